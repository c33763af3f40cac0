//! Repository driver backed by the `git` command line tool

use crate::error::RepoError;
use crate::logging::*;
use crate::repo::Repository;
use crate::types::RepositoryState;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Captured result of one git invocation
#[derive(Debug, Clone, Default)]
pub struct GitOutput {
	pub status: Option<i32>,
	pub stdout: String,
	pub stderr: String,
}

impl GitOutput {
	pub fn success(&self) -> bool {
		self.status == Some(0)
	}

	/// Last non-empty stderr line, which is where git puts the reason
	fn reason(&self) -> String {
		self.stderr
			.lines()
			.chain(self.stdout.lines())
			.map(str::trim)
			.filter(|l| !l.is_empty())
			.last()
			.unwrap_or("no output")
			.to_string()
	}
}

/// Working copy at `workdir` tracking `<remote>/<branch>`
#[derive(Debug, Clone)]
pub struct GitRepository {
	workdir: PathBuf,
	remote: String,
	branch: String,
}

impl GitRepository {
	pub fn new(workdir: impl Into<PathBuf>, remote: &str, branch: &str) -> Self {
		GitRepository { workdir: workdir.into(), remote: remote.to_string(), branch: branch.to_string() }
	}

	pub fn workdir(&self) -> &Path {
		&self.workdir
	}

	pub fn upstream_ref(&self) -> String {
		format!("refs/remotes/{}/{}", self.remote, self.branch)
	}

	/// Run git inside the working copy without interpreting the status
	pub async fn git(&self, args: &[&str]) -> Result<GitOutput, RepoError> {
		debug!("git {}", args.join(" "));
		let output = Command::new("git")
			.arg("-C")
			.arg(&self.workdir)
			.args(["-c", "core.symlinks=true"])
			.args(args)
			.env("LC_ALL", "C")
			.env("GIT_TERMINAL_PROMPT", "0")
			.stdin(Stdio::null())
			.output()
			.await
			.map_err(|e| RepoError::Fatal { message: format!("cannot run git: {}", e) })?;

		Ok(GitOutput {
			status: output.status.code(),
			stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		})
	}

	/// Run git and turn a non-zero status into a classified error
	async fn git_ok(&self, op: &'static str, args: &[&str]) -> Result<GitOutput, RepoError> {
		let out = self.git(args).await?;
		if out.success() {
			Ok(out)
		} else {
			Err(classify_failure(op, &out))
		}
	}

	/// Resolve a revision, `None` if it does not exist (e.g. unborn HEAD)
	pub async fn rev_parse(&self, rev: &str) -> Result<Option<String>, RepoError> {
		let out = self.git(&["rev-parse", "-q", "--verify", rev]).await?;
		match out.status {
			Some(0) => Ok(Some(out.stdout.trim().to_string())),
			Some(1) => Ok(None),
			_ => Err(classify_failure("rev-parse", &out)),
		}
	}

	async fn conflicted_paths(&self) -> Result<Vec<String>, RepoError> {
		let out = self.git_ok("diff", &["diff", "--name-only", "--diff-filter=U"]).await?;
		Ok(out.stdout.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
	}

	/// Make `workdir` a repository tracking `remote_url`.
	///
	/// Idempotent: an existing repository only gets its remote url and
	/// committer identity checked.
	pub async fn init(&self, remote_url: &str) -> Result<(), RepoError> {
		tokio::fs::create_dir_all(&self.workdir).await.map_err(|e| RepoError::Fatal {
			message: format!("cannot create {}: {}", self.workdir.display(), e),
		})?;

		if !self.workdir.join(".git").exists() {
			info!("initializing repository in {}", self.workdir.display());
			self.git_ok("init", &["init", "-q"]).await?;
			let head = format!("refs/heads/{}", self.branch);
			self.git_ok("init", &["symbolic-ref", "HEAD", &head]).await?;
		}

		let current = self.git(&["remote", "get-url", &self.remote]).await?;
		if !current.success() {
			self.git_ok("init", &["remote", "add", &self.remote, remote_url]).await?;
		} else if current.stdout.trim() != remote_url {
			warn!(
				"remote {} pointed at {}, switching to {}",
				self.remote,
				current.stdout.trim(),
				remote_url
			);
			self.git_ok("init", &["remote", "set-url", &self.remote, remote_url]).await?;
		}

		for (key, value) in [("user.name", "pullbox"), ("user.email", "pullbox@localhost")] {
			if !self.git(&["config", key]).await?.success() {
				self.git_ok("init", &["config", key, value]).await?;
			}
		}
		Ok(())
	}

	/// `add -A` then commit; the caller unstages if this fails part way
	async fn commit_all(&self, message: &str) -> Result<bool, RepoError> {
		self.git_ok("add", &["add", "-A"]).await?;

		// 0 = nothing staged, 1 = staged changes
		let staged = self.git(&["diff", "--cached", "--quiet"]).await?;
		match staged.status {
			Some(0) => return Ok(false),
			Some(1) => {}
			_ => return Err(classify_failure("diff", &staged)),
		}

		self.git_ok("commit", &["commit", "-q", "--no-verify", "-m", message]).await?;
		Ok(true)
	}

	/// Drop whatever a failed commit left in the index
	async fn unstage(&self) {
		match self.git(&["reset", "-q"]).await {
			Ok(out) if out.success() => debug!("index reset after failed commit"),
			Ok(out) => warn!("cannot reset index after failed commit: {}", out.reason()),
			Err(e) => warn!("cannot reset index after failed commit: {}", e),
		}
	}
}

#[async_trait]
impl Repository for GitRepository {
	async fn stage_and_commit(&mut self, message: &str) -> Result<bool, RepoError> {
		let result = self.commit_all(message).await;
		if result.is_err() {
			self.unstage().await;
		}
		result
	}

	async fn push(&mut self) -> Result<(), RepoError> {
		let refspec = format!("HEAD:refs/heads/{}", self.branch);
		self.git_ok("push", &["push", "-q", &self.remote, &refspec]).await?;
		Ok(())
	}

	async fn fetch_and_merge(&mut self) -> Result<(), RepoError> {
		self.git_ok("fetch", &["fetch", "-q", &self.remote]).await?;

		let upstream = self.upstream_ref();
		if self.rev_parse(&upstream).await?.is_none() {
			debug!("{} does not exist yet, nothing to merge", upstream);
			return Ok(());
		}

		// Both sides may have started their own history before the first sync
		let out = self.git(&["merge", "--no-edit", "--allow-unrelated-histories", &upstream]).await?;
		if out.success() {
			return Ok(());
		}

		let paths = self.conflicted_paths().await?;
		if self.rev_parse("MERGE_HEAD").await?.is_some() {
			self.git_ok("merge", &["merge", "--abort"]).await?;
		}
		if !paths.is_empty() || out.stdout.contains("CONFLICT") {
			return Err(RepoError::MergeConflict { paths });
		}
		Err(classify_failure("merge", &out))
	}

	async fn is_dirty(&mut self) -> Result<bool, RepoError> {
		let out = self.git_ok("status", &["status", "--porcelain"]).await?;
		Ok(!out.stdout.trim().is_empty())
	}

	async fn state(&mut self) -> Result<RepositoryState, RepoError> {
		let upstream = self.upstream_ref();
		Ok(RepositoryState {
			head: self.rev_parse("HEAD").await?,
			upstream: self.rev_parse(&upstream).await?,
			dirty: self.is_dirty().await?,
		})
	}
}

/// Map a failed git invocation onto the failure taxonomy
pub fn classify_failure(op: &'static str, out: &GitOutput) -> RepoError {
	let text = format!("{}\n{}", out.stderr, out.stdout).to_lowercase();

	if text.contains("not a git repository")
		|| text.contains("corrupt")
		|| text.contains("bad object")
	{
		return RepoError::Fatal { message: out.reason() };
	}

	if op == "push"
		&& (text.contains("[rejected]")
			|| text.contains("non-fast-forward")
			|| text.contains("fetch first"))
	{
		return RepoError::Rejected { message: out.reason() };
	}

	RepoError::Transient { op, message: out.reason() }
}


// vim: ts=4
