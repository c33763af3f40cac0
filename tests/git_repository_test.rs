//! Git repository driver tests
//!
//! These run the real `git` binary against a bare repository and two working
//! copies inside a temp dir. They are skipped when git is not installed.

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

use pullbox::{GitRepository, RepoError, Repository};

// ============================================================================
// Helper Functions
// ============================================================================

fn git_available() -> bool {
	Command::new("git").arg("--version").output().map(|o| o.status.success()).unwrap_or(false)
}

macro_rules! require_git {
	() => {
		if !git_available() {
			eprintln!("git not found, skipping");
			return;
		}
	};
}

/// A bare "remote" plus helpers to create working copies tracking it
struct Fixture {
	root: TempDir,
}

impl Fixture {
	fn new() -> Self {
		let root = TempDir::new().unwrap();
		let status = Command::new("git")
			.args(["init", "--bare", "-q"])
			.arg(root.path().join("remote.git"))
			.status()
			.unwrap();
		assert!(status.success());
		Fixture { root }
	}

	fn bare(&self) -> std::path::PathBuf {
		self.root.path().join("remote.git")
	}

	async fn working_copy(&self, name: &str) -> GitRepository {
		let repo = GitRepository::new(self.root.path().join(name), "origin", "master");
		repo.init(self.bare().to_str().unwrap()).await.unwrap();
		repo
	}

	/// Head of `master` in the bare repository
	fn remote_head(&self) -> Option<String> {
		let out = Command::new("git")
			.arg("-C")
			.arg(self.bare())
			.args(["rev-parse", "-q", "--verify", "refs/heads/master"])
			.output()
			.unwrap();
		if out.status.success() {
			Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
		} else {
			None
		}
	}
}

fn write(repo: &GitRepository, name: &str, content: &str) {
	let path = repo.workdir().join(name);
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(path, content).unwrap();
}

fn read(repo: &GitRepository, name: &str) -> String {
	fs::read_to_string(repo.workdir().join(name)).unwrap()
}

async fn commit_count(repo: &GitRepository) -> usize {
	let out = repo.git(&["rev-list", "--count", "HEAD"]).await.unwrap();
	out.stdout.trim().parse().unwrap_or(0)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_init_is_idempotent() {
	require_git!();
	let fx = Fixture::new();
	let repo = fx.working_copy("a").await;
	assert!(repo.workdir().join(".git").is_dir());

	// Second run only checks the remote url and identity
	repo.init(fx.bare().to_str().unwrap()).await.unwrap();
	let url = repo.git(&["remote", "get-url", "origin"]).await.unwrap();
	assert_eq!(url.stdout.trim(), fx.bare().to_str().unwrap());

	let head = repo.git(&["symbolic-ref", "HEAD"]).await.unwrap();
	assert_eq!(head.stdout.trim(), "refs/heads/master");
}

#[tokio::test]
async fn test_commit_adds_exactly_one_commit() {
	require_git!();
	let fx = Fixture::new();
	let mut repo = fx.working_copy("a").await;

	write(&repo, "notes/a.txt", "hello\n");
	write(&repo, "b.txt", "world\n");
	assert!(repo.stage_and_commit("auto commit at 20240101T000000").await.unwrap());
	assert_eq!(commit_count(&repo).await, 1);

	// Clean tree: nothing to do
	assert!(!repo.stage_and_commit("auto commit at 20240101T000001").await.unwrap());
	assert_eq!(commit_count(&repo).await, 1);

	let msg = repo.git(&["log", "-1", "--format=%s"]).await.unwrap();
	assert_eq!(msg.stdout.trim(), "auto commit at 20240101T000000");
}

#[tokio::test]
async fn test_deletions_are_committed() {
	require_git!();
	let fx = Fixture::new();
	let mut repo = fx.working_copy("a").await;

	write(&repo, "gone.txt", "bye\n");
	repo.stage_and_commit("first").await.unwrap();
	fs::remove_file(repo.workdir().join("gone.txt")).unwrap();
	assert!(repo.is_dirty().await.unwrap());

	assert!(repo.stage_and_commit("second").await.unwrap());
	let tracked = repo.git(&["ls-files"]).await.unwrap();
	assert!(tracked.stdout.trim().is_empty());
}

#[tokio::test]
async fn test_failed_commit_leaves_nothing_staged() {
	require_git!();
	let fx = Fixture::new();
	let mut repo = fx.working_copy("a").await;
	write(&repo, "first.txt", "1\n");
	assert!(repo.stage_and_commit("first").await.unwrap());

	// Signing with a program that always fails makes the commit itself fail
	repo.git(&["config", "commit.gpgsign", "true"]).await.unwrap();
	repo.git(&["config", "gpg.program", "false"]).await.unwrap();
	write(&repo, "second.txt", "2\n");

	assert!(repo.stage_and_commit("second").await.is_err());
	assert_eq!(commit_count(&repo).await, 1);
	let staged = repo.git(&["diff", "--cached", "--quiet"]).await.unwrap();
	assert!(staged.success(), "index still has staged changes");
	// The edit itself is still there for the next attempt
	assert!(repo.is_dirty().await.unwrap());
	assert_eq!(read(&repo, "second.txt"), "2\n");
}

#[tokio::test]
async fn test_is_dirty_and_state() {
	require_git!();
	let fx = Fixture::new();
	let mut repo = fx.working_copy("a").await;

	assert!(!repo.is_dirty().await.unwrap());
	let state = repo.state().await.unwrap();
	assert_eq!(state.head, None);
	assert!(!state.ahead());

	write(&repo, "a.txt", "a\n");
	assert!(repo.is_dirty().await.unwrap());

	repo.stage_and_commit("one").await.unwrap();
	let state = repo.state().await.unwrap();
	assert!(state.head.is_some());
	assert_eq!(state.upstream, None);
	assert!(!state.dirty);
	assert!(state.ahead());
}

#[tokio::test]
async fn test_push_publishes_head() {
	require_git!();
	let fx = Fixture::new();
	let mut repo = fx.working_copy("a").await;

	write(&repo, "a.txt", "a\n");
	repo.stage_and_commit("one").await.unwrap();
	repo.push().await.unwrap();

	let state = repo.state().await.unwrap();
	assert_eq!(fx.remote_head(), state.head);
}

#[tokio::test]
async fn test_rejected_push_then_merge_then_push() {
	require_git!();
	let fx = Fixture::new();
	let mut a = fx.working_copy("a").await;
	let mut b = fx.working_copy("b").await;

	write(&a, "from-a.txt", "a\n");
	a.stage_and_commit("a").await.unwrap();
	a.push().await.unwrap();

	write(&b, "from-b.txt", "b\n");
	b.stage_and_commit("b").await.unwrap();
	let err = b.push().await.unwrap_err();
	assert!(matches!(err, RepoError::Rejected { .. }), "unexpected {:?}", err);

	b.fetch_and_merge().await.unwrap();
	assert_eq!(read(&b, "from-a.txt"), "a\n");
	b.push().await.unwrap();
	assert_eq!(fx.remote_head(), b.state().await.unwrap().head);

	a.fetch_and_merge().await.unwrap();
	assert_eq!(read(&a, "from-b.txt"), "b\n");
	assert_eq!(a.state().await.unwrap().head, fx.remote_head());
}

#[tokio::test]
async fn test_fetch_without_upstream_is_noop() {
	require_git!();
	let fx = Fixture::new();
	let mut repo = fx.working_copy("a").await;

	repo.fetch_and_merge().await.unwrap();
	assert_eq!(repo.state().await.unwrap().head, None);
}

#[tokio::test]
async fn test_merge_conflict_is_aborted() {
	require_git!();
	let fx = Fixture::new();
	let mut a = fx.working_copy("a").await;
	let mut b = fx.working_copy("b").await;

	write(&a, "shared.txt", "base\n");
	a.stage_and_commit("base").await.unwrap();
	a.push().await.unwrap();
	b.fetch_and_merge().await.unwrap();

	write(&a, "shared.txt", "from a\n");
	a.stage_and_commit("a edit").await.unwrap();
	a.push().await.unwrap();

	write(&b, "shared.txt", "from b\n");
	b.stage_and_commit("b edit").await.unwrap();
	let before = b.state().await.unwrap().head;

	match b.fetch_and_merge().await {
		Err(RepoError::MergeConflict { paths }) => assert_eq!(paths, vec!["shared.txt".to_string()]),
		other => panic!("expected a merge conflict, got {:?}", other),
	}

	// Aborted: back on our own commit with a clean tree
	assert_eq!(b.rev_parse("MERGE_HEAD").await.unwrap(), None);
	assert!(!b.is_dirty().await.unwrap());
	assert_eq!(b.state().await.unwrap().head, before);
	assert_eq!(read(&b, "shared.txt"), "from b\n");
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinks_are_committed_as_links() {
	require_git!();
	let fx = Fixture::new();
	let mut a = fx.working_copy("a").await;
	let mut b = fx.working_copy("b").await;

	write(&a, "target.txt", "pointed at\n");
	std::os::unix::fs::symlink("target.txt", a.workdir().join("link")).unwrap();
	a.stage_and_commit("link").await.unwrap();

	let entry = a.git(&["ls-files", "-s", "link"]).await.unwrap();
	assert!(entry.stdout.starts_with("120000"), "not stored as a link: {}", entry.stdout);

	a.push().await.unwrap();
	b.fetch_and_merge().await.unwrap();
	let link = b.workdir().join("link");
	assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
	assert_eq!(fs::read_link(&link).unwrap(), Path::new("target.txt"));
}

#[tokio::test]
async fn test_broken_repository_is_fatal() {
	require_git!();
	let dir = TempDir::new().unwrap();
	let mut repo = GitRepository::new(dir.path(), "origin", "master");

	let err = repo.is_dirty().await.unwrap_err();
	assert!(matches!(err, RepoError::Fatal { .. }), "unexpected {:?}", err);
}

// vim: ts=4
