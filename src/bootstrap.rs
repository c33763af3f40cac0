//! Startup checks and repository bootstrap
//!
//! Everything here runs once before the watch loops start. Any failure is a
//! startup FatalFailure: the daemon refuses to run rather than retrying.

use crate::config::Config;
use crate::connection::{shell_quote, RemoteExec, RemoteSpec};
use crate::error::SyncError;
use crate::git::GitRepository;
use crate::logging::*;
use std::env;
use std::path::{Path, PathBuf};

/// Locate an executable the way a shell would
pub fn find_executable(name: &str) -> Option<PathBuf> {
	if name.contains('/') {
		let path = PathBuf::from(name);
		return if is_executable(&path) { Some(path) } else { None };
	}
	let paths = env::var_os("PATH")?;
	env::split_paths(&paths).map(|dir| dir.join(name)).find(|p| is_executable(p))
}

fn is_executable(path: &Path) -> bool {
	use std::os::unix::fs::PermissionsExt;
	match std::fs::metadata(path) {
		Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
		Err(_) => false,
	}
}

/// First word of a shell command line
fn program_name(command: &str) -> &str {
	command.split_whitespace().next().unwrap_or(command)
}

/// `git` and the ssh client must be installed locally
pub fn check_local_binaries(config: &Config) -> Result<(), SyncError> {
	let needed = ["git", program_name(&config.ssh.ssh_command)];
	debug!("Checking presence of local binaries {:?}", needed);
	for name in needed {
		if find_executable(name).is_none() {
			return Err(SyncError::MissingBinary { name: name.to_string(), remote: false });
		}
	}
	Ok(())
}

/// `git` and the watch tool must be installed on the remote host
pub async fn check_remote_binaries(exec: &dyn RemoteExec, config: &Config) -> Result<(), SyncError> {
	let needed = ["git", program_name(&config.watch_command)];
	debug!("Checking presence of remote binaries {:?}", needed);
	for name in needed {
		let found = exec.run(&format!("command -v {}", shell_quote(name))).await;
		match found {
			Ok(output) if output.success() => {}
			Ok(_) => return Err(SyncError::MissingBinary { name: name.to_string(), remote: true }),
			Err(e) => return Err(e.into()),
		}
	}
	Ok(())
}

/// Create the bare repository on the remote if it does not exist.
///
/// `git init --bare` on an existing repository is a harmless reinit.
pub async fn ensure_remote_repo(exec: &dyn RemoteExec, remote: &RemoteSpec) -> Result<(), SyncError> {
	let output = exec.run(&format!("git init --bare -q {}", shell_quote(&remote.path))).await?;
	if !output.success() {
		return Err(SyncError::Other {
			message: format!(
				"cannot create remote repository {}: {}",
				remote.git_url(),
				output.stderr.trim()
			),
		});
	}
	Ok(())
}

/// Run every startup step in order
pub async fn prepare(
	config: &Config,
	exec: &dyn RemoteExec,
	repo: &GitRepository,
) -> Result<(), SyncError> {
	let remote = config.remote_spec()?;

	check_local_binaries(config)?;
	check_remote_binaries(exec, config).await?;
	ensure_remote_repo(exec, &remote).await?;
	repo.init(&remote.git_url()).await?;

	info!("{} <-> {} ready", repo.workdir().display(), remote.git_url());
	Ok(())
}


// vim: ts=4
