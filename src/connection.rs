//! Remote execution over ssh
//!
//! The sync engine only needs two things from the remote side: run a short
//! command and collect its output, or start a long-running command and read
//! its stdout line by line. Both are behind [`RemoteExec`] so the supervisor
//! and bootstrap code can be driven by fakes in tests.

use crate::error::ConnectionError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

/// Remote half of a sync pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
	pub host: String,
	pub path: String,
}

impl RemoteSpec {
	/// Parse `host:path`. Locations starting with `/`, `.` or `~` are local
	/// paths and yield `None`.
	pub fn parse(location: &str) -> Option<Self> {
		if location.starts_with('/') || location.starts_with('.') || location.starts_with('~') {
			return None;
		}
		let colon_pos = location.find(':')?;
		let host = &location[..colon_pos];
		let path = &location[colon_pos + 1..];
		if host.is_empty() || path.is_empty() {
			return None;
		}
		Some(RemoteSpec { host: host.to_string(), path: path.to_string() })
	}

	/// scp-like url git understands for the ssh transport
	pub fn git_url(&self) -> String {
		format!("{}:{}", self.host, self.path)
	}
}

/// Result of a short remote command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
	/// Exit code, `None` if killed by a signal
	pub status: Option<i32>,
	pub stdout: String,
	pub stderr: String,
}

impl CommandOutput {
	pub fn success(&self) -> bool {
		self.status == Some(0)
	}
}

/// Capability to execute commands on the remote host
#[async_trait]
pub trait RemoteExec: Send + Sync {
	/// Run a command to completion
	async fn run(&self, command: &str) -> Result<CommandOutput, ConnectionError>;

	/// Start a long-running command and stream its stdout
	async fn open(&self, command: &str) -> Result<Box<dyn RemoteSession>, ConnectionError>;
}

/// A running remote command
#[async_trait]
pub trait RemoteSession: Send {
	/// Next stdout line, `None` once the stream is closed
	async fn next_line(&mut self) -> Result<Option<String>, ConnectionError>;

	/// Wait for the command to exit and return its exit code
	async fn wait(&mut self) -> Result<Option<i32>, ConnectionError>;
}

/// [`RemoteExec`] backed by the system ssh client
#[derive(Debug, Clone)]
pub struct SshExec {
	ssh_command: String,
	host: String,
	keepalive_secs: u64,
}

impl SshExec {
	pub fn new(ssh_command: &str, host: &str) -> Self {
		SshExec { ssh_command: ssh_command.to_string(), host: host.to_string(), keepalive_secs: 0 }
	}

	/// Probe long-running sessions so a dead link ends them (0 disables)
	pub fn with_keepalive(mut self, secs: u64) -> Self {
		self.keepalive_secs = secs;
		self
	}

	fn command(&self, remote_command: &str) -> Command {
		let mut cmd = Command::new(&self.ssh_command);
		cmd.arg(&self.host).arg(remote_command).kill_on_drop(true);
		cmd
	}

	fn session_command(&self, remote_command: &str) -> Command {
		let mut cmd = Command::new(&self.ssh_command);
		if self.keepalive_secs > 0 {
			cmd.arg("-o")
				.arg(format!("ServerAliveInterval={}", self.keepalive_secs))
				.args(["-o", "ServerAliveCountMax=3"]);
		}
		cmd.arg(&self.host).arg(remote_command).kill_on_drop(true);
		cmd
	}

	fn spawn_error(&self, e: std::io::Error) -> ConnectionError {
		if e.kind() == std::io::ErrorKind::NotFound {
			ConnectionError::SpawnFailed { cmd: self.ssh_command.clone(), source: e }
		} else {
			ConnectionError::SshFailed { host: self.host.clone(), source: Box::new(e) }
		}
	}
}

#[async_trait]
impl RemoteExec for SshExec {
	async fn run(&self, command: &str) -> Result<CommandOutput, ConnectionError> {
		let output = self
			.command(command)
			.stdin(Stdio::null())
			.output()
			.await
			.map_err(|e| self.spawn_error(e))?;

		Ok(CommandOutput {
			status: output.status.code(),
			stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		})
	}

	async fn open(&self, command: &str) -> Result<Box<dyn RemoteSession>, ConnectionError> {
		let mut child = self
			.session_command(command)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.spawn()
			.map_err(|e| self.spawn_error(e))?;

		let stdout = child
			.stdout
			.take()
			.ok_or(ConnectionError::StdioUnavailable { what: "stdout".to_string() })?;

		Ok(Box::new(ChildSession { lines: BufReader::new(stdout).lines(), child }))
	}
}

/// Session wrapping a local child process (the ssh client)
pub struct ChildSession {
	lines: Lines<BufReader<ChildStdout>>,
	child: Child,
}

#[async_trait]
impl RemoteSession for ChildSession {
	async fn next_line(&mut self) -> Result<Option<String>, ConnectionError> {
		self.lines.next_line().await.map_err(|_| ConnectionError::Disconnected)
	}

	async fn wait(&mut self) -> Result<Option<i32>, ConnectionError> {
		let status = self.child.wait().await.map_err(|_| ConnectionError::Disconnected)?;
		Ok(status.code())
	}
}

/// Quote a string for a POSIX shell on the remote side
pub fn shell_quote(s: &str) -> String {
	format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_remote() {
		let spec = RemoteSpec::parse("backup.example.com:box").unwrap();
		assert_eq!(spec.host, "backup.example.com");
		assert_eq!(spec.path, "box");
		assert_eq!(spec.git_url(), "backup.example.com:box");

		let spec = RemoteSpec::parse("user@10.0.0.1:/srv/box").unwrap();
		assert_eq!(spec.host, "user@10.0.0.1");
		assert_eq!(spec.path, "/srv/box");
	}

	#[test]
	fn test_parse_local_paths_rejected() {
		assert!(RemoteSpec::parse("/absolute/path").is_none());
		assert!(RemoteSpec::parse("./relative:path").is_none());
		assert!(RemoteSpec::parse("~/box").is_none());
		assert!(RemoteSpec::parse("no_colon").is_none());
		assert!(RemoteSpec::parse("host:").is_none());
		assert!(RemoteSpec::parse(":path").is_none());
	}

	#[test]
	fn test_shell_quote() {
		assert_eq!(shell_quote("box"), "'box'");
		assert_eq!(shell_quote("it's"), "'it'\\''s'");
	}

	#[tokio::test]
	async fn test_missing_ssh_binary() {
		let exec = SshExec::new("/nonexistent/ssh-binary", "host");
		let err = exec.run("true").await.unwrap_err();
		assert!(matches!(err, ConnectionError::SpawnFailed { .. }));
	}
}

// vim: ts=4
