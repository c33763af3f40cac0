//! Error types for pullbox

use std::error::Error;
use std::fmt;
use std::io;

/// Failure classes the coordinator makes retry decisions on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
	/// Network or process hiccup, retried with backoff
	Transient,
	/// Non-fast-forward push, recovered by fetch+merge then push
	Rejected,
	/// Overlapping edits the merge could not resolve
	MergeConflict,
	/// Repository or environment is unusable
	Fatal,
}

/// Main error type for daemon operations
#[derive(Debug)]
pub enum SyncError {
	/// Repository driver failure (nested)
	Repository(RepoError),

	/// Remote connection failure (nested)
	Connection(ConnectionError),

	/// Filesystem notification could not be set up
	Watch { message: String },

	/// A required executable is not available
	MissingBinary { name: String, remote: bool },

	/// Invalid configuration
	InvalidConfig { message: String },

	/// Another instance holds the lock
	LockFailed { message: String },

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Repository(e) => write!(f, "Repository error: {}", e),
			SyncError::Connection(e) => write!(f, "Connection error: {}", e),
			SyncError::Watch { message } => {
				write!(f, "Cannot watch local directory: {}", message)
			}
			SyncError::MissingBinary { name, remote } => {
				if *remote {
					write!(f, "\"{}\" remote binary required (or could not connect to server)", name)
				} else {
					write!(f, "\"{}\" binary required", name)
				}
			}
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::LockFailed { message } => {
				write!(f, "Lock acquisition failed: {}", message)
			}
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<RepoError> for SyncError {
	fn from(e: RepoError) -> Self {
		SyncError::Repository(e)
	}
}

impl From<ConnectionError> for SyncError {
	fn from(e: ConnectionError) -> Self {
		SyncError::Connection(e)
	}
}

/// Repository driver errors, one per classified git failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
	/// Remote has commits we do not (non-fast-forward)
	Rejected { message: String },

	/// Automatic merge failed; the merge was aborted
	MergeConflict { paths: Vec<String> },

	/// Network or process failure worth retrying
	Transient { op: &'static str, message: String },

	/// Repository is in a state we cannot recover from
	Fatal { message: String },
}

impl RepoError {
	pub fn kind(&self) -> FailureKind {
		match self {
			RepoError::Rejected { .. } => FailureKind::Rejected,
			RepoError::MergeConflict { .. } => FailureKind::MergeConflict,
			RepoError::Transient { .. } => FailureKind::Transient,
			RepoError::Fatal { .. } => FailureKind::Fatal,
		}
	}
}

impl fmt::Display for RepoError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RepoError::Rejected { message } => write!(f, "Push rejected: {}", message),
			RepoError::MergeConflict { paths } => {
				if paths.is_empty() {
					write!(f, "Merge conflict")
				} else {
					write!(f, "Merge conflict in {}", paths.join(", "))
				}
			}
			RepoError::Transient { op, message } => write!(f, "{} failed: {}", op, message),
			RepoError::Fatal { message } => write!(f, "Unrecoverable repository state: {}", message),
		}
	}
}

impl Error for RepoError {}

/// Connection-specific errors
#[derive(Debug)]
pub enum ConnectionError {
	/// SSH connection failed
	SshFailed { host: String, source: Box<dyn Error + Send + Sync> },

	/// Subprocess spawn failed
	SpawnFailed { cmd: String, source: io::Error },

	/// Remote side never announced readiness
	HandshakeFailed { message: String },

	/// Connection disconnected unexpectedly
	Disconnected,

	/// Operation timeout
	Timeout,

	/// Stdio unavailable
	StdioUnavailable { what: String },

	/// Remote session ended with a failure status
	RemoteExited { code: Option<i32> },
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::SshFailed { host, source } => {
				write!(f, "SSH connection to {} failed: {}", host, source)
			}
			ConnectionError::SpawnFailed { cmd, source } => {
				write!(f, "Failed to spawn '{}': {}", cmd, source)
			}
			ConnectionError::HandshakeFailed { message } => {
				write!(f, "Handshake failed: {}", message)
			}
			ConnectionError::Disconnected => write!(f, "Connection disconnected"),
			ConnectionError::Timeout => write!(f, "Connection timeout"),
			ConnectionError::StdioUnavailable { what } => {
				write!(f, "Stdio unavailable: {}", what)
			}
			ConnectionError::RemoteExited { code: Some(code) } => {
				write!(f, "Remote session exited with status {}", code)
			}
			ConnectionError::RemoteExited { code: None } => {
				write!(f, "Remote session killed by signal")
			}
		}
	}
}

impl Error for ConnectionError {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_repo_error_kinds() {
		assert_eq!(RepoError::Rejected { message: String::new() }.kind(), FailureKind::Rejected);
		assert_eq!(RepoError::MergeConflict { paths: vec![] }.kind(), FailureKind::MergeConflict);
		assert_eq!(
			RepoError::Transient { op: "fetch", message: String::new() }.kind(),
			FailureKind::Transient
		);
		assert_eq!(RepoError::Fatal { message: String::new() }.kind(), FailureKind::Fatal);
	}

	#[test]
	fn test_nested_errors_convert() {
		let e = SyncError::from(RepoError::MergeConflict { paths: vec!["a".into()] });
		assert!(matches!(e, SyncError::Repository(RepoError::MergeConflict { .. })));
		assert!(e.to_string().starts_with("Repository error: "));

		let e = SyncError::from(ConnectionError::Timeout);
		assert!(matches!(e, SyncError::Connection(ConnectionError::Timeout)));
	}

	#[test]
	fn test_display_messages() {
		let e = RepoError::MergeConflict { paths: vec!["a.txt".into(), "b.txt".into()] };
		assert_eq!(e.to_string(), "Merge conflict in a.txt, b.txt");

		let e = SyncError::MissingBinary { name: "inotifywait".into(), remote: true };
		assert!(e.to_string().contains("remote binary required"));
	}
}

// vim: ts=4
