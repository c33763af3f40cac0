//! Single-instance lock
//!
//! Uses an advisory lock on the lock file, so a crashed daemon never
//! leaves a stale lock behind: the kernel drops it with the process.

use crate::error::SyncError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// RAII guard; the lock is released when this is dropped
#[derive(Debug)]
pub struct InstanceLock {
	path: PathBuf,
	_file: File,
}

impl InstanceLock {
	/// Take the lock without waiting
	pub fn acquire(path: &Path) -> Result<InstanceLock, SyncError> {
		let mut file = OpenOptions::new()
			.create(true)
			.write(true)
			.truncate(false)
			.open(path)
			.map_err(|e| SyncError::LockFailed {
				message: format!("Failed to open lock file {}: {}", path.display(), e),
			})?;

		file.try_lock_exclusive().map_err(|e| SyncError::LockFailed {
			message: if e.kind() == fs2::lock_contended_error().kind() {
				format!("another pullbox instance is running (lock held on {})", path.display())
			} else {
				format!("Failed to lock {}: {}", path.display(), e)
			},
		})?;

		// Record our PID for whoever inspects the file
		let _ = file.set_len(0);
		let _ = write!(file, "{}", std::process::id());

		Ok(InstanceLock { path: path.to_path_buf(), _file: file })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_second_acquire_fails() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("pullbox.lock");

		let first = InstanceLock::acquire(&path).unwrap();
		let second = InstanceLock::acquire(&path);
		assert!(matches!(second, Err(SyncError::LockFailed { .. })));
		assert_eq!(std::fs::read_to_string(first.path()).unwrap(), std::process::id().to_string());
	}

	#[test]
	fn test_released_on_drop() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("pullbox.lock");

		drop(InstanceLock::acquire(&path).unwrap());
		assert!(InstanceLock::acquire(&path).is_ok());
	}
}

// vim: ts=4
