//! Local filesystem change source
//!
//! Wraps the platform notification facility (via `notify`) into a stream of
//! local [`ChangeEvent`]s. The stream never ends on its own and cannot be
//! restarted; dropping it stops the underlying watch.

use crate::error::SyncError;
use crate::logging::*;
use crate::types::ChangeEvent;
use futures::Stream;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use notify::event::ModifyKind;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Raw notifications buffered between the notify thread and the runtime
const NOTIFY_QUEUE: usize = 1024;

pub struct LocalWatcher;

impl LocalWatcher {
	/// Start watching `dir` recursively.
	///
	/// Fails with [`SyncError::Watch`] if the platform facility is missing or
	/// the directory cannot be watched; this is not retried.
	pub fn subscribe(dir: &Path) -> Result<LocalEvents, SyncError> {
		let root = dir.canonicalize().map_err(|e| SyncError::Watch {
			message: format!("{}: {}", dir.display(), e),
		})?;

		let (tx, rx) = mpsc::channel(NOTIFY_QUEUE);
		let filter_root = root.clone();
		let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
			Ok(event) => {
				if is_mutation(&filter_root, &event) {
					// Full queue: enough pending events to trigger a sync already
					let _ = tx.try_send(ChangeEvent::local());
				}
			}
			Err(e) => warn!("filesystem watch error: {}", e),
		})
		.map_err(|e| SyncError::Watch { message: e.to_string() })?;

		watcher.watch(&root, RecursiveMode::Recursive).map_err(|e| SyncError::Watch {
			message: format!("{}: {}", root.display(), e),
		})?;
		info!("watching {}", root.display());

		Ok(LocalEvents { rx, _watcher: watcher })
	}
}

/// Stream of local change events
pub struct LocalEvents {
	rx: mpsc::Receiver<ChangeEvent>,
	_watcher: RecommendedWatcher,
}

impl Stream for LocalEvents {
	type Item = ChangeEvent;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ChangeEvent>> {
		self.rx.poll_recv(cx)
	}
}

/// Whether a notification describes a change worth syncing.
///
/// Noise is:
/// - reads
/// - anything inside the repository's own `.git` directory, which every
///   commit the daemon makes writes to
/// - dot-files such as editor swap and lock files (`.x.swp`, `.#x`)
/// - content or metadata changes reported on a directory; the entries
///   inside it report their own events
pub fn is_mutation(root: &Path, event: &Event) -> bool {
	if matches!(event.kind, EventKind::Access(_)) {
		return false;
	}
	if event.paths.is_empty() {
		// Rescans and overflows carry no path
		return true;
	}
	let dir_modified = matches!(event.kind, EventKind::Modify(kind) if !matches!(kind, ModifyKind::Name(_)));
	event.paths.iter().any(|path| {
		let relative = path.strip_prefix(root).unwrap_or(path);
		if relative.components().any(|c| c.as_os_str() == ".git") {
			return false;
		}
		if relative.file_name().map_or(false, |name| name.to_string_lossy().starts_with('.')) {
			return false;
		}
		!(dir_modified && path.is_dir())
	})
}


// vim: ts=4
