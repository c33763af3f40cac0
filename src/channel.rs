//! Remote notification channel
//!
//! A long-lived ssh session runs a small shell loop on the remote host:
//! announce readiness, then block in the watch command and print one line
//! per observed change. Every printed line becomes a remote [`ChangeEvent`].

use crate::connection::{shell_quote, RemoteExec, RemoteSession};
use crate::error::ConnectionError;
use crate::logging::*;
use crate::types::ChangeEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// First line the remote loop prints once it is running
pub const READY_LINE: &str = "READY";

/// Opens watch sessions on the remote host
#[derive(Clone)]
pub struct RemoteChannel {
	exec: Arc<dyn RemoteExec>,
	script: String,
	connect_timeout: Duration,
}

impl RemoteChannel {
	pub fn new(
		exec: Arc<dyn RemoteExec>,
		watch_command: &str,
		remote_dir: &str,
		connect_timeout: Duration,
	) -> Self {
		RemoteChannel { exec, script: watch_script(watch_command, remote_dir), connect_timeout }
	}

	/// Start a session and wait for its READY handshake
	pub async fn connect(&self) -> Result<ConnectedChannel, ConnectionError> {
		let mut session = self.exec.open(&self.script).await?;

		let result = tokio::time::timeout(self.connect_timeout, await_ready(session.as_mut())).await;
		match result {
			Ok(Ok(())) => Ok(ConnectedChannel { session, changes: 0 }),
			Ok(Err(e)) => Err(e),
			Err(_) => Err(ConnectionError::Timeout),
		}
	}
}

async fn await_ready(session: &mut dyn RemoteSession) -> Result<(), ConnectionError> {
	loop {
		match session.next_line().await? {
			Some(line) if line.trim() == READY_LINE => return Ok(()),
			Some(line) => debug!("ignoring pre-handshake output: {}", line.trim()),
			None => {
				let code = session.wait().await?;
				return Err(ConnectionError::HandshakeFailed {
					message: format!("remote session ended before READY (status {:?})", code),
				});
			}
		}
	}
}

/// A session past its handshake.
///
/// READY is printed before the watch command starts, so a completed
/// handshake alone says nothing about whether the watch works.
/// [`changes`](Self::changes) tells the caller whether it ever did.
pub struct ConnectedChannel {
	session: Box<dyn RemoteSession>,
	changes: u64,
}

impl ConnectedChannel {
	/// Changes forwarded so far
	pub fn changes(&self) -> u64 {
		self.changes
	}

	/// Forward remote changes until the session ends.
	///
	/// A normal exit (status 0) counts as one observed change and returns
	/// `Ok(())` so the caller can reissue the watch right away. Anything
	/// else is a connection-level failure.
	pub async fn pump(&mut self, events: &mpsc::Sender<ChangeEvent>) -> Result<(), ConnectionError> {
		while let Some(line) = self.session.next_line().await? {
			if line.trim().is_empty() {
				continue;
			}
			if events.send(ChangeEvent::remote()).await.is_err() {
				// Receiver gone: the daemon is shutting down
				return Ok(());
			}
			self.changes += 1;
		}

		match self.session.wait().await? {
			Some(0) => {
				self.changes += 1;
				let _ = events.send(ChangeEvent::remote()).await;
				Ok(())
			}
			code => Err(ConnectionError::RemoteExited { code }),
		}
	}
}

/// `echo READY; while <watch> <dir>; do echo CHANGED; done; exit 1`
pub fn watch_script(watch_command: &str, remote_dir: &str) -> String {
	format!(
		"echo {}; while {} {}; do echo CHANGED; done; exit 1",
		READY_LINE,
		watch_command,
		shell_quote(remote_dir)
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_watch_script() {
		let script = watch_script("inotifywait -qq -r -e modify", "my box");
		assert_eq!(
			script,
			"echo READY; while inotifywait -qq -r -e modify 'my box'; do echo CHANGED; done; exit 1"
		);
	}
}

// vim: ts=4
