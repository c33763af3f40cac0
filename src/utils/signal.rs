//! Signal handling for graceful shutdown

use tokio::sync::watch;
use tracing::{debug, warn};

/// Resolve on the first SIGINT or SIGTERM
pub async fn shutdown_signal() {
	use tokio::signal;

	let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGTERM handler: {}. Only Ctrl-C will stop the daemon gracefully.", e);
			let _ = signal::ctrl_c().await;
			return;
		}
	};

	tokio::select! {
		_ = sigterm.recv() => debug!("Received SIGTERM, shutting down..."),
		_ = signal::ctrl_c() => debug!("Received SIGINT, shutting down..."),
	}
}

/// Spawn a task flipping the returned flag to `true` on SIGINT/SIGTERM.
///
/// A second signal exits immediately without waiting for the current cycle.
pub fn setup_signal_handlers() -> watch::Receiver<bool> {
	let (tx, rx) = watch::channel(false);
	tokio::spawn(async move {
		shutdown_signal().await;
		let _ = tx.send(true);
		shutdown_signal().await;
		warn!("Second signal received, exiting without waiting for the current cycle");
		std::process::exit(130); // 128 + SIGINT(2)
	});
	rx
}

// vim: ts=4
