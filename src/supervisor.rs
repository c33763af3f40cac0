//! Connection supervisor for the remote notification channel
//!
//! Keeps one watch session alive for as long as the daemon runs:
//! Disconnected -> Connecting -> Connected, back to Disconnected on any
//! connection-level failure, with exponential backoff between attempts.
//!
//! The backoff only resets once a session proves itself: it forwarded at
//! least one change or stayed up for [`STABLE_UPTIME`]. A watch that dies
//! right after READY keeps backing off.

use crate::backoff::Backoff;
use crate::channel::RemoteChannel;
use crate::config::RetryConfig;
use crate::logging::*;
use crate::types::ChangeEvent;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// How long a silent session must live before it counts as healthy
pub const STABLE_UPTIME: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
	Disconnected,
	Connecting,
	Connected,
}

pub struct ConnectionSupervisor {
	channel: RemoteChannel,
	backoff: Backoff,
	state: watch::Sender<SupervisorState>,
}

impl ConnectionSupervisor {
	pub fn new(channel: RemoteChannel, reconnect: &RetryConfig) -> Self {
		let (state, _) = watch::channel(SupervisorState::Disconnected);
		ConnectionSupervisor { channel, backoff: Backoff::from_config(reconnect), state }
	}

	pub fn state(&self) -> SupervisorState {
		*self.state.borrow()
	}

	pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
		self.state.subscribe()
	}

	/// Consecutive failures since the last successful connection
	pub fn failures(&self) -> u32 {
		self.backoff.failures()
	}

	/// A connect attempt failed or a live session broke.
	///
	/// Returns how long to wait before the next attempt.
	pub fn on_failure(&mut self) -> Duration {
		self.state.send_replace(SupervisorState::Disconnected);
		self.backoff.next_delay()
	}

	/// Handshake done; the backoff is left alone until [`on_healthy`](Self::on_healthy)
	pub fn on_connected(&mut self) {
		self.state.send_replace(SupervisorState::Connected);
	}

	/// The session delivered changes or outlived [`STABLE_UPTIME`]
	pub fn on_healthy(&mut self) {
		self.backoff.reset();
	}

	/// Supervise the channel until shutdown or until nobody listens for events
	pub async fn run(mut self, events: mpsc::Sender<ChangeEvent>, mut shutdown: watch::Receiver<bool>) {
		loop {
			if *shutdown.borrow() || events.is_closed() {
				return;
			}

			self.state.send_replace(SupervisorState::Connecting);
			let connected = tokio::select! {
				result = self.channel.connect() => result,
				_ = shutdown.changed() => return,
			};

			let failure = match connected {
				Ok(mut session) => {
					self.on_connected();
					info!("remote watch connected");
					let connected_at = Instant::now();
					let pumped = tokio::select! {
						result = session.pump(&events) => result,
						_ = shutdown.changed() => return,
					};
					if session.changes() > 0 || connected_at.elapsed() >= STABLE_UPTIME {
						self.on_healthy();
					}
					match pumped {
						Ok(()) => {
							debug!("remote watch returned, reissuing");
							continue;
						}
						Err(e) => e,
					}
				}
				Err(e) => e,
			};

			if events.is_closed() {
				return;
			}
			let delay = self.on_failure();
			warn!(
				failures = self.failures(),
				"remote watch failed: {}; reconnecting in {:?}", failure, delay
			);
			tokio::select! {
				_ = tokio::time::sleep(delay) => {}
				_ = shutdown.changed() => return,
			}
		}
	}
}

// vim: ts=4
