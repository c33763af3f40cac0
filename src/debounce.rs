//! Quiet-window debouncing of change events
//!
//! One debouncer runs per side. Every event pushes the deadline out by the
//! quiet window; only when the window passes without events is a single
//! [`SyncTrigger`] emitted for the whole burst.

use crate::logging::*;
use crate::types::{ChangeEvent, Origin, SyncTrigger};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Capacity of the event queue in front of a debouncer
pub const EVENT_QUEUE: usize = 256;

pub struct Debouncer {
	window: Duration,
	origin: Origin,
}

impl Debouncer {
	pub fn new(window: Duration, origin: Origin) -> Self {
		Debouncer { window, origin }
	}

	/// Coalesce `events` into triggers until the event stream closes.
	///
	/// A burst still pending when the input closes is flushed rather than
	/// dropped.
	pub async fn run(self, mut events: mpsc::Receiver<ChangeEvent>, triggers: mpsc::Sender<SyncTrigger>) {
		let trigger = SyncTrigger::for_origin(self.origin);
		let timer = time::sleep(self.window);
		tokio::pin!(timer);
		let mut armed = false;
		let mut coalesced: usize = 0;

		loop {
			tokio::select! {
				event = events.recv() => match event {
					Some(event) => {
						if event.origin != self.origin {
							warn!("{:?} debouncer received a {:?} event", self.origin, event.origin);
						}
						timer.as_mut().reset(Instant::now() + self.window);
						armed = true;
						coalesced += 1;
					}
					None => {
						if armed {
							let _ = triggers.send(trigger).await;
						}
						return;
					}
				},
				_ = &mut timer, if armed => {
					armed = false;
					debug!("{:?}: {} event(s) coalesced into one trigger", self.origin, coalesced);
					coalesced = 0;
					if triggers.send(trigger).await.is_err() {
						return;
					}
				}
			}
		}
	}

	/// Run on its own task; events are fed through the returned handle
	pub fn spawn(self, triggers: mpsc::Sender<SyncTrigger>) -> DebounceHandle {
		let (tx, rx) = mpsc::channel(EVENT_QUEUE);
		let task = tokio::spawn(self.run(rx, triggers));
		DebounceHandle { tx, task }
	}
}

/// Input side of a spawned debouncer
pub struct DebounceHandle {
	tx: mpsc::Sender<ChangeEvent>,
	task: JoinHandle<()>,
}

impl DebounceHandle {
	/// Feed one event. Returns false once the debouncer has stopped.
	///
	/// A full queue still counts as observed: the queued events already
	/// guarantee a trigger.
	pub fn observe(&self, event: ChangeEvent) -> bool {
		match self.tx.try_send(event) {
			Ok(()) => true,
			Err(mpsc::error::TrySendError::Full(_)) => true,
			Err(mpsc::error::TrySendError::Closed(_)) => false,
		}
	}

	/// A sender for producers living on other tasks
	pub fn sender(&self) -> mpsc::Sender<ChangeEvent> {
		self.tx.clone()
	}

	/// Close the input and wait for the final flush
	pub async fn close(self) {
		drop(self.tx);
		let _ = self.task.await;
	}
}


// vim: ts=4
