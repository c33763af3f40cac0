//! Core data model shared by the watchers, debouncers and the coordinator

use serde::Serialize;
use std::fmt;
use tokio::time::Instant;
use uuid::Uuid;

/// Which side of the sync pair an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
	Local,
	Remote,
}

/// "Something changed on this side"
///
/// Path and kind are deliberately not carried: any event means the whole
/// side gets resynced.
#[derive(Debug, Clone, Copy)]
pub struct ChangeEvent {
	pub origin: Origin,
	pub timestamp: Instant,
}

impl ChangeEvent {
	pub fn local() -> Self {
		ChangeEvent { origin: Origin::Local, timestamp: Instant::now() }
	}

	pub fn remote() -> Self {
		ChangeEvent { origin: Origin::Remote, timestamp: Instant::now() }
	}
}

/// Debounced signal consumed by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTrigger {
	LocalChanged,
	RemoteChanged,
}

impl SyncTrigger {
	/// Trigger produced by a debouncer watching the given side
	pub fn for_origin(origin: Origin) -> Self {
		match origin {
			Origin::Local => SyncTrigger::LocalChanged,
			Origin::Remote => SyncTrigger::RemoteChanged,
		}
	}

	pub fn direction(self) -> Direction {
		match self {
			SyncTrigger::LocalChanged => Direction::Push,
			SyncTrigger::RemoteChanged => Direction::Pull,
		}
	}
}

/// Direction of a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
	Push,
	Pull,
}

impl Direction {
	pub fn other(self) -> Self {
		match self {
			Direction::Push => Direction::Pull,
			Direction::Pull => Direction::Push,
		}
	}
}

impl fmt::Display for Direction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Direction::Push => write!(f, "push"),
			Direction::Pull => write!(f, "pull"),
		}
	}
}

/// How a cycle (or one attempt within it) ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
	Success,
	Conflict,
	TransientFailure,
	FatalFailure,
}

/// One push-or-pull attempt driven by a single trigger
#[derive(Debug, Clone)]
pub struct SyncCycle {
	pub id: Uuid,
	pub direction: Direction,
	pub started: Instant,
	pub attempts: u32,
	pub outcome: Option<CycleOutcome>,
}

impl SyncCycle {
	pub fn start(direction: Direction) -> Self {
		SyncCycle {
			id: Uuid::new_v4(),
			direction,
			started: Instant::now(),
			attempts: 0,
			outcome: None,
		}
	}

	pub fn finish(mut self, outcome: CycleOutcome) -> Self {
		self.outcome = Some(outcome);
		self
	}
}

/// Snapshot of the working copy as seen by the repository driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryState {
	/// Local HEAD, `None` while the branch is unborn
	pub head: Option<String>,
	/// Remote-tracking head as of the last fetch
	pub upstream: Option<String>,
	pub dirty: bool,
}

impl RepositoryState {
	/// True when there are local commits the remote is not known to have
	pub fn ahead(&self) -> bool {
		match (&self.head, &self.upstream) {
			(None, _) => false,
			(Some(head), Some(upstream)) => head != upstream,
			(Some(_), None) => true,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_trigger_direction() {
		assert_eq!(SyncTrigger::LocalChanged.direction(), Direction::Push);
		assert_eq!(SyncTrigger::RemoteChanged.direction(), Direction::Pull);
		assert_eq!(SyncTrigger::for_origin(Origin::Remote), SyncTrigger::RemoteChanged);
	}

	#[test]
	fn test_direction_other() {
		assert_eq!(Direction::Push.other(), Direction::Pull);
		assert_eq!(Direction::Pull.other(), Direction::Push);
	}

	#[test]
	fn test_repository_state_ahead() {
		let unborn = RepositoryState::default();
		assert!(!unborn.ahead());

		let fresh = RepositoryState { head: Some("a".into()), upstream: None, dirty: false };
		assert!(fresh.ahead());

		let synced =
			RepositoryState { head: Some("a".into()), upstream: Some("a".into()), dirty: true };
		assert!(!synced.ahead());
	}
}

// vim: ts=4
