//! Sync coordinator
//!
//! Single serialization point over the repository. Triggers from both
//! debouncers are folded into a pending set; at most one cycle runs at a
//! time, holding the repository lock for its whole duration including
//! retries. Triggers keep being accepted while a cycle runs, so the event
//! loops never wait on git.
//!
//! Ordering:
//! - leaving idle with both sides pending, push goes first
//! - when a cycle finishes and the other side is pending, that side goes next
//! - a trigger for the side currently syncing means exactly one more cycle

use crate::backoff::Backoff;
use crate::config::RetryConfig;
use crate::error::{FailureKind, RepoError, SyncError};
use crate::logging::*;
use crate::repo::Repository;
use crate::types::{CycleOutcome, Direction, SyncCycle, SyncTrigger};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

/// Observable coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
	Idle,
	Syncing(Direction),
	Retrying(Direction, u32),
}

/// Directions waiting for a cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
	push: bool,
	pull: bool,
}

impl Pending {
	/// Both directions pending, used for the startup sync
	pub fn all() -> Self {
		Pending { push: true, pull: true }
	}

	pub fn set(&mut self, direction: Direction) {
		match direction {
			Direction::Push => self.push = true,
			Direction::Pull => self.pull = true,
		}
	}

	pub fn is_set(&self, direction: Direction) -> bool {
		match direction {
			Direction::Push => self.push,
			Direction::Pull => self.pull,
		}
	}

	pub fn is_empty(&self) -> bool {
		!self.push && !self.pull
	}

	/// Pick and clear the next direction to run.
	///
	/// `last` is the direction of the cycle that just finished, `None` when
	/// leaving idle.
	pub fn take_next(&mut self, last: Option<Direction>) -> Option<Direction> {
		let next = match last {
			Some(done) if self.is_set(done.other()) => done.other(),
			_ if self.push => Direction::Push,
			_ if self.pull => Direction::Pull,
			_ => return None,
		};
		match next {
			Direction::Push => self.push = false,
			Direction::Pull => self.pull = false,
		}
		Some(next)
	}
}

/// Settings shared by every cycle
#[derive(Debug, Clone)]
struct CyclePolicy {
	retry: RetryConfig,
	commit_prefix: String,
}

type CycleResult = Result<SyncCycle, RepoError>;

pub struct SyncCoordinator<R: Repository + 'static> {
	repo: Arc<Mutex<R>>,
	policy: Arc<CyclePolicy>,
	wake: Arc<Notify>,
	state: Arc<watch::Sender<CoordinatorState>>,
	reporter: Option<mpsc::UnboundedSender<SyncCycle>>,
}

impl<R: Repository + 'static> SyncCoordinator<R> {
	pub fn new(repo: R, retry: RetryConfig, commit_prefix: &str) -> Self {
		let (state, _) = watch::channel(CoordinatorState::Idle);
		SyncCoordinator {
			repo: Arc::new(Mutex::new(repo)),
			policy: Arc::new(CyclePolicy { retry, commit_prefix: commit_prefix.to_string() }),
			wake: Arc::new(Notify::new()),
			state: Arc::new(state),
			reporter: None,
		}
	}

	/// Receive every finished cycle
	pub fn with_reporter(mut self, reporter: mpsc::UnboundedSender<SyncCycle>) -> Self {
		self.reporter = Some(reporter);
		self
	}

	/// The mutual-exclusion domain over the repository
	pub fn repository(&self) -> Arc<Mutex<R>> {
		self.repo.clone()
	}

	pub fn subscribe_state(&self) -> watch::Receiver<CoordinatorState> {
		self.state.subscribe()
	}

	/// Drive cycles until the trigger stream closes or shutdown is signalled.
	///
	/// On close, pending work is still drained. On shutdown, pending work is
	/// dropped but the in-flight cycle runs to completion. A fatal repository
	/// error stops the coordinator and is returned.
	pub async fn run(
		self,
		initial: Pending,
		mut triggers: mpsc::Receiver<SyncTrigger>,
		mut shutdown: watch::Receiver<bool>,
	) -> Result<(), SyncError> {
		let mut pending = initial;
		let mut in_flight: Option<JoinHandle<CycleResult>> = None;
		let mut last: Option<Direction> = None;
		let mut intake_open = true;
		let mut stopping = *shutdown.borrow();

		loop {
			if in_flight.is_none() {
				match pending.take_next(last) {
					Some(direction) if !stopping => {
						in_flight = Some(self.spawn_cycle(direction));
					}
					_ => {
						last = None;
						self.state.send_replace(CoordinatorState::Idle);
						if !intake_open || stopping {
							return Ok(());
						}
					}
				}
			}

			tokio::select! {
				biased;

				changed = shutdown.changed(), if !stopping => {
					if changed.is_err() || *shutdown.borrow() {
						info!("shutdown requested, finishing current cycle");
						stopping = true;
						pending = Pending::default();
					}
				}

				trigger = triggers.recv(), if intake_open && !stopping => match trigger {
					Some(trigger) => {
						debug!("trigger {:?}", trigger);
						pending.set(trigger.direction());
						if in_flight.is_some() {
							// Cut a retry backoff short; the trigger stays pending
							self.wake.notify_waiters();
						}
					}
					None => intake_open = false,
				},

				joined = join_cycle(&mut in_flight), if in_flight.is_some() => {
					in_flight = None;
					let cycle = self.finish_cycle(joined)?;
					last = Some(cycle.direction);
					if let Some(reporter) = &self.reporter {
						let _ = reporter.send(cycle);
					}
				}
			}
		}
	}

	fn spawn_cycle(&self, direction: Direction) -> JoinHandle<CycleResult> {
		let cycle = SyncCycle::start(direction);
		let span = tracing::info_span!("cycle", id = %cycle.id, direction = %direction);
		let repo = self.repo.clone();
		let policy = self.policy.clone();
		let wake = self.wake.clone();
		let state = self.state.clone();

		tokio::spawn(
			async move {
				let mut repo = repo.lock().await;
				run_cycle(&mut *repo, cycle, &policy, &wake, &state).await
			}
			.instrument(span),
		)
	}

	fn finish_cycle(&self, joined: Result<CycleResult, JoinError>) -> Result<SyncCycle, SyncError> {
		let result = joined.map_err(|e| SyncError::Other { message: format!("sync cycle panicked: {}", e) })?;
		match result {
			Ok(cycle) => Ok(cycle),
			Err(e) => {
				error!("repository is unusable, stopping: {}", e);
				Err(SyncError::Repository(e))
			}
		}
	}
}

async fn join_cycle(in_flight: &mut Option<JoinHandle<CycleResult>>) -> Result<CycleResult, JoinError> {
	match in_flight {
		Some(handle) => handle.await,
		None => std::future::pending().await,
	}
}

/// Attempt-level classification used for logging and abandonment
pub fn attempt_outcome(err: &RepoError) -> CycleOutcome {
	match err.kind() {
		FailureKind::MergeConflict => CycleOutcome::Conflict,
		FailureKind::Fatal => CycleOutcome::FatalFailure,
		FailureKind::Transient | FailureKind::Rejected => CycleOutcome::TransientFailure,
	}
}

/// "<prefix> 20240131T235959" in UTC
pub fn commit_message(prefix: &str) -> String {
	format!("{} {}", prefix, chrono::Utc::now().format("%Y%m%dT%H%M%S"))
}

async fn run_cycle<R: Repository + ?Sized>(
	repo: &mut R,
	mut cycle: SyncCycle,
	policy: &CyclePolicy,
	wake: &Notify,
	state: &watch::Sender<CoordinatorState>,
) -> CycleResult {
	let direction = cycle.direction;
	let message = commit_message(&policy.commit_prefix);
	let mut backoff = Backoff::from_config(&policy.retry);

	loop {
		state.send_replace(CoordinatorState::Syncing(direction));
		cycle.attempts += 1;
		let attempt = match direction {
			Direction::Push => push_attempt(repo, &message).await,
			Direction::Pull => pull_attempt(repo, &message).await,
		};

		let err = match attempt {
			Ok(()) => {
				info!(attempts = cycle.attempts, "{} cycle succeeded", direction);
				return Ok(cycle.finish(CycleOutcome::Success));
			}
			Err(err) => err,
		};

		let outcome = attempt_outcome(&err);
		match outcome {
			CycleOutcome::FatalFailure => return Err(err),
			CycleOutcome::Conflict if direction == Direction::Pull => {
				// Cycle-scoped: the pair keeps running, the next trigger tries again
				error!("{}; fix the working tree manually, the next change will retry", err);
				return Ok(cycle.finish(CycleOutcome::FatalFailure));
			}
			_ => warn!(attempt = cycle.attempts, ?outcome, "{} attempt failed: {}", direction, err),
		}

		if cycle.attempts >= policy.retry.max_attempts {
			error!(attempts = cycle.attempts, "giving up on {} cycle: {}", direction, err);
			return Ok(cycle.finish(CycleOutcome::FatalFailure));
		}

		// Register for wakeups before announcing the retry so no trigger is missed
		let wakeup = wake.notified();
		tokio::pin!(wakeup);
		wakeup.as_mut().enable();
		state.send_replace(CoordinatorState::Retrying(direction, cycle.attempts));

		let delay = backoff.next_delay();
		debug!("retrying in {:?}", delay);
		tokio::select! {
			_ = tokio::time::sleep(delay) => {}
			_ = wakeup => debug!("backoff cut short by a new trigger"),
		}
	}
}

/// Commit local edits and publish them, merging once on rejection
async fn push_attempt<R: Repository + ?Sized>(repo: &mut R, message: &str) -> Result<(), RepoError> {
	if repo.stage_and_commit(message).await? {
		debug!("committed local changes");
	}
	if !repo.state().await?.ahead() {
		debug!("nothing to push");
		return Ok(());
	}

	match repo.push().await {
		Err(RepoError::Rejected { message }) => {
			info!("push rejected ({}), merging remote changes first", message);
			repo.fetch_and_merge().await?;
			repo.push().await
		}
		other => other,
	}
}

/// Bring remote history into the working tree
async fn pull_attempt<R: Repository + ?Sized>(repo: &mut R, message: &str) -> Result<(), RepoError> {
	if repo.is_dirty().await? {
		// Merge only ever starts from a committed tree
		repo.stage_and_commit(message).await?;
	}
	repo.fetch_and_merge().await
}


// vim: ts=4
