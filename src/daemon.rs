//! The long-lived context object tying the sync engine together
//!
//! ```text
//! LocalWatcher -> Debouncer(local)  -+
//!                                    +-> SyncCoordinator -> Repository
//! Supervisor   -> Debouncer(remote) -+
//!    (RemoteChannel)       poll timer -+
//! ```

use crate::channel::RemoteChannel;
use crate::config::Config;
use crate::connection::{RemoteExec, SshExec};
use crate::coordinator::{CoordinatorState, Pending, SyncCoordinator};
use crate::debounce::{DebounceHandle, Debouncer};
use crate::error::SyncError;
use crate::git::GitRepository;
use crate::logging::*;
use crate::repo::Repository;
use crate::supervisor::ConnectionSupervisor;
use crate::types::{Origin, SyncCycle, SyncTrigger};
use crate::watcher::{LocalEvents, LocalWatcher};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

/// Capacity of the trigger queue in front of the coordinator
pub const TRIGGER_QUEUE: usize = 16;

pub struct SyncDaemon<R: Repository + 'static = GitRepository> {
	config: Config,
	coordinator: SyncCoordinator<R>,
	local_debouncer: Debouncer,
	remote_debouncer: Debouncer,
	supervisor: ConnectionSupervisor,
	local_events: LocalEvents,
}

impl SyncDaemon<GitRepository> {
	/// Daemon over the configured git working copy and ssh remote
	pub fn from_config(config: Config) -> Result<Self, SyncError> {
		config.validate()?;
		let remote = config.remote_spec()?;
		let exec =
			Arc::new(SshExec::new(&config.ssh.ssh_command, &remote.host).with_keepalive(config.ssh.keepalive_secs));
		let repo = GitRepository::new(&config.local_dir, &config.remote_name, &config.branch);
		SyncDaemon::with_parts(config, repo, exec)
	}
}

impl<R: Repository + 'static> SyncDaemon<R> {
	/// Assemble the engine from explicit collaborators.
	///
	/// Subscribing to local changes happens here, so a missing notification
	/// facility fails before anything runs.
	pub fn with_parts(config: Config, repo: R, exec: Arc<dyn RemoteExec>) -> Result<Self, SyncError> {
		let remote = config.remote_spec()?;
		let local_events = LocalWatcher::subscribe(&config.local_dir)?;

		let channel =
			RemoteChannel::new(exec, &config.watch_command, &remote.path, config.connect_timeout());
		let supervisor = ConnectionSupervisor::new(channel, &config.reconnect);
		let coordinator = SyncCoordinator::new(repo, config.retry.clone(), &config.commit_message_prefix);

		Ok(SyncDaemon {
			local_debouncer: Debouncer::new(config.debounce(), Origin::Local),
			remote_debouncer: Debouncer::new(config.debounce(), Origin::Remote),
			config,
			coordinator,
			supervisor,
			local_events,
		})
	}

	/// Receive every finished sync cycle
	pub fn with_reporter(mut self, reporter: mpsc::UnboundedSender<SyncCycle>) -> Self {
		self.coordinator = self.coordinator.with_reporter(reporter);
		self
	}

	pub fn repository(&self) -> Arc<Mutex<R>> {
		self.coordinator.repository()
	}

	pub fn subscribe_state(&self) -> watch::Receiver<CoordinatorState> {
		self.coordinator.subscribe_state()
	}

	/// Run until shutdown is signalled or the repository becomes unusable.
	///
	/// Starts with a push and a pull pending so edits made while the daemon
	/// was down get published and remote history gets merged.
	pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), SyncError> {
		let SyncDaemon { config, coordinator, local_debouncer, remote_debouncer, supervisor, local_events } =
			self;

		let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE);
		let local = local_debouncer.spawn(trigger_tx.clone());
		let remote = remote_debouncer.spawn(trigger_tx.clone());

		let mut tasks = vec![
			tokio::spawn(forward_local(local_events, local)),
			tokio::spawn(supervisor.run(remote.sender(), shutdown.clone())),
		];
		if let Some(interval) = config.poll_interval() {
			tasks.push(tokio::spawn(poll_remote(interval, trigger_tx.clone())));
		}
		drop(trigger_tx);

		info!(
			"syncing {} with {} (quiet window {:?})",
			config.local_dir.display(),
			config.remote,
			config.debounce()
		);
		let result = coordinator.run(Pending::all(), trigger_rx, shutdown).await;

		for task in &tasks {
			task.abort();
		}
		for task in tasks {
			let _ = task.await;
		}
		remote.close().await;

		if let Err(e) = &result {
			error!("sync pair stopped: {}", e);
		}
		result
	}
}

/// Feed the local event stream into the local debouncer
async fn forward_local(mut events: LocalEvents, debouncer: DebounceHandle) {
	while let Some(event) = events.next().await {
		if !debouncer.observe(event) {
			return;
		}
	}
	debouncer.close().await;
}

/// Periodic pull as a safety net for missed remote notifications
async fn poll_remote(interval: Duration, triggers: mpsc::Sender<SyncTrigger>) {
	let mut ticker = tokio::time::interval(interval);
	ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	// The first tick fires immediately; the startup sync covers it
	ticker.tick().await;
	loop {
		ticker.tick().await;
		debug!("periodic pull");
		if triggers.send(SyncTrigger::RemoteChanged).await.is_err() {
			return;
		}
	}
}

// vim: ts=4
