//! # pullbox - directory sync over git
//!
//! pullbox keeps a local directory and a directory on a remote host in sync,
//! using a git repository as transport and history. Local changes are picked
//! up through filesystem notifications, remote changes through a long-running
//! watch command over ssh. Bursts of changes are debounced into single sync
//! cycles, and a coordinator makes sure only one cycle touches the repository
//! at a time.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pullbox::{Config, SyncDaemon};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         local_dir: "/home/me/box".into(),
//!         remote: "backup.example.com:box".into(),
//!         ..Config::default()
//!     };
//!     let daemon = SyncDaemon::from_config(config)?;
//!     daemon.run(pullbox::utils::setup_signal_handlers()).await?;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod daemon;
pub mod debounce;
pub mod error;
pub mod git;
pub mod lock;
pub mod logging;
pub mod repo;
pub mod supervisor;
pub mod types;
pub mod utils;
pub mod watcher;

// Re-export commonly used types and functions
pub use channel::RemoteChannel;
pub use config::{Config, RetryConfig, SshConfig};
pub use connection::{RemoteExec, RemoteSession, RemoteSpec, SshExec};
pub use coordinator::{CoordinatorState, Pending, SyncCoordinator};
pub use daemon::SyncDaemon;
pub use debounce::Debouncer;
pub use error::{ConnectionError, FailureKind, RepoError, SyncError};
pub use git::GitRepository;
pub use repo::Repository;
pub use supervisor::{ConnectionSupervisor, SupervisorState};
pub use types::{ChangeEvent, CycleOutcome, Direction, Origin, RepositoryState, SyncCycle, SyncTrigger};
pub use watcher::LocalWatcher;

// vim: ts=4
