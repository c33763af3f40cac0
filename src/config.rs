//! Configuration for a pullbox sync pair
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (`.toml`, or `.json`/`.json5`)
//! 3. Environment variables (PULLBOX_* prefix)
//! 4. CLI flags (highest priority, applied by the binary)

use crate::connection::RemoteSpec;
use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

/// Everything the sync engine needs to run one local/remote pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// SYNC PAIR
	// ========================================================================
	/// Local working copy
	pub local_dir: PathBuf,

	/// Remote location in `host:path` form
	pub remote: String,

	/// Name of the git remote inside the local repository
	pub remote_name: String,

	/// Branch both sides commit to
	pub branch: String,

	// ========================================================================
	// TIMING
	// ========================================================================
	/// Quiet window before a burst of events becomes one trigger
	pub debounce_ms: u64,

	/// Pull unconditionally this often (0 disables)
	pub poll_interval_secs: u64,

	/// Remote command that blocks until the remote directory changes
	pub watch_command: String,

	// ========================================================================
	// PROCESS
	// ========================================================================
	/// Lock file preventing two daemons from running at once
	pub lock_file: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	pub log_level: String,

	/// Commit messages are "<prefix> <timestamp>"
	pub commit_message_prefix: String,

	// ========================================================================
	// NESTED SECTIONS (kept last so they serialize as TOML tables)
	// ========================================================================
	/// Backoff for failed sync cycles
	pub retry: RetryConfig,

	/// Backoff for the remote notification session
	pub reconnect: RetryConfig,

	pub ssh: SshConfig,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			local_dir: PathBuf::new(),
			remote: String::new(),
			remote_name: "origin".to_string(),
			branch: "master".to_string(),

			debounce_ms: 1000,
			poll_interval_secs: 60,
			watch_command: "inotifywait -qq -r -e modify -e move -e create -e delete"
				.to_string(),

			lock_file: std::env::temp_dir().join("pullbox.lock"),
			log_level: "info".to_string(),
			commit_message_prefix: "auto commit at".to_string(),

			retry: RetryConfig::default(),
			reconnect: RetryConfig {
				initial_delay_ms: 1000,
				multiplier: 2.0,
				max_delay_ms: 300_000,
				max_attempts: 0,
			},
			ssh: SshConfig::default(),
		}
	}
}

// ============================================================================
// NESTED CONFIGURATION STRUCTS
// ============================================================================

/// Exponential backoff parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
	/// First delay after a failure
	pub initial_delay_ms: u64,

	/// Growth factor between consecutive delays
	pub multiplier: f64,

	/// Upper bound for a single delay
	pub max_delay_ms: u64,

	/// Attempts before a cycle is abandoned (0 = unbounded)
	pub max_attempts: u32,
}

impl Default for RetryConfig {
	fn default() -> Self {
		RetryConfig { initial_delay_ms: 1000, multiplier: 2.0, max_delay_ms: 60_000, max_attempts: 5 }
	}
}

impl RetryConfig {
	pub fn initial_delay(&self) -> Duration {
		Duration::from_millis(self.initial_delay_ms)
	}

	pub fn max_delay(&self) -> Duration {
		Duration::from_millis(self.max_delay_ms)
	}

	fn validate(&self, name: &str, bounded: bool) -> Result<(), SyncError> {
		if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
			return Err(invalid(format!("{}.multiplier must be a finite number greater than 1.0", name)));
		}
		if self.initial_delay_ms == 0 {
			return Err(invalid(format!("{}.initialDelayMs must be greater than 0", name)));
		}
		if self.initial_delay_ms > self.max_delay_ms {
			return Err(invalid(format!(
				"{}.initialDelayMs ({}) exceeds {}.maxDelayMs ({})",
				name, self.initial_delay_ms, name, self.max_delay_ms
			)));
		}
		if bounded && self.max_attempts == 0 {
			return Err(invalid(format!("{}.maxAttempts must be greater than 0", name)));
		}
		Ok(())
	}
}

/// SSH/Remote connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SshConfig {
	/// SSH executable
	pub ssh_command: String,

	/// Seconds to wait for the remote watch session to come up
	pub connect_timeout_secs: u64,

	/// ssh ServerAliveInterval for the watch session (0 = ssh default)
	pub keepalive_secs: u64,
}

impl Default for SshConfig {
	fn default() -> Self {
		SshConfig { ssh_command: "ssh".to_string(), connect_timeout_secs: 30, keepalive_secs: 15 }
	}
}

// ============================================================================
// LOADING
// ============================================================================

impl Config {
	/// Load a config file, picking the format from its extension
	pub fn load(path: &Path) -> Result<Config, SyncError> {
		let contents = std::fs::read_to_string(path).map_err(|e| {
			invalid(format!("Cannot read config file {}: {}", path.display(), e))
		})?;

		match path.extension().and_then(|e| e.to_str()) {
			Some("json") | Some("json5") => json5::from_str(&contents).map_err(|e| {
				invalid(format!("Failed to parse {}: {}", path.display(), e))
			}),
			_ => toml::from_str(&contents)
				.map_err(|e| invalid(format!("Failed to parse {}: {}", path.display(), e))),
		}
	}

	/// Overlay PULLBOX_* variables from the process environment
	pub fn apply_env(&mut self) -> Result<(), SyncError> {
		self.apply_env_from(std::env::vars())
	}

	/// Overlay PULLBOX_* variables from an arbitrary source
	pub fn apply_env_from<I>(&mut self, vars: I) -> Result<(), SyncError>
	where
		I: IntoIterator<Item = (String, String)>,
	{
		for (key, value) in vars {
			match key.as_str() {
				"PULLBOX_LOCAL_DIR" => self.local_dir = PathBuf::from(value),
				"PULLBOX_REMOTE" => self.remote = value,
				"PULLBOX_DEBOUNCE_MS" => {
					self.debounce_ms = value
						.parse()
						.map_err(|_| invalid(format!("PULLBOX_DEBOUNCE_MS: not a number: {}", value)))?
				}
				"PULLBOX_LOG_LEVEL" => self.log_level = value,
				_ => {}
			}
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), SyncError> {
		if self.local_dir.as_os_str().is_empty() {
			return Err(invalid("local directory is not set".to_string()));
		}
		self.remote_spec()?;
		if self.debounce_ms == 0 {
			return Err(invalid("debounceMs must be greater than 0".to_string()));
		}
		if self.branch.is_empty() || self.remote_name.is_empty() {
			return Err(invalid("branch and remoteName must not be empty".to_string()));
		}
		self.retry.validate("retry", true)?;
		self.reconnect.validate("reconnect", false)?;
		Ok(())
	}

	pub fn remote_spec(&self) -> Result<RemoteSpec, SyncError> {
		RemoteSpec::parse(&self.remote).ok_or_else(|| {
			invalid(format!("remote must be of the form host:path, got {:?}", self.remote))
		})
	}

	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}

	pub fn poll_interval(&self) -> Option<Duration> {
		if self.poll_interval_secs == 0 {
			None
		} else {
			Some(Duration::from_secs(self.poll_interval_secs))
		}
	}

	pub fn connect_timeout(&self) -> Duration {
		Duration::from_secs(self.ssh.connect_timeout_secs)
	}
}

fn invalid(message: String) -> SyncError {
	SyncError::InvalidConfig { message }
}


// vim: ts=4
