//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("cycle finished");
//! warn!("push rejected, merging first");
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber.
///
/// `level` is the configured default; the `RUST_LOG` environment variable
/// takes precedence when set:
///
/// ```bash
/// RUST_LOG=debug pullbox run ~/box backup:box
/// RUST_LOG=pullbox::git=debug,pullbox::supervisor=trace pullbox run ~/box backup:box
/// ```
pub fn init_tracing(level: &str) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

	// A second call (e.g. from tests) keeps the first subscriber
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// vim: ts=4
