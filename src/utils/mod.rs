//! Utility modules for common functionality

pub mod signal;

pub use signal::{setup_signal_handlers, shutdown_signal};

// vim: ts=4
