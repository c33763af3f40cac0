//! Exponential backoff shared by cycle retries and reconnects

use crate::config::RetryConfig;
use std::time::Duration;

/// Delay generator: initial, initial*m, initial*m^2, ... capped at `max`
#[derive(Debug, Clone)]
pub struct Backoff {
	initial: Duration,
	multiplier: f64,
	max: Duration,
	last: Option<Duration>,
	failures: u32,
}

impl Backoff {
	pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
		Backoff { initial, multiplier, max, last: None, failures: 0 }
	}

	pub fn from_config(config: &RetryConfig) -> Self {
		Backoff::new(config.initial_delay(), config.multiplier, config.max_delay())
	}

	/// Record one more failure and return how long to wait before retrying
	pub fn next_delay(&mut self) -> Duration {
		self.failures = self.failures.saturating_add(1);
		let delay = match self.last {
			None => self.initial,
			// Overflow, infinities and NaN all land on the cap
			Some(last) => Duration::try_from_secs_f64(last.as_secs_f64() * self.multiplier).unwrap_or(self.max),
		}
		.min(self.max);
		self.last = Some(delay);
		delay
	}

	/// Back to the initial delay, e.g. after a successful connection
	pub fn reset(&mut self) {
		self.last = None;
		self.failures = 0;
	}

	/// Consecutive failures since the last reset
	pub fn failures(&self) -> u32 {
		self.failures
	}
}


// vim: ts=4
