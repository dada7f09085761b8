//! Optional observability helpers for guarded calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (default) to emit spans named `quota_guard.call` with the `component` and
//!   `stage` fields, plus debug/warn events for waits, backoffs, and terminal failures.
//! - Enable `metrics` to increment the `quota_guard_attempt_total`, `quota_guard_cache_total`, and
//!   `quota_guard_backoff_total` counters.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Guard components that emit telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
	/// Rate gate.
	Gate,
	/// Result cache.
	Cache,
	/// Composed guard.
	Guard,
}
impl Component {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Component::Gate => "gate",
			Component::Cache => "cache",
			Component::Guard => "guard",
		}
	}
}
impl Display for Component {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each gated attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
	/// Attempt admitted past spacing and quota checks.
	Dispatched,
	/// Attempt returned a value.
	Success,
	/// Attempt failed with a quota error.
	RateLimited,
	/// Attempt failed with any other error.
	Failure,
	/// Caller aborted the call.
	Cancelled,
}
impl AttemptOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AttemptOutcome::Dispatched => "dispatched",
			AttemptOutcome::Success => "success",
			AttemptOutcome::RateLimited => "rate_limited",
			AttemptOutcome::Failure => "failure",
			AttemptOutcome::Cancelled => "cancelled",
		}
	}
}
impl Display for AttemptOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for cache operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheOutcome {
	/// Lookup served a live entry.
	Hit,
	/// Lookup found nothing usable.
	Miss,
	/// Lookup discovered and removed a stale entry.
	Expired,
	/// Entry removed under capacity pressure.
	Evicted,
}
impl CacheOutcome {
	/// Returns a stable label suitable for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheOutcome::Hit => "hit",
			CacheOutcome::Miss => "miss",
			CacheOutcome::Expired => "expired",
			CacheOutcome::Evicted => "evicted",
		}
	}
}
