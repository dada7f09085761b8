// self
use crate::obs::{AttemptOutcome, CacheOutcome};

/// Records a gated attempt outcome via the global metrics recorder (when enabled).
pub fn record_attempt(outcome: AttemptOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("quota_guard_attempt_total", "outcome" => outcome.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Records `count` cache operations with the provided outcome.
pub fn record_cache(outcome: CacheOutcome, count: u64) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("quota_guard_cache_total", "outcome" => outcome.as_str()).increment(count);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (outcome, count);
	}
}

/// Records a scheduled quota backoff.
pub fn record_backoff() {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("quota_guard_backoff_total").increment(1);
	}
}
