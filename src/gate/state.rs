//! Mutable gate bookkeeping and the read-only views derived from it.

// self
use crate::{_prelude::*, config::GateConfig};

/// Rolling call-count ceiling over a fixed-length window.
#[derive(Clone, Debug)]
pub(crate) struct QuotaWindow {
	length: Duration,
	limit: u32,
	count: u32,
	started_at: OffsetDateTime,
}
impl QuotaWindow {
	pub(crate) fn new(length: Duration, limit: u32, now: OffsetDateTime) -> Self {
		Self { length, limit, count: 0, started_at: now }
	}

	/// Resets the counter lazily once the window has elapsed.
	pub(crate) fn roll(&mut self, now: OffsetDateTime) {
		if now - self.started_at >= self.length {
			self.restart(now);
		}
	}

	pub(crate) fn restart(&mut self, now: OffsetDateTime) {
		self.count = 0;
		self.started_at = now;
	}

	/// Time left until the window boundary when the ceiling has been reached.
	pub(crate) fn wait_needed(&self, now: OffsetDateTime) -> Option<Duration> {
		if self.count < self.limit {
			return None;
		}

		let remaining = self.started_at + self.length - now;

		Some(if remaining.is_negative() { Duration::ZERO } else { remaining })
	}

	pub(crate) fn reserve(&mut self) {
		self.count = self.count.saturating_add(1);
	}

	pub(crate) fn count(&self) -> u32 {
		self.count
	}
}

/// Adaptive spacing and failure streak at a point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayState {
	/// Spacing currently enforced between dispatches.
	pub current_delay: Duration,
	/// Failures observed since the last success.
	pub consecutive_failures: u32,
}

/// Lifetime counters kept by the gate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateTotals {
	/// Attempts admitted through the spacing and quota checks.
	pub dispatched: u64,
	/// Attempts that returned a value.
	pub succeeded: u64,
	/// Attempts that returned an error.
	pub failed: u64,
	/// Failed attempts classified as quota failures.
	pub rate_limited: u64,
	/// Retries scheduled after quota failures.
	pub retries: u64,
}

/// Read-only view of the gate consumed by monitors and reporting surfaces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSnapshot {
	/// Spacing currently enforced, in milliseconds.
	pub current_delay_ms: i64,
	/// Configured spacing floor, in milliseconds.
	pub min_delay_ms: u64,
	/// Configured spacing ceiling, in milliseconds.
	pub max_delay_ms: u64,
	/// Failures observed since the last success.
	pub consecutive_failures: u32,
	/// Dispatches counted in the current one-second window.
	pub requests_this_second: u32,
	/// One-second ceiling.
	pub queries_per_second: u32,
	/// Dispatches counted in the current 100-second window.
	pub requests_this_100_seconds: u32,
	/// 100-second ceiling.
	pub queries_per_100_seconds: u32,
	/// Instant of the most recent dispatch.
	#[serde(with = "time::serde::rfc3339::option")]
	pub last_request_at: Option<OffsetDateTime>,
	/// Lifetime counters.
	pub totals: GateTotals,
}

/// The single mutable record owned by a gate.
#[derive(Clone, Debug)]
pub(crate) struct GateState {
	pub(crate) current_delay: Duration,
	pub(crate) last_request_at: Option<OffsetDateTime>,
	pub(crate) consecutive_failures: u32,
	pub(crate) per_second: QuotaWindow,
	pub(crate) per_100_seconds: QuotaWindow,
	pub(crate) totals: GateTotals,
}
impl GateState {
	const DECAY: f64 = 0.9;
	const GROWTH: f64 = 1.5;

	pub(crate) fn new(config: &GateConfig, now: OffsetDateTime) -> Self {
		Self {
			current_delay: config.min_delay(),
			last_request_at: None,
			consecutive_failures: 0,
			per_second: QuotaWindow::new(Duration::SECOND, config.queries_per_second, now),
			per_100_seconds: QuotaWindow::new(
				Duration::seconds(100),
				config.queries_per_100_seconds,
				now,
			),
			totals: GateTotals::default(),
		}
	}

	/// Remaining spacing before another dispatch may leave.
	pub(crate) fn spacing_wait(&self, now: OffsetDateTime) -> Duration {
		match self.last_request_at {
			Some(last) => {
				let elapsed = now - last;

				if elapsed < self.current_delay { self.current_delay - elapsed } else { Duration::ZERO }
			},
			None => Duration::ZERO,
		}
	}

	/// Counts a dispatch in both windows.
	pub(crate) fn reserve(&mut self, now: OffsetDateTime) {
		self.last_request_at = Some(now);
		self.per_second.reserve();
		self.per_100_seconds.reserve();
		self.totals.dispatched += 1;
	}

	pub(crate) fn record_success(&mut self, config: &GateConfig) {
		self.consecutive_failures = 0;
		self.current_delay = (self.current_delay * Self::DECAY).max(config.min_delay());
		self.totals.succeeded += 1;
	}

	/// Applies a quota failure and returns the backoff to sleep before deciding whether to retry.
	///
	/// The backoff after attempt `retry + 1` is `base_delay × 2^(retry + 1)`, clamped to the
	/// ceiling and raised to the provider's hint when one is present. The delay takes the backoff
	/// value whether or not a retry follows.
	pub(crate) fn record_quota_failure(
		&mut self,
		config: &GateConfig,
		base_delay: Duration,
		retry: u32,
		retry_after: Option<Duration>,
	) -> Duration {
		let max_delay = config.max_delay();
		let exponent = retry.saturating_add(1).min(30);
		let mut backoff =
			base_delay.checked_mul(1_i32 << exponent).unwrap_or(max_delay).min(max_delay);

		if let Some(hint) = retry_after {
			backoff = backoff.max(hint).min(max_delay);
		}

		self.consecutive_failures = self.consecutive_failures.saturating_add(1);
		self.current_delay = backoff.max(config.min_delay());
		self.totals.failed += 1;
		self.totals.rate_limited += 1;

		backoff
	}

	pub(crate) fn record_retry(&mut self) {
		self.totals.retries += 1;
	}

	/// Applies a non-quota failure and slows the gate down.
	pub(crate) fn record_failure(&mut self, config: &GateConfig) {
		self.consecutive_failures = self.consecutive_failures.saturating_add(1);
		self.totals.failed += 1;
		self.escalate(config);
	}

	/// Grows the delay by the escalation factor once a failure is about to propagate.
	pub(crate) fn escalate(&mut self, config: &GateConfig) {
		self.current_delay = (self.current_delay * Self::GROWTH).min(config.max_delay());
	}

	pub(crate) fn delay_state(&self) -> DelayState {
		DelayState {
			current_delay: self.current_delay,
			consecutive_failures: self.consecutive_failures,
		}
	}

	pub(crate) fn snapshot(&self, config: &GateConfig) -> GateSnapshot {
		GateSnapshot {
			current_delay_ms: i64::try_from(self.current_delay.whole_milliseconds())
				.unwrap_or(i64::MAX),
			min_delay_ms: config.min_delay_ms,
			max_delay_ms: config.max_delay_ms,
			consecutive_failures: self.consecutive_failures,
			requests_this_second: self.per_second.count(),
			queries_per_second: config.queries_per_second,
			requests_this_100_seconds: self.per_100_seconds.count(),
			queries_per_100_seconds: config.queries_per_100_seconds,
			last_request_at: self.last_request_at,
			totals: self.totals.clone(),
		}
	}
}
