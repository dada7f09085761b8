//! Call log, quota warning log, and health reporting.
//!
//! The monitor keeps two bounded FIFO logs: every recorded call and, separately, every call whose
//! failure looked like quota exhaustion. Reports are derived on demand from those logs plus
//! lifetime counters that survive trimming. Attached gates and caches are only ever read.

mod report;

pub use report::*;

// self
use crate::{
	_prelude::*,
	cache::CacheStatsSource,
	clock::{Clock, SystemClock},
	config::MonitorConfig,
	gate::{CallFailure, FailureKind, RateGate},
};

/// Failure details attached to a [`CallEvent`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
	/// Human-readable failure description.
	pub message: String,
	/// Status code, when the remote returned one.
	pub status_code: Option<u16>,
	/// Structured quota flag supplied by the caller.
	pub rate_limited: bool,
}
impl FailureDetail {
	/// Creates a detail without a status or quota flag.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into(), status_code: None, rate_limited: false }
	}

	/// Captures message, status, and classification from a gated operation error.
	pub fn from_failure<E>(err: &E) -> Self
	where
		E: CallFailure,
	{
		Self {
			message: err.to_string(),
			status_code: err.status_code(),
			rate_limited: err.classify().is_rate_limited(),
		}
	}

	/// Attaches a status code.
	pub fn with_status(mut self, status: u16) -> Self {
		self.status_code = Some(status);

		self
	}

	/// Flags the failure as quota exhaustion.
	pub fn with_rate_limited(mut self, rate_limited: bool) -> Self {
		self.rate_limited = rate_limited;

		self
	}

	/// Returns `true` when the failure should produce a quota warning.
	///
	/// Falls back to [`FailureKind::infer`] so details built from raw status/message pairs are
	/// still recognized.
	pub fn is_quota(&self) -> bool {
		self.rate_limited || FailureKind::infer(self.status_code, &self.message).is_rate_limited()
	}
}

/// Completed call reported to [`CallMonitor::record`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallEvent {
	/// Logical endpoint (resource) name.
	pub endpoint: String,
	/// Operation performed on the endpoint.
	pub method: String,
	/// Wall time spent in the call.
	pub duration: Duration,
	/// Failure details; `None` for successful calls.
	pub failure: Option<FailureDetail>,
}
impl CallEvent {
	/// Creates a successful call event.
	pub fn success(endpoint: impl Into<String>, method: impl Into<String>, duration: Duration) -> Self {
		Self { endpoint: endpoint.into(), method: method.into(), duration, failure: None }
	}

	/// Creates a failed call event.
	pub fn failure(
		endpoint: impl Into<String>,
		method: impl Into<String>,
		duration: Duration,
		failure: FailureDetail,
	) -> Self {
		Self { endpoint: endpoint.into(), method: method.into(), duration, failure: Some(failure) }
	}

	/// Returns `true` for successful calls.
	pub fn is_success(&self) -> bool {
		self.failure.is_none()
	}
}

/// Retained log entry for one call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
	/// Instant the call was recorded.
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
	/// Logical endpoint name.
	pub endpoint: String,
	/// Operation performed.
	pub method: String,
	/// Duration in milliseconds.
	pub duration_ms: i64,
	/// Whether the call succeeded.
	pub success: bool,
	/// Failure message, if any.
	pub error_message: Option<String>,
	/// Failure status code, if any.
	pub status_code: Option<u16>,
}

/// Retained log entry for one quota failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaWarning {
	/// Instant the warning was recorded.
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
	/// Endpoint that hit the quota.
	pub endpoint: String,
	/// Failure message.
	pub error_message: String,
	/// Failure status code, if any.
	pub status_code: Option<u16>,
}

#[derive(Debug)]
struct MonitorState {
	started_at: OffsetDateTime,
	records: VecDeque<CallRecord>,
	warnings: VecDeque<QuotaWarning>,
	lifetime_calls: u64,
	lifetime_errors: u64,
	lifetime_warnings: u64,
}
impl MonitorState {
	fn new(started_at: OffsetDateTime) -> Self {
		Self {
			started_at,
			records: VecDeque::new(),
			warnings: VecDeque::new(),
			lifetime_calls: 0,
			lifetime_errors: 0,
			lifetime_warnings: 0,
		}
	}
}

/// Aggregates call events into statistics and health judgments.
pub struct CallMonitor {
	config: MonitorConfig,
	clock: Arc<dyn Clock>,
	state: RwLock<MonitorState>,
	gate: Option<Arc<RateGate>>,
	cache: Option<Arc<dyn CacheStatsSource>>,
}
impl CallMonitor {
	const HOUR: Duration = Duration::HOUR;
	const DAY: Duration = Duration::DAY;

	/// Creates a monitor driven by the wall clock.
	pub fn new(config: MonitorConfig) -> Self {
		Self::with_clock(config, Arc::new(SystemClock))
	}

	/// Creates a monitor driven by the provided clock.
	pub fn with_clock(config: MonitorConfig, clock: Arc<dyn Clock>) -> Self {
		let state = MonitorState::new(clock.now());

		Self { config, clock, state: RwLock::new(state), gate: None, cache: None }
	}

	/// Attaches a gate whose snapshot is included in [`CallMonitor::status`].
	pub fn with_gate(mut self, gate: Arc<RateGate>) -> Self {
		self.gate = Some(gate);

		self
	}

	/// Attaches a cache whose statistics are included in [`CallMonitor::status`].
	pub fn with_cache(mut self, cache: Arc<dyn CacheStatsSource>) -> Self {
		self.cache = Some(cache);

		self
	}

	/// Appends a call, trimming the oldest records beyond capacity, and logs a quota warning
	/// when the failure looks like quota exhaustion.
	pub fn record(&self, event: CallEvent) {
		let now = self.clock.now();
		let mut state = self.state.write();

		state.lifetime_calls += 1;

		if let Some(failure) = &event.failure {
			state.lifetime_errors += 1;

			if failure.is_quota() {
				state.lifetime_warnings += 1;
				state.warnings.push_back(QuotaWarning {
					timestamp: now,
					endpoint: event.endpoint.clone(),
					error_message: failure.message.clone(),
					status_code: failure.status_code,
				});

				while state.warnings.len() > self.config.warning_capacity {
					state.warnings.pop_front();
				}
			}
		}

		let (error_message, status_code) = match event.failure {
			Some(failure) => (Some(failure.message), failure.status_code),
			None => (None, None),
		};

		state.records.push_back(CallRecord {
			timestamp: now,
			endpoint: event.endpoint,
			method: event.method,
			duration_ms: i64::try_from(event.duration.whole_milliseconds()).unwrap_or(i64::MAX),
			success: error_message.is_none(),
			error_message,
			status_code,
		});

		while state.records.len() > self.config.event_capacity {
			state.records.pop_front();
		}
	}

	/// Summarizes call volume, success rate, latency, and uptime.
	pub fn api_stats(&self) -> ApiStats {
		let now = self.clock.now();
		let state = self.state.read();
		let total = state.records.len();
		let within = |window: Duration| {
			state.records.iter().filter(|record| record.timestamp > now - window).count()
		};
		let successful = state.records.iter().filter(|record| record.success).count();
		let average_duration_ms = if total == 0 {
			0.0
		} else {
			state.records.iter().map(|record| record.duration_ms as f64).sum::<f64>() / total as f64
		};

		ApiStats {
			total_calls: total,
			last_hour: within(Self::HOUR),
			last_24_hours: within(Self::DAY),
			successful_calls: successful,
			failed_calls: total - successful,
			success_rate: Percentage::of(successful, total),
			average_duration_ms,
			lifetime_calls: state.lifetime_calls,
			uptime: format_uptime(now - state.started_at),
		}
	}

	/// Aggregates failure messages and status codes and lists the latest failures.
	pub fn error_stats(&self) -> ErrorStats {
		let state = self.state.read();
		let failed = || state.records.iter().filter(|record| !record.success);

		ErrorStats {
			total_errors: state.lifetime_errors,
			by_message: frequencies(failed().filter_map(|record| record.error_message.clone())),
			by_status: frequencies(failed().filter_map(|record| record.status_code)),
			recent: failed().rev().take(self.config.recent_errors).cloned().collect(),
		}
	}

	/// Summarizes quota warnings.
	pub fn quota_warnings(&self) -> QuotaWarningReport {
		let state = self.state.read();

		QuotaWarningReport {
			total_warnings: state.lifetime_warnings,
			recent: state.warnings.iter().rev().take(self.config.recent_warnings).cloned().collect(),
			by_endpoint: frequencies(state.warnings.iter().map(|warning| warning.endpoint.clone())),
		}
	}

	/// Combines every report with the attached gate and cache views.
	pub fn status(&self) -> StatusReport {
		StatusReport {
			generated_at: self.clock.now(),
			api: self.api_stats(),
			errors: self.error_stats(),
			quota: self.quota_warnings(),
			gate: self.gate.as_ref().map(|gate| gate.snapshot()),
			cache: self.cache.as_ref().map(|cache| cache.cache_stats()),
		}
	}

	/// Judges health from the success rate, error count, and quota warning count.
	///
	/// An empty log passes the success-rate check.
	pub fn health_report(&self) -> HealthReport {
		let api = self.api_stats();
		let (errors, warnings) = {
			let state = self.state.read();

			(state.lifetime_errors, state.lifetime_warnings)
		};
		let mut issues = Vec::new();

		if api.success_rate.is_sampled() && api.success_rate.value() < self.config.min_success_rate
		{
			issues.push(HealthIssue::LowSuccessRate {
				rate: api.success_rate,
				threshold: self.config.min_success_rate,
			});
		}
		if errors >= self.config.max_errors {
			issues.push(HealthIssue::TooManyErrors { count: errors, threshold: self.config.max_errors });
		}
		if warnings >= self.config.max_quota_warnings {
			issues.push(HealthIssue::TooManyQuotaWarnings {
				count: warnings,
				threshold: self.config.max_quota_warnings,
			});
		}

		HealthReport::from_issues(issues)
	}

	/// Clears both logs and counters and restarts the uptime clock.
	pub fn reset(&self) {
		*self.state.write() = MonitorState::new(self.clock.now());
	}
}
impl Debug for CallMonitor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.read();

		f.debug_struct("CallMonitor")
			.field("records", &state.records.len())
			.field("warnings", &state.warnings.len())
			.field("gate_attached", &self.gate.is_some())
			.field("cache_attached", &self.cache.is_some())
			.finish()
	}
}
