//! Tunable limits for the gate, cache, and monitor.
//!
//! Every setting has a default tuned for "10 requests per second, 1000 per 100 seconds" style
//! quotas. Durations are stored as integer milliseconds or seconds so configs stay readable when
//! serialized.

// self
use crate::{_prelude::*, error::ConfigError};

/// Top-level configuration consumed by [`Guard`](crate::guard::Guard).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
	/// Rate gate limits.
	pub gate: GateConfig,
	/// Result cache limits.
	pub cache: CacheConfig,
	/// Call monitor capacities and health thresholds.
	pub monitor: MonitorConfig,
}
impl GuardConfig {
	/// Parses a JSON document, reporting the path of the first malformed field, and validates it.
	pub fn from_json_str(payload: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(payload);
		let config: Self = serde_path_to_error::deserialize(de)?;

		config.validate()?;

		Ok(config)
	}

	/// Validates every section.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.gate.validate()?;
		self.cache.validate()?;
		self.monitor.validate()
	}
}

/// Limits enforced by [`RateGate`](crate::gate::RateGate).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
	/// Spacing floor between dispatches, in milliseconds.
	pub min_delay_ms: u64,
	/// Spacing and backoff ceiling, in milliseconds.
	pub max_delay_ms: u64,
	/// Dispatch ceiling for every one-second window.
	pub queries_per_second: u32,
	/// Dispatch ceiling for every 100-second window.
	pub queries_per_100_seconds: u32,
	/// Maximum number of retries after quota failures.
	pub max_consecutive_failures: u32,
}
impl GateConfig {
	/// Overrides the spacing floor and ceiling.
	pub fn with_delays(mut self, min: Duration, max: Duration) -> Self {
		self.min_delay_ms = duration_to_millis(min);
		self.max_delay_ms = duration_to_millis(max);

		self
	}

	/// Overrides the per-second dispatch ceiling.
	pub fn with_queries_per_second(mut self, limit: u32) -> Self {
		self.queries_per_second = limit;

		self
	}

	/// Overrides the per-100-second dispatch ceiling.
	pub fn with_queries_per_100_seconds(mut self, limit: u32) -> Self {
		self.queries_per_100_seconds = limit;

		self
	}

	/// Overrides the quota retry budget.
	pub fn with_max_consecutive_failures(mut self, limit: u32) -> Self {
		self.max_consecutive_failures = limit;

		self
	}

	/// Spacing floor as a [`Duration`].
	pub fn min_delay(&self) -> Duration {
		millis(self.min_delay_ms)
	}

	/// Spacing ceiling as a [`Duration`].
	pub fn max_delay(&self) -> Duration {
		millis(self.max_delay_ms)
	}

	/// Checks the bounds and quotas.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.min_delay_ms > self.max_delay_ms {
			return Err(ConfigError::DelayBounds {
				min_ms: self.min_delay_ms,
				max_ms: self.max_delay_ms,
			});
		}

		non_zero("gate.max_delay_ms", self.max_delay_ms)?;
		non_zero("gate.queries_per_second", self.queries_per_second.into())?;
		non_zero("gate.queries_per_100_seconds", self.queries_per_100_seconds.into())
	}
}
impl Default for GateConfig {
	fn default() -> Self {
		Self {
			min_delay_ms: 100,
			max_delay_ms: 5_000,
			queries_per_second: 10,
			queries_per_100_seconds: 1_000,
			max_consecutive_failures: 3,
		}
	}
}

/// Limits enforced by [`ResultCache`](crate::cache::ResultCache).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// TTL applied by [`ResultCache::set_default`](crate::cache::ResultCache::set_default), in seconds.
	pub default_ttl_secs: u64,
	/// Maximum number of live entries.
	pub max_entries: usize,
}
impl CacheConfig {
	/// Overrides the default TTL.
	pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
		self.default_ttl_secs = u64::try_from(ttl.whole_seconds()).unwrap_or(0);

		self
	}

	/// Overrides the capacity.
	pub fn with_max_entries(mut self, max_entries: usize) -> Self {
		self.max_entries = max_entries;

		self
	}

	/// Default TTL as a [`Duration`].
	pub fn default_ttl(&self) -> Duration {
		Duration::seconds(i64::try_from(self.default_ttl_secs).unwrap_or(i64::MAX))
	}

	/// Checks TTL and capacity.
	pub fn validate(&self) -> Result<(), ConfigError> {
		non_zero("cache.default_ttl_secs", self.default_ttl_secs)?;
		non_zero("cache.max_entries", self.max_entries as u64)
	}
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self { default_ttl_secs: 300, max_entries: 1_000 }
	}
}

/// Capacities and health thresholds used by [`CallMonitor`](crate::monitor::CallMonitor).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
	/// Maximum number of call records retained.
	pub event_capacity: usize,
	/// Maximum number of quota warnings retained.
	pub warning_capacity: usize,
	/// Number of failures listed by error reports.
	pub recent_errors: usize,
	/// Number of warnings listed by quota reports.
	pub recent_warnings: usize,
	/// Lowest success rate (percent) still considered healthy.
	pub min_success_rate: f64,
	/// Error count at which the monitor reports unhealthy.
	pub max_errors: u64,
	/// Quota warning count at which the monitor reports unhealthy.
	pub max_quota_warnings: u64,
}
impl MonitorConfig {
	/// Overrides the record and warning capacities.
	pub fn with_capacities(mut self, events: usize, warnings: usize) -> Self {
		self.event_capacity = events;
		self.warning_capacity = warnings;

		self
	}

	/// Checks capacities and thresholds.
	pub fn validate(&self) -> Result<(), ConfigError> {
		non_zero("monitor.event_capacity", self.event_capacity as u64)?;
		non_zero("monitor.warning_capacity", self.warning_capacity as u64)?;

		if !(0.0..=100.0).contains(&self.min_success_rate) {
			return Err(ConfigError::Percentage {
				field: "monitor.min_success_rate",
				value: self.min_success_rate,
			});
		}

		Ok(())
	}
}
impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			event_capacity: 1_000,
			warning_capacity: 500,
			recent_errors: 10,
			recent_warnings: 20,
			min_success_rate: 95.0,
			max_errors: 10,
			max_quota_warnings: 5,
		}
	}
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ConfigError> {
	if value == 0 { Err(ConfigError::Zero { field }) } else { Ok(()) }
}

fn millis(value: u64) -> Duration {
	Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}

fn duration_to_millis(duration: Duration) -> u64 {
	u64::try_from(duration.whole_milliseconds()).unwrap_or(0)
}
