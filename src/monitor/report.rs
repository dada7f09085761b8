//! Plain report structures derived from the monitor's logs.

// self
use crate::{
	_prelude::*,
	cache::CacheStats,
	gate::GateSnapshot,
	monitor::{CallRecord, QuotaWarning},
};

/// Percentage that remembers whether any samples contributed to it.
///
/// Displays as `"0%"` without samples and with two decimals otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Percentage(Option<f64>);
impl Percentage {
	/// Computes `part / whole × 100`; no samples when `whole` is zero.
	pub fn of(part: usize, whole: usize) -> Self {
		if whole == 0 { Self(None) } else { Self(Some(part as f64 / whole as f64 * 100.0)) }
	}

	/// Numeric value, 0 without samples.
	pub fn value(&self) -> f64 {
		self.0.unwrap_or(0.0)
	}

	/// Returns `true` when at least one sample contributed.
	pub fn is_sampled(&self) -> bool {
		self.0.is_some()
	}
}
impl Display for Percentage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self.0 {
			Some(value) => write!(f, "{value:.2}%"),
			None => f.write_str("0%"),
		}
	}
}
impl Serialize for Percentage {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.collect_str(self)
	}
}

/// Occurrence count for one distinct value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Frequency<K> {
	/// Counted value.
	pub value: K,
	/// Number of occurrences.
	pub count: usize,
}

/// Sorts occurrences by descending count, ties broken by value.
pub(crate) fn frequencies<K>(values: impl Iterator<Item = K>) -> Vec<Frequency<K>>
where
	K: Ord,
{
	let mut counts = BTreeMap::<K, usize>::new();

	for value in values {
		*counts.entry(value).or_default() += 1;
	}

	let mut entries =
		counts.into_iter().map(|(value, count)| Frequency { value, count }).collect::<Vec<_>>();

	// Stable sort keeps the BTreeMap order for equal counts.
	entries.sort_by(|a, b| b.count.cmp(&a.count));

	entries
}

/// Formats an uptime as `"{h}h {m}m {s}s"`.
pub(crate) fn format_uptime(uptime: Duration) -> String {
	let total = uptime.whole_seconds().max(0);

	format!("{}h {}m {}s", total / 3_600, total % 3_600 / 60, total % 60)
}

/// Call volume, success rate, and latency summary.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiStats {
	/// Records currently retained.
	pub total_calls: usize,
	/// Retained records from the last hour.
	pub last_hour: usize,
	/// Retained records from the last 24 hours.
	pub last_24_hours: usize,
	/// Successful retained records.
	pub successful_calls: usize,
	/// Failed retained records.
	pub failed_calls: usize,
	/// `successful_calls / total_calls × 100`.
	pub success_rate: Percentage,
	/// Mean duration across retained records, in milliseconds.
	pub average_duration_ms: f64,
	/// Calls recorded since creation or the last reset, including trimmed ones.
	pub lifetime_calls: u64,
	/// Time since creation or the last reset, formatted as `"{h}h {m}m {s}s"`.
	pub uptime: String,
}

/// Failure aggregation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorStats {
	/// Failures recorded since creation or the last reset.
	pub total_errors: u64,
	/// Failure messages ranked by frequency.
	pub by_message: Vec<Frequency<String>>,
	/// Status codes ranked by frequency.
	pub by_status: Vec<Frequency<u16>>,
	/// Most recent failures, newest first.
	pub recent: Vec<CallRecord>,
}

/// Quota warning aggregation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuotaWarningReport {
	/// Quota warnings recorded since creation or the last reset.
	pub total_warnings: u64,
	/// Most recent warnings, newest first.
	pub recent: Vec<QuotaWarning>,
	/// Retained warnings per endpoint, ranked by frequency.
	pub by_endpoint: Vec<Frequency<String>>,
}

/// Composite snapshot across the monitor, gate, and cache.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusReport {
	/// Instant the snapshot was taken.
	#[serde(with = "time::serde::rfc3339")]
	pub generated_at: OffsetDateTime,
	/// Call volume summary.
	pub api: ApiStats,
	/// Failure aggregation.
	pub errors: ErrorStats,
	/// Quota warning aggregation.
	pub quota: QuotaWarningReport,
	/// Gate view, when a gate is attached.
	pub gate: Option<GateSnapshot>,
	/// Cache statistics, when a cache is attached.
	pub cache: Option<CacheStats>,
}

/// Condition that makes the monitor report unhealthy.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthIssue {
	/// Success rate fell below the threshold.
	LowSuccessRate {
		/// Observed success rate.
		rate: Percentage,
		/// Configured minimum, in percent.
		threshold: f64,
	},
	/// Too many failures were recorded.
	TooManyErrors {
		/// Recorded failures.
		count: u64,
		/// Configured ceiling.
		threshold: u64,
	},
	/// Too many quota warnings were recorded.
	TooManyQuotaWarnings {
		/// Recorded warnings.
		count: u64,
		/// Configured ceiling.
		threshold: u64,
	},
}
impl Display for HealthIssue {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::LowSuccessRate { rate, threshold } =>
				write!(f, "Success rate {rate} is below {threshold}%."),
			Self::TooManyErrors { count, threshold } =>
				write!(f, "{count} errors recorded (limit {threshold})."),
			Self::TooManyQuotaWarnings { count, threshold } =>
				write!(f, "{count} quota warnings recorded (limit {threshold})."),
		}
	}
}

/// Pass/fail judgment over success rate, error count, and quota warnings.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthReport {
	/// `true` when no issue was found.
	pub healthy: bool,
	/// Violated conditions.
	pub issues: Vec<HealthIssue>,
	/// Human-readable one-line verdict.
	pub summary: String,
}
impl HealthReport {
	pub(crate) fn from_issues(issues: Vec<HealthIssue>) -> Self {
		let summary = if issues.is_empty() {
			"Healthy: all checks passed.".to_owned()
		} else {
			let details = issues.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");

			format!("Unhealthy: {details}")
		};

		Self { healthy: issues.is_empty(), issues, summary }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn percentage_formats_empty_and_sampled_values() {
		assert_eq!(Percentage::of(0, 0).to_string(), "0%");
		assert_eq!(Percentage::of(0, 4).to_string(), "0.00%");
		assert_eq!(Percentage::of(2, 3).to_string(), "66.67%");
		assert_eq!(Percentage::of(3, 4).value(), 75.0);
		assert_eq!(
			serde_json::to_string(&Percentage::of(1, 1)).expect("Percentage should serialize."),
			"\"100.00%\""
		);
	}

	#[test]
	fn frequencies_rank_by_count_then_value() {
		let ranked = frequencies(["b", "a", "b", "c", "a", "b"].into_iter());

		assert_eq!(
			ranked,
			vec![
				Frequency { value: "b", count: 3 },
				Frequency { value: "a", count: 2 },
				Frequency { value: "c", count: 1 },
			]
		);
	}

	#[test]
	fn uptime_uses_hours_minutes_seconds() {
		assert_eq!(format_uptime(Duration::seconds(3_725)), "1h 2m 5s");
		assert_eq!(format_uptime(Duration::ZERO), "0h 0m 0s");
	}

	#[test]
	fn unhealthy_summary_lists_every_issue() {
		let report = HealthReport::from_issues(vec![
			HealthIssue::TooManyErrors { count: 12, threshold: 10 },
			HealthIssue::TooManyQuotaWarnings { count: 5, threshold: 5 },
		]);

		assert!(!report.healthy);
		assert!(report.summary.contains("12 errors"));
		assert!(report.summary.contains("5 quota warnings"));
		assert!(HealthReport::from_issues(Vec::new()).healthy);
	}
}
