//! Guard-level error types shared across the gate, cache, monitor, and configuration layers.

// self
use crate::{_prelude::*, gate::DelayState};

/// Guard-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical guard error exposed by non-generic public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Configuration and validation failures raised while assembling a guard.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Configuration payload could not be parsed.
	#[error("Configuration is malformed at `{path}`.")]
	Parse {
		/// JSON path of the offending field.
		path: String,
		/// Structured parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// The spacing floor exceeds the ceiling.
	#[error("Minimum delay ({min_ms} ms) exceeds maximum delay ({max_ms} ms).")]
	DelayBounds {
		/// Configured floor in milliseconds.
		min_ms: u64,
		/// Configured ceiling in milliseconds.
		max_ms: u64,
	},
	/// A numeric limit must be strictly positive.
	#[error("The `{field}` setting must be greater than zero.")]
	Zero {
		/// Name of the rejected setting.
		field: &'static str,
	},
	/// A percentage threshold falls outside `0..=100`.
	#[error("The `{field}` setting must be within 0..=100, got {value}.")]
	Percentage {
		/// Name of the rejected setting.
		field: &'static str,
		/// Rejected value.
		value: f64,
	},
}
impl From<serde_path_to_error::Error<serde_json::Error>> for ConfigError {
	fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		let path = e.path().to_string();

		Self::Parse { path, source: e.into_inner() }
	}
}

/// Failure surfaced by [`RateGate`](crate::gate::RateGate) executions.
///
/// Every variant carries the [`DelayState`] observed when the call gave up so callers can log
/// how hard the gate was throttling at that moment.
#[derive(Debug, ThisError)]
pub enum GateError<E> {
	/// The wrapped operation failed with a non-quota error; it was not retried.
	#[error("Remote call failed after {attempts} attempt(s) with the gate delay at {}ms.", .delay.current_delay.whole_milliseconds())]
	Operation {
		/// Error returned by the wrapped operation.
		#[source]
		source: E,
		/// Number of attempts dispatched, including the failing one.
		attempts: u32,
		/// Gate delay state at failure time.
		delay: DelayState,
	},
	/// Quota errors persisted after every permitted retry.
	#[error("Remote quota remained exhausted after {attempts} attempt(s) with the gate delay at {}ms.", .delay.current_delay.whole_milliseconds())]
	RateLimited {
		/// Last quota error returned by the wrapped operation.
		#[source]
		source: E,
		/// Number of attempts dispatched, including the failing one.
		attempts: u32,
		/// Gate delay state at failure time.
		delay: DelayState,
	},
	/// The caller's cancellation token fired while waiting or while the call was in flight.
	#[error("Call was cancelled after {attempts} attempt(s).")]
	Cancelled {
		/// Number of attempts dispatched before cancellation.
		attempts: u32,
		/// Gate delay state at cancellation time.
		delay: DelayState,
	},
	/// The caller's deadline elapsed before the call completed.
	#[error("Call timed out after {}ms.", .after.whole_milliseconds())]
	TimedOut {
		/// Deadline that elapsed.
		after: Duration,
		/// Gate delay state when the deadline fired.
		delay: DelayState,
	},
}
impl<E> GateError<E> {
	/// Returns the delay snapshot attached to the failure.
	pub fn delay(&self) -> &DelayState {
		match self {
			Self::Operation { delay, .. }
			| Self::RateLimited { delay, .. }
			| Self::Cancelled { delay, .. }
			| Self::TimedOut { delay, .. } => delay,
		}
	}

	/// Returns the wrapped operation error, if the failure originated there.
	pub fn operation_error(&self) -> Option<&E> {
		match self {
			Self::Operation { source, .. } | Self::RateLimited { source, .. } => Some(source),
			Self::Cancelled { .. } | Self::TimedOut { .. } => None,
		}
	}

	/// Returns `true` for caller-initiated aborts (cancellation or timeout).
	pub fn is_aborted(&self) -> bool {
		matches!(self, Self::Cancelled { .. } | Self::TimedOut { .. })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn parse_errors_keep_the_json_path() {
		let payload = r#"{"gate":{"min_delay_ms":"fast"}}"#;
		let de = &mut serde_json::Deserializer::from_str(payload);
		let err = serde_path_to_error::deserialize::<_, crate::config::GuardConfig>(de)
			.expect_err("String delay should be rejected.");
		let config_error = ConfigError::from(err);

		assert!(matches!(&config_error, ConfigError::Parse { path, .. } if path == "gate.min_delay_ms"));

		let error: Error = config_error.into();

		assert!(StdError::source(&error).is_some());
	}

	#[test]
	fn gate_error_reports_delay_and_source() {
		let delay = DelayState {
			current_delay: Duration::milliseconds(750),
			consecutive_failures: 2,
		};
		let err: GateError<std::io::Error> = GateError::Operation {
			source: std::io::Error::other("connection reset"),
			attempts: 1,
			delay: delay.clone(),
		};

		assert!(err.to_string().contains("750ms"));
		assert_eq!(err.delay(), &delay);
		assert!(!err.is_aborted());
		assert_eq!(
			StdError::source(&err).map(ToString::to_string),
			Some("connection reset".to_string())
		);
	}
}
