//! Structured failure classification consulted by the gate before retrying.

// self
use crate::_prelude::*;

/// HTTP status code providers use for "too many requests".
pub const TOO_MANY_REQUESTS: u16 = 429;

const QUOTA_VOCABULARY: &[&str] = &[
	"quota",
	"rate limit",
	"rate-limit",
	"ratelimit",
	"too many requests",
	"limit exceeded",
	"limitexceeded",
];

/// How the gate should treat a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
	/// The remote signalled quota exhaustion; the gate backs off and retries.
	RateLimited {
		/// Provider-supplied hint for the earliest sensible retry.
		retry_after: Option<Duration>,
	},
	/// Any other failure; the gate slows down but never retries.
	Other,
}
impl FailureKind {
	/// Quota failure without a retry hint.
	pub const RATE_LIMITED: Self = Self::RateLimited { retry_after: None };

	/// Classifies a failure from its status code and message.
	///
	/// This is the loose heuristic for adapters whose transport cannot report a structured kind:
	/// status 429 or quota vocabulary in the message counts as a quota failure. Provider-specific
	/// quota errors phrased differently are not detected.
	pub fn infer(status: Option<u16>, message: &str) -> Self {
		if status == Some(TOO_MANY_REQUESTS) {
			return Self::RATE_LIMITED;
		}

		let lowered = message.to_ascii_lowercase();

		if QUOTA_VOCABULARY.iter().any(|needle| lowered.contains(needle)) {
			Self::RATE_LIMITED
		} else {
			Self::Other
		}
	}

	/// Returns `true` when the failure should trigger backoff.
	pub const fn is_rate_limited(&self) -> bool {
		matches!(self, Self::RateLimited { .. })
	}

	/// Returns the provider's retry hint, if any.
	pub const fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::RateLimited { retry_after } => *retry_after,
			Self::Other => None,
		}
	}
}

/// Contract implemented by errors returned from gated operations.
pub trait CallFailure
where
	Self: 'static + Send + Sync + StdError,
{
	/// Classifies the failure for the gate's retry policy.
	fn classify(&self) -> FailureKind;

	/// HTTP (or HTTP-like) status code attached to the failure.
	fn status_code(&self) -> Option<u16> {
		None
	}
}

/// General-purpose remote failure for callers without their own error type.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{message}")]
pub struct RemoteError {
	/// Human-readable failure description.
	pub message: String,
	/// Status code returned by the remote, when available.
	pub status: Option<u16>,
	kind: Option<FailureKind>,
}
impl RemoteError {
	/// Creates an error classified from its status and message via [`FailureKind::infer`].
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into(), status: None, kind: None }
	}

	/// Creates an error explicitly classified as a quota failure.
	pub fn rate_limited(message: impl Into<String>) -> Self {
		Self::new(message).with_kind(FailureKind::RATE_LIMITED)
	}

	/// Creates an error explicitly classified as a non-quota failure.
	pub fn other(message: impl Into<String>) -> Self {
		Self::new(message).with_kind(FailureKind::Other)
	}

	/// Attaches a status code.
	pub fn with_status(mut self, status: u16) -> Self {
		self.status = Some(status);

		self
	}

	/// Attaches a retry hint; the error becomes a quota failure.
	pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
		self.kind = Some(FailureKind::RateLimited { retry_after: Some(retry_after) });

		self
	}

	/// Overrides the classification.
	pub fn with_kind(mut self, kind: FailureKind) -> Self {
		self.kind = Some(kind);

		self
	}
}
impl CallFailure for RemoteError {
	fn classify(&self) -> FailureKind {
		self.kind.unwrap_or_else(|| FailureKind::infer(self.status, &self.message))
	}

	fn status_code(&self) -> Option<u16> {
		self.status
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn infer_matches_status_and_vocabulary() {
		assert!(FailureKind::infer(Some(429), "slow down").is_rate_limited());
		assert!(FailureKind::infer(None, "User Rate Limit Exceeded").is_rate_limited());
		assert!(FailureKind::infer(Some(403), "Daily quota exhausted").is_rate_limited());
		assert!(FailureKind::infer(None, "calendarUsageLimitExceeded").is_rate_limited());
		assert_eq!(FailureKind::infer(Some(500), "backend error"), FailureKind::Other);
		assert_eq!(FailureKind::infer(None, "not found"), FailureKind::Other);
	}

	#[test]
	fn explicit_kind_overrides_message_text() {
		let quiet = RemoteError::rate_limited("try again later");

		assert!(quiet.classify().is_rate_limited());

		let misleading = RemoteError::other("quota field missing from payload");

		assert_eq!(misleading.classify(), FailureKind::Other);

		let hinted = RemoteError::new("busy").with_retry_after(Duration::seconds(3));

		assert_eq!(hinted.classify().retry_after(), Some(Duration::seconds(3)));
		assert_eq!(RemoteError::new("x").with_status(429).status_code(), Some(429));
	}
}
