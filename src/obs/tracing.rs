// self
use crate::{_prelude::*, obs::Component};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// A span builder used around gated calls.
#[derive(Clone, Debug)]
pub struct GuardSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl GuardSpan {
	/// Creates a new span tagged with the provided component + stage.
	pub fn new(component: Component, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("quota_guard.call", component = component.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (component, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs a spacing or quota wait at debug level.
pub fn trace_wait(reason: &'static str, wait: Duration) {
	#[cfg(feature = "tracing")]
	tracing::debug!(reason, wait_ms = millis(wait), "Gate is holding the next dispatch.");
	#[cfg(not(feature = "tracing"))]
	let _ = (reason, wait);
}

/// Logs a scheduled quota backoff at warn level.
pub fn trace_backoff(retry: u32, backoff: Duration) {
	#[cfg(feature = "tracing")]
	tracing::warn!(retry, backoff_ms = millis(backoff), "Remote quota exhausted; backing off.");
	#[cfg(not(feature = "tracing"))]
	let _ = (retry, backoff);
}

/// Logs a failure that propagates to the caller.
pub fn trace_failure(attempts: u32, rate_limited: bool, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(attempts, rate_limited, %error, "Gated call failed.");
	#[cfg(not(feature = "tracing"))]
	let _ = (attempts, rate_limited, error);
}

/// Logs cache evictions at debug level.
pub fn trace_eviction(reason: &'static str, removed: usize) {
	#[cfg(feature = "tracing")]
	tracing::debug!(reason, removed, "Cache evicted entries.");
	#[cfg(not(feature = "tracing"))]
	let _ = (reason, removed);
}

#[cfg(feature = "tracing")]
fn millis(duration: Duration) -> i64 {
	i64::try_from(duration.whole_milliseconds()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn helpers_accept_events_without_subscriber() {
		trace_wait("spacing", Duration::milliseconds(100));
		trace_backoff(1, Duration::milliseconds(200));
		trace_failure(2, true, &"quota exceeded");
		trace_eviction("capacity", 1);
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = GuardSpan::new(Component::Gate, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
