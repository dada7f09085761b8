//! Adaptive rate gate with spacing, rolling quota windows, and quota-aware backoff.
//!
//! Every attempt first passes an admission phase that enforces the adaptive inter-request spacing
//! and both quota windows (per second and per 100 seconds). Admission runs under a single async
//! guard so concurrent callers cannot both observe spare capacity. The wrapped operation then runs
//! outside the guard. Quota failures, as classified by [`CallFailure`], are retried with
//! exponential backoff up to `max_consecutive_failures` times; every other failure slows the gate
//! down and propagates immediately.

mod failure;
mod state;

pub use failure::*;
pub use state::{DelayState, GateSnapshot, GateTotals};

pub use crate::error::GateError;

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	config::GateConfig,
	obs::{self, AttemptOutcome, Component, GuardSpan},
};
use state::GateState;

/// Wraps outbound operations with spacing, quota windows, and backoff.
pub struct RateGate {
	config: GateConfig,
	clock: Arc<dyn Clock>,
	admission: AsyncMutex<()>,
	state: Mutex<GateState>,
}
impl RateGate {
	/// Creates a gate driven by the wall clock.
	pub fn new(config: GateConfig) -> Self {
		Self::with_clock(config, Arc::new(SystemClock))
	}

	/// Creates a gate driven by the provided clock.
	pub fn with_clock(config: GateConfig, clock: Arc<dyn Clock>) -> Self {
		let state = GateState::new(&config, clock.now());

		Self { config, clock, admission: AsyncMutex::new(()), state: Mutex::new(state) }
	}

	/// Returns the limits the gate enforces.
	pub fn config(&self) -> &GateConfig {
		&self.config
	}

	/// Returns the clock driving the gate.
	pub fn clock(&self) -> &Arc<dyn Clock> {
		&self.clock
	}

	/// Runs `operation` through the gate.
	///
	/// The closure is invoked once per attempt, so quota retries re-create the request future.
	pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, GateError<E>>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: CallFailure,
	{
		self.run(operation, None).await
	}

	/// Runs `operation` through the gate, aborting any wait or in-flight attempt once `cancel`
	/// fires.
	pub async fn execute_with_cancel<T, E, F, Fut>(
		&self,
		cancel: &CancellationToken,
		operation: F,
	) -> Result<T, GateError<E>>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: CallFailure,
	{
		self.run(operation, Some(cancel)).await
	}

	/// Runs `operation` through the gate, giving up once `timeout` elapses on tokio's clock.
	///
	/// The deadline covers spacing waits, quota waits, backoffs, and the attempts themselves.
	pub async fn execute_with_timeout<T, E, F, Fut>(
		&self,
		timeout: Duration,
		operation: F,
	) -> Result<T, GateError<E>>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: CallFailure,
	{
		match tokio::time::timeout(timeout.unsigned_abs(), self.run(operation, None)).await {
			Ok(result) => result,
			Err(_) => {
				obs::record_attempt(AttemptOutcome::Cancelled);

				Err(GateError::TimedOut { after: timeout, delay: self.delay_state() })
			},
		}
	}

	/// Returns the current delay and failure streak.
	pub fn delay_state(&self) -> DelayState {
		self.state.lock().delay_state()
	}

	/// Returns a read-only view of the gate.
	pub fn snapshot(&self) -> GateSnapshot {
		self.state.lock().snapshot(&self.config)
	}

	/// Restores the initial delay, counters, and windows.
	pub fn reset(&self) {
		*self.state.lock() = GateState::new(&self.config, self.clock.now());
	}

	async fn run<T, E, F, Fut>(
		&self,
		mut operation: F,
		cancel: Option<&CancellationToken>,
	) -> Result<T, GateError<E>>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: CallFailure,
	{
		let span = GuardSpan::new(Component::Gate, "execute");

		span.instrument(async move {
			let base_delay = self.state.lock().current_delay;
			let mut retry = 0_u32;

			loop {
				self.abortable::<_, E>(cancel, retry, self.admit()).await?;

				let attempts = retry + 1;

				obs::record_attempt(AttemptOutcome::Dispatched);

				let err = match self.abortable::<_, E>(cancel, attempts, operation()).await? {
					Ok(value) => {
						self.state.lock().record_success(&self.config);
						obs::record_attempt(AttemptOutcome::Success);

						return Ok(value);
					},
					Err(err) => err,
				};
				let kind = err.classify();
				let rate_limited = kind.is_rate_limited();

				if rate_limited {
					obs::record_attempt(AttemptOutcome::RateLimited);

					let backoff = self.state.lock().record_quota_failure(
						&self.config,
						base_delay,
						retry,
						kind.retry_after(),
					);

					obs::record_backoff();
					obs::trace_backoff(attempts, backoff);
					self.abortable::<_, E>(cancel, attempts, self.clock.sleep(backoff)).await?;

					if retry < self.config.max_consecutive_failures {
						self.state.lock().record_retry();

						retry = attempts;

						continue;
					}
				} else {
					obs::record_attempt(AttemptOutcome::Failure);
				}

				let delay = {
					let mut state = self.state.lock();

					if rate_limited {
						state.escalate(&self.config);
					} else {
						state.record_failure(&self.config);
					}

					state.delay_state()
				};

				obs::trace_failure(attempts, rate_limited, &err);

				return Err(if rate_limited {
					GateError::RateLimited { source: err, attempts, delay }
				} else {
					GateError::Operation { source: err, attempts, delay }
				});
			}
		})
		.await
	}

	/// Waits out the spacing and both quota windows, then reserves a slot for one dispatch.
	async fn admit(&self) {
		let _admission = self.admission.lock().await;
		let spacing = self.state.lock().spacing_wait(self.clock.now());

		if spacing.is_positive() {
			obs::trace_wait("spacing", spacing);
			self.clock.sleep(spacing).await;
		}

		// Windows reset lazily; after sleeping to a boundary the next roll restarts that window.
		loop {
			let now = self.clock.now();
			let wait = {
				let mut state = self.state.lock();

				state.per_second.roll(now);
				state.per_100_seconds.roll(now);

				match (state.per_second.wait_needed(now), state.per_100_seconds.wait_needed(now)) {
					(None, None) => None,
					(Some(second), None) => Some(("per_second_quota", second)),
					(None, Some(hundred)) => Some(("per_100_seconds_quota", hundred)),
					(Some(second), Some(hundred)) =>
						Some(("per_100_seconds_quota", second.max(hundred))),
				}
			};
			let Some((reason, wait)) = wait else {
				break;
			};

			obs::trace_wait(reason, wait);
			self.clock.sleep(wait).await;
		}

		let now = self.clock.now();

		self.state.lock().reserve(now);
	}

	async fn abortable<O, E>(
		&self,
		cancel: Option<&CancellationToken>,
		attempts: u32,
		fut: impl Future<Output = O>,
	) -> Result<O, GateError<E>> {
		let Some(token) = cancel else {
			return Ok(fut.await);
		};

		tokio::select! {
			biased;
			_ = token.cancelled() => {
				obs::record_attempt(AttemptOutcome::Cancelled);

				Err(GateError::Cancelled { attempts, delay: self.delay_state() })
			},
			output = fut => Ok(output),
		}
	}
}
impl Debug for RateGate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateGate")
			.field("config", &self.config)
			.field("delay", &self.delay_state())
			.finish()
	}
}
