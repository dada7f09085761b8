//! Composition of the gate, cache, and monitor around a single call path.
//!
//! [`Guard`] owns shared handles to the three components. Every attempt the gate dispatches is
//! timed and reported to the monitor, so retries show up as separate records. Cacheable reads go
//! through [`Guard::cached_call`]; writes that should drop stale listings go through
//! [`Guard::invalidating_call`].

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	cache::ResultCache,
	clock::{Clock, SystemClock},
	config::GuardConfig,
	gate::{CallFailure, GateError, RateGate},
	monitor::{CallEvent, CallMonitor, FailureDetail, HealthReport, StatusReport},
	obs::{Component, GuardSpan},
};

enum Abort<'a> {
	Never,
	Cancel(&'a CancellationToken),
	After(Duration),
}

/// Outbound-call guard combining rate gating, result caching, and monitoring.
#[derive(Clone)]
pub struct Guard<V> {
	/// Rate gate every call passes through.
	pub gate: Arc<RateGate>,
	/// Cache consulted by [`Guard::cached_call`].
	pub cache: Arc<ResultCache<V>>,
	/// Monitor receiving one event per dispatched attempt.
	pub monitor: Arc<CallMonitor>,
}
impl<V> Guard<V>
where
	V: 'static + Clone + Send + Sync,
{
	/// Validates `config` and builds a guard driven by the wall clock.
	pub fn new(config: GuardConfig) -> Result<Self> {
		Self::with_clock(config, Arc::new(SystemClock))
	}

	/// Validates `config` and builds a guard whose components share `clock`.
	pub fn with_clock(config: GuardConfig, clock: Arc<dyn Clock>) -> Result<Self> {
		config.validate()?;

		let GuardConfig { gate, cache, monitor } = config;
		let gate = Arc::new(RateGate::with_clock(gate, clock.clone()));
		let cache = Arc::new(<ResultCache<V>>::with_clock(cache, clock.clone()));
		let monitor = Arc::new(
			CallMonitor::with_clock(monitor, clock).with_gate(gate.clone()).with_cache(cache.clone()),
		);

		Ok(Self::from_parts(gate, cache, monitor))
	}

	/// Assembles a guard from existing components.
	pub fn from_parts(
		gate: Arc<RateGate>,
		cache: Arc<ResultCache<V>>,
		monitor: Arc<CallMonitor>,
	) -> Self {
		Self { gate, cache, monitor }
	}

	/// Runs `operation` through the gate and records every attempt with the monitor.
	pub async fn call<T, E, F, Fut>(
		&self,
		endpoint: &str,
		method: &str,
		operation: F,
	) -> Result<T, GateError<E>>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: CallFailure,
	{
		self.dispatch(endpoint, method, operation, Abort::Never).await
	}

	/// Like [`Guard::call`], but aborts any wait or in-flight attempt once `cancel` fires.
	///
	/// An attempt interrupted mid-flight is not recorded with the monitor.
	pub async fn call_with_cancel<T, E, F, Fut>(
		&self,
		cancel: &CancellationToken,
		endpoint: &str,
		method: &str,
		operation: F,
	) -> Result<T, GateError<E>>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: CallFailure,
	{
		self.dispatch(endpoint, method, operation, Abort::Cancel(cancel)).await
	}

	/// Like [`Guard::call`], but gives up once `timeout` elapses on tokio's clock.
	pub async fn call_with_timeout<T, E, F, Fut>(
		&self,
		timeout: Duration,
		endpoint: &str,
		method: &str,
		operation: F,
	) -> Result<T, GateError<E>>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: CallFailure,
	{
		self.dispatch(endpoint, method, operation, Abort::After(timeout)).await
	}

	/// Serves `key` from the cache, or runs `operation` through [`Guard::call`] and caches the
	/// successful result for `ttl`.
	pub async fn cached_call<E, F, Fut>(
		&self,
		key: &str,
		ttl: Duration,
		endpoint: &str,
		method: &str,
		operation: F,
	) -> Result<V, GateError<E>>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<V, E>>,
		E: CallFailure,
	{
		let span = GuardSpan::new(Component::Guard, "cached_call");

		span.instrument(async move {
			if let Some(value) = self.cache.get(key) {
				return Ok(value);
			}

			let value = self.call(endpoint, method, operation).await?;

			self.cache.set(key, value.clone(), ttl);

			Ok(value)
		})
		.await
	}

	/// Runs a write through [`Guard::call`] and, on success, drops every cached entry whose key
	/// contains one of `tokens`.
	pub async fn invalidating_call<T, E, F, Fut>(
		&self,
		tokens: &[&str],
		endpoint: &str,
		method: &str,
		operation: F,
	) -> Result<T, GateError<E>>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: CallFailure,
	{
		let value = self.call(endpoint, method, operation).await?;

		for token in tokens {
			self.cache.invalidate_by_token(token);
		}

		Ok(value)
	}

	async fn dispatch<T, E, F, Fut>(
		&self,
		endpoint: &str,
		method: &str,
		mut operation: F,
		abort: Abort<'_>,
	) -> Result<T, GateError<E>>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: CallFailure,
	{
		let clock = self.gate.clock().as_ref();
		let monitor = self.monitor.as_ref();
		let attempt = || {
			let started = clock.now();
			let attempt = operation();

			async move {
				let result = attempt.await;
				let elapsed = clock.now() - started;
				let event = match &result {
					Ok(_) => CallEvent::success(endpoint, method, elapsed),
					Err(err) =>
						CallEvent::failure(endpoint, method, elapsed, FailureDetail::from_failure(err)),
				};

				monitor.record(event);

				result
			}
		};

		match abort {
			Abort::Never => self.gate.execute(attempt).await,
			Abort::Cancel(token) => self.gate.execute_with_cancel(token, attempt).await,
			Abort::After(timeout) => self.gate.execute_with_timeout(timeout, attempt).await,
		}
	}

	/// Composite status across all three components.
	pub fn status(&self) -> StatusReport {
		self.monitor.status()
	}

	/// Health judgment from the monitor.
	pub fn health_report(&self) -> HealthReport {
		self.monitor.health_report()
	}

	/// Resets the gate, clears the cache, and resets the monitor.
	pub fn reset(&self) {
		self.gate.reset();
		self.cache.clear();
		self.monitor.reset();
	}
}
impl<V> Debug for Guard<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Guard")
			.field("gate", &self.gate)
			.field("cache", &self.cache)
			.field("monitor", &self.monitor)
			.finish()
	}
}
