//! Time sources shared by the gate, cache, and monitor.
//!
//! Components never read the wall clock directly. They go through a [`Clock`] so production code
//! can sleep on tokio timers while tests drive virtual time with [`ManualClock`].

// self
use crate::_prelude::*;

/// Boxed future returned by [`Clock::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Time source contract implemented by real and simulated clocks.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;

	/// Suspends the caller for the provided duration; non-positive durations resolve immediately.
	fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// Wall clock backed by `OffsetDateTime::now_utc` and tokio timers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}

	fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
		Box::pin(async move {
			if duration.is_positive() {
				tokio::time::sleep(duration.unsigned_abs()).await;
			}
		})
	}
}

/// Virtual clock whose sleeps complete instantly by advancing the current instant.
///
/// Every positive sleep is recorded, which lets tests assert on the exact waits a component
/// requested.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<OffsetDateTime>,
	sleeps: Mutex<Vec<Duration>>,
}
impl ManualClock {
	/// Creates a clock pinned to `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self { now: Mutex::new(start), sleeps: Mutex::default() }
	}

	/// Moves the clock forward without recording a sleep.
	pub fn advance(&self, duration: Duration) {
		*self.now.lock() += duration;
	}

	/// Returns every sleep requested so far, in order.
	pub fn sleeps(&self) -> Vec<Duration> {
		self.sleeps.lock().clone()
	}

	/// Returns the sum of every recorded sleep.
	pub fn total_slept(&self) -> Duration {
		self.sleeps.lock().iter().fold(Duration::ZERO, |acc, d| acc + *d)
	}

	/// Forgets recorded sleeps while keeping the current instant.
	pub fn clear_sleeps(&self) {
		self.sleeps.lock().clear();
	}
}
impl Default for ManualClock {
	fn default() -> Self {
		Self::new(OffsetDateTime::UNIX_EPOCH)
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.now.lock()
	}

	fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
		if duration.is_positive() {
			self.sleeps.lock().push(duration);
			self.advance(duration);
		}

		Box::pin(async {})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[tokio::test]
	async fn manual_clock_advances_on_sleep() {
		let start = macros::datetime!(2025-11-10 12:00 UTC);
		let clock = ManualClock::new(start);

		clock.sleep(Duration::milliseconds(250)).await;
		clock.sleep(Duration::ZERO).await;
		clock.sleep(Duration::milliseconds(-5)).await;

		assert_eq!(clock.now(), start + Duration::milliseconds(250));
		assert_eq!(clock.sleeps(), vec![Duration::milliseconds(250)]);

		clock.advance(Duration::seconds(1));

		assert_eq!(clock.total_slept(), Duration::milliseconds(250));
		assert_eq!(clock.now(), start + Duration::milliseconds(1_250));
	}

	#[tokio::test(start_paused = true)]
	async fn system_clock_sleeps_on_tokio_timers() {
		let before = tokio::time::Instant::now();

		SystemClock.sleep(Duration::milliseconds(40)).await;

		assert!(before.elapsed() >= std::time::Duration::from_millis(40));
	}
}
