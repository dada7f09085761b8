//! Outbound-call guard for quota-limited APIs: adaptive rate gating with exponential backoff,
//! TTL result caching with bounded eviction, and call health monitoring.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod guard;
pub mod monitor;
pub mod obs;

#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		cache::ResultCache,
		clock::{Clock, ManualClock},
		config::GuardConfig,
		gate::RateGate,
		guard::Guard,
		monitor::CallMonitor,
	};

	/// Fixed instant every test clock starts from.
	pub const TEST_EPOCH: OffsetDateTime = time::macros::datetime!(2025-11-10 12:00 UTC);

	/// Builds a [`ManualClock`] pinned to [`TEST_EPOCH`].
	pub fn test_clock() -> Arc<ManualClock> {
		Arc::new(ManualClock::new(TEST_EPOCH))
	}

	/// Constructs a fully wired [`Guard`] driven by a manual clock, returning the clock so
	/// tests can inspect recorded sleeps and advance virtual time.
	pub fn build_test_guard(config: GuardConfig) -> (Guard<String>, Arc<ManualClock>) {
		let clock = test_clock();
		let shared: Arc<dyn Clock> = clock.clone();
		let gate = Arc::new(RateGate::with_clock(config.gate.clone(), shared.clone()));
		let cache = Arc::new(<ResultCache<String>>::with_clock(config.cache.clone(), shared.clone()));
		let monitor = Arc::new(
			CallMonitor::with_clock(config.monitor.clone(), shared)
				.with_gate(gate.clone())
				.with_cache(cache.clone()),
		);

		(Guard::from_parts(gate, cache, monitor), clock)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

pub use time;
pub use tokio_util::sync::CancellationToken;
#[cfg(test)] use color_eyre as _;
#[cfg(test)] use quota_guard as _;
