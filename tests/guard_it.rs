// std
use std::sync::atomic::{AtomicU32, Ordering};
// self
use quota_guard::{
	_preludet::*,
	CancellationToken,
	config::GuardConfig,
	gate::{GateError, RemoteError},
	monitor::{CallEvent, CallMonitor, FailureDetail, HealthIssue},
};

#[tokio::test]
async fn every_attempt_is_recorded_including_retries() {
	let (guard, _clock) = build_test_guard(GuardConfig::default());
	let calls = AtomicU32::new(0);
	let value = guard
		.call("events", "list", || {
			let attempt = calls.fetch_add(1, Ordering::SeqCst);

			async move {
				if attempt < 2 {
					Err(RemoteError::rate_limited("Quota exceeded for events.list").with_status(403))
				} else {
					Ok(vec!["standup", "retro"])
				}
			}
		})
		.await
		.expect("Third attempt should succeed.");

	assert_eq!(value.len(), 2);

	let api = guard.monitor.api_stats();

	assert_eq!((api.total_calls, api.successful_calls, api.failed_calls), (3, 1, 2));
	assert_eq!(api.success_rate.to_string(), "33.33%");

	let quota = guard.monitor.quota_warnings();

	assert_eq!(quota.total_warnings, 2);
	assert_eq!(quota.recent[0].status_code, Some(403));

	let errors = guard.monitor.error_stats();

	assert_eq!(errors.by_status[0].value, 403);
	assert_eq!(errors.by_status[0].count, 2);
}

#[tokio::test]
async fn cached_reads_skip_the_gate_and_writes_invalidate() {
	let (guard, _clock) = build_test_guard(GuardConfig::default());
	let fetches = AtomicU32::new(0);
	let key = "events:B1:2025-11";

	for _ in 0..3 {
		let value = guard
			.cached_call(key, Duration::minutes(5), "events", "list", || {
				fetches.fetch_add(1, Ordering::SeqCst);

				async { Ok::<_, RemoteError>("standup".to_string()) }
			})
			.await
			.expect("Cached read should succeed.");

		assert_eq!(value, "standup");
	}

	assert_eq!(fetches.load(Ordering::SeqCst), 1);
	assert_eq!(guard.gate.snapshot().totals.dispatched, 1);

	guard.cache.set("calendars:list:B1", "work".to_string(), Duration::minutes(5));
	guard.cache.set("events:B2:2025-11", "retro".to_string(), Duration::minutes(5));
	guard
		.invalidating_call(&["B1"], "events", "insert", || async { Ok::<_, RemoteError>(()) })
		.await
		.expect("Write should succeed.");

	assert_eq!(guard.cache.keys(), vec!["events:B2:2025-11".to_string()]);

	let stats = guard.cache.stats();

	assert_eq!((stats.hits, stats.misses), (2, 1));
}

#[tokio::test]
async fn failed_writes_leave_the_cache_untouched() {
	let (guard, _clock) = build_test_guard(GuardConfig::default());

	guard.cache.set("events:B1", "standup".to_string(), Duration::minutes(5));

	let err = guard
		.invalidating_call(&["B1"], "events", "insert", || async {
			Err::<(), _>(RemoteError::new("Invalid request").with_status(400))
		})
		.await
		.expect_err("Bad request should propagate.");

	assert!(matches!(err, GateError::Operation { attempts: 1, .. }));
	assert!(guard.cache.contains("events:B1"));
	assert_eq!(guard.monitor.quota_warnings().total_warnings, 0);
}

#[tokio::test]
async fn status_reads_gate_and_cache_without_mutating_them() {
	let (guard, _clock) = build_test_guard(GuardConfig::default());

	guard
		.cached_call("calendars:list", Duration::minutes(1), "calendars", "list", || async {
			Ok::<_, RemoteError>("primary".to_string())
		})
		.await
		.expect("Read should succeed.");

	let before = guard.gate.snapshot();
	let status = guard.status();

	assert_eq!(status.gate.as_ref(), Some(&before));
	assert_eq!(status.cache.as_ref().map(|cache| cache.sets), Some(1));
	assert_eq!(status.api.total_calls, 1);
	assert_eq!(guard.gate.snapshot(), before);

	let payload = serde_json::to_value(&status).expect("Status should serialize.");

	assert_eq!(payload["api"]["success_rate"], "100.00%");
	assert_eq!(payload["gate"]["totals"]["dispatched"], 1);
}

#[test]
fn success_rate_matches_the_recorded_ratio() {
	let monitor = CallMonitor::with_clock(Default::default(), test_clock());

	assert_eq!(monitor.api_stats().success_rate.to_string(), "0%");

	for i in 0..10 {
		let duration = Duration::milliseconds(20);
		let event = if i % 4 == 0 {
			CallEvent::failure("acl", "get", duration, FailureDetail::new("Backend Error"))
		} else {
			CallEvent::success("acl", "get", duration)
		};

		monitor.record(event);
	}

	let api = monitor.api_stats();

	assert_eq!(api.success_rate.value(), 7.0 / 10.0 * 100.0);
	assert_eq!(api.average_duration_ms, 20.0);
}

#[tokio::test]
async fn health_report_flags_quota_pressure() {
	let (guard, _clock) = build_test_guard(GuardConfig::default());

	for _ in 0..5 {
		let _ = guard
			.call("events", "watch", || async {
				Err::<(), _>(RemoteError::new("Rate Limit Exceeded"))
			})
			.await;
	}

	let report = guard.health_report();

	assert!(!report.healthy);
	assert!(
		report.issues.iter().any(|issue| matches!(issue, HealthIssue::TooManyQuotaWarnings { .. }))
	);
	assert!(report.issues.iter().any(|issue| matches!(issue, HealthIssue::TooManyErrors { .. })));
}

#[tokio::test(start_paused = true)]
async fn cancelled_calls_skip_the_interrupted_attempt() {
	let (guard, _clock) = build_test_guard(GuardConfig::default());
	let token = CancellationToken::new();

	guard
		.call_with_cancel(&token, "calendars", "get", || async { Ok::<_, RemoteError>("primary") })
		.await
		.expect("Uncancelled call should succeed.");

	let canceller = async {
		tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		token.cancel();
	};
	let call = guard.call_with_cancel(&token, "events", "watch", || async {
		tokio::time::sleep(std::time::Duration::from_secs(30)).await;

		Ok::<_, RemoteError>("channel")
	});
	let (result, ()) = tokio::join!(call, canceller);
	let err = result.expect_err("Cancelled call should fail.");

	assert!(matches!(err, GateError::Cancelled { attempts: 1, .. }));
	assert_eq!(guard.monitor.api_stats().total_calls, 1);
	assert_eq!(guard.gate.snapshot().totals.dispatched, 2);
}

#[tokio::test(start_paused = true)]
async fn timed_out_calls_surface_as_timeouts() {
	let (guard, _clock) = build_test_guard(GuardConfig::default());
	let err = guard
		.call_with_timeout(Duration::seconds(1), "events", "list", || async {
			tokio::time::sleep(std::time::Duration::from_secs(30)).await;

			Ok::<_, RemoteError>(())
		})
		.await
		.expect_err("Slow call should time out.");

	assert!(matches!(err, GateError::TimedOut { .. }));
	assert_eq!(guard.monitor.api_stats().total_calls, 0);
	assert_eq!(guard.monitor.quota_warnings().total_warnings, 0);
}
