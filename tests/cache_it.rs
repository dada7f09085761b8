// self
use quota_guard::{
	_preludet::*,
	cache::{CacheKey, ResultCache},
	clock::{Clock, ManualClock},
	config::CacheConfig,
};

fn build_cache(max_entries: usize) -> (ResultCache<String>, Arc<ManualClock>) {
	let clock = test_clock();
	let config = CacheConfig::default().with_max_entries(max_entries);
	let shared: Arc<dyn Clock> = clock.clone();

	(ResultCache::with_clock(config, shared), clock)
}

#[test]
fn set_then_get_round_trips_until_ttl_elapses() {
	let (cache, clock) = build_cache(16);

	cache.set("calendars:list", "primary,work".to_string(), Duration::minutes(5));

	assert_eq!(cache.get("calendars:list").as_deref(), Some("primary,work"));

	clock.advance(Duration::minutes(5) - Duration::milliseconds(1));

	assert!(cache.get("calendars:list").is_some());

	clock.advance(Duration::milliseconds(1));

	assert_eq!(cache.get("calendars:list"), None);

	let stats = cache.stats();

	assert_eq!((stats.hits, stats.misses, stats.expired_evictions, stats.sets), (2, 1, 1, 1));
}

#[test]
fn inserting_beyond_capacity_evicts_nearest_expiry_first() {
	let (cache, _clock) = build_cache(10);
	// Insert in shuffled order so eviction cannot lean on insertion order.
	let ttls = [70, 20, 90, 10, 50, 100, 30, 80, 60, 40];

	for ttl in ttls {
		cache.set(format!("k{ttl}"), ttl.to_string(), Duration::seconds(ttl));
	}

	cache.set("k5", "5".to_string(), Duration::seconds(5));

	assert_eq!(cache.len(), 10);
	assert!(!cache.contains("k10"), "The soonest-expiring entry should be evicted.");
	assert!(cache.contains("k5"));

	for ttl in [20, 30, 40, 50, 60, 70, 80, 90, 100] {
		assert!(cache.contains(&format!("k{ttl}")));
	}

	for i in 0..25 {
		cache.set(format!("bulk-{i}"), i.to_string(), Duration::seconds(1_000 + i));

		assert!(cache.len() <= 10);
	}

	assert_eq!(cache.stats().sets, 36);
}

#[test]
fn invalidate_by_token_removes_exactly_matching_keys() {
	let (cache, _clock) = build_cache(32);
	let keys = [
		CacheKey::new("events").part("B1").part("2025-11").build(),
		CacheKey::new("calendars").part("list").part("B1").build(),
		CacheKey::new("events").part("B2").part("2025-11").build(),
		CacheKey::new("acl").part("A1").build(),
	];

	for key in &keys {
		cache.set_default(key.clone(), key.to_uppercase());
	}

	assert_eq!(cache.invalidate_by_token("B1"), 2);
	assert_eq!(cache.keys(), vec!["acl:A1".to_string(), "events:B2:2025-11".to_string()]);
	assert_eq!(cache.invalidate_by_token("B1"), 0);
	assert_eq!(cache.invalidate_by_prefix("events:"), 1);
	assert_eq!(cache.stats().deletes, 3);
}

#[test]
fn delete_reports_whether_an_entry_existed() {
	let (cache, _clock) = build_cache(4);

	cache.set_default("k", "v".to_string());

	assert!(cache.delete("k"));
	assert!(!cache.delete("k"));
	assert_eq!(cache.stats().deletes, 1);
}

#[test]
fn health_check_is_read_only() {
	let (cache, clock) = build_cache(4);

	cache.set("short", "a".to_string(), Duration::seconds(1));
	cache.set("long", "b".to_string(), Duration::hours(1));
	clock.advance(Duration::seconds(10));

	let first = cache.health_check();
	let second = cache.health_check();

	assert_eq!(first, second);
	assert_eq!(first.expired_entries, 1);
	assert_eq!(first.size, 2);
	assert_eq!(first.stats.hits + first.stats.misses, 0);
}
