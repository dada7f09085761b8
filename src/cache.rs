//! Capacity-bounded, TTL-keyed result cache for idempotent reads.
//!
//! Eviction is reactive: stale entries disappear when a lookup trips over them, and capacity
//! pressure removes the soonest-expiring tenth of the map before an insert would overflow it.
//! There is no background sweeper.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	config::CacheConfig,
	obs::{self, CacheOutcome},
};

type EntryMap<V> = HashMap<String, CacheEntry<V>>;

#[derive(Clone, Debug)]
struct CacheEntry<V> {
	value: V,
	expires_at: OffsetDateTime,
}
impl<V> CacheEntry<V> {
	fn is_live_at(&self, now: OffsetDateTime) -> bool {
		now < self.expires_at
	}
}

/// Read-only cache statistics consumed by monitors.
pub trait CacheStatsSource
where
	Self: Send + Sync,
{
	/// Returns a point-in-time statistics snapshot.
	fn cache_stats(&self) -> CacheStats;
}

/// Running cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
	/// Lookups served from a live entry.
	pub hits: u64,
	/// Lookups that found nothing usable (including stale entries).
	pub misses: u64,
	/// Inserts and overwrites.
	pub sets: u64,
	/// Entries removed by `delete` or invalidation.
	pub deletes: u64,
	/// Entries removed under capacity pressure.
	pub evictions: u64,
	/// Stale entries removed by the lookup that discovered them.
	pub expired_evictions: u64,
	/// Entries currently stored, live or stale.
	pub size: usize,
	/// `hits / (hits + misses)` as a percentage; 0 before the first lookup.
	pub hit_rate: f64,
}

/// Diagnostic view returned by [`ResultCache::health_check`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheHealth {
	/// Entries currently stored.
	pub size: usize,
	/// Configured capacity.
	pub max_entries: usize,
	/// Entries already past their expiry but not yet evicted.
	pub expired_entries: usize,
	/// Statistics snapshot.
	pub stats: CacheStats,
}

#[derive(Debug, Default)]
struct CacheCounters {
	hits: AtomicU64,
	misses: AtomicU64,
	sets: AtomicU64,
	deletes: AtomicU64,
	evictions: AtomicU64,
	expired: AtomicU64,
}
impl CacheCounters {
	fn add(counter: &AtomicU64, n: u64) {
		counter.fetch_add(n, Ordering::Relaxed);
	}

	fn reset(&self) {
		for counter in
			[&self.hits, &self.misses, &self.sets, &self.deletes, &self.evictions, &self.expired]
		{
			counter.store(0, Ordering::Relaxed);
		}
	}

	fn snapshot(&self, size: usize) -> CacheStats {
		let hits = self.hits.load(Ordering::Relaxed);
		let misses = self.misses.load(Ordering::Relaxed);
		let lookups = hits + misses;

		CacheStats {
			hits,
			misses,
			sets: self.sets.load(Ordering::Relaxed),
			deletes: self.deletes.load(Ordering::Relaxed),
			evictions: self.evictions.load(Ordering::Relaxed),
			expired_evictions: self.expired.load(Ordering::Relaxed),
			size,
			hit_rate: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 * 100.0 },
		}
	}
}

/// Thread-safe TTL cache keyed by strings.
pub struct ResultCache<V> {
	config: CacheConfig,
	clock: Arc<dyn Clock>,
	entries: RwLock<EntryMap<V>>,
	counters: CacheCounters,
}
impl<V> ResultCache<V>
where
	V: Clone,
{
	/// Creates a cache driven by the wall clock.
	pub fn new(config: CacheConfig) -> Self {
		Self::with_clock(config, Arc::new(SystemClock))
	}

	/// Creates a cache driven by the provided clock.
	pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
		Self { config, clock, entries: RwLock::default(), counters: CacheCounters::default() }
	}

	/// Returns the configured limits.
	pub fn config(&self) -> &CacheConfig {
		&self.config
	}

	/// Returns the value stored under `key` if it has not expired.
	///
	/// A stale entry is removed as a side effect; callers see a plain miss either way.
	pub fn get(&self, key: &str) -> Option<V> {
		let now = self.clock.now();

		{
			let entries = self.entries.read();

			match entries.get(key) {
				Some(entry) if entry.is_live_at(now) => {
					CacheCounters::add(&self.counters.hits, 1);
					obs::record_cache(CacheOutcome::Hit, 1);

					return Some(entry.value.clone());
				},
				Some(_) => {},
				None => {
					CacheCounters::add(&self.counters.misses, 1);
					obs::record_cache(CacheOutcome::Miss, 1);

					return None;
				},
			}
		}

		let mut entries = self.entries.write();

		// Re-check under the write guard; a writer may have refreshed the entry meanwhile.
		if entries.get(key).is_some_and(|entry| !entry.is_live_at(now)) {
			entries.remove(key);
			CacheCounters::add(&self.counters.expired, 1);
			obs::record_cache(CacheOutcome::Expired, 1);
		}

		CacheCounters::add(&self.counters.misses, 1);
		obs::record_cache(CacheOutcome::Miss, 1);

		None
	}

	/// Inserts or overwrites `key`, evicting first when a new key would exceed capacity.
	///
	/// A non-positive TTL is a caller bug: debug builds panic, release builds store nothing. A
	/// cache configured with zero capacity never stores anything.
	pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
		debug_assert!(ttl.is_positive(), "Cache TTL must be positive.");

		if !ttl.is_positive() || self.config.max_entries == 0 {
			return;
		}

		let key = key.into();
		let expires_at = self.clock.now() + ttl;
		let mut entries = self.entries.write();

		if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
			let removed = evict_soonest_expiring(&mut entries);

			CacheCounters::add(&self.counters.evictions, removed as u64);
			obs::record_cache(CacheOutcome::Evicted, removed as u64);
			obs::trace_eviction("capacity", removed);
		}

		entries.insert(key, CacheEntry { value, expires_at });
		CacheCounters::add(&self.counters.sets, 1);
	}

	/// Inserts or overwrites `key` using the configured default TTL.
	pub fn set_default(&self, key: impl Into<String>, value: V) {
		self.set(key, value, self.config.default_ttl());
	}

	/// Returns the cached value or runs `fetch`, caching its successful result for `ttl`.
	pub async fn get_or_insert_with<E, F, Fut>(
		&self,
		key: &str,
		ttl: Duration,
		fetch: F,
	) -> Result<V, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<V, E>>,
	{
		if let Some(value) = self.get(key) {
			return Ok(value);
		}

		let value = fetch().await?;

		self.set(key, value.clone(), ttl);

		Ok(value)
	}

	/// Removes `key`, reporting whether an entry existed.
	pub fn delete(&self, key: &str) -> bool {
		let removed = self.entries.write().remove(key).is_some();

		if removed {
			CacheCounters::add(&self.counters.deletes, 1);
		}

		removed
	}

	/// Removes every entry whose key contains `token`, returning how many were removed.
	///
	/// Lets a write to one resource drop every cached listing that mentions it, whatever the
	/// composite key layout.
	pub fn invalidate_by_token(&self, token: &str) -> usize {
		self.remove_where(|key| key.contains(token))
	}

	/// Removes every entry whose key starts with `prefix`, returning how many were removed.
	pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
		self.remove_where(|key| key.starts_with(prefix))
	}

	/// Returns `true` when `key` holds a live entry. Does not touch statistics.
	pub fn contains(&self, key: &str) -> bool {
		let now = self.clock.now();

		self.entries.read().get(key).is_some_and(|entry| entry.is_live_at(now))
	}

	/// Number of stored entries, live or stale.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Sorted list of stored keys.
	pub fn keys(&self) -> Vec<String> {
		let mut keys = self.entries.read().keys().cloned().collect::<Vec<_>>();

		keys.sort_unstable();

		keys
	}

	/// Returns the running statistics.
	pub fn stats(&self) -> CacheStats {
		let size = self.len();

		self.counters.snapshot(size)
	}

	/// Reports size, stale-entry count, and statistics without evicting anything.
	pub fn health_check(&self) -> CacheHealth {
		let now = self.clock.now();
		let (size, expired_entries) = {
			let entries = self.entries.read();
			let expired = entries.values().filter(|entry| !entry.is_live_at(now)).count();

			(entries.len(), expired)
		};

		CacheHealth {
			size,
			max_entries: self.config.max_entries,
			expired_entries,
			stats: self.counters.snapshot(size),
		}
	}

	/// Drops every entry and zeroes the statistics.
	pub fn clear(&self) {
		self.entries.write().clear();
		self.counters.reset();
	}

	fn remove_where(&self, predicate: impl Fn(&str) -> bool) -> usize {
		let mut entries = self.entries.write();
		let before = entries.len();

		entries.retain(|key, _| !predicate(key));

		let removed = before - entries.len();

		CacheCounters::add(&self.counters.deletes, removed as u64);

		removed
	}
}
impl<V> CacheStatsSource for ResultCache<V>
where
	V: Clone + Send + Sync,
{
	fn cache_stats(&self) -> CacheStats {
		self.stats()
	}
}
impl<V> Debug for ResultCache<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResultCache")
			.field("config", &self.config)
			.field("size", &self.entries.read().len())
			.finish()
	}
}

/// Builder for `namespace:part:part` composite cache keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey(String);
impl CacheKey {
	const SEPARATOR: char = ':';

	/// Starts a key in the provided namespace.
	pub fn new(namespace: impl AsRef<str>) -> Self {
		Self(namespace.as_ref().to_owned())
	}

	/// Appends a component.
	pub fn part(mut self, part: impl Display) -> Self {
		self.0.push(Self::SEPARATOR);
		self.0.push_str(&part.to_string());

		self
	}

	/// Appends a component only when present.
	pub fn part_opt(self, part: Option<impl Display>) -> Self {
		match part {
			Some(part) => self.part(part),
			None => self,
		}
	}

	/// Finishes the key.
	pub fn build(self) -> String {
		self.0
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl From<CacheKey> for String {
	fn from(value: CacheKey) -> Self {
		value.0
	}
}

/// Removes the soonest-expiring tenth of the map (rounded up, at least one entry).
fn evict_soonest_expiring<V>(entries: &mut EntryMap<V>) -> usize {
	let quota = entries.len().div_ceil(10).max(1);
	let mut by_expiry =
		entries.iter().map(|(key, entry)| (entry.expires_at, key.clone())).collect::<Vec<_>>();

	by_expiry.sort_unstable();

	by_expiry
		.into_iter()
		.take(quota)
		.filter(|(_, key)| entries.remove(key).is_some())
		.count()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::clock::ManualClock;

	fn cache(max_entries: usize) -> (ResultCache<u32>, Arc<ManualClock>) {
		let clock = Arc::new(ManualClock::default());
		let config = CacheConfig::default().with_max_entries(max_entries);

		(ResultCache::with_clock(config, clock.clone()), clock)
	}

	#[test]
	fn expired_reads_evict_and_count_as_misses() {
		let (cache, clock) = cache(8);

		cache.set("calendars:list", 1, Duration::seconds(30));
		clock.advance(Duration::seconds(30));

		assert_eq!(cache.get("calendars:list"), None);
		assert!(cache.is_empty());

		let stats = cache.stats();

		assert_eq!((stats.hits, stats.misses, stats.expired_evictions), (0, 1, 1));
	}

	#[test]
	fn overwrite_at_capacity_does_not_evict() {
		let (cache, _clock) = cache(2);

		cache.set("a", 1, Duration::seconds(10));
		cache.set("b", 2, Duration::seconds(20));
		cache.set("a", 3, Duration::seconds(30));

		assert_eq!(cache.len(), 2);
		assert_eq!(cache.get("a"), Some(3));
		assert_eq!(cache.stats().evictions, 0);
	}

	#[test]
	fn zero_capacity_cache_stores_nothing() {
		let (cache, _clock) = cache(0);

		cache.set("k", 1, Duration::minutes(1));
		cache.set_default("k2", 2);

		assert!(cache.is_empty());
		assert_eq!(cache.get("k"), None);
		assert_eq!(cache.stats().sets, 0);
		assert_eq!(cache.health_check().size, 0);
	}

	#[test]
	fn eviction_removes_a_rounded_up_tenth() {
		let (cache, _clock) = cache(15);

		for i in 0..15 {
			cache.set(format!("k{i:02}"), i, Duration::seconds(100 + i64::from(i)));
		}

		cache.set("fresh", 99, Duration::seconds(1_000));

		// 15 entries → ceil(1.5) = 2 evicted before the insert.
		assert_eq!(cache.len(), 14);
		assert!(!cache.contains("k00"));
		assert!(!cache.contains("k01"));
		assert!(cache.contains("k02"));
		assert_eq!(cache.stats().evictions, 2);
	}

	#[test]
	fn health_check_counts_stale_entries_without_removing_them() {
		let (cache, clock) = cache(8);

		cache.set("short", 1, Duration::seconds(1));
		cache.set("long", 2, Duration::minutes(5));
		clock.advance(Duration::seconds(2));

		let health = cache.health_check();

		assert_eq!((health.size, health.expired_entries, health.max_entries), (2, 1, 8));
		assert_eq!(cache.len(), 2);
	}

	#[test]
	fn hit_rate_is_a_percentage() {
		let (cache, _clock) = cache(8);

		assert_eq!(cache.stats().hit_rate, 0.0);

		cache.set_default("k", 1);
		cache.get("k");
		cache.get("k");
		cache.get("k");
		cache.get("missing");

		assert_eq!(cache.stats().hit_rate, 75.0);

		cache.clear();

		assert_eq!(cache.stats(), CacheStats::default());
	}

	#[test]
	fn cache_key_joins_parts() {
		let key = CacheKey::new("events").part("cal-B1").part_opt(None::<&str>).part(2025).build();

		assert_eq!(key, "events:cal-B1:2025");
	}

	#[tokio::test]
	async fn read_through_fetches_once() {
		let (cache, _clock) = cache(8);
		let mut fetches = 0;

		for _ in 0..3 {
			let value = cache
				.get_or_insert_with("k", Duration::minutes(1), || {
					fetches += 1;

					async { Ok::<_, ()>(5) }
				})
				.await
				.expect("Fetch should succeed.");

			assert_eq!(value, 5);
		}

		assert_eq!(fetches, 1);
	}
}
