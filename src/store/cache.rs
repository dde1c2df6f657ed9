//! String key-value cache contract plus the [`TokenStorage`] adapter built on it.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{StorageKey, StoreError, TokenStorage},
};

/// Minimal contract for an external cache service (Redis, memcached, a framework cache, ...).
///
/// Values are opaque strings. `ttl` is a hint the backend uses for its own eviction; the batch
/// helpers default to looping over the single-key calls.
pub trait CacheBackend
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`.
	fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Writes `value` under `key` for at most `ttl`.
	fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

	/// Reads several keys at once, omitting the ones that are absent.
	fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>, StoreError> {
		let mut found = HashMap::with_capacity(keys.len());

		for key in keys {
			if let Some(value) = self.get(key)? {
				found.insert(key.clone(), value);
			}
		}

		Ok(found)
	}

	/// Writes several entries with the same TTL.
	fn set_many(&self, entries: &BTreeMap<String, String>, ttl: Duration) -> Result<(), StoreError> {
		for (key, value) in entries {
			self.set(key, value.clone(), ttl)?;
		}

		Ok(())
	}
}

type CacheEntry = (String, Option<OffsetDateTime>);

/// In-process [`CacheBackend`] with per-entry expiry; clones share the same map.
///
/// Every write drops the entries that have already expired.
#[derive(Clone, Debug, Default)]
pub struct MemoryCache(Arc<RwLock<HashMap<String, CacheEntry>>>);
impl MemoryCache {
	/// Number of entries currently held, including expired ones not yet purged.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is held.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Drops every entry whose TTL has elapsed.
	pub fn purge_evicted(&self) {
		let now = OffsetDateTime::now_utc();

		self.0.write().retain(|_, entry| is_live(entry, now));
	}
}
impl CacheBackend for MemoryCache {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		let now = OffsetDateTime::now_utc();

		Ok(self.0.read().get(key).filter(|entry| is_live(entry, now)).map(|(value, _)| value.clone()))
	}

	fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
		let now = OffsetDateTime::now_utc();
		let mut map = self.0.write();

		map.retain(|_, entry| is_live(entry, now));
		map.insert(key.to_owned(), (value, now.checked_add(ttl)));

		Ok(())
	}
}

fn is_live((_, expires_at): &CacheEntry, now: OffsetDateTime) -> bool {
	expires_at.is_none_or(|at| now < at)
}

/// [`TokenStorage`] adapter that serializes credentials as JSON into a [`CacheBackend`].
///
/// The rendered [`StorageKey`] is used as the cache key. A fixed `timeout` can be configured to
/// override the per-credential TTL, matching caches that are set up with a single expiry policy.
pub struct CacheStore<B>
where
	B: ?Sized + CacheBackend,
{
	backend: Arc<B>,
	timeout: Option<Duration>,
}
impl<B> CacheStore<B>
where
	B: ?Sized + CacheBackend,
{
	/// Wraps a cache backend.
	pub fn new(backend: impl Into<Arc<B>>) -> Self {
		Self { backend: backend.into(), timeout: None }
	}

	/// Uses `timeout` for every write instead of the credential's remaining lifetime.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Returns the wrapped backend.
	pub fn backend(&self) -> &Arc<B> {
		&self.backend
	}
}
impl<B> Clone for CacheStore<B>
where
	B: ?Sized + CacheBackend,
{
	fn clone(&self) -> Self {
		Self { backend: self.backend.clone(), timeout: self.timeout }
	}
}
impl<B> Debug for CacheStore<B>
where
	B: ?Sized + CacheBackend,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheStore").field("timeout", &self.timeout).finish()
	}
}
impl<B> TokenStorage for CacheStore<B>
where
	B: ?Sized + CacheBackend,
{
	fn get(&self, key: &StorageKey) -> Result<Option<Credential>, StoreError> {
		let cache_key = key.to_string();

		self.backend
			.get(&cache_key)?
			.map(|raw| {
				serde_json::from_str(&raw).map_err(|e| StoreError::Serialization {
					message: format!("Failed to parse cached credential {cache_key}: {e}"),
				})
			})
			.transpose()
	}

	fn set(
		&self,
		key: &StorageKey,
		credential: Credential,
		ttl: Duration,
	) -> Result<(), StoreError> {
		let payload = serde_json::to_string(&credential).map_err(|e| {
			StoreError::Serialization { message: format!("Failed to serialize credential: {e}") }
		})?;

		self.backend.set(&key.to_string(), payload, self.timeout.unwrap_or(ttl))
	}
}
