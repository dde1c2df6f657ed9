//! Thread-safe in-memory [`TokenStorage`] implementation.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{StorageKey, StoreError, TokenStorage},
};

type StoreMap = Arc<RwLock<HashMap<StorageKey, StoredCredential>>>;

#[derive(Clone, Debug)]
struct StoredCredential {
	credential: Credential,
	evict_at: Option<OffsetDateTime>,
}
impl StoredCredential {
	fn is_evicted_at(&self, instant: OffsetDateTime) -> bool {
		self.evict_at.is_some_and(|evict_at| instant >= evict_at)
	}
}

/// Process-local credential store; clones share the same map.
///
/// Entries honor the `ttl` passed to [`TokenStorage::set`] the way an external cache would, so a
/// credential stored with a zero TTL is never returned.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of entries currently held, including ones past their TTL.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing has been stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Drops every entry whose TTL has elapsed.
	pub fn purge_evicted(&self) {
		let now = OffsetDateTime::now_utc();

		self.0.write().retain(|_, stored| !stored.is_evicted_at(now));
	}
}
impl TokenStorage for MemoryStore {
	fn get(&self, key: &StorageKey) -> Result<Option<Credential>, StoreError> {
		let now = OffsetDateTime::now_utc();
		let guard = self.0.read();

		Ok(guard
			.get(key)
			.filter(|stored| !stored.is_evicted_at(now))
			.map(|stored| stored.credential.clone()))
	}

	fn set(
		&self,
		key: &StorageKey,
		credential: Credential,
		ttl: Duration,
	) -> Result<(), StoreError> {
		let evict_at = OffsetDateTime::now_utc().checked_add(ttl);

		self.0.write().insert(key.clone(), StoredCredential { credential, evict_at });

		Ok(())
	}
}
