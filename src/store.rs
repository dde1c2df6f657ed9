//! Storage contracts and built-in token storage backends.
//!
//! [`TokenStorage`] is the only contract the token lifecycle depends on: a typed get/set pair
//! keyed by [`StorageKey`]. [`MemoryStore`] keeps credentials in-process, while [`CacheStore`]
//! adapts any string key-value [`CacheBackend`] (an external cache service, a web framework's
//! cache, or the bundled [`MemoryCache`]).

pub mod cache;
pub mod memory;

pub use cache::{CacheBackend, CacheStore, MemoryCache};
pub use memory::MemoryStore;

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{Credential, ServiceName},
};

/// Storage backend contract implemented by token stores.
///
/// Implementations must be internally thread-safe. Concurrent writers are not coordinated; the
/// last `set` for a key wins.
pub trait TokenStorage
where
	Self: Send + Sync,
{
	/// Fetches the credential stored under `key`, if present and not evicted.
	fn get(&self, key: &StorageKey) -> Result<Option<Credential>, StoreError>;

	/// Stores or replaces the credential under `key`; backends may evict it after `ttl`.
	fn set(
		&self,
		key: &StorageKey,
		credential: Credential,
		ttl: Duration,
	) -> Result<(), StoreError>;
}

/// Error type produced by storage and cache backends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Key identifying a stored credential.
///
/// Derived from the provider domain, a fingerprint of the client identifier, and the service
/// name so several clients and services can share one backend without collisions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageKey {
	/// Provider domain as configured.
	pub provider: String,
	/// URL-safe base64 SHA-256 digest of the client identifier.
	pub client_fingerprint: String,
	/// Downstream service the credential is scoped to.
	pub service: ServiceName,
}
impl StorageKey {
	/// Prefix shared by every rendered key.
	pub const PREFIX: &'static str = "token";

	/// Builds a key for the provided provider, client, and service.
	pub fn new(provider: &str, client_id: &str, service: ServiceName) -> Self {
		Self {
			provider: provider.to_owned(),
			client_fingerprint: fingerprint(client_id),
			service,
		}
	}
}
impl Display for StorageKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}:{}:{}:{}", Self::PREFIX, self.provider, self.client_fingerprint, self.service)
	}
}

fn fingerprint(client_id: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(client_id.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn service(name: &str) -> ServiceName {
		ServiceName::new(name).expect("Service fixture should be valid.")
	}

	#[test]
	fn keys_are_deterministic() {
		let a = StorageKey::new("auth.example.com", "client", service("billing"));
		let b = StorageKey::new("auth.example.com", "client", service("billing"));

		assert_eq!(a, b);
		assert_eq!(a.to_string(), b.to_string());
		assert!(a.to_string().starts_with("token:auth.example.com:"));
		assert!(a.to_string().ends_with(":billing"));
	}

	#[test]
	fn keys_namespace_service_provider_and_client() {
		let base = StorageKey::new("auth.example.com", "client", service("billing"));

		assert_ne!(base, StorageKey::new("auth.example.com", "client", service("os-core")));
		assert_ne!(base, StorageKey::new("other.example.com", "client", service("billing")));
		assert_ne!(base, StorageKey::new("auth.example.com", "client-2", service("billing")));
		assert!(!base.to_string().contains("client:"), "Raw client ids must not leak into keys.");
	}
}
