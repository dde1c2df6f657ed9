//! Service-to-service bearer tokens for backend callers: client-credentials refresh against an
//! OAuth-style identity provider, pluggable token storage, and an authenticated HTTP client that
//! retries exactly once when a downstream service answers 401.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod authenticator;
pub mod client;
pub mod config;
pub mod contrib;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod store;
pub mod token;
#[cfg(feature = "reqwest")]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests and demos.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{Credential, ServiceName},
		config::Settings,
		http::{HttpTransport, ReqwestTransport},
		store::{MemoryStore, StorageKey, TokenStorage},
		token::TokenManager,
	};

	/// Client identifier used by every test fixture.
	pub const TEST_CLIENT_ID: &str = "test-client";
	/// Client secret used by every test fixture.
	pub const TEST_CLIENT_SECRET: &str = "test-secret";

	/// Builds settings that point the token endpoint at `provider_base` (usually an `httpmock`
	/// server URL) and register `services` as `(name, audience)` pairs.
	pub fn test_settings(provider_base: &str, services: &[(&str, &str)]) -> Settings {
		services
			.iter()
			.fold(Settings::builder(), |builder, (service, audience)| {
				builder.api_id(*service, *audience)
			})
			.client_id(TEST_CLIENT_ID)
			.client_secret(TEST_CLIENT_SECRET)
			.domain(provider_base)
			.build()
			.expect("Test settings fixture should be valid.")
	}

	/// Builds a blocking reqwest transport for tests.
	pub fn test_transport() -> Arc<dyn HttpTransport> {
		Arc::new(ReqwestTransport::new().expect("Failed to build reqwest transport for tests."))
	}

	/// Constructs a [`TokenManager`] backed by an in-memory store and the reqwest transport.
	pub fn build_test_manager(settings: Settings) -> (TokenManager, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let storage: Arc<dyn TokenStorage> = store_backend.clone();
		let manager = TokenManager::with_transport(settings, storage, test_transport());

		(manager, store_backend)
	}

	/// Renders a token endpoint success body.
	pub fn token_body(access_token: &str, expires_in: u64) -> String {
		format!(
			"{{\"access_token\":\"{access_token}\",\"token_type\":\"Bearer\",\"expires_in\":{expires_in}}}"
		)
	}

	/// Seeds `storage` with a credential that stays valid for an hour.
	pub fn seed_credential(
		storage: &dyn TokenStorage,
		settings: &Settings,
		service: &str,
		access_token: &str,
	) -> StorageKey {
		let service = ServiceName::new(service).expect("Seeded service name should be valid.");
		let key = settings.storage_key(&service);
		let now = OffsetDateTime::now_utc();
		let credential = Credential::new(service, access_token, now, now + Duration::hours(1));

		storage
			.set(&key, credential, Duration::hours(1))
			.expect("Seeding the token store should succeed.");

		key
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Error as ReqwestError, blocking::Client as ReqwestClient};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
