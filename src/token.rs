//! Token lifecycle for downstream services: cached lookup, expiry check, and refresh.
//!
//! An [`AccessToken`] is the current credential for one named service. [`AccessToken::get_token`]
//! serves the stored credential while it is valid and refreshes it otherwise;
//! [`AccessToken::refresh`] always asks the identity provider. [`TokenManager`] builds one
//! `AccessToken` per configured service, all sharing a single storage backend and transport.
//!
//! Concurrent callers are not coordinated. Two threads that observe an expired credential at the
//! same time both refresh it, and the later write wins in storage.

// self
use crate::{
	_prelude::*,
	auth::{Credential, ServiceName, TokenSecret},
	authenticator::Authenticator,
	client::ServiceClient,
	config::Settings,
	error::ConfigError,
	http::HttpTransport,
	oauth::TokenEndpointClient,
	obs::{self, OpKind},
	provider::{DefaultProviderStrategy, ProviderStrategy},
	store::{StorageKey, TokenStorage},
};

/// Per-service view of the settings: the service name, its audience, and the shared settings.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
	service: ServiceName,
	audience: String,
	settings: Arc<Settings>,
}
impl ServiceConfig {
	/// Resolves `service` against `settings`, failing when it is not listed in `api_ids`.
	pub fn new(settings: Arc<Settings>, service: ServiceName) -> Result<Self, ConfigError> {
		let audience = settings.audience(&service)?.to_owned();

		Ok(Self { service, audience, settings })
	}

	/// Downstream service name.
	pub fn service(&self) -> &ServiceName {
		&self.service
	}

	/// Provider audience for the service.
	pub fn audience(&self) -> &str {
		&self.audience
	}

	/// Shared client settings.
	pub fn settings(&self) -> &Settings {
		&self.settings
	}

	/// Key under which the service credential is stored.
	pub fn storage_key(&self) -> StorageKey {
		self.settings.storage_key(&self.service)
	}
}

/// Current bearer token for one downstream service.
#[derive(Clone)]
pub struct AccessToken {
	config: ServiceConfig,
	key: StorageKey,
	storage: Arc<dyn TokenStorage>,
	endpoint: TokenEndpointClient,
	strategy: Arc<dyn ProviderStrategy>,
	expiry_skew: Duration,
}
impl AccessToken {
	/// Creates a token handle that refreshes through `transport` and caches in `storage`.
	pub fn new(
		config: ServiceConfig,
		storage: Arc<dyn TokenStorage>,
		transport: Arc<dyn HttpTransport>,
	) -> Self {
		let key = config.storage_key();
		let endpoint = TokenEndpointClient::from_settings(config.settings(), transport);

		Self {
			config,
			key,
			storage,
			endpoint,
			strategy: Arc::new(DefaultProviderStrategy),
			expiry_skew: Duration::ZERO,
		}
	}

	/// Replaces the provider strategy used to decorate token requests.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Treats the last `skew` of every credential's lifetime as expired. Defaults to zero.
	pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
		self.expiry_skew = skew;

		self
	}

	/// Downstream service this token belongs to.
	pub fn service(&self) -> &ServiceName {
		self.config.service()
	}

	/// Per-service configuration.
	pub fn config(&self) -> &ServiceConfig {
		&self.config
	}

	/// Storage key of the cached credential.
	pub fn storage_key(&self) -> &StorageKey {
		&self.key
	}

	/// Reads the stored credential without refreshing it.
	pub fn credential(&self) -> Result<Option<Credential>> {
		Ok(self.storage.get(&self.key)?)
	}

	/// Returns the cached token while it is valid, refreshing it otherwise.
	pub fn get_token(&self) -> Result<TokenSecret> {
		let now = OffsetDateTime::now_utc();

		if let Some(current) =
			self.storage.get(&self.key)?.filter(|c| !c.needs_refresh_at(now, self.expiry_skew))
		{
			return Ok(current.access_token);
		}

		#[cfg(feature = "tracing")]
		tracing::debug!(service = %self.config.service, "Cached credential missing or expired.");

		self.refresh()
	}

	/// Requests a new token from the identity provider and stores it, whatever the cache holds.
	pub fn refresh(&self) -> Result<TokenSecret> {
		obs::observe(OpKind::TokenRefresh, "refresh", || -> Result<TokenSecret> {
			let credential = self
				.endpoint
				.exchange(self.strategy.as_ref(), &self.config.service, &self.config.audience)
				.inspect_err(|_e| {
					#[cfg(feature = "tracing")]
					tracing::warn!(
						service = %self.config.service,
						error = %_e,
						"Token refresh failed."
					);
				})?;
			let ttl = credential.expires_at - credential.issued_at;
			let token = credential.access_token.clone();

			self.storage.set(&self.key, credential, ttl)?;

			#[cfg(feature = "tracing")]
			tracing::debug!(service = %self.config.service, ttl = %ttl, "Stored refreshed credential.");

			Ok(token)
		})
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("service", &self.config.service)
			.field("key", &self.key.to_string())
			.field("expiry_skew", &self.expiry_skew)
			.finish()
	}
}

/// Registry of [`AccessToken`] handles sharing settings, storage, transport, and strategy.
#[derive(Clone)]
pub struct TokenManager {
	settings: Arc<Settings>,
	storage: Arc<dyn TokenStorage>,
	transport: Arc<dyn HttpTransport>,
	strategy: Arc<dyn ProviderStrategy>,
	expiry_skew: Duration,
}
impl TokenManager {
	/// Creates a manager that talks to the provider through the default reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn new(settings: Settings, storage: Arc<dyn TokenStorage>) -> Result<Self, ConfigError> {
		let transport = crate::http::ReqwestTransport::new()?;

		Ok(Self::with_transport(settings, storage, Arc::new(transport)))
	}

	/// Creates a manager that sends every request through `transport`.
	pub fn with_transport(
		settings: Settings,
		storage: Arc<dyn TokenStorage>,
		transport: Arc<dyn HttpTransport>,
	) -> Self {
		Self {
			settings: Arc::new(settings),
			storage,
			transport,
			strategy: Arc::new(DefaultProviderStrategy),
			expiry_skew: Duration::ZERO,
		}
	}

	/// Replaces the provider strategy for every token handed out afterwards.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Sets the expiry skew for every token handed out afterwards.
	pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
		self.expiry_skew = skew;

		self
	}

	/// Shared settings.
	pub fn settings(&self) -> &Settings {
		&self.settings
	}

	/// Shared storage backend.
	pub fn storage(&self) -> &Arc<dyn TokenStorage> {
		&self.storage
	}

	/// Shared HTTP transport.
	pub fn transport(&self) -> &Arc<dyn HttpTransport> {
		&self.transport
	}

	/// Returns the token handle for `service`.
	pub fn access_token(&self, service: &str) -> Result<AccessToken> {
		let service = ServiceName::new(service).map_err(ConfigError::from)?;

		Ok(self.access_token_for(service)?)
	}

	/// Returns a valid token for `service`, refreshing it when needed.
	pub fn get_token(&self, service: &str) -> Result<TokenSecret> {
		self.access_token(service)?.get_token()
	}

	/// Forces a refresh of the token for `service`.
	pub fn refresh_token(&self, service: &str) -> Result<TokenSecret> {
		self.access_token(service)?.refresh()
	}

	/// Refreshes every configured service in name order, stopping at the first failure.
	pub fn refresh_all(&self) -> Result<()> {
		for service in self.settings.services() {
			self.access_token_for(service.clone())?.refresh()?;
		}

		Ok(())
	}

	/// Builds an [`Authenticator`] for `service`.
	pub fn authenticator(&self, service: &str) -> Result<Authenticator> {
		Ok(Authenticator::new(self.access_token(service)?))
	}

	/// Builds an authenticated [`ServiceClient`] for `service` rooted at `base_url`.
	pub fn service_client(&self, service: &str, base_url: &str) -> Result<ServiceClient> {
		let authenticator = self.authenticator(service)?;

		Ok(ServiceClient::new(base_url, Some(authenticator), self.transport.clone())?)
	}

	fn access_token_for(&self, service: ServiceName) -> Result<AccessToken, ConfigError> {
		let config = ServiceConfig::new(self.settings.clone(), service)?;

		Ok(AccessToken::new(config, self.storage.clone(), self.transport.clone())
			.with_strategy(self.strategy.clone())
			.with_expiry_skew(self.expiry_skew))
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("settings", &self.settings)
			.field("expiry_skew", &self.expiry_skew)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::Response;
	// self
	use super::*;
	use crate::{
		error::{AuthenticationError, TransportError},
		http::{HttpRequest, HttpResponse},
		store::{MemoryStore, StoreError},
	};

	struct ProviderStub {
		expires_in: u64,
		forms: Mutex<Vec<String>>,
	}
	impl ProviderStub {
		fn new(expires_in: u64) -> Arc<Self> {
			Arc::new(Self { expires_in, forms: Mutex::new(Vec::new()) })
		}

		fn calls(&self) -> usize {
			self.forms.lock().len()
		}
	}
	impl HttpTransport for ProviderStub {
		fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
			let mut forms = self.forms.lock();

			forms.push(String::from_utf8_lossy(request.body()).into_owned());

			let body = format!(
				r#"{{"access_token":"token-{}","token_type":"Bearer","expires_in":{}}}"#,
				forms.len(),
				self.expires_in
			);

			Ok(Response::builder()
				.status(200)
				.header("content-type", "application/json")
				.body(body.into_bytes())
				.expect("Stub response should build."))
		}
	}

	struct BrokenStorage;
	impl TokenStorage for BrokenStorage {
		fn get(&self, _key: &StorageKey) -> Result<Option<Credential>, StoreError> {
			Ok(None)
		}

		fn set(
			&self,
			_key: &StorageKey,
			_credential: Credential,
			_ttl: Duration,
		) -> Result<(), StoreError> {
			Err(StoreError::Backend { message: "read-only replica".into() })
		}
	}

	fn settings() -> Settings {
		Settings::builder()
			.api_id("os-core", "core-api")
			.api_id("billing", "billing-api")
			.client_id("client")
			.client_secret("secret")
			.domain("auth.example.com")
			.build()
			.expect("Settings fixture should build.")
	}

	fn manager(provider: Arc<ProviderStub>) -> (TokenManager, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::default());

		(TokenManager::with_transport(settings(), store.clone(), provider), store)
	}

	#[test]
	fn cached_token_is_reused_until_expiry() {
		let provider = ProviderStub::new(3600);
		let (manager, _) = manager(provider.clone());
		let token = manager.access_token("billing").expect("Billing should be configured.");
		let first = token.get_token().expect("First fetch should succeed.");
		let second = token.get_token().expect("Second fetch should succeed.");

		assert_eq!(first.expose(), "token-1");
		assert_eq!(second.expose(), "token-1");
		assert_eq!(provider.calls(), 1);
		assert!(provider.forms.lock()[0].contains("audience=billing-api"));
	}

	#[test]
	fn zero_lifetime_tokens_refresh_every_time() {
		let provider = ProviderStub::new(0);
		let (manager, _) = manager(provider.clone());

		manager.get_token("billing").expect("First fetch should succeed.");
		manager.get_token("billing").expect("Second fetch should succeed.");

		assert_eq!(provider.calls(), 2);
	}

	#[test]
	fn expiry_skew_refreshes_early() {
		let provider = ProviderStub::new(60);
		let (manager, _) = manager(provider.clone());
		let manager = manager.with_expiry_skew(Duration::minutes(2));

		manager.get_token("billing").expect("First fetch should succeed.");
		manager.get_token("billing").expect("Second fetch should succeed.");

		assert_eq!(provider.calls(), 2);
	}

	#[test]
	fn refresh_always_calls_provider_and_overwrites_storage() {
		let provider = ProviderStub::new(3600);
		let (manager, store) = manager(provider.clone());
		let token = manager.access_token("billing").expect("Billing should be configured.");

		token.get_token().expect("Initial fetch should succeed.");

		let refreshed = token.refresh().expect("Refresh should succeed.");
		let stored = store
			.get(token.storage_key())
			.expect("Store read should succeed.")
			.expect("Credential should be stored.");

		assert_eq!(refreshed.expose(), "token-2");
		assert_eq!(stored.access_token.expose(), "token-2");
		assert_eq!(stored.service.as_ref(), "billing");
		assert_eq!(provider.calls(), 2);
		assert_eq!(token.credential().expect("Credential read should succeed."), Some(stored));
	}

	#[test]
	fn unknown_services_are_rejected() {
		let (manager, _) = manager(ProviderStub::new(3600));
		let err = manager.access_token("search").expect_err("Unlisted service must fail.");

		assert!(matches!(err, Error::Config(ConfigError::UnknownService { .. })));

		let err = manager.access_token("has space").expect_err("Invalid name must fail.");

		assert!(matches!(err, Error::Config(ConfigError::InvalidServiceName(_))));
	}

	#[test]
	fn refresh_all_covers_every_service_in_order() {
		let provider = ProviderStub::new(3600);
		let (manager, store) = manager(provider.clone());

		manager.refresh_all().expect("Refreshing all services should succeed.");

		let forms = provider.forms.lock();

		assert_eq!(forms.len(), 2);
		assert!(forms[0].contains("audience=billing-api"));
		assert!(forms[1].contains("audience=core-api"));
		assert_eq!(store.len(), 2);
	}

	#[test]
	fn storage_failures_surface_after_exchange() {
		let provider = ProviderStub::new(3600);
		let manager = TokenManager::with_transport(settings(), Arc::new(BrokenStorage), provider);
		let err = manager.get_token("billing").expect_err("Write failure must surface.");

		assert!(matches!(err, Error::Storage(StoreError::Backend { .. })));
	}

	#[test]
	fn custom_strategy_reaches_the_provider() {
		struct ResourceStrategy;
		impl ProviderStrategy for ResourceStrategy {
			fn augment_token_request(
				&self,
				_service: &ServiceName,
				audience: &str,
				params: &mut BTreeMap<String, String>,
			) {
				params.insert("resource".into(), audience.into());
				params.insert("grant_type".into(), "password".into());
			}
		}

		let provider = ProviderStub::new(3600);
		let (manager, _) = manager(provider.clone());
		let manager = manager.with_strategy(Arc::new(ResourceStrategy));

		manager.refresh_token("os-core").expect("Refresh should succeed.");

		let form = provider.forms.lock()[0].clone();

		assert!(form.contains("resource=core-api"));
		assert!(form.contains("grant_type=client_credentials"));
		assert!(!form.contains("grant_type=password"));
		assert!(!form.contains("audience="));
	}

	#[test]
	fn provider_rejection_is_an_authentication_error() {
		struct Rejecting;
		impl HttpTransport for Rejecting {
			fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
				Ok(Response::builder()
					.status(403)
					.body(b"forbidden".to_vec())
					.expect("Stub response should build."))
			}
		}

		let storage = Arc::new(MemoryStore::default());
		let manager = TokenManager::with_transport(settings(), storage, Arc::new(Rejecting));
		let err = manager.get_token("billing").expect_err("Rejected exchange must fail.");

		assert_eq!(err.status(), Some(403));
		assert!(matches!(
			err,
			Error::Authentication(AuthenticationError::Rejected { ref body, .. }) if body == "forbidden"
		));
	}
}
