//! Validated client settings: service audiences, client credentials, and the provider domain.
//!
//! Settings are immutable once built. Every required key is checked at construction so a
//! misconfigured host fails before the first token request instead of on it.

// self
use crate::{
	_prelude::*,
	auth::{ServiceName, TokenSecret},
	error::ConfigError,
	store::StorageKey,
};

/// Path appended to the provider domain to reach its token endpoint.
pub const TOKEN_ENDPOINT_PATH: &str = "/oauth/token";

/// Immutable client configuration shared by every service token.
#[derive(Clone)]
pub struct Settings {
	api_ids: BTreeMap<ServiceName, String>,
	client_id: String,
	client_secret: TokenSecret,
	domain: String,
	token_endpoint: Url,
}
impl Settings {
	/// Creates a new builder.
	pub fn builder() -> SettingsBuilder {
		SettingsBuilder::default()
	}

	/// Parses settings from a JSON document with the `api_ids`, `client_id`, `client_secret`,
	/// and `domain` keys.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);
		let raw: RawSettings = serde_path_to_error::deserialize(de)
			.map_err(|source| ConfigError::InvalidSettings { source })?;

		raw.into_builder().build()
	}

	/// Builds settings from an already parsed JSON value.
	pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
		let raw: RawSettings = serde_path_to_error::deserialize(value)
			.map_err(|source| ConfigError::InvalidSettings { source })?;

		raw.into_builder().build()
	}

	/// Provider audience configured for `service`.
	pub fn audience(&self, service: &ServiceName) -> Result<&str, ConfigError> {
		self.api_ids
			.get(service)
			.map(String::as_str)
			.ok_or_else(|| ConfigError::UnknownService { service: service.to_string() })
	}

	/// Iterates over every configured service name.
	pub fn services(&self) -> impl Iterator<Item = &ServiceName> {
		self.api_ids.keys()
	}

	/// OAuth client identifier.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// OAuth client secret.
	pub fn client_secret(&self) -> &TokenSecret {
		&self.client_secret
	}

	/// Provider domain as configured.
	pub fn domain(&self) -> &str {
		&self.domain
	}

	/// Token endpoint derived from the domain.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	/// Storage key namespacing `service` under this provider and client identity.
	pub fn storage_key(&self, service: &ServiceName) -> StorageKey {
		StorageKey::new(&self.domain, &self.client_id, service.clone())
	}
}
impl Debug for Settings {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Settings")
			.field("api_ids", &self.api_ids)
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("domain", &self.domain)
			.field("token_endpoint", &self.token_endpoint.as_str())
			.finish()
	}
}

/// Builder for [`Settings`] values.
#[derive(Clone, Debug, Default)]
pub struct SettingsBuilder {
	api_ids: Vec<(String, String)>,
	client_id: Option<String>,
	client_secret: Option<TokenSecret>,
	domain: Option<String>,
}
impl SettingsBuilder {
	/// Maps a service name to its provider audience.
	pub fn api_id(mut self, service: impl Into<String>, audience: impl Into<String>) -> Self {
		self.api_ids.push((service.into(), audience.into()));

		self
	}

	/// Adds several service → audience mappings.
	pub fn api_ids<I, S, A>(mut self, entries: I) -> Self
	where
		I: IntoIterator<Item = (S, A)>,
		S: Into<String>,
		A: Into<String>,
	{
		self.api_ids.extend(entries.into_iter().map(|(s, a)| (s.into(), a.into())));

		self
	}

	/// Sets the OAuth client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the OAuth client secret.
	pub fn client_secret(mut self, client_secret: impl Into<TokenSecret>) -> Self {
		self.client_secret = Some(client_secret.into());

		self
	}

	/// Sets the provider domain (`tenant.auth.example.com`, or a full `http(s)://` base URL).
	pub fn domain(mut self, domain: impl Into<String>) -> Self {
		self.domain = Some(domain.into());

		self
	}

	/// Validates the collected values.
	pub fn build(self) -> Result<Settings, ConfigError> {
		let client_id = required("client_id", self.client_id)?;
		let client_secret = self
			.client_secret
			.filter(|secret| !secret.is_blank())
			.ok_or(ConfigError::MissingSetting { key: "client_secret" })?;
		let domain = required("domain", self.domain)?;
		let token_endpoint = token_endpoint(&domain)?;

		if self.api_ids.is_empty() {
			return Err(ConfigError::MissingSetting { key: "api_ids" });
		}

		let mut api_ids = BTreeMap::new();

		for (service, audience) in self.api_ids {
			let service = ServiceName::new(service)?;
			let audience = required("api_ids", Some(audience))?;

			api_ids.insert(service, audience);
		}

		Ok(Settings { api_ids, client_id, client_secret, domain, token_endpoint })
	}
}

#[derive(Debug, Deserialize)]
struct RawSettings {
	#[serde(default)]
	api_ids: Option<BTreeMap<String, String>>,
	#[serde(default)]
	client_id: Option<String>,
	#[serde(default)]
	client_secret: Option<String>,
	#[serde(default)]
	domain: Option<String>,
}
impl RawSettings {
	fn into_builder(self) -> SettingsBuilder {
		let mut builder = Settings::builder().api_ids(self.api_ids.unwrap_or_default());

		builder.client_id = self.client_id;
		builder.client_secret = self.client_secret.map(TokenSecret::new);
		builder.domain = self.domain;

		builder
	}
}

fn required(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
	value
		.map(|v| v.trim().to_owned())
		.filter(|v| !v.is_empty())
		.ok_or(ConfigError::MissingSetting { key })
}

fn token_endpoint(domain: &str) -> Result<Url, ConfigError> {
	let base = if domain.contains("://") {
		Url::parse(domain)
	} else {
		Url::parse(&format!("https://{domain}"))
	}
	.map_err(|source| ConfigError::InvalidDomain { domain: domain.to_owned(), source })?;

	if !matches!(base.scheme(), "http" | "https") {
		return Err(ConfigError::UnsupportedScheme { url: domain.to_owned() });
	}

	let path = format!("{}{TOKEN_ENDPOINT_PATH}", base.path().trim_end_matches('/'));
	let mut endpoint = base;

	endpoint.set_path(&path);

	Ok(endpoint)
}
