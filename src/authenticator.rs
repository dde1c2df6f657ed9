//! Bearer header injection for outgoing requests.

// crates.io
use oauth2::http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError, token::AccessToken};

/// Attaches `Authorization: Bearer <token>` using an owned [`AccessToken`].
///
/// Holds no state besides the token handle; cloning is cheap and clones share the same storage.
#[derive(Clone, Debug)]
pub struct Authenticator {
	token: AccessToken,
}
impl Authenticator {
	/// Wraps a token handle.
	pub fn new(token: AccessToken) -> Self {
		Self { token }
	}

	/// Underlying token handle.
	pub fn access_token(&self) -> &AccessToken {
		&self.token
	}

	/// Headers to merge into an outgoing request.
	pub fn headers(&self) -> Result<HeaderMap> {
		let mut headers = HeaderMap::new();

		self.authorize(&mut headers)?;

		Ok(headers)
	}

	/// Inserts the bearer header into `headers`, replacing any existing `Authorization` value.
	pub fn authorize(&self, headers: &mut HeaderMap) -> Result<()> {
		let token = self.token.get_token()?;

		Ok(Self::authorize_with(headers, &token)?)
	}

	/// Inserts the bearer header for an already obtained `token`, without touching storage.
	pub fn authorize_with(
		headers: &mut HeaderMap,
		token: &TokenSecret,
	) -> Result<(), ConfigError> {
		headers.insert(AUTHORIZATION, bearer_value(token)?);

		Ok(())
	}

	/// Discards the cached token by fetching a new one from the identity provider, returning it.
	pub fn force_refresh(&self) -> Result<TokenSecret> {
		self.token.refresh()
	}
}

fn bearer_value(token: &TokenSecret) -> Result<HeaderValue, ConfigError> {
	let mut value = HeaderValue::from_str(&token.bearer())
		.map_err(|_| ConfigError::InvalidHeader { name: AUTHORIZATION.to_string() })?;

	value.set_sensitive(true);

	Ok(value)
}
