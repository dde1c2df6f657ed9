//! Provider strategy hooks that customize client-credentials token requests.
//!
//! Identity providers disagree on how a token is scoped to a downstream API: Auth0-style
//! providers take an `audience` parameter, others expect a `resource` or a derived `scope`.
//! [`ProviderStrategy`] lets callers express that difference without touching the token flow.

// self
use crate::{_prelude::*, auth::ServiceName};

/// Strategy hook that decorates token requests with provider-specific parameters.
///
/// The hook works on a plain `BTreeMap` of form parameters so implementations stay HTTP-client
/// agnostic. `grant_type`, `client_id`, and `client_secret` are always sent by the token flow and
/// must not be inserted here.
pub trait ProviderStrategy: Send + Sync {
	/// Adds the parameters that scope the token to `audience` (the `api_ids` entry for
	/// `service`).
	fn augment_token_request(
		&self,
		service: &ServiceName,
		audience: &str,
		params: &mut BTreeMap<String, String>,
	);
}

/// Default strategy: sends the configured audience as the `audience` form parameter.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn augment_token_request(
		&self,
		_service: &ServiceName,
		audience: &str,
		params: &mut BTreeMap<String, String>,
	) {
		params.insert("audience".into(), audience.into());
	}
}
