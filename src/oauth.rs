//! Token endpoint facade that runs the client-credentials grant through the `oauth2` crate.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RequestTokenError,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, ServiceName},
	config::Settings,
	error::{AuthenticationError, TransportError},
	http::{HttpTransport, ResponseMetadata, ResponseMetadataSlot, TokenEndpointHandle},
	provider::ProviderStrategy,
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeTokenResponse = oauth2::basic::BasicTokenResponse;

/// Parameters the grant always sends; strategies cannot override them.
const RESERVED_PARAMS: [&str; 3] = ["grant_type", "client_id", "client_secret"];

/// Client-credentials exchange against the provider's token endpoint.
///
/// Client credentials travel in the request body (`client_secret_post`), alongside
/// `grant_type=client_credentials` and whatever the [`ProviderStrategy`] adds.
#[derive(Clone)]
pub struct TokenEndpointClient {
	oauth_client: ConfiguredBasicClient,
	transport: Arc<dyn HttpTransport>,
}
impl TokenEndpointClient {
	/// Builds the facade from validated settings.
	pub fn from_settings(settings: &Settings, transport: Arc<dyn HttpTransport>) -> Self {
		let oauth_client = BasicClient::new(ClientId::new(settings.client_id().to_owned()))
			.set_client_secret(ClientSecret::new(settings.client_secret().expose().to_owned()))
			.set_token_uri(TokenUrl::from_url(settings.token_endpoint().clone()))
			.set_auth_type(AuthType::RequestBody);

		Self { oauth_client, transport }
	}

	/// Requests a new token for `service`, scoped to `audience` by `strategy`.
	///
	/// No retry is attempted; every failure is reported to the caller as-is.
	pub fn exchange(
		&self,
		strategy: &dyn ProviderStrategy,
		service: &ServiceName,
		audience: &str,
	) -> Result<Credential, AuthenticationError> {
		let meta = ResponseMetadataSlot::default();
		let handle = TokenEndpointHandle::new(self.transport.clone(), meta.clone());
		let mut params = BTreeMap::new();

		strategy.augment_token_request(service, audience, &mut params);

		let mut request = self.oauth_client.exchange_client_credentials();

		for (key, value) in params.iter().filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_str()))
		{
			request = request.add_extra_param(key, value);
		}

		let response = request.request(&handle).map_err(|e| map_request_error(meta.take(), e))?;

		map_token_response(service, response)
	}
}
impl Debug for TokenEndpointClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenEndpointClient")
			.field("token_endpoint", &self.oauth_client.token_uri().as_str())
			.finish()
	}
}

fn map_token_response(
	service: &ServiceName,
	response: FacadeTokenResponse,
) -> Result<Credential, AuthenticationError> {
	let expires_in = response.expires_in().ok_or(AuthenticationError::MissingExpiresIn)?.as_secs();
	let expires_in =
		i64::try_from(expires_in).map_err(|_| AuthenticationError::ExpiresInOutOfRange)?;
	let issued_at = OffsetDateTime::now_utc();
	let expires_at = issued_at
		.checked_add(Duration::seconds(expires_in))
		.ok_or(AuthenticationError::ExpiresInOutOfRange)?;

	Ok(Credential::new(
		service.clone(),
		response.access_token().secret().to_owned(),
		issued_at,
		expires_at,
	))
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<TransportError>,
) -> AuthenticationError {
	let status = meta.as_ref().and_then(|meta| meta.status);
	let rejected = meta.and_then(|meta| {
		meta.failure_status().map(|status| (status, meta.error_body.unwrap_or_default()))
	});

	match (err, rejected) {
		(RequestTokenError::Request(e), _) => AuthenticationError::Transport(e),
		(_, Some((status, body))) => AuthenticationError::Rejected { status, body },
		(RequestTokenError::Parse(source, _body), None) =>
			AuthenticationError::MalformedResponse { source, status },
		(RequestTokenError::ServerResponse(response), None) =>
			AuthenticationError::UnexpectedResponse {
				message: format!("OAuth error `{}` on a success status", response.error().as_ref()),
				status,
			},
		(RequestTokenError::Other(message), None) =>
			AuthenticationError::UnexpectedResponse { message, status },
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::Response;
	// self
	use super::*;
	use crate::{
		http::{HttpRequest, HttpResponse},
		provider::DefaultProviderStrategy,
	};

	#[derive(Default)]
	struct StubTransport {
		status: u16,
		body: &'static str,
		sent: Mutex<Vec<(String, String)>>,
	}
	impl StubTransport {
		fn new(status: u16, body: &'static str) -> Arc<Self> {
			Arc::new(Self { status, body, ..Default::default() })
		}
	}
	impl HttpTransport for StubTransport {
		fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
			self.sent.lock().push((
				request.uri().to_string(),
				String::from_utf8_lossy(request.body()).into_owned(),
			));

			Ok(Response::builder()
				.status(self.status)
				.header("content-type", "application/json")
				.body(self.body.as_bytes().to_vec())
				.expect("Stub response should build."))
		}
	}

	struct DownTransport;
	impl HttpTransport for DownTransport {
		fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
			Err(TransportError::Io(std::io::Error::new(
				std::io::ErrorKind::ConnectionRefused,
				"connection refused",
			)))
		}
	}

	fn settings() -> Settings {
		Settings::builder()
			.api_id("billing", "billing-api")
			.client_id("client")
			.client_secret("secret")
			.domain("auth.example.com")
			.build()
			.expect("Settings fixture should build.")
	}

	fn exchange(transport: Arc<dyn HttpTransport>) -> Result<Credential, AuthenticationError> {
		let service = ServiceName::new("billing").expect("Service fixture should be valid.");

		TokenEndpointClient::from_settings(&settings(), transport).exchange(
			&DefaultProviderStrategy,
			&service,
			"billing-api",
		)
	}

	#[test]
	fn exchange_posts_client_credentials_form() {
		let transport = StubTransport::new(
			200,
			r#"{"access_token":"fresh","token_type":"Bearer","expires_in":3600}"#,
		);
		let credential = exchange(transport.clone()).expect("Exchange should succeed.");

		assert_eq!(credential.access_token.expose(), "fresh");
		assert_eq!(credential.expires_at - credential.issued_at, Duration::hours(1));

		let sent = transport.sent.lock();
		let (uri, form) = &sent[0];

		assert_eq!(uri, "https://auth.example.com/oauth/token");
		assert!(form.contains("grant_type=client_credentials"));
		assert!(form.contains("client_id=client"));
		assert!(form.contains("client_secret=secret"));
		assert!(form.contains("audience=billing-api"));
	}

	#[test]
	fn zero_expires_in_yields_expired_credential() {
		let transport =
			StubTransport::new(200, r#"{"access_token":"t","token_type":"Bearer","expires_in":0}"#);
		let credential = exchange(transport).expect("Zero lifetime should still be accepted.");

		assert!(credential.is_expired_at(credential.issued_at));
	}

	#[test]
	fn rejections_carry_status_and_body() {
		let transport = StubTransport::new(401, r#"{"error":"access_denied"}"#);
		let err = exchange(transport).expect_err("401 must fail.");

		match err {
			AuthenticationError::Rejected { status, body } => {
				assert_eq!(status, 401);
				assert_eq!(body, r#"{"error":"access_denied"}"#);
			},
			other => panic!("Unexpected error: {other:?}."),
		}

		let transport = StubTransport::new(503, "upstream down");
		let err = exchange(transport).expect_err("503 must fail.");

		assert!(matches!(err, AuthenticationError::Rejected { status: 503, .. }));
	}

	#[test]
	fn malformed_and_incomplete_payloads_are_reported() {
		let err = exchange(StubTransport::new(200, "not json")).expect_err("Garbage must fail.");

		assert!(matches!(err, AuthenticationError::MalformedResponse { status: Some(200), .. }));

		let err = exchange(StubTransport::new(200, r#"{"access_token":"t","token_type":"Bearer"}"#))
			.expect_err("Missing expires_in must fail.");

		assert!(matches!(err, AuthenticationError::MissingExpiresIn));
	}

	#[test]
	fn transport_failures_are_not_retried() {
		let err = exchange(Arc::new(DownTransport)).expect_err("Refused connection must fail.");

		assert!(matches!(err, AuthenticationError::Transport(TransportError::Io(_))));
	}
}
