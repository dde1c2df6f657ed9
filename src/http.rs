//! Blocking HTTP transport shared by token exchanges and downstream service calls.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack. Requests and responses use
//! the `http` crate types re-exported by `oauth2`, so the same transport drives both the token
//! endpoint (through [`TokenEndpointHandle`], which adapts it to `oauth2`'s
//! [`SyncHttpClient`]) and every [`ServiceClient`](crate::client::ServiceClient) call.
//!
//! Token exchanges record the response status and error body in a [`ResponseMetadataSlot`]
//! before `oauth2` parses the payload, so provider rejections can be reported with the exact
//! status and body the provider sent.

pub use oauth2::{HttpRequest, HttpResponse, http::StatusCode};

// std
#[cfg(feature = "reqwest")] use std::time::Duration as StdDuration;
// crates.io
use oauth2::SyncHttpClient;
#[cfg(feature = "reqwest")] use reqwest::redirect::Policy;
// self
#[cfg(feature = "reqwest")] use crate::error::ConfigError;
use crate::{_prelude::*, error::TransportError};

/// Abstraction over blocking HTTP transports.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by every
/// token and client instance. Any timeout is the transport's own concern; callers never
/// reinterpret it.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and returns the response, whatever its status.
	fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Metadata captured from the most recent token endpoint response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the token endpoint, if available.
	pub status: Option<u16>,
	/// Response body (lossy UTF-8), captured for non-success statuses only.
	pub error_body: Option<String>,
}
impl ResponseMetadata {
	/// Returns the status when it is not a 2xx code.
	pub fn failure_status(&self) -> Option<u16> {
		self.status.filter(|status| !(200..300).contains(status))
	}
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between the transport handle and the error
/// mapping that runs after `oauth2` resolves.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Adapter that lets `oauth2` run token exchanges over any [`HttpTransport`].
#[derive(Clone)]
pub struct TokenEndpointHandle {
	transport: Arc<dyn HttpTransport>,
	slot: ResponseMetadataSlot,
}
impl TokenEndpointHandle {
	/// Creates a handle that records response metadata in `slot`.
	pub fn new(transport: Arc<dyn HttpTransport>, slot: ResponseMetadataSlot) -> Self {
		Self { transport, slot }
	}
}
impl SyncHttpClient for TokenEndpointHandle {
	type Error = TransportError;

	fn call(&self, request: HttpRequest) -> Result<HttpResponse, Self::Error> {
		self.slot.take();

		let response = self.transport.send(request)?;
		let status = response.status();
		let error_body = (!status.is_success())
			.then(|| String::from_utf8_lossy(response.body()).into_owned());

		self.slot.store(ResponseMetadata { status: Some(status.as_u16()), error_body });

		Ok(response)
	}
}
impl Debug for TokenEndpointHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenEndpointHandle(..)")
	}
}

/// Blocking reqwest transport.
///
/// The default client applies [`ReqwestTransport::DEFAULT_TIMEOUT`] to every request and never
/// follows redirects: token endpoints answer directly, so a 3xx from the provider is reported as
/// a rejection, and a 3xx from a downstream service surfaces as an HTTP error. A custom
/// [`ReqwestClient`] passed through [`ReqwestTransport::with_client`] should disable redirect
/// following too, since the same transport drives the token exchange.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Timeout applied by [`ReqwestTransport::new`].
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);

	/// Builds a transport with the default timeout.
	pub fn new() -> Result<Self, ConfigError> {
		Self::with_timeout(Self::DEFAULT_TIMEOUT)
	}

	/// Builds a transport whose requests time out after `timeout`.
	pub fn with_timeout(timeout: StdDuration) -> Result<Self, ConfigError> {
		Ok(Self(ReqwestClient::builder().timeout(timeout).redirect(Policy::none()).build()?))
	}

	/// Wraps an existing blocking reqwest client.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
		let (parts, body) = request.into_parts();
		let uri = parts.uri.to_string();
		let url = Url::parse(&uri)
			.map_err(|source| TransportError::InvalidUri { uri: uri.clone(), source })?;
		let mut builder = self.0.request(parts.method, url).headers(parts.headers);

		if !body.is_empty() {
			builder = builder.body(body);
		}

		let response = builder.send()?;
		let status = response.status();
		let headers = response.headers().to_owned();
		let mut response_new = HttpResponse::new(response.bytes()?.to_vec());

		*response_new.status_mut() = status;
		*response_new.headers_mut() = headers;

		Ok(response_new)
	}
}
