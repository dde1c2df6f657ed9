//! Crate-level error types shared by token refresh, storage, and downstream service calls.

// crates.io
use oauth2::http::Method;
// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Variants separate "could not authenticate" ([`Error::Authentication`]) from "the downstream
/// service rejected the authenticated request" ([`Error::Http`]) and from "the network could not
/// be reached" ([`Error::Transport`]).
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The identity provider did not issue a token.
	#[error(transparent)]
	Authentication(#[from] AuthenticationError),
	/// Transport failure (DNS, TCP, TLS, timeout) while calling a downstream service.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Downstream service answered with a non-success status.
	#[error(transparent)]
	Http(#[from] HttpError),
	/// Response body could not be decoded into the requested type.
	#[error("Response body with HTTP {status} could not be decoded.")]
	Decode {
		/// Structured decoding failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the decoded response.
		status: u16,
	},
}
impl Error {
	/// Returns the HTTP status attached to the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Authentication(e) => e.status(),
			Self::Http(e) => Some(e.status),
			Self::Decode { status, .. } => Some(*status),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised at construction time.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required setting is missing or empty.
	#[error("Required setting `{key}` is missing.")]
	MissingSetting {
		/// Settings key that was not supplied.
		key: &'static str,
	},
	/// Settings document could not be deserialized.
	#[error("Settings document is invalid.")]
	InvalidSettings {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Provider domain cannot be turned into a token endpoint URL.
	#[error("Provider domain `{domain}` is invalid.")]
	InvalidDomain {
		/// Domain value as configured.
		domain: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// URL uses a scheme other than `http` or `https`.
	#[error("URL `{url}` must use http or https.")]
	UnsupportedScheme {
		/// Offending URL.
		url: String,
	},
	/// Service name failed validation.
	#[error(transparent)]
	InvalidServiceName(#[from] crate::auth::IdentifierError),
	/// Requested service has no configured audience.
	#[error("Service `{service}` is not listed in `api_ids`.")]
	UnknownService {
		/// Service name that was requested.
		service: String,
	},
	/// Service client base URL cannot be parsed.
	#[error("Base URL `{url}` is invalid.")]
	InvalidBaseUrl {
		/// Base URL as supplied.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Header name or value cannot be represented on the wire.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Header name as supplied.
		name: String,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Request body could not be encoded.
	#[error("Request body could not be encoded.")]
	BodyEncoding {
		/// Underlying encoding failure.
		#[source]
		source: serde_json::Error,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Token endpoint failures; no retry is attempted for any of them.
#[derive(Debug, ThisError)]
pub enum AuthenticationError {
	/// Provider answered with a non-success status.
	#[error("Token endpoint rejected the request with HTTP {status}: {body}.")]
	Rejected {
		/// HTTP status code returned by the provider.
		status: u16,
		/// Raw response body returned by the provider.
		body: String,
	},
	/// Provider responded with JSON that could not be parsed as a token response.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Provider responded with something other than a token response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	UnexpectedResponse {
		/// Summary of the unexpected response.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint could not be reached.
	#[error("Token endpoint could not be reached.")]
	Transport(#[source] TransportError),
}
impl AuthenticationError {
	/// Returns the provider's HTTP status, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. } => Some(*status),
			Self::MalformedResponse { status, .. } | Self::UnexpectedResponse { status, .. } =>
				*status,
			_ => None,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Request URI could not be handed to the HTTP client.
	#[error("Request URI `{uri}` is not a valid URL.")]
	InvalidUri {
		/// URI as rendered on the request.
		uri: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Non-success response from a downstream service.
#[derive(Debug, ThisError)]
#[error("{method} {url} returned HTTP {status}.")]
pub struct HttpError {
	/// Request method.
	pub method: Method,
	/// Fully resolved request URL.
	pub url: String,
	/// HTTP status code returned by the service.
	pub status: u16,
	/// Raw response body (lossy UTF-8).
	pub body: String,
}
impl HttpError {
	/// Returns `true` for 401 responses.
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}

	/// Returns `true` for any 4xx response.
	pub fn is_client_error(&self) -> bool {
		(400..500).contains(&self.status)
	}
}
