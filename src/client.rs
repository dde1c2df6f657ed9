//! Blocking HTTP client for downstream services with bearer auth and a single 401 retry.
//!
//! Every call runs an explicit two-attempt state machine. The first attempt uses the current
//! token; a 401 on it forces a token refresh and triggers exactly one retry with freshly built
//! headers. A 401 on the retry, and any other non-success status on either attempt, is returned as
//! [`HttpError`]. Transport failures are never retried.

// crates.io
use oauth2::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, header::CONTENT_TYPE};
use rand::{Rng, distr::Alphanumeric};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	authenticator::Authenticator,
	error::{ConfigError, HttpError},
	http::{HttpResponse, HttpTransport, StatusCode},
	obs::{self, OpKind},
};

/// Header carrying the per-call correlation identifier.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

const CORRELATION_ID_LEN: usize = 32;

/// Request body variants accepted by [`RequestOptions`].
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
	/// JSON document sent as `application/json`.
	Json(serde_json::Value),
	/// URL-encoded form sent as `application/x-www-form-urlencoded`.
	Form(Vec<(String, String)>),
	/// Raw bytes with an optional content type.
	Bytes {
		/// Value for the `Content-Type` header, if any.
		content_type: Option<String>,
		/// Payload.
		data: Vec<u8>,
	},
}
impl RequestBody {
	fn encode(&self) -> Result<(Option<HeaderValue>, Vec<u8>), ConfigError> {
		Ok(match self {
			Self::Json(value) =>
				(Some(HeaderValue::from_static("application/json")), value.to_string().into_bytes()),
			Self::Form(pairs) => {
				let encoded = url::form_urlencoded::Serializer::new(String::new())
					.extend_pairs(pairs)
					.finish();

				(
					Some(HeaderValue::from_static("application/x-www-form-urlencoded")),
					encoded.into_bytes(),
				)
			},
			Self::Bytes { content_type, data } => {
				let content_type = content_type
					.as_deref()
					.map(|value| header_value(CONTENT_TYPE.as_str(), value))
					.transpose()?;

				(content_type, data.clone())
			},
		})
	}
}

/// Per-call options: query pairs, extra headers, body, and correlation id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestOptions {
	query: Vec<(String, String)>,
	headers: Vec<(String, String)>,
	body: Option<RequestBody>,
	correlation_id: Option<String>,
}
impl RequestOptions {
	/// Creates empty options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a query pair.
	pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Adds a request header. Caller headers replace client defaults with the same name, but can
	/// never replace `Authorization` on authenticated clients.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Sends `value` as a JSON body.
	pub fn json(mut self, value: serde_json::Value) -> Self {
		self.body = Some(RequestBody::Json(value));

		self
	}

	/// Serializes `value` and sends it as a JSON body.
	pub fn json_from<T>(self, value: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let value =
			serde_json::to_value(value).map_err(|source| ConfigError::BodyEncoding { source })?;

		Ok(self.json(value))
	}

	/// Sends `pairs` as a URL-encoded form body.
	pub fn form<I, K, V>(mut self, pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.body =
			Some(RequestBody::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()));

		self
	}

	/// Sends raw bytes, optionally tagged with a content type.
	pub fn bytes(mut self, data: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
		self.body = Some(RequestBody::Bytes {
			content_type: content_type.map(str::to_owned),
			data: data.into(),
		});

		self
	}

	/// Uses `id` as the `X-Correlation-Id` instead of a generated one.
	pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
		self.correlation_id = Some(id.into());

		self
	}

	/// Request body, if any.
	pub fn body(&self) -> Option<&RequestBody> {
		self.body.as_ref()
	}
}

/// Decoded view of a response body.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseData {
	/// Body parsed as JSON.
	Json(serde_json::Value),
	/// Body was empty.
	Empty,
	/// Body was not JSON; raw bytes are kept.
	Raw(Vec<u8>),
}

/// Successful response from a downstream service.
#[derive(Clone, Debug)]
pub struct ServiceResponse {
	status: StatusCode,
	headers: HeaderMap,
	body: Vec<u8>,
}
impl ServiceResponse {
	fn new(response: HttpResponse) -> Self {
		let (parts, body) = response.into_parts();

		Self { status: parts.status, headers: parts.headers, body }
	}

	/// HTTP status.
	pub fn status(&self) -> StatusCode {
		self.status
	}

	/// Response headers.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Raw body bytes.
	pub fn body(&self) -> &[u8] {
		&self.body
	}

	/// Consumes the response, returning the raw body.
	pub fn into_body(self) -> Vec<u8> {
		self.body
	}

	/// Body as text (lossy UTF-8).
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as JSON into `T`.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let de = &mut serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(de)
			.map_err(|source| Error::Decode { source, status: self.status.as_u16() })
	}

	/// JSON when the body parses, [`ResponseData::Empty`] when it is empty, raw bytes otherwise.
	pub fn data(&self) -> ResponseData {
		if self.body.is_empty() {
			return ResponseData::Empty;
		}

		match serde_json::from_slice(&self.body) {
			Ok(value) => ResponseData::Json(value),
			Err(_) => ResponseData::Raw(self.body.clone()),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Attempt {
	First,
	/// Carries the token obtained by the forced refresh.
	Retry(TokenSecret),
}

/// Client bound to one downstream service base URL.
#[derive(Clone)]
pub struct ServiceClient {
	base_url: Url,
	authenticator: Option<Authenticator>,
	transport: Arc<dyn HttpTransport>,
	default_headers: HeaderMap,
}
impl ServiceClient {
	/// Creates a client for `base_url`; requests are authenticated when `authenticator` is set.
	pub fn new(
		base_url: &str,
		authenticator: Option<Authenticator>,
		transport: Arc<dyn HttpTransport>,
	) -> Result<Self, ConfigError> {
		Ok(Self {
			base_url: parse_base_url(base_url)?,
			authenticator,
			transport,
			default_headers: HeaderMap::new(),
		})
	}

	/// Creates a client that never attaches credentials and never retries.
	pub fn unauthenticated(
		base_url: &str,
		transport: Arc<dyn HttpTransport>,
	) -> Result<Self, ConfigError> {
		Self::new(base_url, None, transport)
	}

	/// Adds a header sent with every request.
	pub fn with_default_header(mut self, name: &str, value: &str) -> Result<Self, ConfigError> {
		let (name, value) = header_pair(name, value)?;

		self.default_headers.insert(name, value);

		Ok(self)
	}

	/// Replaces every default header.
	pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
		self.default_headers = headers;

		self
	}

	/// Copy of this client pointed at another base URL, keeping the authenticator and transport
	/// but none of the default headers.
	pub fn rebased(&self, base_url: &str) -> Result<Self, ConfigError> {
		Self::new(base_url, self.authenticator.clone(), self.transport.clone())
	}

	/// Base URL relative paths are resolved against.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Authenticator, when the client is authenticated.
	pub fn authenticator(&self) -> Option<&Authenticator> {
		self.authenticator.as_ref()
	}

	/// Issues a `GET`.
	pub fn get(&self, path: &str, options: RequestOptions) -> Result<ServiceResponse> {
		self.request(Method::GET, path, options)
	}

	/// Issues a `POST`.
	pub fn post(&self, path: &str, options: RequestOptions) -> Result<ServiceResponse> {
		self.request(Method::POST, path, options)
	}

	/// Issues a `PUT`.
	pub fn put(&self, path: &str, options: RequestOptions) -> Result<ServiceResponse> {
		self.request(Method::PUT, path, options)
	}

	/// Issues a `PATCH`.
	pub fn patch(&self, path: &str, options: RequestOptions) -> Result<ServiceResponse> {
		self.request(Method::PATCH, path, options)
	}

	/// Issues a `DELETE`.
	pub fn delete(&self, path: &str, options: RequestOptions) -> Result<ServiceResponse> {
		self.request(Method::DELETE, path, options)
	}

	/// Issues `method` against `path` (relative to the base URL, or absolute).
	pub fn request(
		&self,
		method: Method,
		path: &str,
		options: RequestOptions,
	) -> Result<ServiceResponse> {
		obs::observe(OpKind::ServiceCall, "request", || self.run(&method, path, &options))
	}

	fn run(&self, method: &Method, path: &str, options: &RequestOptions) -> Result<ServiceResponse> {
		let url = self.resolve_url(path, &options.query)?;
		let (content_type, body) = match &options.body {
			Some(body) => body.encode()?,
			None => (None, Vec::new()),
		};
		let base_headers = self.base_headers(options, content_type)?;
		let mut attempt = Attempt::First;

		loop {
			let mut headers = base_headers.clone();

			if let Some(authenticator) = &self.authenticator {
				match &attempt {
					Attempt::First => authenticator.authorize(&mut headers)?,
					Attempt::Retry(token) => Authenticator::authorize_with(&mut headers, token)?,
				}
			}

			let mut request = Request::builder()
				.method(method.clone())
				.uri(url.as_str())
				.body(body.clone())
				.map_err(ConfigError::from)?;

			*request.headers_mut() = headers;

			let response = self.transport.send(request)?;
			let status = response.status();

			if status.is_success() {
				return Ok(ServiceResponse::new(response));
			}

			let first = attempt == Attempt::First;

			match (first, status, &self.authenticator) {
				(true, StatusCode::UNAUTHORIZED, Some(authenticator)) => {
					#[cfg(feature = "tracing")]
					tracing::warn!(%method, %url, "Unauthorized; refreshing token and retrying once.");

					attempt = Attempt::Retry(authenticator.force_refresh()?);
				},
				_ => {
					let body = String::from_utf8_lossy(response.body()).into_owned();

					#[cfg(feature = "tracing")]
					tracing::warn!(%method, %url, status = status.as_u16(), "Bad response.");

					return Err(HttpError {
						method: method.clone(),
						url: url.to_string(),
						status: status.as_u16(),
						body,
					}
					.into());
				},
			}
		}
	}

	fn resolve_url(&self, path: &str, query: &[(String, String)]) -> Result<Url, ConfigError> {
		let mut url = match Url::parse(path) {
			Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => url,
			_ => {
				let base = self.base_url.as_str().trim_end_matches('/');
				let joined = if path.is_empty() || path.starts_with('/') || path.starts_with('?') {
					format!("{base}{path}")
				} else {
					format!("{base}/{path}")
				};

				Url::parse(&joined)
					.map_err(|source| ConfigError::InvalidBaseUrl { url: joined, source })?
			},
		};

		if !query.is_empty() {
			url.query_pairs_mut().extend_pairs(query);
		}

		Ok(url)
	}

	fn base_headers(
		&self,
		options: &RequestOptions,
		content_type: Option<HeaderValue>,
	) -> Result<HeaderMap, ConfigError> {
		let mut headers = self.default_headers.clone();
		let mut caller = HeaderMap::new();

		if let Some(content_type) = content_type {
			headers.insert(CONTENT_TYPE, content_type);
		}
		for (name, value) in &options.headers {
			let (name, value) = header_pair(name, value)?;

			caller.append(name, value);
		}

		// Replaces every value of each caller-supplied name.
		headers.extend(caller);

		let correlation_id = match &options.correlation_id {
			Some(id) => header_value(CORRELATION_ID_HEADER, id)?,
			None => match headers.get(CORRELATION_ID_HEADER) {
				Some(existing) => existing.clone(),
				None => header_value(CORRELATION_ID_HEADER, &generate_correlation_id())?,
			},
		};

		headers.insert(CORRELATION_ID_HEADER, correlation_id);

		Ok(headers)
	}
}
impl Debug for ServiceClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceClient")
			.field("base_url", &self.base_url.as_str())
			.field("authenticated", &self.authenticator.is_some())
			.field("default_headers", &self.default_headers)
			.finish()
	}
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
	let url = Url::parse(raw)
		.map_err(|source| ConfigError::InvalidBaseUrl { url: raw.to_owned(), source })?;

	if !matches!(url.scheme(), "http" | "https") {
		return Err(ConfigError::UnsupportedScheme { url: raw.to_owned() });
	}

	Ok(url)
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ConfigError> {
	let header_name = HeaderName::from_bytes(name.as_bytes())
		.map_err(|_| ConfigError::InvalidHeader { name: name.to_owned() })?;

	Ok((header_name, header_value(name, value)?))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ConfigError> {
	HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidHeader { name: name.to_owned() })
}

fn generate_correlation_id() -> String {
	rand::rng().sample_iter(Alphanumeric).take(CORRELATION_ID_LEN).map(char::from).collect()
}
