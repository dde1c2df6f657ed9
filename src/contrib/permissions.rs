//! Cache-aware permission checks against a downstream permissions API.
//!
//! A permissions document maps `global`, an organization reference, or `<kind>:<id>` for a legacy
//! location to the scopes a person holds there. [`PermissionsClient`] fetches the document for the
//! resource being checked through a [`PermissionsSource`], flattens it into pipe-delimited cache
//! entries, and grants a scope when it appears in either the global entry or the resource entry.
//!
//! Cache entries are named `permissions_client:<person>:global`,
//! `permissions_client:<person>:<ref>` and `permissions_client:<person>:<id>:<kind>`. A lookup
//! only counts as a hit when every entry it needs is present.

// self
use crate::{
	_prelude::*,
	client::{RequestOptions, ServiceClient},
	error::ConfigError,
	obs::{self, OpKind},
	store::CacheBackend,
};

/// Permissions document as returned by the permissions API: resource key → scopes.
pub type PermissionsDoc = BTreeMap<String, Vec<String>>;

/// Kind of a legacy numeric location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
	/// Company location.
	Company,
	/// Vendor location.
	Vendor,
}
impl LocationType {
	/// Wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			LocationType::Company => "company",
			LocationType::Vendor => "vendor",
		}
	}
}
impl Display for LocationType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Resource a permission is checked against.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceRef {
	/// Organization, identified by its reference (usually a UUID).
	Org(String),
	/// Legacy location identified by numeric id and kind.
	Location {
		/// Location identifier.
		id: u64,
		/// Location kind.
		kind: LocationType,
	},
}
impl ResourceRef {
	/// Organization reference.
	pub fn org(org_ref: impl Into<String>) -> Self {
		Self::Org(org_ref.into())
	}

	/// Company location.
	pub fn company(id: u64) -> Self {
		Self::Location { id, kind: LocationType::Company }
	}

	/// Vendor location.
	pub fn vendor(id: u64) -> Self {
		Self::Location { id, kind: LocationType::Vendor }
	}
}

/// Backend that fetches permissions documents.
///
/// `resource` is `None` for global-only checks.
pub trait PermissionsSource
where
	Self: Send + Sync,
{
	/// Fetches the document for `person_id`, covering `global` and `resource`.
	fn fetch_permissions(
		&self,
		person_id: &str,
		resource: Option<&ResourceRef>,
	) -> Result<PermissionsDoc>;
}

/// [`PermissionsSource`] that calls `GET /api/v1/people/{person}/permissions` through a
/// [`ServiceClient`].
#[derive(Clone, Debug)]
pub struct ServicePermissionsSource {
	client: ServiceClient,
}
impl ServicePermissionsSource {
	/// Wraps `client`, keeping its authenticator and transport but rebasing it onto the origin of
	/// its base URL and dropping its default headers.
	pub fn new(client: &ServiceClient) -> Result<Self, ConfigError> {
		let origin = client.base_url().origin().ascii_serialization();

		Ok(Self { client: client.rebased(&origin)? })
	}

	/// Rebased client used for fetches.
	pub fn client(&self) -> &ServiceClient {
		&self.client
	}
}
impl PermissionsSource for ServicePermissionsSource {
	fn fetch_permissions(
		&self,
		person_id: &str,
		resource: Option<&ResourceRef>,
	) -> Result<PermissionsDoc> {
		let options = match resource {
			None => RequestOptions::new().query("org_ref", GLOBAL),
			Some(ResourceRef::Org(org_ref)) => RequestOptions::new().query("org_ref", org_ref),
			Some(ResourceRef::Location { id, kind }) => RequestOptions::new()
				.query("location_id", id.to_string())
				.query("location_type", kind.as_str()),
		};

		#[cfg(feature = "tracing")]
		tracing::debug!(person_id, ?resource, "Fetching permissions.");

		self.client.get(&format!("/api/v1/people/{person_id}/permissions"), options)?.json()
	}
}

const GLOBAL: &str = "global";

/// Cached permission checks.
#[derive(Clone)]
pub struct PermissionsClient {
	source: Arc<dyn PermissionsSource>,
	cache: Option<Arc<dyn CacheBackend>>,
	cache_period_seconds: u64,
}
impl PermissionsClient {
	/// Prefix of every cache key.
	pub const CACHE_PREFIX: &'static str = "permissions_client";
	/// Cache period used by [`PermissionsClient::with_cache`] callers that have no preference.
	pub const DEFAULT_CACHE_PERIOD_SECONDS: u64 = 120;

	/// Creates an uncached client.
	pub fn new(source: Arc<dyn PermissionsSource>) -> Self {
		Self { source, cache: None, cache_period_seconds: 0 }
	}

	/// Creates an uncached client that fetches through `client`.
	pub fn from_service_client(client: &ServiceClient) -> Result<Self, ConfigError> {
		Ok(Self::new(Arc::new(ServicePermissionsSource::new(client)?)))
	}

	/// Caches documents in `cache` for `cache_period_seconds`; `0` disables caching.
	pub fn with_cache(mut self, cache: Arc<dyn CacheBackend>, cache_period_seconds: u64) -> Self {
		self.cache = Some(cache);
		self.cache_period_seconds = cache_period_seconds;

		self
	}

	/// Returns `true` when `person_id` holds `scope` on `resource`, globally or directly.
	pub fn has_permission(
		&self,
		person_id: &str,
		scope: &str,
		resource: &ResourceRef,
	) -> Result<bool> {
		self.check(person_id, scope, Some(resource))
	}

	/// Returns `true` when `person_id` holds `scope` globally.
	pub fn has_global_permission(&self, person_id: &str, scope: &str) -> Result<bool> {
		self.check(person_id, scope, None)
	}

	/// Returns `true` when `person_id` holds `scope` on every resource in `resources`.
	///
	/// An empty `resources` slice falls back to the global check.
	pub fn has_all_permissions(
		&self,
		person_id: &str,
		scope: &str,
		resources: &[ResourceRef],
	) -> Result<bool> {
		if resources.is_empty() {
			return self.has_global_permission(person_id, scope);
		}

		for resource in resources {
			if !self.has_permission(person_id, scope, resource)? {
				return Ok(false);
			}
		}

		Ok(true)
	}

	/// Cache key for `resource`, or for the global entry when `resource` is `None`.
	pub fn cache_key(person_id: &str, resource: Option<&ResourceRef>) -> String {
		match resource {
			None => format!("{}:{person_id}:{GLOBAL}", Self::CACHE_PREFIX),
			Some(ResourceRef::Org(org_ref)) =>
				format!("{}:{person_id}:{org_ref}", Self::CACHE_PREFIX),
			Some(ResourceRef::Location { id, kind }) =>
				format!("{}:{person_id}:{id}:{kind}", Self::CACHE_PREFIX),
		}
	}

	/// Flattens a fetched document into cache entries.
	///
	/// `<kind>:<id>` document keys become `<id>:<kind>` key suffixes; every value is the scope list
	/// joined with `|` plus a trailing `|`.
	pub fn cache_entries(person_id: &str, doc: &PermissionsDoc) -> BTreeMap<String, String> {
		doc.iter()
			.map(|(doc_key, scopes)| {
				let suffix = match doc_key.split_once(':') {
					Some((kind, id)) => format!("{id}:{kind}"),
					None => doc_key.clone(),
				};
				let mut joined = scopes.join("|");

				joined.push('|');

				(format!("{}:{person_id}:{suffix}", Self::CACHE_PREFIX), joined)
			})
			.collect()
	}

	fn check(&self, person_id: &str, scope: &str, resource: Option<&ResourceRef>) -> Result<bool> {
		obs::observe(OpKind::PermissionCheck, "check", || -> Result<bool> {
			let mut keys = vec![Self::cache_key(person_id, None)];

			if resource.is_some() {
				keys.push(Self::cache_key(person_id, resource));
			}

			let entries = match self.cache_read(&keys)? {
				Some(entries) => entries,
				None => {
					let doc = self.source.fetch_permissions(person_id, resource)?;
					let mut entries = Self::cache_entries(person_id, &doc);

					// Keys the document omits are cached as empty so denials hit too.
					for key in &keys {
						entries.entry(key.clone()).or_insert_with(|| "|".into());
					}

					self.cache_write(&entries)?;

					entries.into_iter().collect()
				},
			};

			Ok(!scope.is_empty()
				&& keys.iter().filter_map(|key| entries.get(key)).any(|scopes| {
					scopes.split('|').any(|granted| granted == scope)
				}))
		})
	}

	fn cache(&self) -> Option<&Arc<dyn CacheBackend>> {
		self.cache.as_ref().filter(|_| self.cache_period_seconds > 0)
	}

	fn cache_read(&self, keys: &[String]) -> Result<Option<HashMap<String, String>>> {
		let Some(cache) = self.cache() else {
			return Ok(None);
		};
		let found = cache.get_many(keys)?;

		if found.len() != keys.len() {
			#[cfg(feature = "tracing")]
			tracing::debug!(found = found.len(), wanted = keys.len(), "Permissions cache miss.");

			return Ok(None);
		}

		Ok(Some(found))
	}

	fn cache_write(&self, entries: &BTreeMap<String, String>) -> Result<()> {
		if let Some(cache) = self.cache() {
			let seconds = i64::try_from(self.cache_period_seconds).unwrap_or(i64::MAX);

			cache.set_many(entries, Duration::seconds(seconds))?;
		}

		Ok(())
	}
}
impl Debug for PermissionsClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PermissionsClient")
			.field("cached", &self.cache.is_some())
			.field("cache_period_seconds", &self.cache_period_seconds)
			.finish()
	}
}
