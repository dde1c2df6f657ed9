//! Checks a person's permissions against the permissions API, caching the fetched document in an
//! in-process cache.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use service_auth_client::{
	config::Settings,
	contrib::permissions::{PermissionsClient, ResourceRef},
	store::{MemoryCache, MemoryStore, TokenStorage},
	token::TokenManager,
};

fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start();

	server.mock(|when, then| {
		when.method(POST).path("/oauth/token");
		then.status(200).header("content-type", "application/json").body(
			"{\"access_token\":\"demo-access\",\"token_type\":\"Bearer\",\"expires_in\":900}",
		);
	});

	let permissions_mock = server.mock(|when, then| {
		when.method(GET).path("/api/v1/people/person-1/permissions").query_param("org_ref", "acme");
		then.status(200).header("content-type", "application/json").body(
			"{\"global\":[\"read:profile\"],\"acme\":[\"read:invoices\",\"write:invoices\"]}",
		);
	});
	let settings = Settings::builder()
		.api_id("os-core", "core-api")
		.client_id("demo-client")
		.client_secret("super-secret")
		.domain(server.base_url())
		.build()?;
	let storage: Arc<dyn TokenStorage> = Arc::new(MemoryStore::default());
	let manager = TokenManager::new(settings, storage)?;
	let client = manager.service_client("os-core", &server.base_url())?;
	let permissions = PermissionsClient::from_service_client(&client)?.with_cache(
		Arc::new(MemoryCache::default()),
		PermissionsClient::DEFAULT_CACHE_PERIOD_SECONDS,
	);
	let acme = ResourceRef::org("acme");

	for scope in ["read:invoices", "write:invoices", "read:profile", "delete:invoices"] {
		let granted = permissions.has_permission("person-1", scope, &acme)?;

		println!("person-1 {scope} on acme: {granted}.");
	}

	permissions_mock.assert_calls(1);

	Ok(())
}
