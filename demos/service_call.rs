//! Calls a downstream service with a bearer token obtained through the client-credentials grant
//! and reused from the in-memory token store.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use service_auth_client::{
	client::{RequestOptions, ResponseData},
	config::Settings,
	store::{MemoryStore, TokenStorage},
	token::TokenManager,
};

fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start();
	let token_mock = server.mock(|when, then| {
		when.method(POST).path("/oauth/token");
		then.status(200).header("content-type", "application/json").body(
			"{\"access_token\":\"demo-access\",\"token_type\":\"Bearer\",\"expires_in\":900}",
		);
	});
	let service_mock = server.mock(|when, then| {
		when.method(GET)
			.path("/billing/invoices")
			.query_param("status", "open")
			.header("authorization", "Bearer demo-access");
		then.status(200)
			.header("content-type", "application/json")
			.body("[{\"id\":1,\"total\":\"12.50\"}]");
	});
	let settings = Settings::builder()
		.api_id("billing", "billing-api")
		.client_id("demo-client")
		.client_secret("super-secret")
		.domain(server.base_url())
		.build()?;
	let storage: Arc<dyn TokenStorage> = Arc::new(MemoryStore::default());
	let manager = TokenManager::new(settings, storage)?;
	let client = manager.service_client("billing", &server.url("/billing"))?;

	for _ in 0..2 {
		let response = client.get("/invoices", RequestOptions::new().query("status", "open"))?;

		if let ResponseData::Json(invoices) = response.data() {
			println!("Open invoices: {invoices}.");
		}
	}

	// Both calls reuse the cached token.
	token_mock.assert_calls(1);
	service_mock.assert_calls(2);

	Ok(())
}
