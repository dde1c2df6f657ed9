// crates.io
use httpmock::prelude::*;
// self
use service_auth_client::{
	_preludet::*,
	client::{CORRELATION_ID_HEADER, RequestOptions, ResponseData},
	error::TransportError,
};

const SERVICE: &str = "billing";

/// Starts a server that plays both the provider and the service, with `seeded` cached as the
/// current token and `fresh` returned by the token endpoint.
fn setup(server: &MockServer) -> (service_auth_client::client::ServiceClient, httpmock::Mock<'_>) {
	let token_mock = server.mock(|when, then| {
		when.method(POST).path("/oauth/token");
		then.status(200).header("content-type", "application/json").body(token_body("fresh", 3600));
	});
	let settings = test_settings(&server.base_url(), &[(SERVICE, "billing-api")]);
	let (manager, store) = build_test_manager(settings.clone());

	seed_credential(store.as_ref(), &settings, SERVICE, "seeded");

	let client = manager
		.service_client(SERVICE, &server.url("/api"))
		.expect("Service client should build.");

	(client, token_mock)
}

#[test]
fn unauthorized_response_refreshes_and_retries_once() {
	let server = MockServer::start();
	let (client, token_mock) = setup(&server);
	let stale = server.mock(|when, then| {
		when.method(GET).path("/api/items").header("authorization", "Bearer seeded");
		then.status(401).body("expired");
	});
	let fresh = server.mock(|when, then| {
		when.method(GET).path("/api/items").header("authorization", "Bearer fresh");
		then.status(200).header("content-type", "application/json").body("[{\"id\":1}]");
	});
	let response = client.get("/items", RequestOptions::new()).expect("Retry should succeed.");

	stale.assert_calls(1);
	fresh.assert_calls(1);
	token_mock.assert_calls(1);

	assert_eq!(response.status().as_u16(), 200);
	assert_eq!(response.data(), ResponseData::Json(serde_json::json!([{ "id": 1 }])));
}

#[test]
fn retry_uses_the_force_refreshed_token_even_when_it_expires_immediately() {
	let server = MockServer::start();
	let token_mock = server.mock(|when, then| {
		when.method(POST).path("/oauth/token");
		then.status(200).header("content-type", "application/json").body(token_body("instant", 0));
	});
	let settings = test_settings(&server.base_url(), &[(SERVICE, "billing-api")]);
	let (manager, store) = build_test_manager(settings.clone());

	seed_credential(store.as_ref(), &settings, SERVICE, "seeded");

	let client = manager
		.service_client(SERVICE, &server.url("/api"))
		.expect("Service client should build.");
	let stale = server.mock(|when, then| {
		when.method(GET).path("/api/x").header("authorization", "Bearer seeded");
		then.status(401);
	});
	let fresh = server.mock(|when, then| {
		when.method(GET).path("/api/x").header("authorization", "Bearer instant");
		then.status(200).body("ok");
	});

	client.get("/x", RequestOptions::new()).expect("Retry should succeed.");

	stale.assert_calls(1);
	fresh.assert_calls(1);
	token_mock.assert_calls(1);
}

#[test]
fn second_unauthorized_response_is_surfaced_without_a_third_attempt() {
	let server = MockServer::start();
	let (client, token_mock) = setup(&server);
	let denied = server.mock(|when, then| {
		when.method(POST).path("/api/items");
		then.status(401).body("{\"detail\":\"nope\"}");
	});
	let err = client
		.post("/items", RequestOptions::new().json(serde_json::json!({ "name": "x" })))
		.expect_err("Persistent 401 should fail.");

	denied.assert_calls(2);
	token_mock.assert_calls(1);

	match err {
		Error::Http(http) => {
			assert!(http.is_unauthorized());
			assert_eq!(http.body, "{\"detail\":\"nope\"}");
			assert_eq!(http.url, server.url("/api/items"));
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[test]
fn server_errors_are_not_retried() {
	let server = MockServer::start();
	let (client, token_mock) = setup(&server);
	let failing = server.mock(|when, then| {
		when.method(PUT).path("/api/items/7");
		then.status(500).body("boom");
	});
	let err = client.put("/items/7", RequestOptions::new()).expect_err("500 should fail.");

	failing.assert_calls(1);
	token_mock.assert_calls(0);

	assert_eq!(err.status(), Some(500));
}

#[test]
fn caller_headers_survive_but_cannot_override_authorization() {
	let server = MockServer::start();
	let (client, _) = setup(&server);
	let client = client.with_default_header("x-tenant", "default").expect("Header should be valid.");
	let mock = server.mock(|when, then| {
		when.method(PATCH)
			.path("/api/items/7")
			.query_param("dry_run", "true")
			.header("authorization", "Bearer seeded")
			.header("x-tenant", "acme")
			.header("x-trace", "abc")
			.header(CORRELATION_ID_HEADER, "corr-123");
		then.status(204);
	});
	let options = RequestOptions::new()
		.query("dry_run", "true")
		.header("Authorization", "Bearer forged")
		.header("X-Tenant", "acme")
		.header("X-Trace", "abc")
		.correlation_id("corr-123");
	let response = client.patch("/items/7", options).expect("PATCH should succeed.");

	mock.assert_calls(1);

	assert_eq!(response.data(), ResponseData::Empty);
}

#[test]
fn correlation_id_is_stable_across_the_retry() {
	let server = MockServer::start();
	let (client, _) = setup(&server);
	let stale = server.mock(|when, then| {
		when.method(DELETE)
			.path("/api/items/7")
			.header("authorization", "Bearer seeded")
			.header(CORRELATION_ID_HEADER, "retry-me");
		then.status(401);
	});
	let fresh = server.mock(|when, then| {
		when.method(DELETE)
			.path("/api/items/7")
			.header("authorization", "Bearer fresh")
			.header(CORRELATION_ID_HEADER, "retry-me");
		then.status(200).body("deleted");
	});
	let response = client
		.delete("/items/7", RequestOptions::new().correlation_id("retry-me"))
		.expect("DELETE should succeed after the retry.");

	stale.assert_calls(1);
	fresh.assert_calls(1);

	assert_eq!(response.text(), "deleted");
	assert_eq!(response.data(), ResponseData::Raw(b"deleted".to_vec()));
}

#[test]
fn typed_json_responses_decode() {
	#[derive(Debug, Deserialize, PartialEq)]
	struct Invoice {
		id: u32,
		total: String,
	}

	let server = MockServer::start();
	let (client, _) = setup(&server);

	server.mock(|when, then| {
		when.method(GET).path("/api/invoices/9");
		then.status(200)
			.header("content-type", "application/json")
			.body("{\"id\":9,\"total\":\"12.50\"}");
	});

	let invoice: Invoice = client
		.get("/invoices/9", RequestOptions::new())
		.expect("GET should succeed.")
		.json()
		.expect("Invoice should decode.");

	assert_eq!(invoice, Invoice { id: 9, total: "12.50".into() });
}

#[test]
fn unauthenticated_clients_send_no_credentials() {
	let server = MockServer::start();
	let mock = server.mock(|when, then| {
		when.method(GET).path("/health");
		then.status(401);
	});
	let client = service_auth_client::client::ServiceClient::unauthenticated(
		&server.base_url(),
		test_transport(),
	)
	.expect("Client should build.");
	let err = client.get("/health", RequestOptions::new()).expect_err("401 should fail.");

	mock.assert_calls(1);

	assert_eq!(err.status(), Some(401));
}

#[test]
fn unreachable_services_are_transport_failures() {
	let server = MockServer::start();
	let (client, token_mock) = setup(&server);
	let port = std::net::TcpListener::bind("127.0.0.1:0")
		.and_then(|listener| listener.local_addr())
		.expect("An ephemeral port should be available.")
		.port();
	let err = client
		.get(&format!("http://127.0.0.1:{port}/items"), RequestOptions::new())
		.expect_err("Closed port should fail.");

	token_mock.assert_calls(0);

	assert!(matches!(err, Error::Transport(TransportError::Network { .. })));
}
