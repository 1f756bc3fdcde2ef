#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use httpmock::prelude::*;
use tokio::time::timeout;
// self
use token_engine::{
	_preludet::*,
	error::NetworkError,
	http::{ExchangeClient, ExchangeRequest},
};

const TEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

fn request(server: &MockServer, path: &str) -> ExchangeRequest {
	ExchangeRequest::get(Url::parse(&server.url(path)).expect("Mock URL should parse."))
}

#[tokio::test]
async fn non_retryable_statuses_return_as_ordinary_responses() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_request"}"#);
		})
		.await;
	let response = test_exchange_client()
		.send(request(&server, "/token"))
		.await
		.expect("Protocol-level rejections are responses, not exchange failures.");

	assert_eq!(response.status, 400);
	assert!(response.body.contains("invalid_request"));

	mock.assert_async().await;
}

#[tokio::test]
async fn two_transient_statuses_fail_terminally_after_exactly_two_attempts() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/flaky");
			then.status(503).body("busy");
		})
		.await;
	let err = test_exchange_client()
		.send(request(&server, "/flaky"))
		.await
		.expect_err("Exhausted retry must fail with a typed error.");

	assert!(matches!(
		err,
		Error::Network(NetworkError::ServiceUnavailable { status: 503 }),
	));

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn transient_failure_then_success_returns_the_success_body() {
	let server = MockServer::start_async().await;
	let unavailable = server
		.mock_async(|when, then| {
			when.method(GET).path("/recovering");
			then.status(503).body("busy");
		})
		.await;
	// A long backoff leaves room to swap the endpoint's behavior between the
	// first attempt and its retry.
	let client = ExchangeClient::new(Arc::new(test_reqwest_transport()))
		.with_backoff(std::time::Duration::from_millis(750));
	let exchange = {
		let request = request(&server, "/recovering");

		tokio::spawn(async move { client.send(request).await })
	};

	timeout(TEST_TIMEOUT, async {
		while unavailable.calls_async().await == 0 {
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("First attempt should reach the endpoint.");

	unavailable.delete_async().await;

	let recovered = server
		.mock_async(|when, then| {
			when.method(GET).path("/recovering");
			then.status(200).body("recovered");
		})
		.await;
	let response = timeout(TEST_TIMEOUT, exchange)
		.await
		.expect("Retry should resolve before the timeout.")
		.expect("Exchange task should not panic.")
		.expect("Retry should deliver the recovered response.");

	assert_eq!(response.status, 200);
	assert_eq!(response.body, "recovered");

	recovered.assert_async().await;
}
