//! Integration tests for `AmazonClient` using wiremock HTTP mocks.

use ambridge_scraper::{AmazonClient, ScraperError, DEFAULT_RAPIDAPI_HOST};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> AmazonClient {
    AmazonClient::with_base_url(Some("test-key"), DEFAULT_RAPIDAPI_HOST, 15, 2, 0, base_url)
        .expect("client construction should not fail")
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "status": "OK",
        "request_id": "req-1",
        "data": data
    }))
}

#[tokio::test]
async fn fetch_product_details_sends_rapidapi_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/product-details"))
        .and(query_param("asin", "B08N5WRWNW"))
        .and(query_param("country", "US"))
        .and(header("X-RapidAPI-Key", "test-key"))
        .and(header("X-RapidAPI-Host", DEFAULT_RAPIDAPI_HOST))
        .respond_with(ok(serde_json::json!({
            "asin": "B08N5WRWNW",
            "product_title": "Echo Dot",
            "product_price": "$49.99"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let record = client
        .fetch_product_details("B08N5WRWNW", "US")
        .await
        .expect("should fetch record");
    assert_eq!(
        record.first_str(&["title", "product_title"]),
        Some("Echo Dot")
    );
}

#[tokio::test]
async fn missing_api_key_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ok(serde_json::json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client =
        AmazonClient::with_base_url(None, DEFAULT_RAPIDAPI_HOST, 15, 0, 0, &server.uri()).unwrap();
    let err = client
        .fetch_product_details("B08N5WRWNW", "US")
        .await
        .unwrap_err();
    assert!(matches!(err, ScraperError::MissingApiKey));
    assert_eq!(err.code(), "API_KEY_MISSING");
}

#[tokio::test]
async fn error_envelope_surfaces_api_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ERROR",
            "message": "Invalid ASIN"
        })))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .fetch_product_details("B000000000", "US")
        .await
        .unwrap_err();
    assert!(matches!(err, ScraperError::Api(ref m) if m == "Invalid ASIN"));
    assert_eq!(err.code(), "API_ERROR");
}

#[tokio::test]
async fn empty_data_gives_diagnostic_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ok(serde_json::json!({})))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .fetch_product_details("B000000000", "DE")
        .await
        .unwrap_err();
    assert!(matches!(err, ScraperError::EmptyProduct { .. }));
    let message = err.to_string();
    assert!(message.contains("request limit"), "{message}");
    assert!(message.contains("restricted in DE"), "{message}");
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ok(serde_json::json!({
            "title": "Retry Lamp",
            "price": { "current_price": 12.0 }
        })))
        .mount(&server)
        .await;

    let record = test_client(&server.uri())
        .fetch_product_details("B0RETRY001", "US")
        .await
        .expect("second attempt should succeed");
    assert!(!record.is_empty());
}

#[tokio::test]
async fn non_json_body_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .fetch_product_details("B000000000", "US")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PARSE_ERROR");
}

#[tokio::test]
async fn scrape_url_rejects_non_amazon_urls() {
    let client = test_client("http://127.0.0.1:9");
    let err = client
        .scrape_url("https://www.example.com/dp/B08N5WRWNW")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_URL");

    let err = client
        .scrape_url("https://www.amazon.com/s?k=lamp")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_URL");
}

#[tokio::test]
async fn scrape_url_rejects_incomplete_child() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ok(serde_json::json!({ "product_title": "No Price Mug" })))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .scrape_url("https://www.amazon.com/dp/B0MUG00001")
        .await
        .unwrap_err();
    assert!(matches!(err, ScraperError::IncompleteProduct { ref missing, .. } if missing == "price"));
}

#[tokio::test]
async fn scrape_url_fetches_parent_for_variations() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("asin", "B0CHILD001"))
        .and(query_param("country", "GB"))
        .respond_with(ok(serde_json::json!({
            "asin": "B0CHILD001",
            "parent_asin": "B0PARENT01",
            "product_title": "Trail Shirt (Red, S)",
            "product_price": "£19.99"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("asin", "B0PARENT01"))
        .respond_with(ok(serde_json::json!({
            "asin": "B0PARENT01",
            "product_title": "Trail Shirt",
            "product_price": "£19.99",
            "currency": "GBP",
            "all_product_variations": { "data": [
                { "asin": "B0CHILD001", "dimensions": { "color": "Red", "size": "S" } },
                { "asin": "B0CHILD002", "dimensions": { "color": "Blue", "size": "S" } }
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let product = test_client(&server.uri())
        .scrape_url("https://www.amazon.co.uk/dp/B0CHILD001")
        .await
        .expect("scrape should succeed");

    assert_eq!(product.asin, "B0PARENT01");
    assert_eq!(product.title, "Trail Shirt");
    assert_eq!(product.currency, "GBP");
    assert_eq!(product.variants.len(), 2);
    assert_eq!(product.options.len(), 2);
}

#[tokio::test]
async fn scrape_url_falls_back_to_child_when_parent_fails() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("asin", "B0CHILD009"))
        .respond_with(ok(serde_json::json!({
            "asin": "B0CHILD009",
            "parent_asin": "B0PARENT09",
            "title": "Desk Lamp",
            "price": { "current_price": 35.5 }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("asin", "B0PARENT09"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let product = test_client(&server.uri())
        .scrape_url("https://www.amazon.com/gp/product/B0CHILD009")
        .await
        .expect("child data should be used");

    assert_eq!(product.title, "Desk Lamp");
    assert_eq!(product.asin, "B0PARENT09");
    assert!(product.variants.is_empty());
}
