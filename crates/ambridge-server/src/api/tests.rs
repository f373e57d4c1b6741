use std::net::SocketAddr;

use super::*;
use crate::middleware::WEBHOOK_TOKEN_HEADER;
use ambridge_core::Environment;
use ambridge_scraper::DEFAULT_RAPIDAPI_HOST;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHOP: &str = "demo.myshopify.com";
const WEBHOOK_SECRET: &str = "hook-secret";
/// Nothing listens here; used when a test must not reach an upstream.
const UNREACHABLE: &str = "http://127.0.0.1:9";

fn test_config() -> AppConfig {
    AppConfig {
        database_url: String::new(),
        env: Environment::Test,
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        log_level: "info".to_owned(),
        app_url: "https://app.example.com".to_owned(),
        rapidapi_key: Some("test-key".to_owned()),
        rapidapi_host: DEFAULT_RAPIDAPI_HOST.to_owned(),
        shopify_api_version: "2025-01".to_owned(),
        webhook_secret: Some(WEBHOOK_SECRET.to_owned()),
        db_max_connections: 2,
        db_min_connections: 0,
        db_acquire_timeout_secs: 5,
        scraper_request_timeout_secs: 5,
        scraper_max_retries: 0,
        scraper_retry_backoff_base_secs: 0,
        shopify_request_timeout_secs: 5,
    }
}

fn test_app(pool: PgPool, amazon_base: &str, shopify_base: &str) -> Router {
    let amazon = AmazonClient::with_base_url(
        Some("test-key"),
        DEFAULT_RAPIDAPI_HOST,
        5,
        0,
        0,
        amazon_base,
    )
    .expect("amazon client");
    let shopify = AdminConnector::with_base_url("2025-01", 5, shopify_base).expect("connector");
    let state = AppState {
        pool,
        config: Arc::new(test_config()),
        catalog: Arc::new(PlanCatalog::standard()),
        amazon: Arc::new(amazon),
        shopify,
    };
    let auth = AuthState::from_keys("", true).expect("auth");
    build_app(
        state,
        auth,
        WebhookAuth::new(Some(WEBHOOK_SECRET)),
        default_rate_limit_state(),
    )
}

fn offline_app(pool: PgPool) -> Router {
    test_app(pool, UNREACHABLE, UNREACHABLE)
}

fn shop_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(SHOP_DOMAIN_HEADER, SHOP)
        .header(ACCESS_TOKEN_HEADER, "shpat_test")
        .header("content-type", "application/json");
    let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));
    builder.body(body).expect("request")
}

fn webhook_request(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(SHOP_DOMAIN_HEADER, SHOP)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header(WEBHOOK_TOKEN_HEADER, token);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("json parse")
    };
    (status, json)
}

async fn seed_shop(pool: &PgPool, plan: &str) {
    sqlx::query("INSERT INTO shop_settings (shop, plan) VALUES ($1, $2)")
        .bind(SHOP)
        .bind(plan)
        .execute(pool)
        .await
        .expect("insert shop settings");
}

async fn seed_imports(pool: &PgPool, count: usize) {
    for i in 0..count {
        sqlx::query(
            "INSERT INTO imported_products \
             (shop, shopify_product_id, amazon_url, asin, title, price, original_price, \
              markup_value, pricing_mode, import_mode, status) \
             VALUES ($1, $2, 'https://www.amazon.com/dp/B000000000', 'B000000000', 'Seed', \
                     10, 10, 1.5, 'MULTIPLIER', 'DROPSHIPPING', 'DRAFT')",
        )
        .bind(SHOP)
        .bind(format!("gid://shopify/Product/{i}"))
        .execute(pool)
        .await
        .expect("insert imported product");
    }
}

fn amazon_ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "status": "OK", "data": data }))
}

fn desk_record() -> Value {
    json!({
        "asin": "B0DESK0001",
        "product_title": "Standing Desk",
        "product_price": "$49.99",
        "product_photos": ["https://m.media-amazon.com/images/I/desk.jpg"],
        "about_product": ["Steel frame"]
    })
}

fn shopify_ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
}

async fn mount_single_sku_commit(server: &MockServer, expected_price: &str) {
    Mock::given(method("POST"))
        .and(body_string_contains("mutation productCreate"))
        .respond_with(shopify_ok(json!({
            "productCreate": {
                "product": {
                    "id": "gid://shopify/Product/500",
                    "title": "Standing Desk",
                    "handle": "standing-desk",
                    "status": "ACTIVE",
                    "variants": { "edges": [ { "node": { "id": "gid://shopify/ProductVariant/50" } } ] },
                    "media": { "nodes": [ { "id": "gid://shopify/MediaImage/1", "alt": "Standing Desk" } ] }
                },
                "userErrors": []
            }
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("productVariantsBulkUpdate"))
        .and(body_string_contains(&format!("\"price\":\"{expected_price}\"")))
        .respond_with(shopify_ok(json!({
            "productVariantsBulkUpdate": { "productVariants": [], "userErrors": [] }
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("metafieldsSet"))
        .respond_with(shopify_ok(json!({ "metafieldsSet": { "userErrors": [] } })))
        .expect(1)
        .mount(server)
        .await;
}

// -------------------------------------------------------------------------
// Unit
// -------------------------------------------------------------------------

#[test]
fn normalize_limit_applies_defaults_and_bounds() {
    assert_eq!(normalize_limit(None), 50);
    assert_eq!(normalize_limit(Some(0)), 1);
    assert_eq!(normalize_limit(Some(1_000)), 200);
    assert_eq!(normalize_limit(Some(25)), 25);
}

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("plan_limit_reached", StatusCode::FORBIDDEN),
        ("feature_unavailable", StatusCode::FORBIDDEN),
        ("upstream_error", StatusCode::BAD_GATEWAY),
        ("rate_limited", StatusCode::TOO_MANY_REQUESTS),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, status) in cases {
        let response = ApiError::new("req-1", code, "message").into_response();
        assert_eq!(response.status(), status, "{code}");
    }
}

#[test]
fn api_error_omits_empty_details() {
    let json = serde_json::to_value(ApiError::new("req-1", "not_found", "gone")).unwrap();
    assert!(json["error"].get("details").is_none());
    let json = serde_json::to_value(
        ApiError::new("req-1", "plan_limit_reached", "full").with_details(json!({ "n": 1 })),
    )
    .unwrap();
    assert_eq!(json["error"]["details"]["n"], 1);
}

// -------------------------------------------------------------------------
// Health, plans, shop context
// -------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn health_reports_database_ok(pool: PgPool) {
    let request = Request::builder()
        .uri("/api/v1/health")
        .body(Body::empty())
        .expect("request");
    let (status, json) = send(offline_app(pool), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["database"], "ok");
}

#[sqlx::test(migrations = "../../migrations")]
async fn plans_lists_the_catalog_in_order(pool: PgPool) {
    let (status, json) = send(offline_app(pool), shop_request("GET", "/api/v1/plans", None)).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = json["data"]
        .as_array()
        .expect("data array")
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(names, ["FREE", "BASIC", "PRO", "PREMIUM"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn missing_shop_header_is_bad_request(pool: PgPool) {
    let request = Request::builder()
        .uri("/api/v1/billing/status")
        .body(Body::empty())
        .expect("request");
    let (status, json) = send(offline_app(pool), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "bad_request");
}

#[sqlx::test(migrations = "../../migrations")]
async fn foreign_shop_domain_is_rejected(pool: PgPool) {
    let request = Request::builder()
        .uri("/api/v1/settings")
        .header(SHOP_DOMAIN_HEADER, "evil.example.com")
        .body(Body::empty())
        .expect("request");
    let (status, _) = send(offline_app(pool), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// -------------------------------------------------------------------------
// Import pipeline
// -------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn import_prices_commits_and_counts_usage(pool: PgPool) {
    seed_shop(&pool, "BASIC").await;
    seed_imports(&pool, 10).await;

    let amazon = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product-details"))
        .and(query_param("asin", "B0DESK0001"))
        .respond_with(amazon_ok(desk_record()))
        .mount(&amazon)
        .await;
    let shopify = MockServer::start().await;
    mount_single_sku_commit(&shopify, "64.99").await;

    let app = test_app(pool.clone(), &amazon.uri(), &shopify.uri());
    let (status, json) = send(
        app,
        shop_request(
            "POST",
            "/api/v1/products/import",
            Some(json!({
                "url": "https://www.amazon.com/dp/B0DESK0001",
                "import_mode": "DROPSHIPPING",
                "pricing": { "mode": "MULTIPLIER", "value": "1.3" },
                "publish": true
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{json}");
    let data = &json["data"];
    assert_eq!(data["pricing"]["original_price"], "49.99");
    assert_eq!(data["pricing"]["final_price"], "64.99");
    assert_eq!(data["pricing"]["markup"], "15.00");
    assert_eq!(data["product"]["product_id"], "gid://shopify/Product/500");
    assert_eq!(data["usage"]["current_count"], 11);
    assert_eq!(data["usage"]["limit"], 150);
    assert_eq!(data["usage"]["remaining"], 139);

    let logged = ambridge_db::list_imported_products(&pool, SHOP, 1)
        .await
        .expect("list imports");
    assert_eq!(logged[0].asin, "B0DESK0001");
    assert_eq!(logged[0].status, "ACTIVE");
    assert_eq!(logged[0].price.to_string(), "64.99");
    assert_eq!(
        logged[0].shopify_variant_id.as_deref(),
        Some("gid://shopify/ProductVariant/50")
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn import_at_plan_limit_is_denied_before_commit(pool: PgPool) {
    seed_shop(&pool, "FREE").await;
    seed_imports(&pool, 20).await;

    let amazon = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product-details"))
        .respond_with(amazon_ok(desk_record()))
        .mount(&amazon)
        .await;
    let shopify = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(shopify_ok(json!({})))
        .expect(0)
        .mount(&shopify)
        .await;

    let app = test_app(pool.clone(), &amazon.uri(), &shopify.uri());
    let (status, json) = send(
        app,
        shop_request(
            "POST",
            "/api/v1/products/import",
            Some(json!({
                "url": "https://www.amazon.com/dp/B0DESK0001",
                "import_mode": "DROPSHIPPING"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "plan_limit_reached");
    assert_eq!(json["error"]["details"]["usage"]["current_count"], 20);
    assert_eq!(json["error"]["details"]["usage"]["remaining"], 0);
    assert_eq!(
        json["error"]["message"],
        "Product limit reached! You have 20/20 products on the FREE plan. Upgrade to import more products."
    );
    let count = ambridge_db::count_imported_products(&pool, SHOP)
        .await
        .expect("count");
    assert_eq!(count, 20);
}

#[sqlx::test(migrations = "../../migrations")]
async fn import_rejects_multiplier_below_one(pool: PgPool) {
    let amazon = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(amazon_ok(desk_record()))
        .mount(&amazon)
        .await;

    let app = test_app(pool, &amazon.uri(), UNREACHABLE);
    let (status, json) = send(
        app,
        shop_request(
            "POST",
            "/api/v1/products/import",
            Some(json!({
                "url": "https://www.amazon.com/dp/B0DESK0001",
                "import_mode": "DROPSHIPPING",
                "pricing": { "mode": "MULTIPLIER", "value": "0.8" }
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
}

#[sqlx::test(migrations = "../../migrations")]
async fn import_needs_access_token(pool: PgPool) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/products/import")
        .header(SHOP_DOMAIN_HEADER, SHOP)
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "url": "https://www.amazon.com/dp/B0DESK0001", "import_mode": "AFFILIATE" })
                .to_string(),
        ))
        .expect("request");
    let (status, json) = send(offline_app(pool), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "unauthorized");
}

#[sqlx::test(migrations = "../../migrations")]
async fn preview_forces_dropshipping_on_free_plan(pool: PgPool) {
    let amazon = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(amazon_ok(desk_record()))
        .mount(&amazon)
        .await;

    let app = test_app(pool, &amazon.uri(), UNREACHABLE);
    let (status, json) = send(
        app,
        shop_request(
            "POST",
            "/api/v1/products/preview",
            Some(json!({
                "url": "https://www.amazon.com/dp/B0DESK0001",
                "import_mode": "AFFILIATE"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{json}");
    let data = &json["data"];
    assert_eq!(data["import_mode"]["mode"], "DROPSHIPPING");
    assert_eq!(data["import_mode"]["forced"], true);
    assert_eq!(
        data["import_mode"]["notice"],
        "Affiliate Mode requires BASIC plan or higher. Switched to Dropshipping Mode."
    );
    // Shop default is MULTIPLIER 1.5.
    assert_eq!(data["pricing"]["final_price"], "74.99");
    assert_eq!(data["usage"]["remaining"], 20);
}

#[sqlx::test(migrations = "../../migrations")]
async fn preview_rejects_non_amazon_url(pool: PgPool) {
    let (status, json) = send(
        offline_app(pool),
        shop_request(
            "POST",
            "/api/v1/products/preview",
            Some(json!({ "url": "https://example.com/item/1" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "bad_request");
}

// -------------------------------------------------------------------------
// Billing
// -------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn billing_status_creates_free_account(pool: PgPool) {
    let (status, json) =
        send(offline_app(pool), shop_request("GET", "/api/v1/billing/status", None)).await;
    assert_eq!(status, StatusCode::OK);
    let data = &json["data"];
    assert_eq!(data["plan"], "FREE");
    assert_eq!(data["status"], "ACTIVE");
    assert_eq!(data["usage"]["limit"], 20);
    assert_eq!(data["usage"]["remaining"], 20);
    assert_eq!(data["features"]["buy_on_amazon_button"], false);
}

#[sqlx::test(migrations = "../../migrations")]
async fn subscribe_to_paid_plan_goes_pending(pool: PgPool) {
    let shopify = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("appSubscriptionCreate"))
        .and(body_string_contains("\"test\":true"))
        .and(body_string_contains("billing/return?shop=demo.myshopify.com&plan=PRO"))
        .respond_with(shopify_ok(json!({
            "appSubscriptionCreate": {
                "appSubscription": { "id": "gid://shopify/AppSubscription/77" },
                "confirmationUrl": "https://demo.myshopify.com/admin/charges/77/confirm",
                "userErrors": []
            }
        })))
        .expect(1)
        .mount(&shopify)
        .await;

    let app = test_app(pool.clone(), UNREACHABLE, &shopify.uri());
    let (status, json) = send(
        app,
        shop_request(
            "POST",
            "/api/v1/billing/subscribe",
            Some(json!({ "plan": "PRO" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(
        json["data"]["confirmation_url"],
        "https://demo.myshopify.com/admin/charges/77/confirm"
    );
    assert_eq!(json["data"]["status"], "PENDING");
    assert_eq!(json["data"]["pending_plan"], "PRO");

    let row = ambridge_db::get_shop_settings(&pool, SHOP)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.plan, "FREE");
    assert_eq!(
        row.pending_subscription_id.as_deref(),
        Some("gid://shopify/AppSubscription/77")
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn subscribe_user_errors_are_upstream_errors(pool: PgPool) {
    let shopify = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(shopify_ok(json!({
            "appSubscriptionCreate": {
                "appSubscription": null,
                "confirmationUrl": null,
                "userErrors": [
                    { "field": null, "message": "Managed pricing apps cannot use the Billing API" }
                ]
            }
        })))
        .mount(&shopify)
        .await;

    let app = test_app(pool, UNREACHABLE, &shopify.uri());
    let (status, json) = send(
        app,
        shop_request(
            "POST",
            "/api/v1/billing/subscribe",
            Some(json!({ "plan": "BASIC" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"]["message"]
        .as_str()
        .unwrap_or_default()
        .contains("Managed pricing apps cannot use the Billing API"));
}

/// Starts a paid checkout through the subscribe route, leaving the shop PENDING.
async fn start_checkout(pool: &PgPool, plan: &str, charge_id: u64) {
    let shopify = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("appSubscriptionCreate"))
        .respond_with(shopify_ok(json!({
            "appSubscriptionCreate": {
                "appSubscription": { "id": format!("gid://shopify/AppSubscription/{charge_id}") },
                "confirmationUrl": format!("https://{SHOP}/admin/charges/{charge_id}/confirm"),
                "userErrors": []
            }
        })))
        .expect(1)
        .mount(&shopify)
        .await;

    let app = test_app(pool.clone(), UNREACHABLE, &shopify.uri());
    let (status, json) = send(
        app,
        shop_request(
            "POST",
            "/api/v1/billing/subscribe",
            Some(json!({ "plan": plan })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["status"], "PENDING");
}

fn billing_return_request(params: &[(&str, String)]) -> Request<Body> {
    let url = reqwest::Url::parse_with_params("http://localhost/billing/return", params)
        .expect("url");
    let uri = format!("{}?{}", url.path(), url.query().unwrap_or_default());
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

#[sqlx::test(migrations = "../../migrations")]
async fn billing_return_confirms_pending_checkout_via_host(pool: PgPool) {
    start_checkout(&pool, "BASIC", 123).await;

    let request = billing_return_request(&[
        ("host", STANDARD.encode(format!("{SHOP}/admin"))),
        ("plan", "BASIC".to_owned()),
        ("charge_id", "123".to_owned()),
    ]);
    let (status, json) = send(offline_app(pool.clone()), request).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["result"], "confirmed");
    assert_eq!(json["data"]["subscription_id"], "gid://shopify/AppSubscription/123");

    let row = ambridge_db::get_shop_settings(&pool, SHOP)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.plan, "BASIC");
    assert_eq!(row.subscription_status, "ACTIVE");
    assert!(row.pending_subscription_id.is_none());
    assert!(row.plan_end_date.is_some());

    // Reloading the return page changes nothing.
    let request = billing_return_request(&[
        ("shop", SHOP.to_owned()),
        ("plan", "BASIC".to_owned()),
        ("charge_id", "123".to_owned()),
    ]);
    let (_, json) = send(offline_app(pool), request).await;
    assert_eq!(json["data"]["result"], "unchanged");
}

#[sqlx::test(migrations = "../../migrations")]
async fn unsolicited_billing_return_grants_nothing(pool: PgPool) {
    seed_shop(&pool, "FREE").await;

    let request = billing_return_request(&[
        ("shop", SHOP.to_owned()),
        ("plan", "PREMIUM".to_owned()),
    ]);
    let (status, json) = send(offline_app(pool.clone()), request).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["result"], "needs_manual_sync");
    assert_eq!(json["data"]["plan"], "FREE");

    let row = ambridge_db::get_shop_settings(&pool, SHOP)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.plan, "FREE");
    assert!(row.subscription_id.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn billing_return_for_other_plan_or_charge_keeps_checkout_pending(pool: PgPool) {
    start_checkout(&pool, "BASIC", 124).await;

    for params in [
        [
            ("shop", SHOP.to_owned()),
            ("plan", "PREMIUM".to_owned()),
            ("charge_id", "124".to_owned()),
        ],
        [
            ("shop", SHOP.to_owned()),
            ("plan", "BASIC".to_owned()),
            ("charge_id", "999".to_owned()),
        ],
    ] {
        let (status, json) = send(offline_app(pool.clone()), billing_return_request(&params)).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["data"]["result"], "needs_manual_sync");
    }

    let row = ambridge_db::get_shop_settings(&pool, SHOP)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.plan, "FREE");
    assert_eq!(row.subscription_status, "PENDING");
    assert_eq!(row.pending_plan.as_deref(), Some("BASIC"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn billing_return_without_plan_needs_manual_sync(pool: PgPool) {
    let request = Request::builder()
        .uri(format!("/billing/return?shop={SHOP}"))
        .body(Body::empty())
        .expect("request");
    let (status, json) = send(offline_app(pool.clone()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["result"], "needs_manual_sync");

    let request = Request::builder()
        .uri(format!("/billing/return?shop={SHOP}&plan=GOLD"))
        .body(Body::empty())
        .expect("request");
    let (status, _) = send(offline_app(pool), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_adopts_active_platform_subscription(pool: PgPool) {
    let shopify = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("GetActiveSubscriptions"))
        .respond_with(shopify_ok(json!({
            "app": { "installation": { "activeSubscriptions": [ {
                "id": "gid://shopify/AppSubscription/31",
                "name": "Premium Plan",
                "status": "ACTIVE",
                "lineItems": [ { "plan": { "pricingDetails": {
                    "price": { "amount": "19.99", "currencyCode": "USD" },
                    "interval": "EVERY_30_DAYS"
                } } } ]
            } ] } }
        })))
        .mount(&shopify)
        .await;

    let app = test_app(pool.clone(), UNREACHABLE, &shopify.uri());
    let (status, json) = send(app, shop_request("POST", "/api/v1/billing/sync", None)).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["plan"], "PREMIUM");
    assert_eq!(json["data"]["match_kind"], "exact");
    assert_eq!(json["data"]["subscription_id"], "gid://shopify/AppSubscription/31");
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_without_active_subscription_is_free(pool: PgPool) {
    seed_shop(&pool, "PRO").await;
    let shopify = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(shopify_ok(json!({
            "app": { "installation": { "activeSubscriptions": [] } }
        })))
        .mount(&shopify)
        .await;

    let app = test_app(pool, UNREACHABLE, &shopify.uri());
    let (status, json) = send(app, shop_request("POST", "/api/v1/billing/sync", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["plan"], "FREE");
    assert_eq!(json["data"]["status"], "ACTIVE");
}

// -------------------------------------------------------------------------
// Webhooks
// -------------------------------------------------------------------------

fn subscription_payload(id: &str, status: &str, amount: Option<&str>) -> Value {
    let line_items = amount.map_or_else(
        || json!([]),
        |amount| json!([ { "plan": { "pricing_details": { "price": { "amount": amount } } } } ]),
    );
    json!({
        "app_subscription": {
            "admin_graphql_api_id": id,
            "name": "Pro Plan",
            "status": status,
            "updated_at": "2026-10-19T10:00:00Z",
            "line_items": line_items
        }
    })
}

#[sqlx::test(migrations = "../../migrations")]
async fn webhook_without_token_is_unauthorized(pool: PgPool) {
    let body = subscription_payload("gid://shopify/AppSubscription/1", "ACTIVE", Some("9.99"));
    let (status, _) = send(
        offline_app(pool.clone()),
        webhook_request("/webhooks/app/subscriptions_update", None, &body),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        offline_app(pool),
        webhook_request("/webhooks/app/subscriptions_update", Some("wrong"), &body),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../migrations")]
async fn subscription_webhooks_drive_the_lifecycle(pool: PgPool) {
    let uri = "/webhooks/app/subscriptions_update";
    let active_id = "gid://shopify/AppSubscription/10";

    let body = subscription_payload(active_id, "ACTIVE", Some("9.99"));
    let (status, json) =
        send(offline_app(pool.clone()), webhook_request(uri, Some(WEBHOOK_SECRET), &body)).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["result"], "applied");

    // Redelivery is a no-op.
    let (_, json) =
        send(offline_app(pool.clone()), webhook_request(uri, Some(WEBHOOK_SECRET), &body)).await;
    assert_eq!(json["data"]["result"], "ignored");

    // Cancellation of some older subscription does not touch the active one.
    let stale = subscription_payload("gid://shopify/AppSubscription/9", "CANCELLED", None);
    let (_, json) =
        send(offline_app(pool.clone()), webhook_request(uri, Some(WEBHOOK_SECRET), &stale)).await;
    assert_eq!(json["data"]["result"], "ignored");

    let row = ambridge_db::get_shop_settings(&pool, SHOP)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.plan, "PRO");
    assert_eq!(row.subscription_status, "ACTIVE");

    let cancel = subscription_payload(active_id, "CANCELLED", None);
    let (_, json) =
        send(offline_app(pool.clone()), webhook_request(uri, Some(WEBHOOK_SECRET), &cancel)).await;
    assert_eq!(json["data"]["result"], "applied");
    let row = ambridge_db::get_shop_settings(&pool, SHOP)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.subscription_status, "CANCELLING");
    assert_eq!(row.plan, "PRO");
}

#[sqlx::test(migrations = "../../migrations")]
async fn active_webhook_without_amount_is_rejected(pool: PgPool) {
    let body = subscription_payload("gid://shopify/AppSubscription/4", "ACTIVE", None);
    let (status, json) = send(
        offline_app(pool),
        webhook_request(
            "/webhooks/app/subscriptions_update",
            Some(WEBHOOK_SECRET),
            &body,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
}

#[sqlx::test(migrations = "../../migrations")]
async fn pending_webhook_is_acknowledged_without_change(pool: PgPool) {
    let body = subscription_payload("gid://shopify/AppSubscription/5", "PENDING", Some("4.99"));
    let (status, json) = send(
        offline_app(pool.clone()),
        webhook_request(
            "/webhooks/app/subscriptions_update",
            Some(WEBHOOK_SECRET),
            &body,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["result"], "ignored");
    let row = ambridge_db::get_shop_settings(&pool, SHOP).await.expect("query");
    assert!(row.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn shop_redact_removes_settings_and_import_log(pool: PgPool) {
    seed_shop(&pool, "BASIC").await;
    seed_imports(&pool, 3).await;

    let (status, _) = send(
        offline_app(pool.clone()),
        webhook_request(
            "/webhooks/shop/redact",
            Some(WEBHOOK_SECRET),
            &json!({ "shop_id": 1, "shop_domain": SHOP }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(ambridge_db::get_shop_settings(&pool, SHOP)
        .await
        .expect("query")
        .is_none());
    assert_eq!(
        ambridge_db::count_imported_products(&pool, SHOP)
            .await
            .expect("count"),
        0
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn uninstall_keeps_import_log(pool: PgPool) {
    seed_shop(&pool, "FREE").await;
    seed_imports(&pool, 2).await;

    let (status, _) = send(
        offline_app(pool.clone()),
        webhook_request("/webhooks/app/uninstalled", Some(WEBHOOK_SECRET), &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(ambridge_db::get_shop_settings(&pool, SHOP)
        .await
        .expect("query")
        .is_none());
    assert_eq!(
        ambridge_db::count_imported_products(&pool, SHOP)
            .await
            .expect("count"),
        2
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn customer_privacy_webhooks_acknowledge(pool: PgPool) {
    for uri in ["/webhooks/customers/data_request", "/webhooks/customers/redact"] {
        let (status, json) = send(
            offline_app(pool.clone()),
            webhook_request(uri, Some(WEBHOOK_SECRET), &json!({ "customer": { "id": 1 } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(json["data"]["result"], "acknowledged");
    }
}

// -------------------------------------------------------------------------
// Settings
// -------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn settings_defaults_on_first_contact(pool: PgPool) {
    let (status, json) =
        send(offline_app(pool), shop_request("GET", "/api/v1/settings", None)).await;
    assert_eq!(status, StatusCode::OK);
    let data = &json["data"];
    assert_eq!(data["pricing_mode"], "MULTIPLIER");
    let value: rust_decimal::Decimal = data["pricing_value"]
        .as_str()
        .expect("decimal string")
        .parse()
        .expect("decimal");
    assert_eq!(value, rust_decimal::Decimal::new(15, 1));
    assert_eq!(data["default_import_mode"], "DROPSHIPPING");
    assert_eq!(data["buy_button_position"], "AFTER_BUY_NOW");
    assert_eq!(data["affiliate_available"], false);
    assert_eq!(data["terms_accepted"], false);
}

#[sqlx::test(migrations = "../../migrations")]
async fn free_plan_cannot_enable_affiliate_mode(pool: PgPool) {
    let (status, json) = send(
        offline_app(pool),
        shop_request(
            "PUT",
            "/api/v1/settings",
            Some(json!({ "affiliate_mode_enabled": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "feature_unavailable");
}

#[sqlx::test(migrations = "../../migrations")]
async fn settings_update_persists_valid_patch(pool: PgPool) {
    seed_shop(&pool, "BASIC").await;
    let (status, json) = send(
        offline_app(pool.clone()),
        shop_request(
            "PUT",
            "/api/v1/settings",
            Some(json!({
                "pricing_mode": "FIXED",
                "pricing_value": "5",
                "affiliate_id": "store-20",
                "affiliate_mode_enabled": true,
                "buy_button_text": "View on Amazon"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["pricing_mode"], "FIXED");
    assert_eq!(json["data"]["affiliate_id"], "store-20");
    assert_eq!(json["data"]["buy_button_text"], "View on Amazon");

    let (status, json) = send(
        offline_app(pool),
        shop_request(
            "PUT",
            "/api/v1/settings",
            Some(json!({ "pricing_mode": "MULTIPLIER", "pricing_value": "0.5" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
}

#[sqlx::test(migrations = "../../migrations")]
async fn accepting_terms_records_timestamp(pool: PgPool) {
    let (status, json) = send(
        offline_app(pool),
        shop_request("POST", "/api/v1/settings/terms", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["terms_accepted"], true);
    assert!(json["data"]["terms_accepted_at"].is_string());
}
