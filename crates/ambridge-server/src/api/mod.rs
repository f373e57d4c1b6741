mod billing;
mod products;
mod settings;
mod webhooks;

use std::{sync::Arc, time::Duration};

use ambridge_core::{
    check_product_limit, AppConfig, Plan, PlanCatalog, PlanName, ProductLimitCheck,
    SubscriptionState,
};
use ambridge_db::ShopSettingsRow;
use ambridge_scraper::{AmazonClient, ScraperError};
use ambridge_shopify::{normalize_shop_domain, AdminClient, AdminConnector, ShopifyError};
use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::lifecycle;
use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, require_webhook_token, AuthState,
    RateLimitState, RequestId, WebhookAuth,
};

pub(crate) const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";
pub(crate) const ACCESS_TOKEN_HEADER: &str = "x-shopify-access-token";

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub catalog: Arc<PlanCatalog>,
    pub amazon: Arc<AmazonClient>,
    pub shopify: AdminConnector,
}

impl AppState {
    /// Catalog entry for `name`; the standard catalog has every plan.
    pub(super) fn plan(&self, request_id: &str, name: PlanName) -> Result<&Plan, ApiError> {
        self.catalog.get(name).ok_or_else(|| {
            tracing::error!(plan = %name, "plan missing from catalog");
            ApiError::new(request_id, "internal_error", "plan catalog is incomplete")
        })
    }
}

/// A shop's settings row with due subscription transitions applied.
pub(super) struct ShopAccount {
    pub row: ShopSettingsRow,
    pub subscription: SubscriptionState,
    pub plan: Plan,
}

pub(super) async fn load_account(
    state: &AppState,
    request_id: &str,
    shop: &str,
) -> Result<ShopAccount, ApiError> {
    let (row, subscription) = lifecycle::refresh(&state.pool, shop, Utc::now())
        .await
        .map_err(|e| map_db_error(request_id.to_owned(), &e))?;
    let plan = state.plan(request_id, subscription.plan)?.clone();
    Ok(ShopAccount {
        row,
        subscription,
        plan,
    })
}

/// Live usage for the gate; counted on every call, never cached.
pub(super) async fn current_usage(
    state: &AppState,
    request_id: &str,
    shop: &str,
    plan: &Plan,
) -> Result<ProductLimitCheck, ApiError> {
    let count = ambridge_db::count_imported_products(&state.pool, shop)
        .await
        .map_err(|e| map_db_error(request_id.to_owned(), &e))?;
    Ok(check_product_limit(plan, count))
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(request_id: String, data: T) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" | "plan_limit_reached" | "feature_unavailable" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_db_error(request_id: String, error: &ambridge_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_scraper_error(request_id: String, error: &ScraperError) -> ApiError {
    let code = if error.is_input_error() {
        tracing::info!(error = %error, "rejected product URL");
        "bad_request"
    } else {
        tracing::warn!(error = %error, code = error.code(), "product fetch failed");
        "upstream_error"
    };
    ApiError::new(request_id, code, error.to_string())
        .with_details(serde_json::json!({ "fetch_error": error.code() }))
}

pub(super) fn map_shopify_error(request_id: String, error: &ShopifyError) -> ApiError {
    if let ShopifyError::InvalidShop(_) = error {
        return ApiError::new(request_id, "bad_request", error.to_string());
    }
    tracing::warn!(error = %error, "shopify request failed");
    ApiError::new(request_id, "upstream_error", error.to_string())
}

pub(super) fn plan_limit_error(request_id: String, usage: &ProductLimitCheck) -> ApiError {
    ApiError::new(request_id, "plan_limit_reached", usage.denial_message())
        .with_details(serde_json::json!({ "usage": usage }))
}

/// The shop a request acts for, from the embedded-app session headers.
#[derive(Debug, Clone)]
pub struct ShopContext {
    pub shop: String,
    access_token: Option<String>,
}

impl ShopContext {
    /// Admin API client for this shop; needs the access token header.
    pub(super) fn admin_client(
        &self,
        state: &AppState,
        request_id: &str,
    ) -> Result<AdminClient, ApiError> {
        let token = self.access_token.as_deref().ok_or_else(|| {
            ApiError::new(
                request_id,
                "unauthorized",
                "missing X-Shopify-Access-Token header",
            )
        })?;
        state
            .shopify
            .client_for(&self.shop, token)
            .map_err(|e| map_shopify_error(request_id.to_owned(), &e))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ShopContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_default();
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let shop = header(SHOP_DOMAIN_HEADER).ok_or_else(|| {
            ApiError::new(
                request_id.clone(),
                "bad_request",
                "missing X-Shopify-Shop-Domain header",
            )
        })?;
        let shop = normalize_shop_domain(shop)
            .map_err(|e| ApiError::new(request_id.clone(), "bad_request", e.to_string()))?;

        Ok(Self {
            shop,
            access_token: header(ACCESS_TOKEN_HEADER).map(str::to_owned),
        })
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static(SHOP_DOMAIN_HEADER),
            HeaderName::from_static(ACCESS_TOKEN_HEADER),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/plans", get(list_plans))
        .route("/api/v1/products", get(products::list_imported))
        .route("/api/v1/products/preview", post(products::preview_product))
        .route("/api/v1/products/import", post(products::import_product))
        .route("/api/v1/billing/status", get(billing::billing_status))
        .route("/api/v1/billing/subscribe", post(billing::subscribe))
        .route("/api/v1/billing/sync", post(billing::sync_subscription))
        .route("/api/v1/billing/cancel", post(billing::cancel_subscription))
        .route(
            "/api/v1/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/api/v1/settings/terms", post(settings::accept_terms))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

fn webhook_router(webhooks: WebhookAuth) -> Router<AppState> {
    Router::new()
        .route(
            "/webhooks/app/subscriptions_update",
            post(webhooks::subscriptions_update),
        )
        .route("/webhooks/app/uninstalled", post(webhooks::app_uninstalled))
        .route("/webhooks/shop/redact", post(webhooks::shop_redact))
        .route(
            "/webhooks/customers/data_request",
            post(webhooks::customers_acknowledge),
        )
        .route(
            "/webhooks/customers/redact",
            post(webhooks::customers_acknowledge),
        )
        .layer(axum::middleware::from_fn_with_state(
            webhooks,
            require_webhook_token,
        ))
}

pub fn build_app(
    state: AppState,
    auth: AuthState,
    webhooks: WebhookAuth,
    rate_limit: RateLimitState,
) -> Router {
    let public_routes = Router::new()
        .route("/api/v1/health", get(health))
        .route("/billing/return", get(billing::billing_return));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .merge(webhook_router(webhooks))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match ambridge_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

async fn list_plans(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<Plan>>> {
    ApiResponse::new(req_id.0, state.catalog.plans().to_vec())
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
mod tests;
