//! Platform webhook receivers.
//!
//! Every handler is safe to re-run: duplicate deliveries re-apply the same
//! transition or delete rows that are already gone. Database failures return
//! 500 so the platform retries.

use ambridge_core::{map_amount_to_plan, BillingEvent, TransitionOutcome};
use ambridge_scraper::parse_price;
use ambridge_shopify::normalize_shop_domain;
use axum::{extract::State, http::HeaderMap, Extension, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lifecycle;
use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, SHOP_DOMAIN_HEADER};

#[derive(Debug, Deserialize)]
struct SubscriptionWebhook {
    app_subscription: AppSubscriptionPayload,
}

#[derive(Debug, Deserialize)]
struct AppSubscriptionPayload {
    admin_graphql_api_id: String,
    #[serde(default)]
    name: Option<String>,
    status: String,
    #[serde(default)]
    current_period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    line_items: Vec<Value>,
    #[serde(default)]
    price: Option<Value>,
}

impl AppSubscriptionPayload {
    /// Recurring amount from the first line item, else the top-level price.
    fn amount(&self) -> Decimal {
        let from_line_item = self
            .line_items
            .first()
            .and_then(|item| item.pointer("/plan/pricing_details/price/amount"))
            .map(|v| parse_price(Some(v)))
            .filter(|amount| *amount > Decimal::ZERO);
        from_line_item.unwrap_or_else(|| parse_price(self.price.as_ref()))
    }
}

#[derive(Debug, Serialize)]
pub(super) struct WebhookAck {
    topic: &'static str,
    shop: Option<String>,
    /// `applied`, `ignored` or `acknowledged`.
    result: &'static str,
}

fn ack(
    req_id: String,
    topic: &'static str,
    shop: Option<String>,
    result: &'static str,
) -> Json<ApiResponse<WebhookAck>> {
    ApiResponse::new(req_id, WebhookAck { topic, shop, result })
}

/// Shop from the delivery header, falling back to the payload.
fn webhook_shop(
    request_id: &str,
    headers: &HeaderMap,
    payload: &Value,
) -> Result<String, ApiError> {
    let raw = headers
        .get(SHOP_DOMAIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| payload.get("shop_domain").and_then(Value::as_str))
        .or_else(|| payload.get("myshopify_domain").and_then(Value::as_str))
        .ok_or_else(|| {
            ApiError::new(request_id, "bad_request", "webhook carries no shop domain")
        })?;

    normalize_shop_domain(raw)
        .map_err(|e| ApiError::new(request_id, "bad_request", e.to_string()))
}

fn outcome_label(outcome: TransitionOutcome) -> &'static str {
    match outcome {
        TransitionOutcome::Applied => "applied",
        TransitionOutcome::Ignored => "ignored",
    }
}

pub(super) async fn subscriptions_update(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<ApiResponse<WebhookAck>>, ApiError> {
    const TOPIC: &str = "app_subscriptions/update";

    let shop = webhook_shop(&req_id.0, &headers, &payload)?;
    let webhook: SubscriptionWebhook = serde_json::from_value(payload).map_err(|e| {
        ApiError::new(req_id.0.clone(), "bad_request", format!("invalid subscription payload: {e}"))
    })?;
    let subscription = webhook.app_subscription;
    let status = subscription.status.trim().to_ascii_uppercase();

    tracing::info!(
        shop = %shop,
        subscription_id = %subscription.admin_graphql_api_id,
        name = subscription.name.as_deref().unwrap_or_default(),
        status = %status,
        "subscription webhook received"
    );

    let event = match status.as_str() {
        "ACTIVE" => {
            let amount = subscription.amount();
            if amount <= Decimal::ZERO {
                return Err(ApiError::new(
                    req_id.0,
                    "validation_error",
                    "active subscription webhook carries no price amount",
                ));
            }
            let matched = map_amount_to_plan(&state.catalog, amount);
            BillingEvent::PlatformWebhookActive {
                plan: matched.plan,
                subscription_id: subscription.admin_graphql_api_id,
                plan_end_date: subscription.current_period_end,
            }
        }
        "CANCELLED" | "EXPIRED" | "DECLINED" | "FROZEN" => BillingEvent::PlatformWebhookCancelled {
            subscription_id: subscription.admin_graphql_api_id,
        },
        _ => {
            tracing::debug!(shop = %shop, status = %status, "subscription status needs no action");
            return Ok(ack(req_id.0, TOPIC, Some(shop), "ignored"));
        }
    };

    let transition = lifecycle::apply_event(&state.pool, &shop, event, Utc::now())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ack(req_id.0, TOPIC, Some(shop), outcome_label(transition.outcome)))
}

pub(super) async fn app_uninstalled(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<ApiResponse<WebhookAck>>, ApiError> {
    let shop = webhook_shop(&req_id.0, &headers, &payload)?;
    let deleted = ambridge_db::delete_shop_settings(&state.pool, &shop)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(shop = %shop, deleted, "app uninstalled; settings removed");

    Ok(ack(req_id.0, "app/uninstalled", Some(shop), "applied"))
}

pub(super) async fn shop_redact(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<ApiResponse<WebhookAck>>, ApiError> {
    let shop = webhook_shop(&req_id.0, &headers, &payload)?;
    let products = ambridge_db::delete_imported_products(&state.pool, &shop)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let settings = ambridge_db::delete_shop_settings(&state.pool, &shop)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(shop = %shop, products, settings, "shop data redacted");

    Ok(ack(req_id.0, "shop/redact", Some(shop), "applied"))
}

/// No customer data is stored, so data requests and redactions only need
/// acknowledging.
pub(super) async fn customers_acknowledge(
    Extension(req_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Json<ApiResponse<WebhookAck>> {
    let shop = webhook_shop(&req_id.0, &headers, &payload).ok();
    tracing::info!(
        shop = shop.as_deref().unwrap_or("unknown"),
        "customer privacy webhook acknowledged"
    );
    ack(req_id.0, "customers", shop, "acknowledged")
}
