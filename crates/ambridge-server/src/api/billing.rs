use ambridge_core::{
    map_amount_to_plan, AmountMatchKind, BillingEvent, PlanFeatures, PlanName, ProductLimitCheck,
    SubscriptionState, SubscriptionStatus, TransitionOutcome, BILLING_INTERVAL,
};
use ambridge_shopify::{normalize_shop_domain, SubscriptionRequest};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::lifecycle;
use crate::middleware::RequestId;

use super::{
    current_usage, load_account, map_db_error, map_shopify_error, ApiError, ApiResponse,
    AppState, ShopContext,
};

const BILLING_CURRENCY: &str = "USD";
const BILLING_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub(super) struct SubscribeRequest {
    plan: PlanName,
}

#[derive(Debug, Serialize)]
pub(super) struct SubscribeData {
    plan: PlanName,
    status: SubscriptionStatus,
    pending_plan: Option<PlanName>,
    /// Where the merchant approves the charge; absent for FREE.
    confirmation_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct BillingReturnQuery {
    shop: Option<String>,
    plan: Option<String>,
    charge_id: Option<String>,
    host: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct BillingReturnData {
    shop: String,
    /// `confirmed`, `unchanged` or `needs_manual_sync`.
    result: &'static str,
    plan: Option<PlanName>,
    subscription_id: Option<String>,
    redirect_to: String,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncData {
    plan: PlanName,
    status: SubscriptionStatus,
    subscription_id: Option<String>,
    amount: Option<Decimal>,
    match_kind: Option<AmountMatchKind>,
    outcome: TransitionOutcome,
}

#[derive(Debug, Serialize)]
pub(super) struct BillingStatusData {
    plan: PlanName,
    plan_display_name: String,
    status: SubscriptionStatus,
    subscription_id: Option<String>,
    pending_plan: Option<PlanName>,
    plan_start_date: DateTime<Utc>,
    plan_end_date: Option<DateTime<Utc>>,
    usage: ProductLimitCheck,
    features: PlanFeatures,
}

/// `{app_url}/billing/return?shop=..&plan=..&host=..` where `host` is the
/// base64 of `{shop}/admin`.
pub(super) fn return_url(app_url: &str, shop: &str, plan: PlanName) -> Option<String> {
    let mut url = Url::parse(&format!("{}/billing/return", app_url.trim_end_matches('/'))).ok()?;
    url.query_pairs_mut()
        .append_pair("shop", shop)
        .append_pair("plan", plan.as_str())
        .append_pair("host", &STANDARD.encode(format!("{shop}/admin")));
    Some(url.into())
}

/// Recovers the shop domain from the embedded-app `host` parameter.
pub(super) fn shop_from_host(host: &str) -> Option<String> {
    let decoded = STANDARD.decode(host.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let shop = decoded.split("/admin").next()?.trim();
    (!shop.is_empty()).then(|| shop.to_owned())
}

/// Numeric charge ids from the return redirect are turned into the GraphQL
/// id that webhooks and the creation response carry.
pub(super) fn confirmed_subscription_id(charge_id: Option<&str>) -> Option<String> {
    let id = charge_id.map(str::trim).filter(|id| !id.is_empty())?;
    if id.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("gid://shopify/AppSubscription/{id}"))
    } else {
        Some(id.to_owned())
    }
}

/// A repeated return for a checkout that already went through.
fn already_confirmed(state: &SubscriptionState, plan: PlanName, charge_id: Option<&str>) -> bool {
    state.status == SubscriptionStatus::Active
        && state.plan == plan
        && state.subscription_id.is_some()
        && charge_id.is_none_or(|id| state.subscription_id.as_deref() == Some(id))
}

pub(super) async fn subscribe(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ctx: ShopContext,
    Json(body): Json<SubscribeRequest>,
) -> Result<Json<ApiResponse<SubscribeData>>, ApiError> {
    let account = load_account(&state, &req_id.0, &ctx.shop).await?;

    if !body.plan.is_paid() {
        if let Some(id) = account
            .subscription
            .subscription_id
            .as_deref()
            .filter(|_| account.subscription.plan.is_paid())
        {
            match ctx.admin_client(&state, &req_id.0) {
                Ok(client) => {
                    if let Err(e) = client.cancel_subscription(id).await {
                        tracing::warn!(shop = %ctx.shop, subscription_id = %id, error = %e, "failed to cancel paid subscription on downgrade");
                    }
                }
                Err(_) => {
                    tracing::warn!(shop = %ctx.shop, subscription_id = %id, "no access token; paid subscription left on platform");
                }
            }
        }

        let transition = lifecycle::apply_event(
            &state.pool,
            &ctx.shop,
            BillingEvent::DowngradeRequested,
            Utc::now(),
        )
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

        return Ok(ApiResponse::new(
            req_id.0,
            SubscribeData {
                plan: transition.state.plan,
                status: transition.state.status,
                pending_plan: transition.state.pending_plan,
                confirmation_url: None,
            },
        ));
    }

    let client = ctx.admin_client(&state, &req_id.0)?;
    let plan = state.plan(&req_id.0, body.plan)?;
    let return_url = return_url(&state.config.app_url, &ctx.shop, plan.name).ok_or_else(|| {
        tracing::error!(app_url = %state.config.app_url, "APP_URL is not a valid URL");
        ApiError::new(req_id.0.clone(), "internal_error", "billing return URL is invalid")
    })?;

    let request = SubscriptionRequest {
        name: plan.display_name.clone(),
        price: plan.price,
        currency_code: BILLING_CURRENCY.to_owned(),
        interval: BILLING_INTERVAL.to_owned(),
        return_url,
        test: !state.config.env.is_production(),
    };
    let created = client
        .create_subscription(&request)
        .await
        .map_err(|e| map_shopify_error(req_id.0.clone(), &e))?;

    let transition = lifecycle::apply_event(
        &state.pool,
        &ctx.shop,
        BillingEvent::CreationRequested {
            plan: plan.name,
            subscription_id: created.id,
        },
        Utc::now(),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        req_id.0,
        SubscribeData {
            plan: transition.state.plan,
            status: transition.state.status,
            pending_plan: transition.state.pending_plan,
            confirmation_url: Some(created.confirmation_url),
        },
    ))
}

/// Landing point after the merchant approves a charge.
pub(super) async fn billing_return(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<BillingReturnQuery>,
) -> Result<Json<ApiResponse<BillingReturnData>>, ApiError> {
    let raw_shop = query
        .shop
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .or_else(|| query.host.as_deref().and_then(shop_from_host))
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "bad_request", "missing shop parameter"))?;
    let shop = normalize_shop_domain(&raw_shop)
        .map_err(|e| ApiError::new(req_id.0.clone(), "bad_request", e.to_string()))?;
    let redirect_to = format!("https://{shop}/admin/apps");

    let Some(raw_plan) = query.plan.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
        tracing::warn!(shop = %shop, "billing return without plan; manual sync required");
        return Ok(ApiResponse::new(
            req_id.0,
            BillingReturnData {
                shop,
                result: "needs_manual_sync",
                plan: None,
                subscription_id: None,
                redirect_to,
            },
        ));
    };
    let plan: PlanName = raw_plan
        .parse()
        .map_err(|e: ambridge_core::CoreError| {
            ApiError::new(req_id.0.clone(), "bad_request", e.to_string())
        })?;

    let now = Utc::now();
    let charge_id = confirmed_subscription_id(query.charge_id.as_deref());
    let transition = lifecycle::apply_event(
        &state.pool,
        &shop,
        BillingEvent::ConfirmationReceived {
            plan,
            subscription_id: charge_id.clone(),
            plan_end_date: Some(now + Duration::days(BILLING_PERIOD_DAYS)),
        },
        now,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let result = match transition.outcome {
        TransitionOutcome::Applied => "confirmed",
        TransitionOutcome::Ignored
            if already_confirmed(&transition.state, plan, charge_id.as_deref()) =>
        {
            "unchanged"
        }
        TransitionOutcome::Ignored => {
            tracing::warn!(
                shop = %shop,
                plan = %plan,
                status = %transition.state.status,
                "billing return matches no pending checkout; manual sync required"
            );
            "needs_manual_sync"
        }
    };
    Ok(ApiResponse::new(
        req_id.0,
        BillingReturnData {
            shop,
            result,
            plan: Some(transition.state.plan),
            subscription_id: transition.state.subscription_id,
            redirect_to,
        },
    ))
}

/// Reads the platform's active subscriptions and adopts the first one.
pub(super) async fn sync_subscription(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ctx: ShopContext,
) -> Result<Json<ApiResponse<SyncData>>, ApiError> {
    let client = ctx.admin_client(&state, &req_id.0)?;
    let active = client
        .active_subscriptions()
        .await
        .map_err(|e| map_shopify_error(req_id.0.clone(), &e))?;

    let (event, amount, match_kind) = match active.first() {
        None => (BillingEvent::ManualReconciliation { active: None }, None, None),
        Some(subscription) => {
            let amount = subscription.amount().unwrap_or(Decimal::ZERO);
            let matched = map_amount_to_plan(&state.catalog, amount);
            (
                BillingEvent::ManualReconciliation {
                    active: Some((matched.plan, subscription.id.clone())),
                },
                Some(amount),
                Some(matched.kind),
            )
        }
    };

    let transition = lifecycle::apply_event(&state.pool, &ctx.shop, event, Utc::now())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        req_id.0,
        SyncData {
            plan: transition.state.plan,
            status: transition.state.status,
            subscription_id: transition.state.subscription_id,
            amount,
            match_kind,
            outcome: transition.outcome,
        },
    ))
}

/// Cancels the stored paid subscription, then downgrades to FREE.
pub(super) async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ctx: ShopContext,
) -> Result<Json<ApiResponse<SubscribeData>>, ApiError> {
    let account = load_account(&state, &req_id.0, &ctx.shop).await?;

    if let Some(id) = account
        .subscription
        .subscription_id
        .as_deref()
        .filter(|_| account.subscription.plan.is_paid())
    {
        let client = ctx.admin_client(&state, &req_id.0)?;
        client
            .cancel_subscription(id)
            .await
            .map_err(|e| map_shopify_error(req_id.0.clone(), &e))?;
        tracing::info!(shop = %ctx.shop, subscription_id = %id, "paid subscription cancelled");
    }

    let transition = lifecycle::apply_event(
        &state.pool,
        &ctx.shop,
        BillingEvent::DowngradeRequested,
        Utc::now(),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        req_id.0,
        SubscribeData {
            plan: transition.state.plan,
            status: transition.state.status,
            pending_plan: transition.state.pending_plan,
            confirmation_url: None,
        },
    ))
}

pub(super) async fn billing_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ctx: ShopContext,
) -> Result<Json<ApiResponse<BillingStatusData>>, ApiError> {
    let account = load_account(&state, &req_id.0, &ctx.shop).await?;
    let usage = current_usage(&state, &req_id.0, &ctx.shop, &account.plan).await?;
    let subscription = account.subscription;

    Ok(ApiResponse::new(
        req_id.0,
        BillingStatusData {
            plan: subscription.plan,
            plan_display_name: account.plan.display_name,
            status: subscription.status,
            subscription_id: subscription.subscription_id,
            pending_plan: subscription.pending_plan,
            plan_start_date: subscription.plan_start_date,
            plan_end_date: subscription.plan_end_date,
            usage,
            features: account.plan.features,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_url_carries_shop_plan_and_encoded_host() {
        let url = return_url("https://app.example.com/", "demo.myshopify.com", PlanName::Pro)
            .expect("valid url");
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/billing/return");
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("shop".into(), "demo.myshopify.com".into()));
        assert_eq!(pairs[1], ("plan".into(), "PRO".into()));
        assert_eq!(pairs[2].1, STANDARD.encode("demo.myshopify.com/admin"));
    }

    #[test]
    fn return_url_rejects_garbage_app_url() {
        assert!(return_url("not a url", "demo.myshopify.com", PlanName::Basic).is_none());
    }

    #[test]
    fn shop_from_host_takes_text_before_admin() {
        let host = STANDARD.encode("demo.myshopify.com/admin");
        assert_eq!(shop_from_host(&host).as_deref(), Some("demo.myshopify.com"));
        assert_eq!(shop_from_host("%%%"), None);
    }

    #[test]
    fn numeric_charge_id_becomes_graphql_id() {
        assert_eq!(
            confirmed_subscription_id(Some("28417")).as_deref(),
            Some("gid://shopify/AppSubscription/28417")
        );
        assert_eq!(
            confirmed_subscription_id(Some("gid://shopify/AppSubscription/9")).as_deref(),
            Some("gid://shopify/AppSubscription/9")
        );
        assert_eq!(confirmed_subscription_id(Some("  ")), None);
        assert_eq!(confirmed_subscription_id(None), None);
    }

    #[test]
    fn repeated_return_counts_as_confirmed_only_for_the_active_plan() {
        let mut state = SubscriptionState::new_free(Utc::now());
        assert!(!already_confirmed(&state, PlanName::Free, None));

        state.plan = PlanName::Pro;
        state.subscription_id = Some("gid://shopify/AppSubscription/7".to_owned());
        assert!(already_confirmed(&state, PlanName::Pro, None));
        assert!(already_confirmed(
            &state,
            PlanName::Pro,
            Some("gid://shopify/AppSubscription/7")
        ));
        assert!(!already_confirmed(&state, PlanName::Premium, None));
        assert!(!already_confirmed(
            &state,
            PlanName::Pro,
            Some("gid://shopify/AppSubscription/8")
        ));
    }
}
