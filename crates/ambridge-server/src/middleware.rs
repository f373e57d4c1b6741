//! Request-scoped layers: request ids, bearer auth for the merchant API,
//! shared-secret auth for platform webhooks and a per-shop rate limit.
//!
//! Rejections use the same `ApiError` envelope as the handlers, so every
//! layer here expects [`request_id`] to run first.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{ApiError, SHOP_DOMAIN_HEADER};

/// Header carrying the shared webhook secret.
pub const WEBHOOK_TOKEN_HEADER: &str = "x-ambridge-webhook-token";

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Request id stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map_or_else(String::new, |id| id.0.clone())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Bearer tokens accepted on the merchant API.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<[String]>,
    pub enabled: bool,
}

impl AuthState {
    /// Reads `AMBRIDGE_API_KEYS` (comma-separated).
    ///
    /// # Errors
    ///
    /// Fails outside development when no key is configured.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("AMBRIDGE_API_KEYS").unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// # Errors
    ///
    /// Fails outside development when `raw` holds no key.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let keys: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if keys.is_empty() && !is_development {
            anyhow::bail!("AMBRIDGE_API_KEYS must list at least one bearer token outside development");
        }
        if keys.is_empty() {
            tracing::warn!("AMBRIDGE_API_KEYS not set; merchant API is unauthenticated");
        }

        Ok(Self {
            enabled: !keys.is_empty(),
            api_keys: keys.into(),
        })
    }

    /// Checks every key so timing does not reveal which one matched.
    fn allows(&self, token: &str) -> bool {
        self.api_keys
            .iter()
            .fold(false, |found, key| constant_time_eq(key, token) | found)
    }
}

/// Shared-secret check for platform webhooks.
///
/// With no secret configured (development only) every delivery is accepted.
#[derive(Debug, Clone)]
pub struct WebhookAuth {
    secret: Option<Arc<str>>,
}

impl WebhookAuth {
    #[must_use]
    pub fn new(secret: Option<&str>) -> Self {
        let secret = secret.map(str::trim).filter(|s| !s.is_empty());
        if secret.is_none() {
            tracing::warn!("AMBRIDGE_WEBHOOK_SECRET not set; webhook authentication disabled");
        }
        Self {
            secret: secret.map(Arc::from),
        }
    }

    fn verify(&self, presented: Option<&str>) -> bool {
        match &self.secret {
            None => true,
            Some(secret) => presented.is_some_and(|p| constant_time_eq(p, secret)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: usize,
}

/// Fixed-window request budget per shop.
///
/// Requests without a shop header share one bucket. Windows older than the
/// period are dropped whenever the map is touched.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    period: Duration,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, period: Duration) -> Self {
        Self {
            max_requests,
            period,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Counts one request for `bucket`; `false` once the budget is spent.
    async fn admit(&self, bucket: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| now.duration_since(w.started_at) < self.period);

        let window = windows.entry(bucket.to_owned()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if window.count >= self.max_requests {
            return false;
        }
        window.count += 1;
        true
    }
}

/// Reuses a sane inbound `x-request-id`, otherwise generates a `UUIDv4`.
/// The id is stored as [`RequestId`] and echoed on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned);

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    res
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match bearer_token(req.headers()) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => ApiError::new(
            request_id_of(&req),
            "unauthorized",
            "missing or invalid bearer token",
        )
        .into_response(),
    }
}

pub async fn require_webhook_token(
    State(auth): State<WebhookAuth>,
    req: Request,
    next: Next,
) -> Response {
    let presented = req
        .headers()
        .get(WEBHOOK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    if auth.verify(presented) {
        return next.run(req).await;
    }

    tracing::warn!(path = %req.uri().path(), "rejected webhook with invalid token");
    ApiError::new(
        request_id_of(&req),
        "unauthorized",
        "missing or invalid webhook token",
    )
    .into_response()
}

pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let bucket = req
        .headers()
        .get(SHOP_DOMAIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(String::new, |shop| shop.trim().to_ascii_lowercase());

    if rate_limit.admit(&bucket, Instant::now()).await {
        return next.run(req).await;
    }

    tracing::info!(shop = %bucket, "rate limit exceeded");
    ApiError::new(request_id_of(&req), "rate_limited", "rate limit exceeded").into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
