//! Database operations for `shop_settings`.
//!
//! One row per shop. Every mutation is a single-row statement keyed by
//! `shop`; there are no multi-row transactions.

use ambridge_core::{
    ImportMode, PlanName, PricingConfig, PricingMode, SubscriptionState, SubscriptionStatus,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

const COLUMNS: &str = "shop, plan, subscription_status, subscription_id, pending_plan, \
     pending_subscription_id, plan_start_date, plan_end_date, status_changed_at, \
     pricing_mode, pricing_value, default_import_mode, affiliate_id, affiliate_mode_enabled, \
     buy_button_enabled, buy_button_text, buy_button_position, terms_accepted, \
     terms_accepted_at, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `shop_settings` table.
///
/// Enum columns are stored as their upper-case names; use the accessor
/// methods to get typed values.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShopSettingsRow {
    pub shop: String,
    pub plan: String,
    pub subscription_status: String,
    pub subscription_id: Option<String>,
    pub pending_plan: Option<String>,
    pub pending_subscription_id: Option<String>,
    pub plan_start_date: DateTime<Utc>,
    pub plan_end_date: Option<DateTime<Utc>>,
    pub status_changed_at: DateTime<Utc>,
    pub pricing_mode: String,
    pub pricing_value: Decimal,
    pub default_import_mode: String,
    pub affiliate_id: Option<String>,
    pub affiliate_mode_enabled: bool,
    pub buy_button_enabled: bool,
    pub buy_button_text: String,
    pub buy_button_position: String,
    pub terms_accepted: bool,
    pub terms_accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShopSettingsRow {
    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if `plan` is not a known plan.
    pub fn plan_name(&self) -> Result<PlanName, DbError> {
        Ok(self.plan.parse()?)
    }

    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if a stored plan or status is unknown.
    pub fn subscription_state(&self) -> Result<SubscriptionState, DbError> {
        Ok(SubscriptionState {
            plan: self.plan.parse()?,
            status: self.subscription_status.parse::<SubscriptionStatus>()?,
            subscription_id: self.subscription_id.clone(),
            pending_plan: self
                .pending_plan
                .as_deref()
                .map(str::parse::<PlanName>)
                .transpose()?,
            pending_subscription_id: self.pending_subscription_id.clone(),
            plan_start_date: self.plan_start_date,
            plan_end_date: self.plan_end_date,
            status_changed_at: self.status_changed_at,
        })
    }

    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if `pricing_mode` is unknown.
    pub fn pricing_config(&self) -> Result<PricingConfig, DbError> {
        Ok(PricingConfig::new(
            self.pricing_mode.parse::<PricingMode>()?,
            self.pricing_value,
        ))
    }

    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if `default_import_mode` is unknown.
    pub fn import_mode(&self) -> Result<ImportMode, DbError> {
        Ok(self.default_import_mode.parse()?)
    }
}

/// Merchant-editable settings, written as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub pricing: PricingConfig,
    pub default_import_mode: ImportMode,
    pub affiliate_id: Option<String>,
    pub affiliate_mode_enabled: bool,
    pub buy_button_enabled: bool,
    pub buy_button_text: String,
    pub buy_button_position: String,
}

impl SettingsUpdate {
    /// The current settings of `row`, as a starting point for a partial edit.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if a stored enum column is unknown.
    pub fn from_row(row: &ShopSettingsRow) -> Result<Self, DbError> {
        Ok(Self {
            pricing: row.pricing_config()?,
            default_import_mode: row.import_mode()?,
            affiliate_id: row.affiliate_id.clone(),
            affiliate_mode_enabled: row.affiliate_mode_enabled,
            buy_button_enabled: row.buy_button_enabled,
            buy_button_text: row.buy_button_text.clone(),
            buy_button_position: row.buy_button_position.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Returns the shop's settings, creating the default row on first contact
/// (FREE, active, `MULTIPLIER` 1.5, `DROPSHIPPING`).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert or fetch fails.
pub async fn ensure_shop_settings(pool: &PgPool, shop: &str) -> Result<ShopSettingsRow, DbError> {
    sqlx::query("INSERT INTO shop_settings (shop) VALUES ($1) ON CONFLICT (shop) DO NOTHING")
        .bind(shop)
        .execute(pool)
        .await?;

    get_shop_settings(pool, shop)
        .await?
        .ok_or(DbError::NotFound)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_shop_settings(
    pool: &PgPool,
    shop: &str,
) -> Result<Option<ShopSettingsRow>, DbError> {
    let row = sqlx::query_as::<_, ShopSettingsRow>(&format!(
        "SELECT {COLUMNS} FROM shop_settings WHERE shop = $1"
    ))
    .bind(shop)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Persists a subscription state produced by the lifecycle state machine.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the shop has no settings row, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn save_subscription_state(
    pool: &PgPool,
    shop: &str,
    state: &SubscriptionState,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE shop_settings SET \
             plan                    = $2, \
             subscription_status     = $3, \
             subscription_id         = $4, \
             pending_plan            = $5, \
             pending_subscription_id = $6, \
             plan_start_date         = $7, \
             plan_end_date           = $8, \
             status_changed_at       = $9, \
             updated_at              = NOW() \
         WHERE shop = $1",
    )
    .bind(shop)
    .bind(state.plan.as_str())
    .bind(state.status.as_str())
    .bind(&state.subscription_id)
    .bind(state.pending_plan.map(PlanName::as_str))
    .bind(&state.pending_subscription_id)
    .bind(state.plan_start_date)
    .bind(state.plan_end_date)
    .bind(state.status_changed_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Overwrites the merchant-editable settings and returns the updated row.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the shop has no settings row, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_settings(
    pool: &PgPool,
    shop: &str,
    update: &SettingsUpdate,
) -> Result<ShopSettingsRow, DbError> {
    let row = sqlx::query_as::<_, ShopSettingsRow>(&format!(
        "UPDATE shop_settings SET \
             pricing_mode           = $2, \
             pricing_value          = $3, \
             default_import_mode    = $4, \
             affiliate_id           = $5, \
             affiliate_mode_enabled = $6, \
             buy_button_enabled     = $7, \
             buy_button_text        = $8, \
             buy_button_position    = $9, \
             updated_at             = NOW() \
         WHERE shop = $1 \
         RETURNING {COLUMNS}"
    ))
    .bind(shop)
    .bind(update.pricing.mode.as_str())
    .bind(update.pricing.value)
    .bind(update.default_import_mode.as_str())
    .bind(&update.affiliate_id)
    .bind(update.affiliate_mode_enabled)
    .bind(update.buy_button_enabled)
    .bind(&update.buy_button_text)
    .bind(&update.buy_button_position)
    .fetch_optional(pool)
    .await?;

    row.ok_or(DbError::NotFound)
}

/// Records terms acceptance. Re-accepting keeps the first timestamp.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the shop has no settings row, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn accept_terms(
    pool: &PgPool,
    shop: &str,
    accepted_at: DateTime<Utc>,
) -> Result<ShopSettingsRow, DbError> {
    let row = sqlx::query_as::<_, ShopSettingsRow>(&format!(
        "UPDATE shop_settings SET \
             terms_accepted    = TRUE, \
             terms_accepted_at = COALESCE(terms_accepted_at, $2), \
             updated_at        = NOW() \
         WHERE shop = $1 \
         RETURNING {COLUMNS}"
    ))
    .bind(shop)
    .bind(accepted_at)
    .fetch_optional(pool)
    .await?;

    row.ok_or(DbError::NotFound)
}

/// Shops whose subscription is waiting on a time-driven transition.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_shops_in_flight(pool: &PgPool) -> Result<Vec<ShopSettingsRow>, DbError> {
    let rows = sqlx::query_as::<_, ShopSettingsRow>(&format!(
        "SELECT {COLUMNS} FROM shop_settings \
         WHERE subscription_status IN ('PENDING', 'CANCELLING') \
         ORDER BY status_changed_at"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the number of rows deleted (0 or 1).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_shop_settings(pool: &PgPool, shop: &str) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM shop_settings WHERE shop = $1")
        .bind(shop)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
