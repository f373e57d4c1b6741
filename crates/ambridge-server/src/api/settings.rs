use ambridge_core::{
    can_use_feature, validate_pricing, Feature, ImportMode, PlanName, PricingConfig, PricingMode,
};
use ambridge_db::{SettingsUpdate, ShopSettingsRow};
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{load_account, map_db_error, ApiError, ApiResponse, AppState, ShopContext};

pub(super) const BUTTON_POSITIONS: [&str; 4] = [
    "BEFORE_BUY_NOW",
    "AFTER_BUY_NOW",
    "BEFORE_ADD_TO_CART",
    "AFTER_ADD_TO_CART",
];

const MAX_BUTTON_TEXT_LEN: usize = 60;

#[derive(Debug, Serialize)]
pub(super) struct SettingsData {
    shop: String,
    plan: PlanName,
    pricing_mode: PricingMode,
    pricing_value: Decimal,
    default_import_mode: ImportMode,
    affiliate_id: Option<String>,
    affiliate_mode_enabled: bool,
    /// Whether the current plan allows affiliate mode and the buy button.
    affiliate_available: bool,
    buy_button_enabled: bool,
    buy_button_text: String,
    buy_button_position: String,
    terms_accepted: bool,
    terms_accepted_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

/// Partial edit; absent fields keep their stored value. An empty
/// `affiliate_id` clears it.
#[derive(Debug, Default, Deserialize)]
pub(super) struct SettingsPatch {
    pricing_mode: Option<PricingMode>,
    pricing_value: Option<Decimal>,
    default_import_mode: Option<ImportMode>,
    affiliate_id: Option<String>,
    affiliate_mode_enabled: Option<bool>,
    buy_button_enabled: Option<bool>,
    buy_button_text: Option<String>,
    buy_button_position: Option<String>,
}

impl SettingsPatch {
    /// Whether the patch switches on anything that needs the buy button feature.
    fn enables_affiliate(&self) -> bool {
        self.affiliate_mode_enabled == Some(true)
            || self.buy_button_enabled == Some(true)
            || self.default_import_mode == Some(ImportMode::Affiliate)
    }

    fn apply(self, mut update: SettingsUpdate) -> Result<SettingsUpdate, String> {
        update.pricing = PricingConfig::new(
            self.pricing_mode.unwrap_or(update.pricing.mode),
            self.pricing_value.unwrap_or(update.pricing.value),
        );
        validate_pricing(Decimal::ONE, update.pricing).map_err(|e| e.to_string())?;

        if let Some(mode) = self.default_import_mode {
            update.default_import_mode = mode;
        }
        if let Some(id) = self.affiliate_id {
            let id = id.trim();
            update.affiliate_id = (!id.is_empty()).then(|| id.to_owned());
        }
        if let Some(enabled) = self.affiliate_mode_enabled {
            update.affiliate_mode_enabled = enabled;
        }
        if let Some(enabled) = self.buy_button_enabled {
            update.buy_button_enabled = enabled;
        }
        if let Some(text) = self.buy_button_text {
            let text = text.trim();
            if text.is_empty() || text.chars().count() > MAX_BUTTON_TEXT_LEN {
                return Err(format!(
                    "buy button text must be 1 to {MAX_BUTTON_TEXT_LEN} characters"
                ));
            }
            text.clone_into(&mut update.buy_button_text);
        }
        if let Some(position) = self.buy_button_position {
            let position = position.trim().to_ascii_uppercase();
            if !BUTTON_POSITIONS.contains(&position.as_str()) {
                return Err(format!(
                    "buy button position must be one of {}",
                    BUTTON_POSITIONS.join(", ")
                ));
            }
            update.buy_button_position = position;
        }

        Ok(update)
    }
}

fn settings_data(row: ShopSettingsRow, plan: PlanName, affiliate_available: bool) -> SettingsData {
    let pricing = row.pricing_config().unwrap_or_default();
    let default_import_mode = row.import_mode().unwrap_or(ImportMode::Dropshipping);
    SettingsData {
        shop: row.shop,
        plan,
        pricing_mode: pricing.mode,
        pricing_value: pricing.value,
        default_import_mode,
        affiliate_id: row.affiliate_id,
        affiliate_mode_enabled: row.affiliate_mode_enabled,
        affiliate_available,
        buy_button_enabled: row.buy_button_enabled,
        buy_button_text: row.buy_button_text,
        buy_button_position: row.buy_button_position,
        terms_accepted: row.terms_accepted,
        terms_accepted_at: row.terms_accepted_at,
        updated_at: row.updated_at,
    }
}

pub(super) async fn get_settings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ctx: ShopContext,
) -> Result<Json<ApiResponse<SettingsData>>, ApiError> {
    let account = load_account(&state, &req_id.0, &ctx.shop).await?;
    let available = can_use_feature(&account.plan, Feature::BuyOnAmazonButton);
    Ok(ApiResponse::new(
        req_id.0,
        settings_data(account.row, account.plan.name, available),
    ))
}

pub(super) async fn update_settings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ctx: ShopContext,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<ApiResponse<SettingsData>>, ApiError> {
    let account = load_account(&state, &req_id.0, &ctx.shop).await?;
    let available = can_use_feature(&account.plan, Feature::BuyOnAmazonButton);

    if patch.enables_affiliate() && !available {
        return Err(ApiError::new(
            req_id.0,
            "feature_unavailable",
            "Affiliate Mode and the Buy on Amazon button require BASIC plan or higher.",
        )
        .with_details(serde_json::json!({ "plan": account.plan.name })));
    }

    let current =
        SettingsUpdate::from_row(&account.row).map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let update = patch
        .apply(current)
        .map_err(|message| ApiError::new(req_id.0.clone(), "validation_error", message))?;

    let row = ambridge_db::update_settings(&state.pool, &ctx.shop, &update)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(shop = %ctx.shop, "settings updated");

    Ok(ApiResponse::new(
        req_id.0,
        settings_data(row, account.plan.name, available),
    ))
}

pub(super) async fn accept_terms(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ctx: ShopContext,
) -> Result<Json<ApiResponse<SettingsData>>, ApiError> {
    let account = load_account(&state, &req_id.0, &ctx.shop).await?;
    let available = can_use_feature(&account.plan, Feature::BuyOnAmazonButton);
    let row = ambridge_db::accept_terms(&state.pool, &ctx.shop, Utc::now())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        req_id.0,
        settings_data(row, account.plan.name, available),
    ))
}
