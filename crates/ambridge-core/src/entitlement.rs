//! Plan-based usage and feature gates.
//!
//! Denials are ordinary values, not errors: callers render them as upgrade
//! prompts using the usage figures they carry.

use serde::Serialize;

use crate::plans::{Feature, Plan, PlanName};
use crate::pricing::ImportMode;

/// Outcome of a product-quota check against a live product count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProductLimitCheck {
    pub allowed: bool,
    pub current_count: i64,
    pub limit: i64,
    pub remaining: i64,
    pub plan: PlanName,
}

impl ProductLimitCheck {
    /// Merchant-facing message for a denied import.
    #[must_use]
    pub fn denial_message(&self) -> String {
        format!(
            "Product limit reached! You have {}/{} products on the {} plan. Upgrade to import more products.",
            self.current_count, self.limit, self.plan
        )
    }
}

/// Compares `current_count` (draft and active imports both count) against
/// the plan's product limit. Importing is allowed only while strictly below
/// the limit.
#[must_use]
pub fn check_product_limit(plan: &Plan, current_count: i64) -> ProductLimitCheck {
    ProductLimitCheck {
        allowed: plan.is_within_limit(current_count),
        current_count,
        limit: plan.product_limit,
        remaining: plan.remaining_products(current_count),
        plan: plan.name,
    }
}

#[must_use]
pub fn can_use_feature(plan: &Plan, feature: Feature) -> bool {
    plan.has_feature(feature)
}

/// Effective import mode after applying plan features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportModeDecision {
    pub mode: ImportMode,
    pub forced: bool,
    pub notice: Option<String>,
}

/// Affiliate mode needs the storefront buy button; plans without it are
/// switched to dropshipping with an explicit notice.
#[must_use]
pub fn resolve_import_mode(plan: &Plan, requested: ImportMode) -> ImportModeDecision {
    if requested == ImportMode::Affiliate && !can_use_feature(plan, Feature::BuyOnAmazonButton) {
        return ImportModeDecision {
            mode: ImportMode::Dropshipping,
            forced: true,
            notice: Some(
                "Affiliate Mode requires BASIC plan or higher. Switched to Dropshipping Mode."
                    .to_owned(),
            ),
        };
    }

    ImportModeDecision {
        mode: requested,
        forced: false,
        notice: None,
    }
}
