pub mod app_config;
pub mod config;
pub mod entitlement;
pub mod media;
pub mod plans;
pub mod pricing;
pub mod products;
pub mod reconcile;
pub mod subscription;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use entitlement::{
    can_use_feature, check_product_limit, resolve_import_mode, ImportModeDecision,
    ProductLimitCheck,
};
pub use media::{
    link_variant_media, plan_media, MediaMatch, MediaMatchMethod, MediaPlan, PlannedMedia,
    UploadedMedia, MAX_PRODUCT_MEDIA,
};
pub use plans::{Feature, Plan, PlanCatalog, PlanFeatures, PlanName, BILLING_INTERVAL};
pub use pricing::{
    apply_markup, calculate_pricing, markup_percentage, price_for_import, validate_pricing,
    validate_product_pricing, ImportMode, PricedProduct, PricingConfig, PricingMode, PricingResult,
    PricingValidationError, MAX_PRICE,
};
pub use products::{
    CanonicalProduct, NormalizedVariants, ProductOption, ProductVariant, MAX_PRODUCT_OPTIONS,
};
pub use reconcile::{map_amount_to_plan, AmountMatch, AmountMatchKind};
pub use subscription::{
    BillingEvent, SubscriptionState, SubscriptionStatus, Transition, TransitionOutcome,
    CANCELLATION_GRACE_SECS, PENDING_STALENESS_SECS,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown plan: {0}")]
    UnknownPlan(String),
    #[error("unknown pricing mode: {0}")]
    UnknownPricingMode(String),
    #[error("unknown import mode: {0}")]
    UnknownImportMode(String),
    #[error("unknown subscription status: {0}")]
    UnknownSubscriptionStatus(String),
}
