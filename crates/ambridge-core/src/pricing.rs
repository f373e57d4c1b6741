//! Markup math for dropshipping imports.
//!
//! Every monetary result is rounded to cents exactly once, at the point it is
//! computed, using half-away-from-zero rounding.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::products::CanonicalProduct;
use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingMode {
    /// `original × value`
    Multiplier,
    /// `original + value`
    Fixed,
}

impl PricingMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Multiplier => "MULTIPLIER",
            Self::Fixed => "FIXED",
        }
    }
}

impl fmt::Display for PricingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PricingMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MULTIPLIER" => Ok(Self::Multiplier),
            "FIXED" => Ok(Self::Fixed),
            _ => Err(CoreError::UnknownPricingMode(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportMode {
    /// Original price kept, buyers are referred to Amazon.
    Affiliate,
    /// Merchant resells at a marked-up price.
    Dropshipping,
}

impl ImportMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Affiliate => "AFFILIATE",
            Self::Dropshipping => "DROPSHIPPING",
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AFFILIATE" => Ok(Self::Affiliate),
            "DROPSHIPPING" => Ok(Self::Dropshipping),
            _ => Err(CoreError::UnknownImportMode(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub mode: PricingMode,
    pub value: Decimal,
}

impl PricingConfig {
    #[must_use]
    pub fn new(mode: PricingMode, value: Decimal) -> Self {
        Self { mode, value }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            mode: PricingMode::Multiplier,
            value: Decimal::new(15, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub original_price: Decimal,
    pub final_price: Decimal,
    /// `final_price - original_price`
    pub markup: Decimal,
    pub markup_percentage: Decimal,
}

impl PricingResult {
    /// A result that leaves `price` untouched, used for affiliate imports.
    #[must_use]
    pub fn unchanged(price: Decimal) -> Self {
        Self {
            original_price: price,
            final_price: price,
            markup: Decimal::ZERO,
            markup_percentage: Decimal::ZERO,
        }
    }
}

/// Largest price the engine will produce for an import.
pub const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PricingValidationError {
    #[error("Original price must be greater than 0")]
    NonPositiveOriginal,
    #[error("Multiplier must be at least 1.0 (no markup)")]
    MultiplierBelowOne,
    #[error("Fixed markup cannot be negative")]
    NegativeFixedMarkup,
    #[error("Marked-up price must not exceed 1000000000")]
    PriceTooLarge,
}

fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Marked-up price, or `None` when it does not fit in a `Decimal`.
fn checked_markup(original: Decimal, mode: PricingMode, value: Decimal) -> Option<Decimal> {
    let raw = match mode {
        PricingMode::Multiplier => original.checked_mul(value),
        PricingMode::Fixed => original.checked_add(value),
    };
    raw.map(round_cents)
}

/// Applies a markup to `original`.
///
/// Non-positive originals, and results too large to represent, come back
/// unchanged; [`validate_pricing`] rejects the latter up front.
#[must_use]
pub fn apply_markup(original: Decimal, mode: PricingMode, value: Decimal) -> Decimal {
    if original <= Decimal::ZERO {
        return original;
    }
    checked_markup(original, mode, value).unwrap_or(original)
}

/// Percentage markup of `final_price` over `original`, rounded to two places.
/// Zero when the ratio cannot be represented.
#[must_use]
pub fn markup_percentage(original: Decimal, final_price: Decimal) -> Decimal {
    if original <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    final_price
        .checked_sub(original)
        .and_then(|diff| diff.checked_div(original))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map_or(Decimal::ZERO, round_cents)
}

#[must_use]
pub fn calculate_pricing(original: Decimal, config: PricingConfig) -> PricingResult {
    let final_price = apply_markup(original, config.mode, config.value);
    PricingResult {
        original_price: original,
        final_price,
        markup: final_price.checked_sub(original).unwrap_or(Decimal::ZERO),
        markup_percentage: markup_percentage(original, final_price),
    }
}

/// Rejects configurations the engine would compute but the merchant should
/// never be allowed to save or import with.
///
/// # Errors
///
/// Returns the first failing rule as a [`PricingValidationError`].
pub fn validate_pricing(
    original: Decimal,
    config: PricingConfig,
) -> Result<(), PricingValidationError> {
    if original <= Decimal::ZERO {
        return Err(PricingValidationError::NonPositiveOriginal);
    }
    match config.mode {
        PricingMode::Multiplier if config.value < Decimal::ONE => {
            return Err(PricingValidationError::MultiplierBelowOne);
        }
        PricingMode::Fixed if config.value < Decimal::ZERO => {
            return Err(PricingValidationError::NegativeFixedMarkup);
        }
        _ => {}
    }
    match checked_markup(original, config.mode, config.value) {
        Some(price) if price <= MAX_PRICE => Ok(()),
        _ => Err(PricingValidationError::PriceTooLarge),
    }
}

/// [`validate_pricing`] for the base price and every variant price the
/// import would mark up.
///
/// # Errors
///
/// Returns the first failing rule, base price first.
pub fn validate_product_pricing(
    product: &CanonicalProduct,
    config: PricingConfig,
) -> Result<(), PricingValidationError> {
    validate_pricing(product.base_price, config)?;
    product
        .variants
        .iter()
        .filter_map(|v| v.price.filter(|p| *p > Decimal::ZERO))
        .try_for_each(|price| validate_pricing(price, config))
}

/// A product with import prices applied, plus the headline pricing figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedProduct {
    pub product: CanonicalProduct,
    pub import_mode: ImportMode,
    pub pricing: PricingResult,
}

/// Prices a product for import.
///
/// Affiliate imports bypass the engine. Dropshipping imports mark up the base
/// price and each variant price; variants without their own price inherit
/// the base price before markup.
#[must_use]
pub fn price_for_import(
    product: &CanonicalProduct,
    import_mode: ImportMode,
    config: PricingConfig,
) -> PricedProduct {
    let mut priced = product.clone();

    let pricing = match import_mode {
        ImportMode::Affiliate => PricingResult::unchanged(product.base_price),
        ImportMode::Dropshipping => {
            let pricing = calculate_pricing(product.base_price, config);
            priced.base_price = pricing.final_price;
            for variant in &mut priced.variants {
                let source = variant
                    .price
                    .filter(|p| *p > Decimal::ZERO)
                    .unwrap_or(product.base_price);
                variant.price = Some(apply_markup(source, config.mode, config.value));
            }
            pricing
        }
    };

    PricedProduct {
        product: priced,
        import_mode,
        pricing,
    }
}

#[cfg(test)]
#[path = "pricing_test.rs"]
mod tests;
