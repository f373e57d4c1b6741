//! Subscription plan catalog.
//!
//! The catalog is built once at startup and shared read-only. Components that
//! need it take a `&PlanCatalog` so tests can substitute their own.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Recurring interval used for every paid plan.
pub const BILLING_INTERVAL: &str = "EVERY_30_DAYS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanName {
    Free,
    Basic,
    Pro,
    Premium,
}

impl PlanName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Basic => "BASIC",
            Self::Pro => "PRO",
            Self::Premium => "PREMIUM",
        }
    }

    #[must_use]
    pub fn is_paid(self) -> bool {
        self != Self::Free
    }
}

impl fmt::Display for PlanName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "BASIC" => Ok(Self::Basic),
            "PRO" => Ok(Self::Pro),
            "PREMIUM" => Ok(Self::Premium),
            _ => Err(CoreError::UnknownPlan(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature {
    /// Storefront button linking to the Amazon listing; required for affiliate mode.
    BuyOnAmazonButton,
    Dropshipping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeatures {
    pub buy_on_amazon_button: bool,
    pub dropshipping_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub name: PlanName,
    pub display_name: String,
    pub price: Decimal,
    pub product_limit: i64,
    pub features: PlanFeatures,
}

impl Plan {
    #[must_use]
    pub fn has_feature(&self, feature: Feature) -> bool {
        match feature {
            Feature::BuyOnAmazonButton => self.features.buy_on_amazon_button,
            Feature::Dropshipping => self.features.dropshipping_allowed,
        }
    }

    #[must_use]
    pub fn is_within_limit(&self, current_count: i64) -> bool {
        current_count < self.product_limit
    }

    /// Imports left before the limit; never negative.
    #[must_use]
    pub fn remaining_products(&self, current_count: i64) -> i64 {
        (self.product_limit - current_count).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Builds a catalog from explicit entries, preserving their order.
    #[must_use]
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    /// The production catalog: FREE, BASIC, PRO, PREMIUM.
    #[must_use]
    pub fn standard() -> Self {
        let paid = PlanFeatures {
            buy_on_amazon_button: true,
            dropshipping_allowed: true,
        };
        Self::new(vec![
            Plan {
                name: PlanName::Free,
                display_name: "Free Plan".to_owned(),
                price: Decimal::ZERO,
                product_limit: 20,
                features: PlanFeatures {
                    buy_on_amazon_button: false,
                    dropshipping_allowed: true,
                },
            },
            Plan {
                name: PlanName::Basic,
                display_name: "Basic Plan".to_owned(),
                price: Decimal::new(499, 2),
                product_limit: 150,
                features: paid,
            },
            Plan {
                name: PlanName::Pro,
                display_name: "Pro Plan".to_owned(),
                price: Decimal::new(999, 2),
                product_limit: 1000,
                features: paid,
            },
            Plan {
                name: PlanName::Premium,
                display_name: "Premium Plan".to_owned(),
                price: Decimal::new(1999, 2),
                product_limit: 3000,
                features: paid,
            },
        ])
    }

    #[must_use]
    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    #[must_use]
    pub fn get(&self, name: PlanName) -> Option<&Plan> {
        self.plans.iter().find(|p| p.name == name)
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_limits_and_prices() {
        let catalog = PlanCatalog::standard();
        let expected = [
            (PlanName::Free, Decimal::ZERO, 20),
            (PlanName::Basic, Decimal::new(499, 2), 150),
            (PlanName::Pro, Decimal::new(999, 2), 1000),
            (PlanName::Premium, Decimal::new(1999, 2), 3000),
        ];
        for (name, price, limit) in expected {
            let plan = catalog.get(name).expect("plan present");
            assert_eq!(plan.price, price, "{name} price");
            assert_eq!(plan.product_limit, limit, "{name} limit");
        }
    }

    #[test]
    fn free_plan_lacks_buy_button_only() {
        let catalog = PlanCatalog::standard();
        let free = catalog.get(PlanName::Free).unwrap();
        assert!(!free.has_feature(Feature::BuyOnAmazonButton));
        assert!(free.has_feature(Feature::Dropshipping));
        let basic = catalog.get(PlanName::Basic).unwrap();
        assert!(basic.has_feature(Feature::BuyOnAmazonButton));
    }

    #[test]
    fn plan_name_round_trips_through_str() {
        for name in [PlanName::Free, PlanName::Basic, PlanName::Pro, PlanName::Premium] {
            assert_eq!(name.as_str().parse::<PlanName>(), Ok(name));
        }
        assert_eq!("premium".parse::<PlanName>(), Ok(PlanName::Premium));
        assert_eq!(
            "GOLD".parse::<PlanName>(),
            Err(CoreError::UnknownPlan("GOLD".to_owned()))
        );
    }
}
