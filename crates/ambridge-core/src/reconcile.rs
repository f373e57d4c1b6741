//! Maps a billed amount back to a plan.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::plans::{PlanCatalog, PlanName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountMatchKind {
    /// Within the tight tolerance of a listed price.
    Exact,
    /// Inside one of the wide fallback bands.
    Band,
    /// Nothing matched; resolved to FREE.
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AmountMatch {
    pub plan: PlanName,
    pub kind: AmountMatchKind,
}

impl AmountMatch {
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        self.kind != AmountMatchKind::Unrecognized
    }
}

/// Absolute difference below which an amount matches a listed price.
fn tolerance() -> Decimal {
    Decimal::new(2, 2)
}

/// Inclusive wide bands, checked in order after the tolerance pass.
fn bands() -> [(Decimal, Decimal, PlanName); 3] {
    [
        (Decimal::new(1950, 2), Decimal::new(2050, 2), PlanName::Premium),
        (Decimal::new(950, 2), Decimal::new(1050, 2), PlanName::Pro),
        (Decimal::new(450, 2), Decimal::new(550, 2), PlanName::Basic),
    ]
}

/// Resolves `amount` to a plan.
///
/// Tries every catalog price within a 0.02 tolerance first, then the wide
/// bands, then treats anything under 0.50 as FREE. An amount that matches
/// none of these resolves to FREE and is logged as unrecognized; a paid tier
/// is never granted for an unmatched amount.
#[must_use]
pub fn map_amount_to_plan(catalog: &PlanCatalog, amount: Decimal) -> AmountMatch {
    if let Some(plan) = catalog
        .plans()
        .iter()
        .find(|p| (p.price - amount).abs() < tolerance())
    {
        return AmountMatch {
            plan: plan.name,
            kind: AmountMatchKind::Exact,
        };
    }

    if let Some((_, _, plan)) = bands()
        .into_iter()
        .find(|(low, high, _)| amount >= *low && amount <= *high)
    {
        return AmountMatch {
            plan,
            kind: AmountMatchKind::Band,
        };
    }

    if amount < Decimal::new(50, 2) {
        return AmountMatch {
            plan: PlanName::Free,
            kind: AmountMatchKind::Band,
        };
    }

    tracing::warn!(%amount, "billing amount matches no known plan; defaulting to FREE");
    AmountMatch {
        plan: PlanName::Free,
        kind: AmountMatchKind::Unrecognized,
    }
}
