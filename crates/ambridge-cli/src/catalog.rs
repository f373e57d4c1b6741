//! Offline commands over the plan catalog, the reconciler and the pricing engine.

use ambridge_core::{
    calculate_pricing, map_amount_to_plan, validate_pricing, AmountMatchKind, Plan, PlanCatalog,
    PricingConfig,
};
use rust_decimal::Decimal;

pub(crate) fn run_price(amount: Decimal, config: PricingConfig) -> anyhow::Result<()> {
    validate_pricing(amount, config)?;
    let result = calculate_pricing(amount, config);
    println!("{} {} on {:.2}", config.mode, config.value, result.original_price);
    println!("final price: {:.2}", result.final_price);
    println!(
        "markup:      {:.2} ({:.2}%)",
        result.markup, result.markup_percentage
    );
    Ok(())
}

pub(crate) fn run_plans() {
    let catalog = PlanCatalog::standard();
    println!("{:<9}{:<15}{:>8}{:>10}  features", "PLAN", "NAME", "PRICE", "PRODUCTS");
    for plan in catalog.plans() {
        println!(
            "{:<9}{:<15}{:>8}{:>10}  {}",
            plan.name.as_str(),
            plan.display_name,
            format!("{:.2}", plan.price),
            plan.product_limit,
            feature_list(plan)
        );
    }
}

pub(crate) fn run_reconcile(amount: Decimal) {
    let matched = map_amount_to_plan(&PlanCatalog::standard(), amount);
    println!("{amount} -> {} ({})", matched.plan, match_label(matched.kind));
    if !matched.is_recognized() {
        eprintln!("warning: {amount} matches no plan price; a paid tier is never granted for it");
    }
}

fn feature_list(plan: &Plan) -> String {
    let mut features = Vec::new();
    if plan.features.dropshipping_allowed {
        features.push("dropshipping");
    }
    if plan.features.buy_on_amazon_button {
        features.push("affiliate button");
    }
    features.join(", ")
}

fn match_label(kind: AmountMatchKind) -> &'static str {
    match kind {
        AmountMatchKind::Exact => "exact price",
        AmountMatchKind::Band => "price band",
        AmountMatchKind::Unrecognized => "unrecognized amount, defaulted",
    }
}
