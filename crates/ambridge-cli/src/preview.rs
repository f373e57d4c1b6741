//! `preview`: fetch one Amazon listing and print what an import would create.
//!
//! Runs the same scrape, normalize, mode gate and pricing steps as the
//! server's preview endpoint, without a database or a shop.

use ambridge_core::{
    price_for_import, resolve_import_mode, validate_product_pricing, ImportMode,
    ImportModeDecision, PlanCatalog, PlanName, PricedProduct, PricingConfig, ProductVariant,
};
use ambridge_scraper::AmazonClient;
use rust_decimal::Decimal;

pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 15;
pub(crate) const MAX_RETRIES: u32 = 2;
pub(crate) const RETRY_BACKOFF_BASE_SECS: u64 = 1;

#[derive(Debug, Clone, Copy)]
pub(crate) struct PreviewOptions {
    pub pricing: PricingConfig,
    pub import_mode: ImportMode,
    pub plan: PlanName,
    pub json: bool,
}

/// # Errors
///
/// Returns an error if the fetch fails, the markup is invalid for a
/// dropshipping import, or JSON output cannot be serialized.
pub(crate) async fn run_preview(
    client: &AmazonClient,
    url: &str,
    options: &PreviewOptions,
) -> anyhow::Result<()> {
    let catalog = PlanCatalog::standard();
    let plan = catalog
        .get(options.plan)
        .ok_or_else(|| anyhow::anyhow!("plan {} is not in the catalog", options.plan))?;

    let product = client
        .scrape_url(url)
        .await
        .map_err(|e| anyhow::anyhow!("fetch failed [{}]: {e}", e.code()))?;

    let decision = resolve_import_mode(plan, options.import_mode);
    if decision.mode == ImportMode::Dropshipping {
        validate_product_pricing(&product, options.pricing)?;
    }
    let priced = price_for_import(&product, decision.mode, options.pricing);

    if options.json {
        println!("{}", serde_json::to_string_pretty(&priced)?);
        return Ok(());
    }

    print_summary(&priced, &decision);
    Ok(())
}

fn print_summary(priced: &PricedProduct, decision: &ImportModeDecision) {
    let product = &priced.product;
    let pricing = &priced.pricing;

    println!("{} ({})", product.title, product.asin);
    println!(
        "Images: {}  Options: {}  Variants: {}",
        product.images.len(),
        product.options.len(),
        product.variants.len()
    );
    for option in &product.options {
        println!("  {}: {}", option.name, option.values.join(", "));
    }
    println!();

    println!("Import mode: {}", decision.mode);
    if let Some(notice) = &decision.notice {
        println!("  note: {notice}");
    }
    println!("Amazon price: {}", fmt_money(pricing.original_price, &product.currency));
    println!("Your price:   {}", fmt_money(pricing.final_price, &product.currency));
    println!(
        "Margin:       {} ({})",
        fmt_money(pricing.markup, &product.currency),
        fmt_percent(pricing.markup_percentage)
    );

    if !product.variants.is_empty() {
        println!();
        for variant in &product.variants {
            println!("  {}", variant_line(variant, &product.currency));
        }
    }

    let duplicates = product.duplicate_option_combinations();
    if !duplicates.is_empty() {
        eprintln!(
            "warning: {} option combination(s) are shared by more than one variant",
            duplicates.len()
        );
    }
}

/// `"USD 64.99"`, always two decimals.
fn fmt_money(amount: Decimal, currency: &str) -> String {
    format!("{currency} {:.2}", amount.round_dp(2))
}

/// One decimal, matching the merchant-facing margin display.
fn fmt_percent(value: Decimal) -> String {
    format!("{:.1}%", value.round_dp(1))
}

fn variant_line(variant: &ProductVariant, currency: &str) -> String {
    let options = variant
        .options
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ");
    let price = variant
        .price
        .map_or_else(|| "\u{2014}".to_owned(), |p| fmt_money(p, currency));
    let image = if variant.image.is_some() { "image" } else { "no image" };
    format!("{}  {options}  {price}  {image}", variant.asin)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn money_is_padded_to_cents() {
        assert_eq!(fmt_money(Decimal::new(65, 0), "USD"), "USD 65.00");
        assert_eq!(fmt_money(Decimal::new(6499, 2), "EUR"), "EUR 64.99");
    }

    #[test]
    fn percent_has_one_decimal() {
        assert_eq!(fmt_percent(Decimal::new(3000, 2)), "30.0%");
        assert_eq!(fmt_percent(Decimal::new(3339, 2)), "33.4%");
    }

    #[test]
    fn variant_line_lists_options_in_name_order() {
        let variant = ProductVariant {
            asin: "B0VAR00001".to_owned(),
            options: BTreeMap::from([
                ("Size".to_owned(), "L".to_owned()),
                ("Color".to_owned(), "Red".to_owned()),
            ]),
            price: Some(Decimal::new(1950, 2)),
            image: None,
            available: true,
        };
        assert_eq!(
            variant_line(&variant, "USD"),
            "B0VAR00001  Color=Red, Size=L  USD 19.50  no image"
        );
    }
}
