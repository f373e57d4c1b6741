//! `webhooks`: print the subscriptions the app needs registered in the
//! Partner Dashboard. Nothing is registered automatically.

/// Topic and the path the server receives it on.
pub(crate) const WEBHOOK_ROUTES: [(&str, &str); 5] = [
    ("app/uninstalled", "/webhooks/app/uninstalled"),
    ("app_subscriptions/update", "/webhooks/app/subscriptions_update"),
    ("customers/data_request", "/webhooks/customers/data_request"),
    ("customers/redact", "/webhooks/customers/redact"),
    ("shop/redact", "/webhooks/shop/redact"),
];

/// Delivery address for each topic under `app_url`.
pub(crate) fn webhook_addresses(app_url: &str) -> Vec<(&'static str, String)> {
    let base = app_url.trim().trim_end_matches('/');
    WEBHOOK_ROUTES
        .iter()
        .map(|(topic, path)| (*topic, format!("{base}{path}")))
        .collect()
}

pub(crate) fn run_webhooks(app_url: &str) {
    println!("Webhooks to register (format: JSON)");
    println!();
    for (index, (topic, address)) in webhook_addresses(app_url).iter().enumerate() {
        println!("{}. {topic}", index + 1);
        println!("   URL: {address}");
    }
    println!();
    println!("Manual steps:");
    println!("1. Open https://partners.shopify.com/ and select the app.");
    println!("2. Go to App setup > Webhooks.");
    println!("3. Add each topic above with its URL.");
    println!("4. Set AMBRIDGE_WEBHOOK_SECRET on the server and configure the same");
    println!("   value as the x-ambridge-webhook-token header on every delivery.");
}
