use super::*;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["ambridge-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["ambridge-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["ambridge-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn preview_defaults_to_dropshipping_with_standard_markup() {
    let cli = Cli::try_parse_from([
        "ambridge-cli",
        "preview",
        "https://www.amazon.com/dp/B0DESK0001",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Preview {
            ref url,
            mode: PricingMode::Multiplier,
            value,
            import_mode: ImportMode::Dropshipping,
            plan: PlanName::Free,
            json: false,
            ..
        }) if url == "https://www.amazon.com/dp/B0DESK0001" && value == Decimal::new(15, 1)
    ));
}

#[test]
fn preview_accepts_fixed_markup_and_affiliate_mode() {
    let cli = Cli::try_parse_from([
        "ambridge-cli",
        "preview",
        "https://www.amazon.de/dp/B0DESK0001",
        "--mode",
        "fixed",
        "--value",
        "7.50",
        "--import-mode",
        "affiliate",
        "--plan",
        "basic",
        "--json",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Preview {
            mode: PricingMode::Fixed,
            value,
            import_mode: ImportMode::Affiliate,
            plan: PlanName::Basic,
            json: true,
            ..
        }) if value == Decimal::new(750, 2)
    ));
}

#[test]
fn preview_rejects_unknown_mode() {
    let result = Cli::try_parse_from([
        "ambridge-cli",
        "preview",
        "https://www.amazon.com/dp/B0DESK0001",
        "--mode",
        "percent",
    ]);
    assert!(result.is_err());
}

#[test]
fn parses_price_command() {
    let cli = Cli::try_parse_from(["ambridge-cli", "price", "49.99", "--value", "1.3"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Price {
            amount,
            mode: PricingMode::Multiplier,
            value,
        }) if amount == Decimal::new(4999, 2) && value == Decimal::new(13, 1)
    ));
}

#[test]
fn price_rejects_non_numeric_amount() {
    assert!(Cli::try_parse_from(["ambridge-cli", "price", "twelve"]).is_err());
}

#[test]
fn parses_plans_and_reconcile() {
    let plans = Cli::try_parse_from(["ambridge-cli", "plans"]).unwrap();
    assert!(matches!(plans.command, Some(Commands::Plans)));

    let reconcile = Cli::try_parse_from(["ambridge-cli", "reconcile", "9.98"]).unwrap();
    assert!(matches!(
        reconcile.command,
        Some(Commands::Reconcile { amount }) if amount == Decimal::new(998, 2)
    ));
}

#[test]
fn parses_webhooks_with_app_url() {
    let cli = Cli::try_parse_from([
        "ambridge-cli",
        "webhooks",
        "--app-url",
        "https://app.example.com",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Webhooks { ref app_url }) if app_url == "https://app.example.com"
    ));
}
