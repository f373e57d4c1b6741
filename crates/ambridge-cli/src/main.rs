mod catalog;
mod db;
mod preview;
mod webhooks;

use ambridge_core::{ImportMode, PlanName, PricingConfig, PricingMode};
use ambridge_scraper::{AmazonClient, DEFAULT_RAPIDAPI_HOST};
use clap::{CommandFactory, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

use crate::db::DbCommands;

#[derive(Debug, Parser)]
#[command(name = "ambridge-cli")]
#[command(about = "Ambridge operational tooling")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch an Amazon product and show how it would be imported
    Preview {
        /// Amazon product URL
        url: String,
        /// Markup mode: multiplier or fixed
        #[arg(long, default_value = "multiplier")]
        mode: PricingMode,
        /// Markup value (factor for multiplier, amount for fixed)
        #[arg(long, default_value = "1.5")]
        value: Decimal,
        /// Import mode: affiliate or dropshipping
        #[arg(long, default_value = "dropshipping")]
        import_mode: ImportMode,
        /// Plan whose features gate the import mode
        #[arg(long, default_value = "free")]
        plan: PlanName,
        /// Print the priced product as JSON instead of a summary
        #[arg(long)]
        json: bool,
        #[arg(long, env = "RAPIDAPI_KEY", hide_env_values = true)]
        api_key: Option<String>,
        #[arg(long, env = "AMBRIDGE_RAPIDAPI_HOST", default_value = DEFAULT_RAPIDAPI_HOST)]
        host: String,
    },
    /// Apply a markup to a price without fetching anything
    Price {
        amount: Decimal,
        #[arg(long, default_value = "multiplier")]
        mode: PricingMode,
        #[arg(long, default_value = "1.5")]
        value: Decimal,
    },
    /// Print the plan catalog
    Plans,
    /// Show which plan a billed amount resolves to
    Reconcile { amount: Decimal },
    /// Print webhook registration instructions
    Webhooks {
        /// Public base URL the platform delivers webhooks to
        #[arg(long, env = "AMBRIDGE_APP_URL", default_value = "http://localhost:3000")]
        app_url: String,
    },
    /// Database utilities
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let level = std::env::var("AMBRIDGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Preview {
            url,
            mode,
            value,
            import_mode,
            plan,
            json,
            api_key,
            host,
        }) => {
            let client = AmazonClient::new(
                api_key.as_deref(),
                &host,
                preview::REQUEST_TIMEOUT_SECS,
                preview::MAX_RETRIES,
                preview::RETRY_BACKOFF_BASE_SECS,
            )?;
            let options = preview::PreviewOptions {
                pricing: PricingConfig::new(mode, value),
                import_mode,
                plan,
                json,
            };
            preview::run_preview(&client, url.trim(), &options).await?;
        }
        Some(Commands::Price {
            amount,
            mode,
            value,
        }) => catalog::run_price(amount, PricingConfig::new(mode, value))?,
        Some(Commands::Plans) => catalog::run_plans(),
        Some(Commands::Reconcile { amount }) => catalog::run_reconcile(amount),
        Some(Commands::Webhooks { app_url }) => webhooks::run_webhooks(&app_url),
        Some(Commands::Db { command }) => {
            let config = ambridge_core::load_app_config()?;
            let pool = ambridge_db::connect_pool_from_config(&config).await?;
            match command {
                DbCommands::Ping => db::run_ping(&pool).await?,
                DbCommands::Migrate => db::run_migrate(&pool).await?,
            }
        }
        None => Cli::command().print_help()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests;
