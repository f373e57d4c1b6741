use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Does not read `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("AMBRIDGE_ENV", "development"))?;

    let bind_addr = parse_addr("AMBRIDGE_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("AMBRIDGE_LOG_LEVEL", "info");
    let app_url = or_default("AMBRIDGE_APP_URL", "http://localhost:3000")
        .trim_end_matches('/')
        .to_string();

    let rapidapi_key = optional("RAPIDAPI_KEY");
    let rapidapi_host = or_default(
        "AMBRIDGE_RAPIDAPI_HOST",
        "real-time-amazon-data.p.rapidapi.com",
    );
    let shopify_api_version = or_default("AMBRIDGE_SHOPIFY_API_VERSION", "2025-01");

    let webhook_secret = optional("AMBRIDGE_WEBHOOK_SECRET");
    if webhook_secret.is_none() && !env.is_development() {
        return Err(ConfigError::MissingEnvVar(
            "AMBRIDGE_WEBHOOK_SECRET".to_string(),
        ));
    }

    let db_max_connections = parse_u32("AMBRIDGE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("AMBRIDGE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("AMBRIDGE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let scraper_request_timeout_secs = parse_u64("AMBRIDGE_SCRAPER_REQUEST_TIMEOUT_SECS", "15")?;
    let scraper_max_retries = parse_u32("AMBRIDGE_SCRAPER_MAX_RETRIES", "2")?;
    let scraper_retry_backoff_base_secs =
        parse_u64("AMBRIDGE_SCRAPER_RETRY_BACKOFF_BASE_SECS", "1")?;
    let shopify_request_timeout_secs = parse_u64("AMBRIDGE_SHOPIFY_REQUEST_TIMEOUT_SECS", "30")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        app_url,
        rapidapi_key,
        rapidapi_host,
        shopify_api_version,
        webhook_secret,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scraper_request_timeout_secs,
        scraper_max_retries,
        scraper_retry_backoff_base_secs,
        shopify_request_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "AMBRIDGE_ENV".to_string(),
            reason: format!("expected development, test or production, got {other:?}"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
