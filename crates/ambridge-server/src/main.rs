mod api;
mod lifecycle;
mod middleware;
mod scheduler;

use std::sync::Arc;

use ambridge_core::PlanCatalog;
use ambridge_scraper::AmazonClient;
use ambridge_shopify::AdminConnector;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::{AuthState, WebhookAuth},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(ambridge_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool = ambridge_db::connect_pool_from_config(&config).await?;
    let applied = ambridge_db::run_migrations(&pool).await?;
    tracing::info!(applied, "database migrations complete");

    let _scheduler = scheduler::build_scheduler(pool.clone()).await?;

    let amazon = AmazonClient::from_app_config(&config)?;
    if !amazon.has_api_key() {
        tracing::warn!("RAPIDAPI_KEY not set; product previews and imports will fail");
    }

    let state = AppState {
        pool,
        config: Arc::clone(&config),
        catalog: Arc::new(PlanCatalog::standard()),
        amazon: Arc::new(amazon),
        shopify: AdminConnector::from_app_config(&config)?,
    };
    let auth = AuthState::from_env(config.env.is_development())?;
    let webhooks = WebhookAuth::new(config.webhook_secret.as_deref());
    let app = build_app(state, auth, webhooks, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "ambridge server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
