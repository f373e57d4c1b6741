use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Check that the database answers
    Ping,
    /// Apply pending migrations
    Migrate,
}

pub(crate) async fn run_ping(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    ambridge_db::ping(pool).await?;
    println!("database ok");
    Ok(())
}

pub(crate) async fn run_migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let applied = ambridge_db::run_migrations(pool).await?;
    tracing::info!(applied, "database migrations complete");
    println!("applied {applied} migration(s)");
    Ok(())
}
