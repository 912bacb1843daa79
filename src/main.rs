use anyhow::Context;
use cpmm_ledger::{config::Config, db::init_db_with_config, MarketEngine, Repository};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;

    let pool = init_db_with_config(&config)
        .await
        .with_context(|| format!("failed to initialize database at {}", config.database_path))?;

    let repo = Arc::new(Repository::new(pool));
    let engine = MarketEngine::with_sql_registry(repo.clone());

    let markets = engine.list_markets().await.context("failed to list markets")?;
    let open = markets.markets.iter().filter(|m| m.status.is_open()).count();
    tracing::info!(
        database = %config.database_path,
        total = markets.total_count,
        open,
        "Market store ready"
    );

    repo.close().await;
    Ok(())
}
