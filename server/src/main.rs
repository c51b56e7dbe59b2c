use std::sync::Arc;

use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use parlor_server::config::Config;
use parlor_server::database::Database;
use parlor_server::engine::{Rulebook, TurnEngine};
use parlor_server::invitations::InvitationManager;
use parlor_server::relay::Relay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::ACTIVE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load("parlor.toml").await?;
    let db = Database::connect(&config.database.url, config.database.max_connections).await?;
    db.migrate().await?;

    let engine = Arc::new(TurnEngine::new(db.clone(), Rulebook::standard()));
    let _invitations = InvitationManager::new(db.clone());
    let _relay = Relay::new(engine);

    tracing::info!(database = %config.database.url, "parlor server ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
