use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use advising::config::AppConfig;
use advising::db::Database;
use advising::handlers;
use advising::services::directory::load_seed;
use advising::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        hours = %config.working_hours.to_human_readable(),
        horizon_days = config.horizon_days,
        "advising hours loaded"
    );

    let db = Arc::new(Database::open(&config.database_url)?);

    if let Some(seed_path) = &config.seed_path {
        let (advisors, students) = load_seed(&db, Path::new(seed_path))?;
        tracing::info!(advisors, students, path = %seed_path, "directory seeded");
    }

    let port = config.port;
    let state = Arc::new(AppState::from_config(config, db)?);
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
