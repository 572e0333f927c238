use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tourism_analytics_api::{
    app::build_router, config::Config, db, services::posters::PosterStore, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    db::provision_all_client_datasets(&pool).await?;
    info!("Database connected and migrations applied");

    let redis = redis::Client::open(config.redis_url.as_str())?;

    let posters = Arc::new(PosterStore::load(&config.poster_dir).await?);

    let state = AppState {
        db: pool,
        redis,
        config: config.clone(),
        posters,
    };

    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("tourism analytics API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
