pub mod tenant;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the schema migrations embedded in ./migrations/
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Re-provision the trend dataset of every client (idempotent, safe on every startup).
pub async fn provision_all_client_datasets(pool: &PgPool) -> anyhow::Result<()> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM clients ORDER BY id")
        .fetch_all(pool)
        .await?;

    for id in ids {
        let dataset = tenant::TrendDataset::Tenant(id);
        tenant::provision_dataset(pool, &dataset).await?;
        tracing::debug!("Provisioned trend dataset {}", dataset.key());
    }
    Ok(())
}
