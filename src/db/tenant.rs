use sqlx::{PgExecutor, PgPool};

use crate::{error::ApiError, models::user::UserRole};

/// The logical trend table a caller reads from and writes to.
///
/// All datasets live in the `trends` table and are told apart by
/// `dataset_key`. The key is derived from the authenticated identity,
/// never from request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDataset {
    /// Operator-owned public data.
    Shared,
    /// One tenant's private uploads.
    Tenant(i64),
}

impl TrendDataset {
    pub fn key(&self) -> String {
        match self {
            TrendDataset::Shared => "shared".to_string(),
            TrendDataset::Tenant(client_id) => format!("client:{client_id}"),
        }
    }

    fn client_id(&self) -> Option<i64> {
        match self {
            TrendDataset::Shared => None,
            TrendDataset::Tenant(client_id) => Some(*client_id),
        }
    }
}

/// Maps a caller to its dataset: the site admin owns the shared one,
/// everybody else gets their client's.
pub fn resolve_dataset(role: UserRole, client_id: i64, site_client_id: i64) -> TrendDataset {
    if role == UserRole::Admin && client_id == site_client_id {
        TrendDataset::Shared
    } else {
        TrendDataset::Tenant(client_id)
    }
}

/// Create the dataset registry row if it is missing.
///
/// `ON CONFLICT DO NOTHING` makes concurrent first writers converge on a
/// single row without either of them failing. Takes a pool or an open
/// transaction.
pub async fn provision_dataset<'e, E>(executor: E, dataset: &TrendDataset) -> Result<(), ApiError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO trend_datasets (dataset_key, client_id) VALUES ($1, $2)
         ON CONFLICT (dataset_key) DO NOTHING",
    )
    .bind(dataset.key())
    .bind(dataset.client_id())
    .execute(executor)
    .await
    .map_err(|e| ApiError::Schema(format!("failed to provision dataset {}: {e}", dataset.key())))?;
    Ok(())
}

/// Resolve and provision in one step.
pub async fn resolve_and_provision(
    pool: &PgPool,
    role: UserRole,
    client_id: i64,
    site_client_id: i64,
) -> Result<TrendDataset, ApiError> {
    let dataset = resolve_dataset(role, client_id, site_client_id);
    provision_dataset(pool, &dataset).await?;
    Ok(dataset)
}
