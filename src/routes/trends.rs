use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    db::tenant::{resolve_and_provision, TrendDataset},
    error::{ApiError, ApiResult},
    models::{
        auth::AuthenticatedUser,
        trend::{DeleteTrendsRequest, InsertTrendsRequest, TrendQueryParams},
    },
    routes::envelope,
    services::{
        metrics::TREND_ROWS_COUNTER,
        policy::{authorize, Action, RegionScope},
        trends::{TrendFilter, TrendService},
    },
    AppState,
};

/// Operator-owned public trends, limited to the caller's licensed regions.
pub async fn list_shared_trends(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    params: Result<Query<TrendQueryParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(params) = params?;
    let site_client_id = state.config.site_client_id;
    authorize(&Action::ReadSharedTrends, &user, site_client_id)?;

    let scope = RegionScope::for_user(&user, site_client_id);
    let filter = TrendFilter::from_params(&params, scope, Utc::now().date_naive())?;
    let rows = TrendService::fetch(&state.db, &TrendDataset::Shared, &filter).await?;
    envelope("Trends retrieved", rows)
}

/// The caller's own dataset. The site admin may read any tenant's with
/// `client_id`.
pub async fn list_user_trends(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    params: Result<Query<TrendQueryParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(params) = params?;
    let site_client_id = state.config.site_client_id;

    let dataset = match params.client_id {
        Some(client_id) if client_id != user.client_id => {
            authorize(&Action::ReadForeignTrends { client_id }, &user, site_client_id)?;
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM clients WHERE id = $1)")
                .bind(client_id)
                .fetch_one(&state.db)
                .await?;
            if !exists {
                return Err(ApiError::not_found("Client not found"));
            }
            TrendDataset::Tenant(client_id)
        }
        _ => resolve_and_provision(&state.db, user.role, user.client_id, site_client_id).await?,
    };

    let scope = RegionScope::for_user(&user, site_client_id);
    let filter = TrendFilter::from_params(&params, scope, Utc::now().date_naive())?;
    let rows = TrendService::fetch(&state.db, &dataset, &filter).await?;
    envelope("Trends retrieved", rows)
}

/// All-or-nothing bulk upload into the caller's dataset.
pub async fn insert_user_trends(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<InsertTrendsRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let site_client_id = state.config.site_client_id;
    authorize(&Action::WriteTrends, &user, site_client_id)?;
    let Json(body) = body?;

    let rows = TrendService::validate_batch(&body.rows)?;
    RegionScope::for_user(&user, site_client_id).ensure_all(rows.iter().map(|r| r.region_id))?;

    let dataset = resolve_and_provision(&state.db, user.role, user.client_id, site_client_id).await?;
    let inserted = TrendService::insert_batch(&state.db, &dataset, &rows).await?;

    TREND_ROWS_COUNTER.with_label_values(&["insert"]).inc_by(inserted as f64);
    tracing::info!(dataset = %dataset.key(), inserted, user_id = user.id, "trend rows inserted");
    Ok((StatusCode::CREATED, envelope("Trends inserted", json!({ "inserted": inserted }))?))
}

pub async fn delete_user_trends(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<DeleteTrendsRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let site_client_id = state.config.site_client_id;
    authorize(&Action::WriteTrends, &user, site_client_id)?;
    let Json(body) = body?;
    TrendService::validate_delete_ids(&body.ids)?;

    let dataset = resolve_and_provision(&state.db, user.role, user.client_id, site_client_id).await?;
    let scope = RegionScope::for_user(&user, site_client_id);
    let deleted = TrendService::delete_by_ids(&state.db, &dataset, &scope, &body.ids).await?;

    TREND_ROWS_COUNTER.with_label_values(&["delete"]).inc_by(deleted as f64);
    tracing::info!(dataset = %dataset.key(), deleted, user_id = user.id, "trend rows deleted");
    envelope("Trends deleted", json!({ "deleted": deleted }))
}
