use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        auth::AuthenticatedUser,
        reference::{CreateTrendTypeRequest, Lga, TrendType},
    },
    routes::envelope,
    services::{
        auth::conflict_on_unique,
        policy::{authorize, Action},
    },
    AppState,
};

const MAX_TREND_TYPE_NAME: usize = 128;

pub async fn list_lgas(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> ApiResult<Json<Value>> {
    let lgas = sqlx::query_as::<_, Lga>("SELECT id, name, state FROM lgas ORDER BY name")
        .fetch_all(&state.db)
        .await?;
    envelope("Regions retrieved", lgas)
}

pub async fn list_trend_types(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> ApiResult<Json<Value>> {
    let types = sqlx::query_as::<_, TrendType>(
        "SELECT id, name, description, created_at FROM trend_types ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    envelope("Trend types retrieved", types)
}

pub async fn create_trend_type(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<CreateTrendTypeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    authorize(&Action::ManageReferenceData, &user, state.config.site_client_id)?;
    let Json(body) = body?;

    let name = body.name.trim();
    if name.is_empty() || name.len() > MAX_TREND_TYPE_NAME {
        return Err(ApiError::validation(format!(
            "name must be 1-{MAX_TREND_TYPE_NAME} characters"
        )));
    }

    let trend_type = sqlx::query_as::<_, TrendType>(
        "INSERT INTO trend_types (name, description) VALUES ($1, $2)
         RETURNING id, name, description, created_at",
    )
    .bind(name)
    .bind(body.description.as_deref().map(str::trim).unwrap_or(""))
    .fetch_one(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, "Trend type already exists"))?;

    tracing::info!(trend_type_id = trend_type.id, name = %trend_type.name, "trend type created");
    Ok((StatusCode::CREATED, envelope("Trend type created", trend_type)?))
}
