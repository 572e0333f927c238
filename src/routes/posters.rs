use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{ApiError, ApiResult},
    models::auth::AuthenticatedUser,
    routes::envelope,
    AppState,
};

/// Movie ids the caller has uploaded posters for.
pub async fn list_posters(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Value>> {
    let movies = state.posters.movies_for(&user.email).await;
    envelope("Posters retrieved", json!({ "movie_ids": movies }))
}

/// Replace the caller's poster for `movie_id` with the first multipart file.
pub async fn upload_poster(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(movie_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Invalid multipart body: {e}")))?
        .ok_or_else(|| ApiError::validation("No file provided"))?;

    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::validation(format!("Failed to read upload: {e}")))?;

    let name = state.posters.save(&user.email, &movie_id, data).await?;
    tracing::info!(user_id = user.id, file = %name, "poster uploaded");
    Ok((
        StatusCode::CREATED,
        envelope("Poster uploaded", json!({ "movie_id": movie_id }))?,
    ))
}

pub async fn get_poster(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(movie_id): Path<String>,
) -> ApiResult<Response> {
    let data = state.posters.read(&user.email, &movie_id).await?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/png")
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(Body::from(data))
        .map_err(|e| ApiError::Internal(e.into()))
}
