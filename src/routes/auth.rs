use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{ApiError, ApiResult},
    middleware::rate_limit::check_rate_limit,
    models::{
        auth::AuthenticatedUser,
        user::{LoginRequest, RegisterRequest, UserProfile},
    },
    routes::envelope,
    services::{auth::AuthService, metrics::LOGINS_COUNTER},
    AppState,
};

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = body?;
    let user = AuthService::register(&state.db, &state.config, &body.email, &body.password).await?;
    Ok((StatusCode::CREATED, envelope("User registered", UserProfile::from(user))?))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }

    // Rate limit: 10 attempts per 15 min per email
    let rate_key = format!("rate:login:{}", body.email.trim().to_lowercase());
    check_rate_limit(&state.redis, &rate_key, 10, 900).await?;

    match AuthService::login(&state.db, &state.config, &body.email, &body.password).await {
        Ok((token, user)) => {
            LOGINS_COUNTER.with_label_values(&["success"]).inc();
            envelope(
                "Login successful",
                json!({ "token": token, "user": UserProfile::from(user) }),
            )
        }
        Err(e) => {
            LOGINS_COUNTER.with_label_values(&["failure"]).inc();
            Err(e)
        }
    }
}

pub async fn me(user: AuthenticatedUser) -> ApiResult<Json<Value>> {
    envelope("Authenticated", user)
}
