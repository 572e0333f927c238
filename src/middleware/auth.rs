use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::{
    config::Config,
    error::{ApiError, AuthError},
    models::auth::AuthenticatedUser,
    services::auth::AuthService,
    AppState,
};

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let claims = AuthService::verify_token(token, &state.config.jwt_secret)?;
        let user = load_subject(&state.db, &claims.user.email).await?;
        check_subscription(&user, &state.config, Utc::now())?;
        Ok(user)
    }
}

/// Extract `<token>` from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::Missing)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::Missing)
}

#[derive(Debug, FromRow)]
struct SubjectRow {
    id: i64,
    email: String,
    role: String,
    client_id: i64,
    client_name: String,
    client_type: String,
    expires_at: Option<DateTime<Utc>>,
    lga_ids: String,
}

/// Load the token subject joined with its client and the client's regions.
/// A user deleted after the token was issued is an unknown subject.
pub async fn load_subject(pool: &PgPool, email: &str) -> Result<AuthenticatedUser, ApiError> {
    let row = sqlx::query_as::<_, SubjectRow>(
        "SELECT u.id, u.email, u.role, u.client_id,
                c.name AS client_name, c.client_type, c.expires_at,
                COALESCE(string_agg(cl.lga_id::TEXT, ',' ORDER BY cl.lga_id), '') AS lga_ids
         FROM users u
         JOIN clients c ON c.id = u.client_id
         LEFT JOIN client_lgas cl ON cl.client_id = c.id
         WHERE LOWER(u.email) = LOWER($1)
         GROUP BY u.id, c.id",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .ok_or(AuthError::UnknownSubject)?;

    Ok(AuthenticatedUser {
        id: row.id,
        email: row.email,
        role: row.role.parse()?,
        client_id: row.client_id,
        client_name: row.client_name,
        client_type: row.client_type.parse()?,
        lga_ids: parse_lga_ids(&row.lga_ids)?,
        client_expires_at: row.expires_at,
    })
}

/// Parse the comma-joined region aggregate. An empty aggregate is an empty list.
pub fn parse_lga_ids(raw: &str) -> anyhow::Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().map_err(|e| anyhow::anyhow!("bad lga id '{s}': {e}")))
        .collect()
}

/// Optional lapsed-subscription gate. The site client never expires.
pub fn check_subscription(user: &AuthenticatedUser, config: &Config, now: DateTime<Utc>) -> Result<(), ApiError> {
    if !config.enforce_subscription_expiry || user.client_id == config.site_client_id {
        return Ok(());
    }
    match user.client_expires_at {
        Some(expires_at) if expires_at < now => Err(ApiError::SubscriptionExpired),
        _ => Ok(()),
    }
}
