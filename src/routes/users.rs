use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{ApiError, ApiResult},
    models::{
        auth::AuthenticatedUser,
        client::Client,
        user::{CreateUserRequest, ListUsersQuery, UserProfile, UserRole},
    },
    routes::envelope,
    services::{
        auth::{ensure_license_available, insert_user, AuthService},
        policy::{authorize, Action},
    },
    AppState,
};

/// List the users of the caller's client. The site admin may pick any client.
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    query: Result<Query<ListUsersQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let client_id = target_client(&user, query.client_id);
    authorize(&Action::ListUsers { client_id }, &user, state.config.site_client_id)?;

    let users = sqlx::query_as::<_, crate::models::user::User>(
        "SELECT id, email, password_hash, role, client_id, created_at, updated_at
         FROM users WHERE client_id = $1 ORDER BY email",
    )
    .bind(client_id)
    .fetch_all(&state.db)
    .await?;

    let profiles: Vec<UserProfile> = users.into_iter().map(UserProfile::from).collect();
    envelope("Users retrieved", profiles)
}

/// Create a user inside a client, within its license count.
///
/// When no password is supplied one is generated and returned in this
/// response only.
pub async fn create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = body?;
    let site_client_id = state.config.site_client_id;
    let client_id = target_client(&user, body.client_id);
    let role = body.role.unwrap_or(UserRole::User);
    authorize(&Action::CreateUser { client_id, role }, &user, site_client_id)?;

    if role == UserRole::Admin && client_id != site_client_id {
        return Err(ApiError::validation("Admin users can only belong to the site client"));
    }

    let email = body.email.trim().to_lowercase();
    let (password, generated) = match body.password {
        Some(p) => (p, false),
        None => (AuthService::generate_password(), true),
    };
    AuthService::validate_credentials(&email, &password)?;
    let password_hash = AuthService::hash_password(&password, state.config.bcrypt_cost)?;

    let mut tx = state.db.begin().await?;
    let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1 FOR UPDATE")
        .bind(client_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Client not found"))?;
    ensure_license_available(&mut tx, client.id, client.license_count).await?;
    let created = insert_user(&mut tx, &email, &password_hash, role, client.id).await?;
    tx.commit().await?;

    tracing::info!(user_id = created.id, client_id, %role, by = user.id, "user created");

    let mut results = json!({ "user": UserProfile::from(created) });
    if generated {
        results["password"] = json!(password);
    }
    Ok((StatusCode::CREATED, envelope("User created", results)?))
}

/// The client a request addresses. Naming a client other than the caller's
/// own is left for `authorize` to refuse unless the caller is the site admin.
fn target_client(user: &AuthenticatedUser, requested: Option<i64>) -> i64 {
    requested.unwrap_or(user.client_id)
}
