use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde_json::Value;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        auth::AuthenticatedUser,
        client::{ClientWithLgas, RenewRequest},
    },
    routes::envelope,
    services::{
        onboarding::OnboardingService,
        policy::{authorize, Action},
    },
    AppState,
};

const CLIENT_SELECT: &str = "
    SELECT c.id, c.name, c.client_type, c.email_domain, c.license_count, c.expires_at,
           ARRAY(SELECT cl.lga_id FROM client_lgas cl
                 WHERE cl.client_id = c.id ORDER BY cl.lga_id) AS lga_ids,
           (SELECT COUNT(*) FROM users u WHERE u.client_id = c.id) AS user_count
    FROM clients c";

/// All clients with their regions and seat usage. Site admin only.
pub async fn list_clients(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Value>> {
    authorize(&Action::ManageClients, &user, state.config.site_client_id)?;

    let clients = sqlx::query_as::<_, ClientWithLgas>(&format!("{CLIENT_SELECT} ORDER BY c.id"))
        .fetch_all(&state.db)
        .await?;
    envelope("Clients retrieved", clients)
}

/// The caller's own client.
pub async fn my_client(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Value>> {
    let client = sqlx::query_as::<_, ClientWithLgas>(&format!("{CLIENT_SELECT} WHERE c.id = $1"))
        .bind(user.client_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Client not found"))?;
    envelope("Client retrieved", client)
}

pub async fn renew_client(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(client_id): Path<i64>,
    body: Result<Json<RenewRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    authorize(&Action::ManageClients, &user, state.config.site_client_id)?;
    let Json(body) = body?;
    let months = body.months.unwrap_or(state.config.subscription_months);

    let client = OnboardingService::renew(&state.db, client_id, months).await?;
    envelope("Subscription renewed", client)
}
