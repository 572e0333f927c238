use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::ApiResult,
    middleware::rate_limit::check_rate_limit,
    models::{
        auth::AuthenticatedUser,
        subscription::{FinalizeRequest, ListSubscriptionsQuery, QuoteSubmission},
    },
    routes::envelope,
    services::{
        onboarding::{OnboardingService, QuotePricing},
        policy::{authorize, Action},
    },
    AppState,
};

fn client_ip(h: &HeaderMap) -> String {
    h.get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            h.get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .map(|s| s.trim())
        })
        .unwrap_or("unknown")
        .to_string()
}

/// Public quote request form.
pub async fn submit_quote(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<QuoteSubmission>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = body?;
    let quote = body.validate(QuotePricing::from(state.config.as_ref()))?;

    // Rate limit: 5 quotes per hour per IP
    let rate_key = format!("rate:quote:{}", client_ip(&headers));
    check_rate_limit(&state.redis, &rate_key, 5, 3600).await?;

    let row = OnboardingService::submit_quote(&state.db, quote).await?;
    Ok((
        StatusCode::CREATED,
        envelope(
            "Quote submitted",
            json!({
                "id": row.id,
                "quote_reference": row.quote_reference,
                "quote_amount_cents": row.quote_amount_cents,
                "status": row.status,
            }),
        )?,
    ))
}

/// Public status lookup by quote reference. Contact details stay private.
pub async fn get_quote(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> ApiResult<Json<Value>> {
    let row = OnboardingService::find_by_reference(&state.db, &reference).await?;
    envelope(
        "Quote retrieved",
        json!({
            "quote_reference": row.quote_reference,
            "organisation_name": row.organisation_name,
            "license_count": row.license_count,
            "lga_ids": row.lga_ids,
            "quote_amount_cents": row.quote_amount_cents,
            "payment_method": row.payment_method,
            "status": row.status,
        }),
    )
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    query: Result<Query<ListSubscriptionsQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    authorize(&Action::ReviewSubscriptions, &user, state.config.site_client_id)?;
    let Query(query) = query?;
    let rows = OnboardingService::list(&state.db, query.status).await?;
    envelope("Subscriptions retrieved", rows)
}

/// Provision a pending request. The generated password appears in this
/// response and nowhere else.
pub async fn finalize_subscription(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<FinalizeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    authorize(&Action::ReviewSubscriptions, &user, state.config.site_client_id)?;
    let Json(body) = body?;
    let provisioned = OnboardingService::finalize(&state.db, &state.config, body.new_client_id).await?;
    Ok((StatusCode::CREATED, envelope("Client registered", provisioned)?))
}
