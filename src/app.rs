use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{routes, AppState};

pub fn build_router(state: AppState) -> Router {
    // Allow the configured front-end origin; localhost always passes for development.
    let base = state.config.app_base_url.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let Ok(o) = origin.to_str() else {
            return false;
        };
        o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") || o == base
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Auth
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/me", get(routes::auth::me))
        // Onboarding (public side)
        .route("/subscriptions", post(routes::subscriptions::submit_quote))
        .route("/subscriptions/{reference}", get(routes::subscriptions::get_quote))
        // Reference data
        .route("/lgas", get(routes::reference::list_lgas))
        .route("/trend-types", get(routes::reference::list_trend_types).post(routes::reference::create_trend_type))
        // Trends
        .route("/trends", get(routes::trends::list_shared_trends))
        .route(
            "/user-trends",
            get(routes::trends::list_user_trends)
                .post(routes::trends::insert_user_trends)
                .delete(routes::trends::delete_user_trends),
        )
        // Tenant user management
        .route("/users", get(routes::users::list_users).post(routes::users::create_user))
        // Clients
        .route("/clients", get(routes::clients::list_clients))
        .route("/clients/me", get(routes::clients::my_client))
        .route("/clients/{id}/renew", post(routes::clients::renew_client))
        // Site admin onboarding review
        .route("/admin/subscriptions", get(routes::subscriptions::list_subscriptions))
        .route("/admin/subscriptions/finalize", post(routes::subscriptions::finalize_subscription))
        // Posters
        .route("/posters", get(routes::posters::list_posters))
        .route("/posters/{movie_id}", get(routes::posters::get_poster).post(routes::posters::upload_poster))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(state)
}
