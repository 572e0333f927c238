pub mod auth;
pub mod clients;
pub mod health;
pub mod metrics;
pub mod posters;
pub mod reference;
pub mod subscriptions;
pub mod trends;
pub mod users;

use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ApiResult;

/// Success envelope: `{ "error": false, "message", "results" }`.
pub fn envelope(message: &str, results: impl Serialize) -> ApiResult<Json<Value>> {
    let results = serde_json::to_value(results).map_err(anyhow::Error::from)?;
    Ok(Json(json!({ "error": false, "message": message, "results": results })))
}
