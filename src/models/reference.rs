use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Local government area.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lga {
    pub id: i64,
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrendType {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTrendTypeRequest {
    pub name: String,
    pub description: Option<String>,
}
