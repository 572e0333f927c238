use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Organisation category. `owner` is an older spelling of `Business`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientType {
    #[serde(rename = "admin")]
    Admin,
    Government,
    #[serde(alias = "owner", alias = "business")]
    Business,
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClientType::Admin => "admin",
            ClientType::Government => "Government",
            ClientType::Business => "Business",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ClientType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(ClientType::Admin),
            "government" => Ok(ClientType::Government),
            "business" | "owner" => Ok(ClientType::Business),
            _ => Err(anyhow::anyhow!("Unknown client type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub client_type: String,
    pub email_domain: String,
    pub license_count: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client row with its entitled regions aggregated.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ClientWithLgas {
    pub id: i64,
    pub name: String,
    pub client_type: String,
    pub email_domain: String,
    pub license_count: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub lga_ids: Vec<i64>,
    pub user_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    pub months: Option<u32>,
}
