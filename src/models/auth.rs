use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{client::ClientType, user::UserRole};

/// The `user` object embedded in the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUser {
    pub id: i64,
    pub email: String,
    pub role: UserRole,
    pub client_id: i64,
}

/// Claims embedded in the JWT access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user: TokenUser,
    pub exp: usize,
    pub iat: usize,
}

/// Resolved by the credential verifier and available via Axum extractors.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub email: String,
    pub role: UserRole,
    pub client_id: i64,
    pub client_name: String,
    pub client_type: ClientType,
    pub lga_ids: Vec<i64>,
    #[serde(skip_serializing)]
    pub client_expires_at: Option<DateTime<Utc>>,
}
