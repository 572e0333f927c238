use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Registered,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Registered => "registered",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubscriptionStatus::Pending),
            "registered" => Ok(SubscriptionStatus::Registered),
            _ => Err(anyhow::anyhow!("Unknown subscription status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Invoice,
    Card,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentMethod::Invoice => "invoice",
            PaymentMethod::Card => "card",
        };
        write!(f, "{s}")
    }
}

/// Pending onboarding request (`new_clients` row).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NewClient {
    pub id: i64,
    pub organisation_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub client_type: String,
    pub lga_ids: Vec<i64>,
    pub license_count: i32,
    pub quote_amount_cents: i64,
    pub payment_method: String,
    pub status: String,
    pub quote_reference: String,
    pub registered_client_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw quote submission from the subscription form.
#[derive(Debug, Deserialize)]
pub struct QuoteSubmission {
    pub organisation_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub client_type: String,
    pub lga_ids: Vec<i64>,
    pub license_count: i32,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub new_client_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub status: Option<SubscriptionStatus>,
}

/// Returned exactly once by the finalize call.
#[derive(Debug, Serialize)]
pub struct ProvisionedClient {
    pub client_id: i64,
    pub user_id: i64,
    pub email: String,
    pub password: String,
}
