//! Subscription onboarding: quote request → admin review → provisioning.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    config::Config,
    db::tenant::{provision_dataset, TrendDataset},
    error::{is_foreign_key_violation, ApiError},
    models::{
        client::{Client, ClientType},
        subscription::{NewClient, PaymentMethod, ProvisionedClient, QuoteSubmission, SubscriptionStatus},
        user::UserRole,
    },
    services::{
        auth::{email_domain, extend_expiry, insert_user, AuthService},
        metrics::ONBOARDING_COUNTER,
    },
};

pub const MAX_LICENSES: i32 = 1_000;
pub const MAX_RENEWAL_MONTHS: u32 = 60;

/// A quote submission that passed validation, priced.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidQuote {
    pub organisation_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub client_type: ClientType,
    pub lga_ids: Vec<i64>,
    pub license_count: i32,
    pub payment_method: PaymentMethod,
    pub quote_amount_cents: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct QuotePricing {
    pub cents_per_license: i64,
    pub cents_per_region: i64,
}

impl From<&Config> for QuotePricing {
    fn from(config: &Config) -> Self {
        Self {
            cents_per_license: config.quote_cents_per_license,
            cents_per_region: config.quote_cents_per_region,
        }
    }
}

impl QuotePricing {
    pub fn amount(&self, license_count: i32, regions: usize) -> i64 {
        i64::from(license_count) * self.cents_per_license + regions as i64 * self.cents_per_region
    }
}

impl QuoteSubmission {
    pub fn validate(self, pricing: QuotePricing) -> Result<ValidQuote, ApiError> {
        let organisation_name = self.organisation_name.trim().to_string();
        if organisation_name.is_empty() {
            return Err(ApiError::validation("organisation_name is required"));
        }
        let contact_name = self.contact_name.trim().to_string();
        if contact_name.is_empty() {
            return Err(ApiError::validation("contact_name is required"));
        }
        email_domain(&self.email)?;

        let client_type: ClientType = self
            .client_type
            .parse()
            .map_err(|_| ApiError::validation("client_type must be Government or Business"))?;
        if client_type == ClientType::Admin {
            return Err(ApiError::validation("client_type must be Government or Business"));
        }

        let mut lga_ids = self.lga_ids;
        lga_ids.sort_unstable();
        lga_ids.dedup();
        if lga_ids.is_empty() {
            return Err(ApiError::validation("lga_ids must list at least one region"));
        }
        if lga_ids.iter().any(|id| *id <= 0) {
            return Err(ApiError::validation("lga_ids must be positive integers"));
        }

        if !(1..=MAX_LICENSES).contains(&self.license_count) {
            return Err(ApiError::validation(format!(
                "license_count must be between 1 and {MAX_LICENSES}"
            )));
        }

        let quote_amount_cents = pricing.amount(self.license_count, lga_ids.len());
        Ok(ValidQuote {
            organisation_name,
            contact_name,
            email: self.email.trim().to_lowercase(),
            phone: self.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            client_type,
            lga_ids,
            license_count: self.license_count,
            payment_method: self.payment_method,
            quote_amount_cents,
        })
    }
}

/// Opaque reference shown to the prospective client.
pub fn generate_quote_reference() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("Q-{}", &id[..12])
}

/// What provisioning needs from a pending request.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub id: i64,
    pub organisation_name: String,
    pub email: String,
    pub client_type: ClientType,
    pub lga_ids: Vec<i64>,
    pub license_count: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OnboardingState {
    Pending(PendingRequest),
    Registered { client_id: Option<i64> },
}

impl OnboardingState {
    pub fn from_row(row: NewClient) -> Result<Self, ApiError> {
        let status: SubscriptionStatus = row.status.parse()?;
        match status {
            SubscriptionStatus::Registered => Ok(OnboardingState::Registered {
                client_id: row.registered_client_id,
            }),
            SubscriptionStatus::Pending => Ok(OnboardingState::Pending(PendingRequest {
                id: row.id,
                organisation_name: row.organisation_name,
                email: row.email,
                client_type: row.client_type.parse()?,
                lga_ids: row.lga_ids,
                license_count: row.license_count,
            })),
        }
    }

    /// Only a pending request can be provisioned.
    pub fn begin_provisioning(self) -> Result<PendingRequest, ApiError> {
        match self {
            OnboardingState::Pending(request) => Ok(request),
            OnboardingState::Registered { .. } => {
                Err(ApiError::conflict("Subscription already registered"))
            }
        }
    }
}

/// Record a refused duplicate provisioning, whichever check caught it.
fn count_duplicate(err: ApiError) -> ApiError {
    if matches!(err, ApiError::Conflict(_)) {
        ONBOARDING_COUNTER.with_label_values(&["duplicate"]).inc();
    }
    err
}

pub struct OnboardingService;

impl OnboardingService {
    pub async fn submit_quote(pool: &PgPool, quote: ValidQuote) -> Result<NewClient, ApiError> {
        let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lgas WHERE id = ANY($1)")
            .bind(&quote.lga_ids)
            .fetch_one(pool)
            .await?;
        if known != quote.lga_ids.len() as i64 {
            return Err(ApiError::validation("lga_ids contains an unknown region"));
        }

        let row = sqlx::query_as::<_, NewClient>(
            "INSERT INTO new_clients
                (organisation_name, contact_name, email, phone, client_type, lga_ids,
                 license_count, quote_amount_cents, payment_method, status, quote_reference)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10)
             RETURNING *",
        )
        .bind(&quote.organisation_name)
        .bind(&quote.contact_name)
        .bind(&quote.email)
        .bind(&quote.phone)
        .bind(quote.client_type.to_string())
        .bind(&quote.lga_ids)
        .bind(quote.license_count)
        .bind(quote.quote_amount_cents)
        .bind(quote.payment_method.to_string())
        .bind(generate_quote_reference())
        .fetch_one(pool)
        .await?;

        tracing::info!(new_client_id = row.id, reference = %row.quote_reference, "quote submitted");
        ONBOARDING_COUNTER.with_label_values(&["quoted"]).inc();
        Ok(row)
    }

    pub async fn find_by_reference(pool: &PgPool, reference: &str) -> Result<NewClient, ApiError> {
        sqlx::query_as::<_, NewClient>("SELECT * FROM new_clients WHERE quote_reference = $1")
            .bind(reference)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Quote not found"))
    }

    pub async fn list(pool: &PgPool, status: Option<SubscriptionStatus>) -> Result<Vec<NewClient>, ApiError> {
        let rows = sqlx::query_as::<_, NewClient>(
            "SELECT * FROM new_clients
             WHERE ($1::TEXT IS NULL OR status = $1)
             ORDER BY created_at DESC",
        )
        .bind(status.map(|s| s.to_string()))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Turn a pending request into a client, its `client_admin` and its
    /// region entitlements, all in one transaction. The generated password
    /// is only ever returned here.
    pub async fn finalize(pool: &PgPool, config: &Config, new_client_id: i64) -> Result<ProvisionedClient, ApiError> {
        let mut tx = pool.begin().await?;

        let row = sqlx::query_as::<_, NewClient>("SELECT * FROM new_clients WHERE id = $1 FOR UPDATE")
            .bind(new_client_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::not_found("Subscription request not found"))?;

        let request = OnboardingState::from_row(row)?.begin_provisioning()?;

        let existing: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))")
            .bind(&request.email)
            .fetch_one(&mut *tx)
            .await?;
        if existing {
            return Err(count_duplicate(ApiError::conflict("User already exists")));
        }

        let password = AuthService::generate_password();
        let password_hash = AuthService::hash_password(&password, config.bcrypt_cost)?;
        let expires_at = extend_expiry(Utc::now(), config.subscription_months);

        let client = sqlx::query_as::<_, Client>(
            "INSERT INTO clients (name, client_type, email_domain, license_count, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(&request.organisation_name)
        .bind(request.client_type.to_string())
        .bind(email_domain(&request.email)?)
        .bind(request.license_count)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        let user = insert_user(&mut tx, &request.email, &password_hash, UserRole::ClientAdmin, client.id)
            .await
            .map_err(count_duplicate)?;

        sqlx::query("INSERT INTO client_lgas (client_id, lga_id) SELECT $1, UNNEST($2::BIGINT[])")
            .bind(client.id)
            .bind(&request.lga_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ApiError::validation("Subscription request references an unknown region")
                } else {
                    ApiError::Storage(e)
                }
            })?;

        sqlx::query(
            "UPDATE new_clients SET status = 'registered', registered_client_id = $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(request.id)
        .bind(client.id)
        .execute(&mut *tx)
        .await?;

        provision_dataset(&mut *tx, &TrendDataset::Tenant(client.id)).await?;

        tx.commit().await?;

        ONBOARDING_COUNTER.with_label_values(&["registered"]).inc();
        tracing::info!(new_client_id = request.id, client_id = client.id, user_id = user.id, "client provisioned");

        // TODO: deliver credentials by email once an outbound mail service is configured.
        Ok(ProvisionedClient {
            client_id: client.id,
            user_id: user.id,
            email: user.email,
            password,
        })
    }

    /// Extend a subscription by `months`, counting from now when already lapsed.
    pub async fn renew(pool: &PgPool, client_id: i64, months: u32) -> Result<Client, ApiError> {
        if !(1..=MAX_RENEWAL_MONTHS).contains(&months) {
            return Err(ApiError::validation(format!(
                "months must be between 1 and {MAX_RENEWAL_MONTHS}"
            )));
        }

        let current: Option<Option<chrono::DateTime<Utc>>> =
            sqlx::query_scalar("SELECT expires_at FROM clients WHERE id = $1")
                .bind(client_id)
                .fetch_optional(pool)
                .await?;
        let current = current.ok_or_else(|| ApiError::not_found("Client not found"))?;

        let now = Utc::now();
        let base = current.filter(|at| *at > now).unwrap_or(now);
        let expires_at = extend_expiry(base, months);

        let client = sqlx::query_as::<_, Client>(
            "UPDATE clients SET expires_at = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(client_id)
        .bind(expires_at)
        .fetch_one(pool)
        .await?;

        tracing::info!(client_id, %expires_at, "subscription renewed");
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn pricing() -> QuotePricing {
        QuotePricing { cents_per_license: 50_000, cents_per_region: 25_000 }
    }

    fn submission() -> QuoteSubmission {
        QuoteSubmission {
            organisation_name: " Coastal Council ".into(),
            contact_name: "Sam Lee".into(),
            email: "Sam@Coastal.gov.au".into(),
            phone: Some("  ".into()),
            client_type: "government".into(),
            lga_ids: vec![7, 3, 7],
            license_count: 4,
            payment_method: PaymentMethod::Invoice,
        }
    }

    fn row(status: &str) -> NewClient {
        NewClient {
            id: 11,
            organisation_name: "Coastal Council".into(),
            contact_name: "Sam Lee".into(),
            email: "sam@coastal.gov.au".into(),
            phone: None,
            client_type: "Government".into(),
            lga_ids: vec![3, 7],
            license_count: 4,
            quote_amount_cents: 250_000,
            payment_method: "invoice".into(),
            status: status.into(),
            quote_reference: "Q-ABCDEF123456".into(),
            registered_client_id: (status == "registered").then_some(42),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn quote_is_normalised_and_priced() {
        let quote = submission().validate(pricing()).unwrap();
        assert_eq!(quote.organisation_name, "Coastal Council");
        assert_eq!(quote.email, "sam@coastal.gov.au");
        assert_eq!(quote.phone, None);
        assert_eq!(quote.client_type, ClientType::Government);
        assert_eq!(quote.lga_ids, vec![3, 7]);
        assert_eq!(quote.quote_amount_cents, 4 * 50_000 + 2 * 25_000);
    }

    #[test]
    fn owner_is_accepted_as_business() {
        let mut s = submission();
        s.client_type = "owner".into();
        assert_eq!(s.validate(pricing()).unwrap().client_type, ClientType::Business);
    }

    #[test]
    fn invalid_quotes_are_rejected() {
        let mut s = submission();
        s.client_type = "admin".into();
        assert_eq!(s.validate(pricing()).unwrap_err().status(), StatusCode::BAD_REQUEST);

        let mut s = submission();
        s.lga_ids.clear();
        assert!(s.validate(pricing()).is_err());

        let mut s = submission();
        s.license_count = 0;
        assert!(s.validate(pricing()).is_err());

        let mut s = submission();
        s.email = "nobody".into();
        assert!(s.validate(pricing()).is_err());

        let mut s = submission();
        s.organisation_name = "   ".into();
        assert!(s.validate(pricing()).is_err());
    }

    #[test]
    fn quote_references_are_opaque_and_unique() {
        let a = generate_quote_reference();
        let b = generate_quote_reference();
        assert!(a.starts_with("Q-"));
        assert_eq!(a.len(), 14);
        assert_ne!(a, b);
    }

    #[test]
    fn pending_request_can_be_provisioned() {
        let state = OnboardingState::from_row(row("pending")).unwrap();
        let request = state.begin_provisioning().unwrap();
        assert_eq!(request.id, 11);
        assert_eq!(request.client_type, ClientType::Government);
        assert_eq!(request.lga_ids, vec![3, 7]);
    }

    #[test]
    fn registered_request_is_terminal() {
        let state = OnboardingState::from_row(row("registered")).unwrap();
        assert_eq!(state, OnboardingState::Registered { client_id: Some(42) });
        assert_eq!(state.begin_provisioning().unwrap_err().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn unknown_status_is_an_error() {
        assert!(OnboardingState::from_row(row("archived")).is_err());
    }

    #[test]
    fn only_conflicts_count_as_duplicates() {
        let duplicates = || ONBOARDING_COUNTER.with_label_values(&["duplicate"]).get();
        let before = duplicates();

        let err = count_duplicate(ApiError::conflict("User already exists"));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(duplicates(), before + 1.0);

        let err = count_duplicate(ApiError::validation("bad"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(duplicates(), before + 1.0);
    }
}
