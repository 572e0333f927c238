use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::Rng;
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    config::Config,
    error::{is_unique_violation, ApiError, AuthError},
    models::{
        auth::{Claims, TokenUser},
        client::{Client, ClientType},
        user::{User, UserRole},
    },
};

/// Characters used for generated passwords (no lookalikes).
const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";
const GENERATED_PASSWORD_LEN: usize = 16;
pub const MIN_PASSWORD_LEN: usize = 8;

pub struct AuthService;

impl AuthService {
    pub fn issue_token(user: &User, role: UserRole, secret: &str, ttl_seconds: u64) -> anyhow::Result<String> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            user: TokenUser {
                id: user.id,
                email: user.email.clone(),
                role,
                client_id: user.client_id,
            },
            iat: now,
            exp: now + ttl_seconds as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Check signature and expiry. Never touches the database, so an expired
    /// token is reported as expired whether or not its user still exists.
    pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
        let key = DecodingKey::from_secret(secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<Claims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::Malformed,
            })
    }

    pub fn hash_password(password: &str, cost: u32) -> anyhow::Result<String> {
        Ok(bcrypt::hash(password, cost)?)
    }

    pub fn generate_password() -> String {
        let mut rng = rand::thread_rng();
        (0..GENERATED_PASSWORD_LEN)
            .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
            .collect()
    }

    pub fn validate_credentials(email: &str, password: &str) -> Result<(), ApiError> {
        validate_email(email)?;
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ApiError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }

    /// Verify email + password and return a signed token with the user.
    pub async fn login(pool: &PgPool, config: &Config, email: &str, password: &str) -> Result<(String, User), ApiError> {
        let invalid = || ApiError::Unauthorized(AuthError::BadCredentials);

        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, role, client_id, created_at, updated_at
             FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email.trim())
        .fetch_optional(pool)
        .await?
        .ok_or_else(invalid)?;

        let valid = bcrypt::verify(password, &user.password_hash).map_err(|_| invalid())?;
        if !valid {
            return Err(invalid());
        }

        let role: UserRole = user.role.parse()?;
        let token = Self::issue_token(&user, role, &config.jwt_secret, config.jwt_expiry_seconds)?;
        Ok((token, user))
    }

    /// Self-service registration.
    ///
    /// The very first user bootstraps the operator tenant: one site client,
    /// one `admin` user, and an entitlement to every known region. Later
    /// users join the client whose email domain matches theirs, within that
    /// client's license count.
    pub async fn register(pool: &PgPool, config: &Config, email: &str, password: &str) -> Result<User, ApiError> {
        Self::validate_credentials(email, password)?;
        let email = email.trim().to_lowercase();
        let password_hash = Self::hash_password(password, config.bcrypt_cost)?;

        let mut tx = pool.begin().await?;

        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await?;

        let user = if user_count == 0 {
            Self::bootstrap_site(&mut tx, config, &email, &password_hash).await?
        } else {
            Self::join_client(&mut tx, &email, &password_hash).await?
        };

        tx.commit().await?;
        tracing::info!(user_id = user.id, client_id = user.client_id, role = %user.role, "user registered");
        Ok(user)
    }

    async fn bootstrap_site(
        tx: &mut Transaction<'_, Postgres>,
        config: &Config,
        email: &str,
        password_hash: &str,
    ) -> Result<User, ApiError> {
        let domain = email_domain(email)?;

        // A concurrent bootstrap loses on the explicit primary key.
        sqlx::query(
            "INSERT INTO clients (id, name, client_type, email_domain, license_count)
             VALUES ($1, 'Site Administration', $2, $3, 1000)",
        )
        .bind(config.site_client_id)
        .bind(ClientType::Admin.to_string())
        .bind(domain)
        .execute(&mut **tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Site client already exists"))?;

        sqlx::query(
            "SELECT setval(pg_get_serial_sequence('clients', 'id'),
                           GREATEST((SELECT MAX(id) FROM clients), 1))",
        )
        .execute(&mut **tx)
        .await?;

        let user = insert_user(tx, email, password_hash, UserRole::Admin, config.site_client_id).await?;

        sqlx::query("INSERT INTO client_lgas (client_id, lga_id) SELECT $1, id FROM lgas")
            .bind(config.site_client_id)
            .execute(&mut **tx)
            .await?;

        tracing::info!("bootstrapped site client {}", config.site_client_id);
        Ok(user)
    }

    async fn join_client(
        tx: &mut Transaction<'_, Postgres>,
        email: &str,
        password_hash: &str,
    ) -> Result<User, ApiError> {
        let domain = email_domain(email)?;

        // Row lock serialises license counting for this client.
        let client = sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE LOWER(email_domain) = $1
             ORDER BY id LIMIT 1 FOR UPDATE",
        )
        .bind(domain)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::forbidden("No subscription found for this email domain"))?;

        if let Some(expires_at) = client.expires_at {
            if expires_at < Utc::now() {
                return Err(ApiError::SubscriptionExpired);
            }
        }

        ensure_license_available(tx, client.id, client.license_count).await?;
        insert_user(tx, email, password_hash, UserRole::User, client.id).await
    }
}

/// Insert a user. The unique email constraint is the authority on duplicates.
pub async fn insert_user(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
    password_hash: &str,
    role: UserRole,
    client_id: i64,
) -> Result<User, ApiError> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (email, password_hash, role, client_id)
         VALUES ($1, $2, $3, $4)
         RETURNING id, email, password_hash, role, client_id, created_at, updated_at",
    )
    .bind(email)
    .bind(password_hash)
    .bind(role.to_string())
    .bind(client_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| conflict_on_unique(e, "User already exists"))
}

pub async fn ensure_license_available(
    tx: &mut Transaction<'_, Postgres>,
    client_id: i64,
    license_count: i32,
) -> Result<(), ApiError> {
    let used: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE client_id = $1")
        .bind(client_id)
        .fetch_one(&mut **tx)
        .await?;
    if used >= i64::from(license_count) {
        return Err(ApiError::forbidden(format!(
            "License limit reached ({license_count} users)"
        )));
    }
    Ok(())
}

pub fn conflict_on_unique(err: sqlx::Error, message: &str) -> ApiError {
    if is_unique_violation(&err) {
        ApiError::conflict(message)
    } else {
        ApiError::Storage(err)
    }
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    email_domain(email).map(|_| ())
}

/// Lower-cased part after the `@`.
pub fn email_domain(email: &str) -> Result<String, ApiError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && domain.contains('.') && !domain.contains('@') && !domain.starts_with('.') =>
        {
            Ok(domain.to_lowercase())
        }
        _ => Err(ApiError::validation("Invalid email address")),
    }
}

/// Expiry `months` after `from`, approximated as 30-day months.
pub fn extend_expiry(from: chrono::DateTime<Utc>, months: u32) -> chrono::DateTime<Utc> {
    from + Duration::days(30 * i64::from(months))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 5,
            email: "ana@visit.example.org".into(),
            password_hash: String::new(),
            role: "client_admin".into(),
            client_id: 42,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn token_with(exp_offset: i64, secret: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user: TokenUser { id: 5, email: "ana@visit.example.org".into(), role: UserRole::ClientAdmin, client_id: 42 },
            iat: now as usize,
            exp: (now + exp_offset) as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn issued_token_round_trips() {
        let token = AuthService::issue_token(&user(), UserRole::ClientAdmin, "s3cret", 86_400).unwrap();
        let claims = AuthService::verify_token(&token, "s3cret").unwrap();
        assert_eq!(claims.user.email, "ana@visit.example.org");
        assert_eq!(claims.user.client_id, 42);
        assert_eq!(claims.user.role, UserRole::ClientAdmin);
        assert_eq!(claims.exp - claims.iat, 86_400);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let token = token_with(-10, "s3cret");
        assert_eq!(AuthService::verify_token(&token, "s3cret").unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn wrong_secret_is_invalid_signature() {
        let token = token_with(600, "other");
        assert_eq!(
            AuthService::verify_token(&token, "s3cret").unwrap_err(),
            AuthError::InvalidSignature
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(AuthService::verify_token("not-a-jwt", "s3cret").unwrap_err(), AuthError::Malformed);
        assert_eq!(AuthService::verify_token("", "s3cret").unwrap_err(), AuthError::Malformed);
    }

    #[test]
    fn generated_passwords_are_long_and_distinct() {
        let a = AuthService::generate_password();
        let b = AuthService::generate_password();
        assert_eq!(a.len(), GENERATED_PASSWORD_LEN);
        assert!(a.bytes().all(|c| PASSWORD_ALPHABET.contains(&c)));
        assert_ne!(a, b);
    }

    #[test]
    fn password_hash_verifies() {
        let hash = AuthService::hash_password("correct horse", 4).unwrap();
        assert!(bcrypt::verify("correct horse", &hash).unwrap());
        assert!(!bcrypt::verify("wrong horse", &hash).unwrap());
    }

    #[test]
    fn email_domain_extraction() {
        assert_eq!(email_domain(" Ana@Visit.Example.ORG ").unwrap(), "visit.example.org");
        assert!(email_domain("no-at-sign").is_err());
        assert!(email_domain("@example.org").is_err());
        assert!(email_domain("ana@localhost").is_err());
        assert!(email_domain("ana@x@y.org").is_err());
    }

    #[test]
    fn credentials_require_min_password_length() {
        assert!(AuthService::validate_credentials("ana@example.org", "short").is_err());
        assert!(AuthService::validate_credentials("ana@example.org", "long enough").is_ok());
    }
}
