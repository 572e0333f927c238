use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub bcrypt_cost: u32,
    /// The operator tenant; its `admin` users bypass tenant scoping.
    pub site_client_id: i64,
    pub poster_dir: String,
    pub host: String,
    pub port: u16,
    pub app_base_url: String,
    // Quote pricing, in cents
    pub quote_cents_per_license: i64,
    pub quote_cents_per_region: i64,
    pub subscription_months: u32,
    pub enforce_subscription_expiry: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiry_seconds: env::var("JWT_EXPIRY_SECONDS")
                .unwrap_or_else(|_| "86400".into())
                .parse()?,
            bcrypt_cost: env::var("BCRYPT_COST")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            site_client_id: env::var("SITE_CLIENT_ID")
                .unwrap_or_else(|_| "1".into())
                .parse()?,
            poster_dir: env::var("POSTER_DIR").unwrap_or_else(|_| "/data/posters".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost".into()),
            quote_cents_per_license: env::var("QUOTE_CENTS_PER_LICENSE")
                .unwrap_or_else(|_| "50000".into())
                .parse()?,
            quote_cents_per_region: env::var("QUOTE_CENTS_PER_REGION")
                .unwrap_or_else(|_| "25000".into())
                .parse()?,
            subscription_months: env::var("SUBSCRIPTION_MONTHS")
                .unwrap_or_else(|_| "12".into())
                .parse()?,
            enforce_subscription_expiry: env::var("ENFORCE_SUBSCRIPTION_EXPIRY")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }

    /// Settings for tests and tools that never reach a live database.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/tourism_test".into(),
            redis_url: "redis://127.0.0.1:6379".into(),
            jwt_secret: "test-secret".into(),
            jwt_expiry_seconds: 86_400,
            bcrypt_cost: 4,
            site_client_id: 1,
            poster_dir: std::env::temp_dir().join("posters").to_string_lossy().into_owned(),
            host: "127.0.0.1".into(),
            port: 0,
            app_base_url: "http://localhost".into(),
            quote_cents_per_license: 50_000,
            quote_cents_per_region: 25_000,
            subscription_months: 12,
            enforce_subscription_expiry: false,
        }
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
