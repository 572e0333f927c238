pub mod auth;
pub mod metrics;
pub mod onboarding;
pub mod policy;
pub mod posters;
pub mod trends;
