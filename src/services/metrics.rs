use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Login attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref TREND_ROWS_COUNTER: CounterVec = register_counter_vec!(
        "api_trend_rows_total",
        "Trend rows written, by operation",
        &["operation"]
    ).unwrap();

    pub static ref ONBOARDING_COUNTER: CounterVec = register_counter_vec!(
        "api_onboarding_total",
        "Onboarding events by outcome",
        &["outcome"]
    ).unwrap();
}
