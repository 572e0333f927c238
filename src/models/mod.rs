pub mod auth;
pub mod client;
pub mod reference;
pub mod subscription;
pub mod trend;
pub mod user;
