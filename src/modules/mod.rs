pub mod crypto;
pub mod http_auth;
pub mod metrics;
pub mod secure_keys;
