//! Credential handling.

pub mod credentials;

pub use credentials::{GatewayConfig, SecretString};
