//! Gateway wrappers.
//!
//! Compose around any `ModelGateway`:
//!
//! ```rust,ignore
//! let gateway = LimitedGateway::new(RetryingGateway::new(openai), 4)
//!     .with_requests_per_minute(nonzero!(60u32));
//! ```

pub mod limited;
pub mod retrying;

pub use limited::LimitedGateway;
pub use retrying::{RetryConfig, RetryingGateway};
