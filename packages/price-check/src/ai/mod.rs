//! Model gateway implementations.
//!
//! Reference implementations of the `ModelGateway` trait. Users can use
//! these directly or implement their own.

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "openai")]
pub use openai::{classify_failure, OpenAIGateway};
