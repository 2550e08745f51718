//! Core trait abstractions for the price-check library.
//!
//! Applications implement these to plug in a model provider.

pub mod gateway;
