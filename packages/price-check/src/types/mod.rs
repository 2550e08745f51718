//! Data types shared by the pipeline stages.

pub mod config;
pub mod material;
pub mod price;
pub mod quote;
pub mod run;
pub mod stage;
pub mod summary;
pub mod validation;
