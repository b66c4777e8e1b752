//! gs-core - Core library for the Geostash database tooling
//!
//! This crate provides configuration parsing (`gsdb.yml`) and the shared
//! error types used across the schema-update components.

pub mod config;
pub mod error;

pub use config::{Config, ConsistencyConfig, DatabaseConfig, TriggerConfig};
pub use error::{CoreError, CoreResult};
