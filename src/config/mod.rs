//! Configuration module for frontkit
//!
//! Provides types and parsing for `frontkit.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::{default_config, load_config, CliOverrides, ConfigError};
pub use schema::*;
