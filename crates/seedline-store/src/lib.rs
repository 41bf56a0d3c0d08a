// SQLite store and configuration for the bracket engine.

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod rows;

pub use config::{Config, ConfigError};
pub use db::Database;
pub use error::StoreError;
pub use model::*;
