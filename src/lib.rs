// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use api::ExchangeGateway;
pub use error::{Error, ExchangeError};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Error>;
