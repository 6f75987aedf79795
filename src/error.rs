//! Error types for the stock info agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Market data error: {0}")]
    MarketDataError(String),

    #[error("Operator input error: {0}")]
    OperatorError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Iteration budget exhausted after {0} model calls")]
    IterationBudget(usize),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
