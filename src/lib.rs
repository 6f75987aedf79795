//! Stock Info Agent
//!
//! A conversational assistant for stock questions that:
//! - Lets the model invoke lookup capabilities (price, CEO, ticker search)
//! - Asks the operator for clarification when a request is ambiguous
//! - Folds every capability result back into an append-only transcript
//! - Converts prices to EUR where an FX rate is available
//!
//! DISPATCH LOOP:
//! USER QUERY → MODEL → CAPABILITY? → RESULT → MODEL → ... → ANSWER

pub mod capabilities;
pub mod dispatch;
pub mod error;
pub mod market;
pub mod models;
pub mod openai;
pub mod operator;

pub use error::Result;

// Re-export common types
pub use dispatch::DispatchLoop;
pub use models::*;
