//! Human operator I/O seam
//!
//! The clarification capability suspends the dispatch loop until the
//! operator supplies a reply. It goes through this trait rather than the
//! terminal directly, so non-interactive harnesses can substitute a
//! scripted responder.

use crate::error::AgentError;
use crate::Result;
use std::io::{self, Write};

#[async_trait::async_trait]
pub trait Operator: Send + Sync {
    /// Present a question and block until a reply line is supplied.
    /// The reply is returned verbatim, un-validated.
    async fn ask(&self, question: &str) -> Result<String>;
}

/// Terminal-backed operator for interactive sessions.
pub struct ConsoleOperator;

impl ConsoleOperator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleOperator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Operator for ConsoleOperator {
    async fn ask(&self, question: &str) -> Result<String> {
        let prompt = format!("\nAgent needs clarification: {}\nYour answer: ", question);

        // Stdin has no async story worth having for a single prompt; park
        // the read on the blocking pool instead of the runtime.
        tokio::task::spawn_blocking(move || -> Result<String> {
            let mut stdout = io::stdout();
            stdout.write_all(prompt.as_bytes())?;
            stdout.flush()?;

            let mut reply = String::new();
            io::stdin().read_line(&mut reply)?;
            Ok(reply.trim_end_matches(['\r', '\n']).to_string())
        })
        .await
        .map_err(|e| AgentError::OperatorError(format!("input task failed: {}", e)))?
    }
}
