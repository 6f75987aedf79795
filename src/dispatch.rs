//! Dispatch loop - the orchestration core
//!
//! Alternates between querying the model and executing capabilities until
//! the model produces a plain answer. Exactly one capability runs per
//! iteration; its result (or the no-result sentinel) is folded back into
//! the transcript so the model can decide how to proceed.

use crate::capabilities::CapabilityRegistry;
use crate::error::AgentError;
use crate::models::Transcript;
use crate::openai::{ModelClient, ModelReply};
use crate::Result;
use std::env;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Uniform representation of "no data found", fed back to the model in
/// place of propagating handler failures.
pub const NO_RESULT: &str = "No result found";

/// Upper bound on model calls per user query when none is configured.
const DEFAULT_MAX_ITERATIONS: usize = 16;

const SYSTEM_PROMPT: &str = "\
You are a helpful stock information assistant. You have access to tools that can:
1. Look up current stock prices
2. Find the CEO of a company
3. Find ticker symbols for company names
4. Ask the user for clarification when needed

Use these tools to answer user questions about stocks and companies. \
If information is unclear, ask for clarification.";

/// Drives one conversation session. Owns the transcript exclusively and
/// mutates it only by appending.
pub struct DispatchLoop {
    model: Arc<dyn ModelClient>,
    registry: CapabilityRegistry,
    transcript: Transcript,
    max_iterations: usize,
}

impl DispatchLoop {
    pub fn new(model: Arc<dyn ModelClient>, registry: CapabilityRegistry) -> Self {
        let max_iterations = env::var("AGENT_MAX_ITERATIONS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_ITERATIONS);

        Self {
            model,
            registry,
            transcript: Transcript::new(),
            max_iterations,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Process one user query to a final answer.
    ///
    /// Each iteration sends the full ordered transcript plus the capability
    /// descriptors to the model. A capability request is resolved by exact
    /// name; an unknown name or an absent handler result both become the
    /// [`NO_RESULT`] sentinel so the model can self-correct. Model failures
    /// propagate to the caller; the transcript keeps every turn appended so
    /// far.
    pub async fn process_query(&mut self, query: &str) -> Result<String> {
        self.transcript.push_user(query);

        let descriptors = self.registry.descriptors();

        for iteration in 1..=self.max_iterations {
            debug!(
                iteration,
                session_id = %self.transcript.session_id,
                "Awaiting model"
            );

            let reply = self
                .model
                .complete_turn(SYSTEM_PROMPT, self.transcript.turns(), &descriptors)
                .await?;

            let invocation = match reply {
                ModelReply::FinalAnswer { text } => {
                    self.transcript.push_answer(text.clone());
                    return Ok(text);
                }
                ModelReply::CapabilityRequest(invocation) => invocation,
            };

            info!(
                capability = %invocation.name,
                invocation_id = %invocation.id,
                "Executing capability"
            );

            let argument = invocation.first_argument();
            let output = match self.registry.get(&invocation.name) {
                Some(capability) => capability.invoke(argument.as_deref()).await,
                None => {
                    warn!(capability = %invocation.name, "Capability not registered");
                    None
                }
            };

            let output = output.unwrap_or_else(|| NO_RESULT.to_string());
            self.transcript.push_capability_round(invocation, output);
        }

        Err(AgentError::IterationBudget(self.max_iterations))
    }
}
