//! Core data model: the conversation transcript

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

//
// ================= Invocation =================
//

/// One model-issued request to execute a capability.
///
/// The id is assigned by the model provider and must be echoed back on the
/// matching result turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilityInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl CapabilityInvocation {
    /// The single argument a handler actually receives.
    ///
    /// Capabilities are unary in practice: the first value of the argument
    /// object is passed through, string values verbatim, anything else in
    /// its compact JSON encoding. An empty object means no argument.
    pub fn first_argument(&self) -> Option<String> {
        self.arguments.values().next().map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

//
// ================= Descriptors =================
//

/// Machine-readable description of one capability, exposed verbatim to the
/// model so it can only request invocations whose shape matches the schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-schema fragment for the parameter object.
    pub parameters: Value,
}

//
// ================= Turns =================
//

/// One entry in the transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
    },
    /// Exactly one of `text` / `invocation` is populated. A terminal answer
    /// carries `text` with no invocation.
    Assistant {
        text: Option<String>,
        invocation: Option<CapabilityInvocation>,
    },
    CapabilityResult {
        invocation_id: String,
        capability: String,
        output: String,
    },
}

//
// ================= Transcript =================
//

/// Append-only, strictly ordered conversation history for one session.
///
/// Every capability result is appended together with the assistant turn
/// that requested it, so the request/result pairing holds by construction.
/// Turns are never removed or reordered for the lifetime of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::User { text: text.into() });
    }

    /// Append a terminal assistant answer.
    pub fn push_answer(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::Assistant {
            text: Some(text.into()),
            invocation: None,
        });
    }

    /// Append one capability round: the assistant turn holding the
    /// invocation, immediately followed by its result turn.
    pub fn push_capability_round(&mut self, invocation: CapabilityInvocation, output: String) {
        let invocation_id = invocation.id.clone();
        let capability = invocation.name.clone();
        self.turns.push(Turn::Assistant {
            text: None,
            invocation: Some(invocation),
        });
        self.turns.push(Turn::CapabilityResult {
            invocation_id,
            capability,
            output,
        });
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
