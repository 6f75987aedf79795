//! OpenAI chat-completions client with function calling
//!
//! The dispatch loop talks to the model through the [`ModelClient`] trait;
//! this module provides the wire types and the reqwest-backed
//! implementation. Uses a long-lived reqwest::Client for connection
//! pooling.

use crate::error::AgentError;
use crate::models::{CapabilityDescriptor, CapabilityInvocation, Turn};
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{error, info};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

/// One completed model turn: either a terminal answer or a request to
/// invoke a capability.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    FinalAnswer { text: String },
    CapabilityRequest(CapabilityInvocation),
}

/// Abstraction over the language model.
///
/// Decouples the dispatch state machine from any specific provider. At most
/// one capability request is surfaced per call even when the provider could
/// return several; the loop processes exactly one invocation per iteration.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete_turn(
        &self,
        system_prompt: &str,
        transcript: &[Turn],
        capabilities: &[CapabilityDescriptor],
    ) -> Result<ModelReply>;
}

/// Reusable OpenAI client (connection-pooled)
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        let base_url = env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let model = env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self {
            client,
            api_key,
            base_url,
            model,
        }
    }

    /// Read the credential from the environment. Absence is a fatal
    /// startup condition, not a per-call error.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            AgentError::ConfigError("OPENAI_API_KEY is not set".to_string())
        })?;
        if api_key.is_empty() {
            return Err(AgentError::ConfigError(
                "OPENAI_API_KEY is empty".to_string(),
            ));
        }
        Ok(Self::new(api_key))
    }
}

#[async_trait::async_trait]
impl ModelClient for OpenAiClient {
    async fn complete_turn(
        &self,
        system_prompt: &str,
        transcript: &[Turn],
        capabilities: &[CapabilityDescriptor],
    ) -> Result<ModelReply> {
        let mut messages = vec![WireMessage::system(system_prompt)];
        messages.extend(render_transcript(transcript));

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            tools: capabilities.iter().map(ToolDecl::from).collect(),
            tool_choice: "auto",
        };

        info!(model = %self.model, "Calling chat completions API");

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Chat completions request failed: {}", e);
                AgentError::ModelError(format!("request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Chat completions error response: {}", error_text);
            return Err(AgentError::ModelError(format!(
                "provider returned {}: {}",
                status, error_text
            )));
        }

        let completion: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse completion: {}", e);
            AgentError::ModelError(format!("completion parse error: {}", e))
        })?;

        parse_reply(completion)
    }
}

/// Render the ordered transcript into wire messages. Nothing is ever
/// dropped or reordered: the model sees the full history on every call.
fn render_transcript(transcript: &[Turn]) -> Vec<WireMessage> {
    transcript
        .iter()
        .map(|turn| match turn {
            Turn::User { text } => WireMessage::user(text),
            Turn::Assistant { text, invocation } => match invocation {
                Some(invocation) => WireMessage::assistant_invocation(invocation),
                None => WireMessage::assistant_text(text.clone().unwrap_or_default()),
            },
            Turn::CapabilityResult {
                invocation_id,
                capability,
                output,
            } => WireMessage::capability_result(invocation_id, capability, output),
        })
        .collect()
}

/// Interpret a completion. The first tool call wins; a choice without tool
/// calls must carry content.
fn parse_reply(completion: ChatResponse) -> Result<ModelReply> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::ModelError("no choices in completion".to_string()))?;

    let message = choice.message;

    if let Some(call) = message.tool_calls.unwrap_or_default().into_iter().next() {
        let arguments: Value = serde_json::from_str(&call.function.arguments).map_err(|e| {
            AgentError::ModelError(format!(
                "malformed tool call arguments for {}: {}",
                call.function.name, e
            ))
        })?;
        let arguments = match arguments {
            Value::Object(map) => map,
            other => {
                return Err(AgentError::ModelError(format!(
                    "tool call arguments for {} are not an object: {}",
                    call.function.name, other
                )))
            }
        };

        return Ok(ModelReply::CapabilityRequest(CapabilityInvocation {
            id: call.id,
            name: call.function.name,
            arguments,
        }));
    }

    match message.content {
        Some(text) => Ok(ModelReply::FinalAnswer { text }),
        None => Err(AgentError::ModelError(
            "completion carried neither content nor tool calls".to_string(),
        )),
    }
}

//
// ================= Wire types =================
//

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    tools: Vec<ToolDecl>,
    tool_choice: &'static str,
}

#[derive(Debug, Serialize)]
struct ToolDecl {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDecl,
}

#[derive(Debug, Serialize)]
struct FunctionDecl {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&CapabilityDescriptor> for ToolDecl {
    fn from(descriptor: &CapabilityDescriptor) -> Self {
        Self {
            kind: "function",
            function: FunctionDecl {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                parameters: descriptor.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl WireMessage {
    fn system(text: &str) -> Self {
        Self::plain("system", Some(text.to_string()))
    }

    fn user(text: &str) -> Self {
        Self::plain("user", Some(text.to_string()))
    }

    fn assistant_text(text: String) -> Self {
        Self::plain("assistant", Some(text))
    }

    fn assistant_invocation(invocation: &CapabilityInvocation) -> Self {
        Self {
            role: "assistant",
            content: None,
            tool_calls: Some(vec![WireToolCall {
                id: invocation.id.clone(),
                kind: "function",
                function: WireFunctionCall {
                    name: invocation.name.clone(),
                    arguments: Value::Object(invocation.arguments.clone()).to_string(),
                },
            }]),
            tool_call_id: None,
            name: None,
        }
    }

    fn capability_result(invocation_id: &str, capability: &str, output: &str) -> Self {
        Self {
            role: "tool",
            content: Some(output.to_string()),
            tool_calls: None,
            tool_call_id: Some(invocation_id.to_string()),
            name: Some(capability.to_string()),
        }
    }

    fn plain(role: &'static str, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded argument object, as the protocol transmits it.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: WireFunctionCall,
}
