//! Completion clients
//!
//! The accumulation driver only needs "text in, text out". Everything that
//! can go wrong on the way (network, timeouts, tool callbacks) is folded
//! into [`TransportError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod ollama;
pub mod replay;
pub mod tools;

pub use ollama::OllamaClient;
pub use replay::ReplayClient;
pub use tools::{RecordTraits, ToolCallingClient};

/// Role of a chat message sent to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }
}

/// A system prompt plus the conversation so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    /// Single-turn request
    pub fn prompt(system: &str, prompt: &str) -> Self {
        Self {
            system: system.to_string(),
            messages: vec![ChatMessage::user(prompt)],
        }
    }

    /// Append a turn to the conversation
    pub fn then(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Content of the last user turn
    pub fn last_prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// Generation options passed through to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmParams {
    pub temperature: f64,
    pub seed: i64,
    pub repeat_last_n: i64,
    pub num_predict: u32,
    pub num_ctx: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl Default for LlmParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            seed: 1,
            repeat_last_n: 0,
            num_predict: 2048,
            num_ctx: 4096,
            top_k: None,
            top_p: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("unexpected response from model server: {0}")]
    Protocol(String),

    #[error("tool call failed: {0}")]
    Tool(String),

    #[error("{0}")]
    Raised(String),

    #[error("no canned responses left")]
    Exhausted,
}

/// Anything that can turn a request into model text
pub trait CompletionClient {
    /// Short label used in logs
    fn name(&self) -> &str;

    fn complete(&mut self, request: &CompletionRequest) -> Result<String, TransportError>;
}

impl<C: CompletionClient + ?Sized> CompletionClient for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(&mut self, request: &CompletionRequest) -> Result<String, TransportError> {
        (**self).complete(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = CompletionRequest::prompt("sys", "first")
            .then(ChatMessage::assistant("answer"))
            .then(ChatMessage::user("second"));

        assert_eq!(request.system, "sys");
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.last_prompt(), "second");
    }

    #[test]
    fn test_params_skip_unset_sampling() {
        let json = serde_json::to_value(LlmParams::default()).unwrap();
        assert_eq!(json["num_predict"], 2048);
        assert!(json.get("top_k").is_none());
        assert!(json.get("top_p").is_none());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = ChatMessage::assistant("x");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }
}
