//! Ollama chat client (blocking, non-streaming)

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatMessage, CompletionClient, CompletionRequest, LlmParams, Role, TransportError};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: &'a LlmParams,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

pub struct OllamaClient {
    agent: ureq::Agent,
    url: String,
    model: String,
    params: LlmParams,
}

impl OllamaClient {
    pub fn new(host: &str, model: &str, params: LlmParams, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder().timeout_global(Some(timeout)).build();

        Self {
            agent: ureq::Agent::new_with_config(config),
            url: format!("{}/api/chat", host.trim_end_matches('/')),
            model: model.to_string(),
            params,
        }
    }

    fn body(&self, request: &CompletionRequest) -> Result<String, TransportError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: Role::System,
                content: request.system.clone(),
            });
        }
        messages.extend(request.messages.iter().cloned());

        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: &self.params,
        };

        serde_json::to_string(&body).map_err(|e| TransportError::Protocol(e.to_string()))
    }
}

impl CompletionClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    fn complete(&mut self, request: &CompletionRequest) -> Result<String, TransportError> {
        let body = self.body(request)?;
        log::trace!("POST {} ({} bytes)", self.url, body.len());

        let mut response = self
            .agent
            .post(&self.url)
            .header("Content-Type", "application/json")
            .send(body.as_bytes())
            .map_err(map_ureq_error)?;

        let text = response.body_mut().read_to_string().map_err(map_ureq_error)?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| TransportError::Protocol(format!("{} in {:?}", e, truncate(&text, 200))))?;

        Ok(parsed.message.content)
    }
}

fn map_ureq_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(t) => TransportError::Timeout(format!("{:?}", t)),
        ureq::Error::StatusCode(code) => TransportError::Http(format!("server returned status {}", code)),
        other => TransportError::Http(other.to_string()),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
