//! Canned-response client
//!
//! Replays a fixed list of responses in order, one per request. Lets a run
//! be reproduced offline from a transcript file:
//!
//! ```yaml
//! - '[{"characteristic": "habit", "value": "tree"}]'
//! - text: "not json at all"
//! - error: "connection reset by peer"
//! ```

use eyre::{Context, Result};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use super::{CompletionClient, CompletionRequest, TransportError};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Canned {
    Bare(String),
    Text { text: String },
    Error { error: String },
}

impl Canned {
    pub fn text(s: &str) -> Self {
        Canned::Text { text: s.to_string() }
    }

    pub fn error(s: &str) -> Self {
        Canned::Error { error: s.to_string() }
    }
}

pub struct ReplayClient {
    responses: VecDeque<Canned>,
    served: usize,
}

impl ReplayClient {
    pub fn new(responses: Vec<Canned>) -> Self {
        Self {
            responses: responses.into(),
            served: 0,
        }
    }

    /// Load canned responses from a YAML (or JSON) list
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let responses: Vec<Canned> = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse replay file {}", path.display()))?;

        log::info!("Loaded {} canned responses from {}", responses.len(), path.display());
        Ok(Self::new(responses))
    }

    /// Drop the first `n` responses (used when resuming a replayed run)
    pub fn skip(&mut self, n: usize) {
        let n = n.min(self.responses.len());
        self.responses.drain(..n);
        self.served += n;
    }

    pub fn remaining(&self) -> usize {
        self.responses.len()
    }
}

impl CompletionClient for ReplayClient {
    fn name(&self) -> &str {
        "replay"
    }

    fn complete(&mut self, request: &CompletionRequest) -> Result<String, TransportError> {
        log::trace!("replay #{} for prompt: {}", self.served, request.last_prompt());
        let next = self.responses.pop_front().ok_or(TransportError::Exhausted)?;
        self.served += 1;

        match next {
            Canned::Bare(text) | Canned::Text { text } => Ok(text),
            Canned::Error { error } => Err(TransportError::Raised(error)),
        }
    }
}
