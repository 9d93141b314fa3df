//! Tool-calling wrapper
//!
//! Advertises a set of tools in the system prompt and, when the model
//! answers with a tool-call envelope instead of plain text, runs the named
//! tool and hands its output back as the completion:
//!
//! ```json
//! {"tool": "record_traits", "arguments": {"traits": [{"characteristic": "habit", "value": "tree"}]}}
//! ```
//!
//! A tool that is unknown or fails surfaces as [`TransportError::Tool`], so
//! callers see it exactly like a failed request.

use serde_json::Value;

use super::{CompletionClient, CompletionRequest, TransportError};

pub trait Tool {
    fn name(&self) -> &str;

    /// One-line usage shown to the model
    fn describe(&self) -> &str;

    fn invoke(&self, arguments: &Value) -> Result<String, String>;
}

/// Records the extracted traits; returns them as a bare JSON array
pub struct RecordTraits;

impl Tool for RecordTraits {
    fn name(&self) -> &str {
        "record_traits"
    }

    fn describe(&self) -> &str {
        r#"record_traits: {"traits": [{"characteristic": string, "value": string}, ...]}"#
    }

    fn invoke(&self, arguments: &Value) -> Result<String, String> {
        let traits = arguments
            .get("traits")
            .ok_or_else(|| "missing 'traits' argument".to_string())?;
        if !traits.is_array() {
            return Err("'traits' must be an array".to_string());
        }
        serde_json::to_string(traits).map_err(|e| e.to_string())
    }
}

pub struct ToolCallingClient<C> {
    inner: C,
    tools: Vec<Box<dyn Tool>>,
}

impl<C: CompletionClient> ToolCallingClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            tools: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Box::new(tool));
        self
    }

    fn tool_preamble(&self) -> String {
        let mut preamble = String::from(
            "\n\nYou may answer by calling one of the tools below. To call a tool, reply with only \
             {\"tool\": <tool name>, \"arguments\": <arguments object>}.\nTools:\n",
        );
        for tool in &self.tools {
            preamble.push_str("- ");
            preamble.push_str(tool.describe());
            preamble.push('\n');
        }
        preamble
    }

    fn dispatch(&self, text: &str) -> Result<Option<String>, TransportError> {
        let Ok(Value::Object(call)) = serde_json::from_str::<Value>(text.trim()) else {
            return Ok(None);
        };
        let Some(name) = call.get("tool").and_then(Value::as_str) else {
            return Ok(None);
        };

        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| TransportError::Tool(format!("unknown tool '{}'", name)))?;

        let arguments = call.get("arguments").cloned().unwrap_or(Value::Null);
        log::debug!("Invoking tool '{}'", name);
        tool.invoke(&arguments)
            .map(Some)
            .map_err(|e| TransportError::Tool(format!("{}: {}", name, e)))
    }
}

impl<C: CompletionClient> CompletionClient for ToolCallingClient<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn complete(&mut self, request: &CompletionRequest) -> Result<String, TransportError> {
        let mut augmented = request.clone();
        augmented.system.push_str(&self.tool_preamble());

        let text = self.inner.complete(&augmented)?;
        Ok(self.dispatch(&text)?.unwrap_or(text))
    }
}
