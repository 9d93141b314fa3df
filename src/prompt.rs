//! Prompt templates
//!
//! Templates are plain text with bracketed placeholders that are replaced
//! verbatim before a request is sent. Built-in defaults can be overridden
//! per template with a file path.

use eyre::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::PromptsConfig;

pub const DESCRIPTION: &str = "[DESCRIPTION]";
pub const DESCRIPTIONS: &str = "[DESCRIPTIONS]";
pub const CHARACTER_LIST: &str = "[CHARACTER_LIST]";
pub const MISSING_WORDS: &str = "[MISSING_WORDS]";

pub const DEFAULT_SYSTEM: &str = "\
You are a careful assistant with expert knowledge of botanical terminology.
You transcribe botanical descriptions of plant species into structured JSON.
Your answer must be complete and accurate, and must be valid JSON with no other text.
";

pub const DEFAULT_ACCUMULATION: &str = r#"You are given a botanical description of a plant species taken from a published flora.
Extract every characteristic mentioned in the description together with its value, and transcribe them into JSON.
Answer with a JSON array of objects formatted as {"characteristic": <name of characteristic>, "value": <value of characteristic>}.
Write every characteristic name in lowercase.
Surround your answer with square brackets so that it is a valid array, and include no other text.

1. Transcribe characteristics of the whole plant, such as growth form, reproduction, height and branching.
2. Go through every organ (leaves, stems, flowers, inflorescences, fruits, seeds, roots) and every part of an organ (stipules, anthers, ovaries) and transcribe their characteristics.
3. Where a characteristic below applies, reuse its exact name; add new characteristics for anything not covered.

Characteristics recorded so far:
[CHARACTER_LIST]

Description:
[DESCRIPTION]
"#;

pub const DEFAULT_INIT: &str = r#"You are given a botanical description of a plant species taken from a published flora.
Extract every characteristic mentioned in the description together with its value, and transcribe them into JSON.
Answer with a JSON array of objects formatted as {"characteristic": <name of characteristic>, "value": <value of characteristic>}.
Write every characteristic name in lowercase, and include no text other than the array.

Description:
[DESCRIPTION]
"#;

pub const DEFAULT_TABULATION: &str = r#"You are given botanical descriptions of several plant species, each preceded by its species ID.
Build a table of every characteristic mentioned in any of the descriptions, with the value for each species.
Answer with a JSON array of objects formatted as {"characteristic": <name of characteristic>, "values": {<species ID>: <value>, ...}}.
Every object must contain a value for every species ID; use an empty string when a description does not mention the characteristic.
Write every characteristic name in lowercase, and include no text other than the array.

Descriptions:
[DESCRIPTIONS]
"#;

pub const DEFAULT_FOLLOWUP: &str = r#"Your previous answer left out these words from the description:
[MISSING_WORDS]

Transcribe the characteristics and values that these words describe, in the same JSON format as before.
Answer only with the additional entries, as a JSON array, and include no other text.
Where one of these characteristics applies, reuse its exact name:
[CHARACTER_LIST]

Description:
[DESCRIPTION]
"#;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{template} prompt must contain the {placeholder} placeholder")]
pub struct TemplateError {
    pub template: &'static str,
    pub placeholder: &'static str,
}

/// The full set of templates used in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptSet {
    pub system: String,
    pub accumulation: String,
    pub init: String,
    pub followup: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM.to_string(),
            accumulation: DEFAULT_ACCUMULATION.to_string(),
            init: DEFAULT_INIT.to_string(),
            followup: DEFAULT_FOLLOWUP.to_string(),
        }
    }
}

impl PromptSet {
    /// Resolve templates from config paths, falling back to built-ins.
    /// `tabulate` selects the tabulation default for the init template.
    pub fn load(config: &PromptsConfig, tabulate: bool) -> Result<Self> {
        let mut set = Self::default();
        if tabulate {
            set.init = DEFAULT_TABULATION.to_string();
        }

        if let Some(path) = &config.system {
            set.system = read_template(path)?;
        }
        if let Some(path) = &config.accumulation {
            set.accumulation = read_template(path)?;
        }
        if let Some(path) = &config.init {
            set.init = read_template(path)?;
        }
        if let Some(path) = &config.followup {
            set.followup = read_template(path)?;
        }

        Ok(set)
    }

    /// Check placeholders needed by the selected run mode
    pub fn validate(&self, followup: bool, seed_placeholder: Option<&'static str>) -> Result<(), TemplateError> {
        require("accumulation", &self.accumulation, DESCRIPTION)?;
        if followup {
            require("follow-up", &self.followup, MISSING_WORDS)?;
        }
        if let Some(placeholder) = seed_placeholder {
            require("init", &self.init, placeholder)?;
        }
        Ok(())
    }
}

fn require(template: &'static str, text: &str, placeholder: &'static str) -> Result<(), TemplateError> {
    if text.contains(placeholder) {
        Ok(())
    } else {
        Err(TemplateError { template, placeholder })
    }
}

fn read_template(path: &Path) -> Result<String> {
    let path = crate::config::Config::expand_path(path);
    let text =
        fs::read_to_string(&path).with_context(|| format!("Failed to read prompt template {}", path.display()))?;
    if text.trim().is_empty() {
        eyre::bail!("Prompt template {} is empty", path.display());
    }
    log::info!("Loaded prompt template: {}", path.display());
    Ok(text)
}

/// Join names the way every template expects them
pub fn join_list(items: &[String]) -> String {
    items.join("; ")
}

pub fn render_accumulation(template: &str, description: &str, characteristics: &[String]) -> String {
    template
        .replace(DESCRIPTION, description)
        .replace(CHARACTER_LIST, &join_list(characteristics))
}

pub fn render_followup(template: &str, description: &str, missing: &[String], characteristics: &[String]) -> String {
    template
        .replace(DESCRIPTION, description)
        .replace(MISSING_WORDS, &join_list(missing))
        .replace(CHARACTER_LIST, &join_list(characteristics))
}

/// Tabulation input: one block per species
pub fn render_tabulation(template: &str, species: &[(String, String)]) -> String {
    let blocks = species
        .iter()
        .map(|(id, desc)| format!("Species ID: {}\n\nSpecies description:\n{}", id, desc))
        .collect::<Vec<_>>()
        .join("\n\n");
    template.replace(DESCRIPTIONS, &blocks)
}

/// Built-in template by name, for `prompts show` / `prompts export`
pub fn builtin(name: &str) -> Option<&'static str> {
    match name {
        "system" => Some(DEFAULT_SYSTEM),
        "accumulation" | "accum" => Some(DEFAULT_ACCUMULATION),
        "init" => Some(DEFAULT_INIT),
        "tabulation" | "tab" => Some(DEFAULT_TABULATION),
        "followup" | "follow-up" => Some(DEFAULT_FOLLOWUP),
        _ => None,
    }
}

pub const BUILTIN_NAMES: [&str; 5] = ["system", "accumulation", "init", "tabulation", "followup"];
