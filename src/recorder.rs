//! Run recorder and the run artifact
//!
//! The artifact is the compatibility surface for downstream QC and plotting
//! tools, so its keys are fixed:
//!
//! ```json
//! {
//!   "metadata": {...},
//!   "charlist_history": [["habit", ...], ...],
//!   "charlist_len_history": [1, ...],
//!   "data": [{"coreid": "...", "status": "success", "original_description": "...", "char_json": [...]}, ...]
//! }
//! ```
//!
//! `coreid` is always present (`null` when unknown). `char_json` is present
//! only on success and `failed_str` only otherwise.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::config::RunConfig;
use crate::input::Species;
use crate::llm::LlmParams;
use crate::parser::CharValue;
use crate::registry::TraitRegistry;

/// Outcome of processing one species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    InvalidJson,
    InvalidJsonFollowup,
    BadStructure,
    ExceptionThrown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::InvalidJson => "invalid_json",
            Status::InvalidJsonFollowup => "invalid_json_followup",
            Status::BadStructure => "bad_structure",
            Status::ExceptionThrown => "exception_thrown",
        }
    }

    pub const ALL: [Status; 5] = [
        Status::Success,
        Status::InvalidJson,
        Status::InvalidJsonFollowup,
        Status::BadStructure,
        Status::ExceptionThrown,
    ];
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesResult {
    /// Always written, `null` when the input carried no id
    #[serde(default)]
    pub coreid: Option<String>,
    pub status: Status,
    pub original_description: String,
    #[serde(rename = "char_json", default, skip_serializing_if = "Option::is_none")]
    pub char_values: Option<Vec<CharValue>>,
    #[serde(rename = "failed_str", default, skip_serializing_if = "Option::is_none")]
    pub failed_raw_text: Option<String>,
}

impl SpeciesResult {
    pub fn success(species: &Species, values: Vec<CharValue>) -> Self {
        Self {
            coreid: species.id.clone(),
            status: Status::Success,
            original_description: species.description.clone(),
            char_values: Some(values),
            failed_raw_text: None,
        }
    }

    pub fn failure(species: &Species, status: Status, raw_text: &str) -> Self {
        debug_assert!(status != Status::Success);
        Self {
            coreid: species.id.clone(),
            status,
            original_description: species.description.clone(),
            char_values: None,
            failed_raw_text: Some(raw_text.to_string()),
        }
    }
}

/// What happened in the seeding step, if there was one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedOutcome {
    pub strategy: String,
    pub species: Vec<String>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_str: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub mode: String,
    pub model: String,
    pub params: LlmParams,
    pub sys_prompt: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_prompt: Option<String>,
    pub config: RunConfig,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<SeedOutcome>,
    /// Completion requests issued so far (initial + follow-up + seed)
    #[serde(default)]
    pub completion_calls: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub metadata: RunMetadata,
    pub charlist_history: Vec<Vec<String>>,
    pub charlist_len_history: Vec<usize>,
    pub data: Vec<SpeciesResult>,
}

impl RunArtifact {
    pub fn new(metadata: RunMetadata) -> Self {
        Self {
            metadata,
            charlist_history: Vec::new(),
            charlist_len_history: Vec::new(),
            data: Vec::new(),
        }
    }

    /// History entries that belong to the seed step rather than a species
    pub fn seed_entries(&self) -> usize {
        usize::from(self.metadata.seed.is_some())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read run artifact {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse run artifact {}", path.display()))
    }
}

/// Accumulates per-species results and registry history in order
#[derive(Debug)]
pub struct RunRecorder {
    artifact: RunArtifact,
}

impl RunRecorder {
    pub fn new(metadata: RunMetadata) -> Self {
        Self {
            artifact: RunArtifact::new(metadata),
        }
    }

    /// Continue a previously persisted run
    pub fn resume(artifact: RunArtifact) -> Result<Self> {
        let entries = artifact.charlist_history.len();
        if artifact.charlist_len_history.len() != entries {
            eyre::bail!(
                "Corrupt artifact: {} registry snapshots but {} size entries",
                entries,
                artifact.charlist_len_history.len()
            );
        }
        let expected = artifact.data.len() + artifact.seed_entries();
        if entries != expected {
            eyre::bail!(
                "Corrupt artifact: {} registry snapshots for {} species results (expected {})",
                entries,
                artifact.data.len(),
                expected
            );
        }
        if let Some(last) = artifact.charlist_history.last()
            && artifact.charlist_len_history.last() != Some(&last.len())
        {
            eyre::bail!("Corrupt artifact: last registry size does not match its snapshot");
        }

        Ok(Self { artifact })
    }

    /// Check that `species` starts with the descriptions already recorded
    pub fn check_species(&self, species: &[Species]) -> Result<()> {
        let recorded = &self.artifact.data;
        if species.len() < recorded.len() {
            eyre::bail!(
                "Artifact holds {} species but the input only selects {}",
                recorded.len(),
                species.len()
            );
        }
        if let Some(index) = recorded
            .iter()
            .zip(species)
            .position(|(result, sp)| result.original_description != sp.description)
        {
            eyre::bail!(
                "Description {} differs from the one recorded in the artifact",
                index + 1
            );
        }
        Ok(())
    }

    /// Registry as it stood after the last recorded step
    pub fn registry(&self) -> TraitRegistry {
        self.artifact
            .charlist_history
            .last()
            .map(TraitRegistry::from_snapshot)
            .unwrap_or_default()
    }

    pub fn has_seed(&self) -> bool {
        self.artifact.metadata.seed.is_some()
    }

    pub fn record_seed(&mut self, outcome: SeedOutcome, registry: &TraitRegistry) {
        self.artifact.metadata.seed = Some(outcome);
        self.push_snapshot(registry);
    }

    pub fn record(&mut self, result: SpeciesResult, registry: &TraitRegistry) {
        self.artifact.data.push(result);
        self.push_snapshot(registry);
    }

    fn push_snapshot(&mut self, registry: &TraitRegistry) {
        self.artifact.charlist_len_history.push(registry.size());
        self.artifact.charlist_history.push(registry.snapshot());
    }

    pub fn add_calls(&mut self, n: usize) {
        self.artifact.metadata.completion_calls += n;
    }

    /// Species already recorded
    pub fn processed(&self) -> usize {
        self.artifact.data.len()
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.artifact.metadata
    }

    pub fn artifact(&self) -> &RunArtifact {
        &self.artifact
    }

    pub fn into_artifact(self) -> RunArtifact {
        self.artifact
    }
}

/// Where the artifact goes after each recorded step
pub trait ArtifactSink {
    fn persist(&mut self, artifact: &RunArtifact) -> Result<()>;
}

/// Writes the artifact as JSON, replacing the file atomically
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ArtifactSink for JsonFileSink {
    fn persist(&mut self, artifact: &RunArtifact) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).context("Failed to create output directory")?;

        let mut tmp = NamedTempFile::new_in(dir).context("Failed to create temporary artifact file")?;
        serde_json::to_writer(&mut tmp, artifact).context("Failed to serialize run artifact")?;
        tmp.flush().context("Failed to flush run artifact")?;
        tmp.as_file().sync_all().context("Failed to sync run artifact")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        log::debug!("Persisted {} species to {}", artifact.data.len(), self.path.display());
        Ok(())
    }
}

/// Discards everything; for runs that only need the returned artifact
pub struct NullSink;

impl ArtifactSink for NullSink {
    fn persist(&mut self, _artifact: &RunArtifact) -> Result<()> {
        Ok(())
    }
}
