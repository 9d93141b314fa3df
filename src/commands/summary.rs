//! Run artifact summary
//!
//! Status counts, registry growth and word recovery of a finished (or
//! partial) run.

use colored::*;
use eyre::Result;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::recorder::{RunArtifact, Status};
use crate::words;

#[derive(Debug, Serialize)]
struct Summary {
    mode: String,
    model: String,
    started_at: String,
    species: usize,
    statuses: IndexMap<&'static str, usize>,
    registry_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed_status: Option<Status>,
    /// Mean proportion of description words recovered, over every species
    #[serde(skip_serializing_if = "Option::is_none")]
    mean_prop_recovered: Option<f64>,
    completion_calls: usize,
}

fn summarize(artifact: &RunArtifact) -> Summary {
    let mut statuses: IndexMap<&'static str, usize> = Status::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for result in &artifact.data {
        *statuses.entry(result.status.as_str()).or_default() += 1;
    }

    let proportions: Vec<f64> = artifact
        .data
        .iter()
        .map(|r| {
            // Failed species are scored against whatever text the model returned
            let rendered = match &r.char_values {
                Some(values) => words::render_entries(values),
                None => r.failed_raw_text.clone().unwrap_or_default(),
            };
            words::coverage(&r.original_description, &rendered).prop_recovered
        })
        .collect();
    let mean_prop_recovered =
        (!proportions.is_empty()).then(|| proportions.iter().sum::<f64>() / proportions.len() as f64);

    Summary {
        mode: artifact.metadata.mode.clone(),
        model: artifact.metadata.model.clone(),
        started_at: artifact.metadata.started_at.clone(),
        species: artifact.data.len(),
        statuses,
        registry_size: artifact.charlist_len_history.last().copied().unwrap_or(0),
        seed_status: artifact.metadata.seed.as_ref().map(|s| s.status),
        mean_prop_recovered,
        completion_calls: artifact.metadata.completion_calls,
    }
}

pub fn run(path: &Path, format: OutputFormat) -> Result<()> {
    let artifact = RunArtifact::load(path)?;
    let summary = summarize(&artifact);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(&summary)?);
        }
        OutputFormat::Text => {
            println!("{}", path.display().to_string().bold());
            println!("  mode: {} ({})", summary.mode.cyan(), summary.model);
            println!("  started: {}", summary.started_at);
            if let Some(status) = summary.seed_status {
                println!("  seed: {}", status);
            }
            println!();

            println!("{}:", "species".cyan());
            println!("  total: {}", summary.species);
            for (status, count) in &summary.statuses {
                if *count > 0 {
                    println!("  {}: {}", status, count);
                }
            }
            println!();

            println!("{}:", "registry".cyan());
            println!("  characteristics: {}", summary.registry_size);
            if let Some(prop) = summary.mean_prop_recovered {
                println!("  mean words recovered: {:.1}%", prop * 100.0);
            }
            println!("  completion calls: {}", summary.completion_calls);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Species;
    use crate::parser::CharValue;
    use crate::recorder::tests::metadata;
    use crate::recorder::{RunRecorder, SpeciesResult};
    use crate::registry::TraitRegistry;

    #[test]
    fn test_summarize_counts_and_recovery() {
        let mut recorder = RunRecorder::new(metadata());
        let mut registry = TraitRegistry::new();

        registry.merge(["habit"]);
        recorder.record(
            SpeciesResult::success(&Species::new(None, "Tree"), vec![CharValue::new("habit", "tree")]),
            &registry,
        );
        recorder.record(
            SpeciesResult::failure(&Species::new(None, "Herb"), Status::InvalidJson, "oops"),
            &registry,
        );

        let summary = summarize(recorder.artifact());
        assert_eq!(summary.species, 2);
        assert_eq!(summary.statuses["success"], 1);
        assert_eq!(summary.statuses["invalid_json"], 1);
        assert_eq!(summary.statuses["exception_thrown"], 0);
        assert_eq!(summary.registry_size, 1);
        assert_eq!(summary.mean_prop_recovered, Some(0.5));
        assert_eq!(summary.seed_status, None);
    }

    #[test]
    fn test_summarize_scores_failed_raw_text() {
        let mut recorder = RunRecorder::new(metadata());
        recorder.record(
            SpeciesResult::failure(&Species::new(None, "Herb annual"), Status::InvalidJson, "{habit: herb"),
            &TraitRegistry::new(),
        );
        recorder.record(
            SpeciesResult::failure(&Species::new(None, "Tree"), Status::ExceptionThrown, "timed out"),
            &TraitRegistry::new(),
        );

        let summary = summarize(recorder.artifact());
        assert_eq!(summary.mean_prop_recovered, Some(0.25));
    }

    #[test]
    fn test_summarize_empty_run() {
        let recorder = RunRecorder::new(metadata());
        let summary = summarize(recorder.artifact());
        assert_eq!(summary.species, 0);
        assert_eq!(summary.registry_size, 0);
        assert_eq!(summary.mean_prop_recovered, None);
    }
}
