//! Trait accumulation driver
//!
//! Species are processed strictly in input order. The registry as it stood
//! after species n is part of the prompt for species n+1, so nothing here
//! may be reordered or run ahead.
//!
//! Per species:
//!
//! 1. render the accumulation prompt with the registry snapshot
//! 2. ask the model; a transport failure ends the species as `exception_thrown`
//! 3. parse; failures become `invalid_json` / `bad_structure`
//! 4. optionally ask one follow-up question about omitted words
//! 5. merge the accepted characteristic names into the registry
//! 6. record the result and registry snapshot, then persist

use eyre::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{RunConfig, SeedStrategy};
use crate::input::Species;
use crate::llm::{ChatMessage, CompletionClient, CompletionRequest, LlmParams, RecordTraits, ToolCallingClient};
use crate::parser::{self, CharValue, ParseError};
use crate::prompt::{self, PromptSet, TemplateError};
use crate::recorder::{ArtifactSink, RunArtifact, RunMetadata, RunRecorder, SeedOutcome, SpeciesResult, Status};
use crate::registry::TraitRegistry;
use crate::words;

/// Which variant of the accumulation loop to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strategy {
    pub seed: SeedStrategy,
    /// Species tabulated by [`SeedStrategy::Tabulate`]
    pub init_species: usize,
    pub followup_enabled: bool,
    pub tool_calling_enabled: bool,
}

impl Default for Strategy {
    fn default() -> Self {
        Self {
            seed: SeedStrategy::None,
            init_species: 3,
            followup_enabled: false,
            tool_calling_enabled: false,
        }
    }
}

impl Strategy {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            seed: config.seed_strategy,
            init_species: config.init_species_count,
            followup_enabled: config.followup_enabled,
            tool_calling_enabled: config.tool_calling_enabled,
        }
    }

    /// Mode name written to the artifact metadata
    pub fn mode_name(&self) -> String {
        let mut mode = match (self.seed, self.followup_enabled) {
            (SeedStrategy::None, false) => "desc2json_accum_plain",
            (SeedStrategy::None, true) => "desc2json_accum_plain_followup",
            (SeedStrategy::Single, false) => "desc2json_accum",
            (SeedStrategy::Single, true) => "desc2json_accum_followup",
            (SeedStrategy::Tabulate, false) => "desc2json_accum_tab",
            (SeedStrategy::Tabulate, true) => "desc2json_accum_tf",
        }
        .to_string();
        if self.tool_calling_enabled {
            mode.push_str("_tools");
        }
        mode
    }

    /// Placeholder the init template must carry for this seed strategy
    fn seed_placeholder(&self) -> Option<&'static str> {
        match self.seed {
            SeedStrategy::None => None,
            SeedStrategy::Single => Some(prompt::DESCRIPTION),
            SeedStrategy::Tabulate => Some(prompt::DESCRIPTIONS),
        }
    }
}

/// Build the metadata block for a fresh run
pub fn run_metadata(
    strategy: &Strategy,
    prompts: &PromptSet,
    model: &str,
    params: &LlmParams,
    config: &RunConfig,
    started_at: &str,
) -> RunMetadata {
    RunMetadata {
        mode: strategy.mode_name(),
        model: model.to_string(),
        params: params.clone(),
        sys_prompt: prompts.system.clone(),
        prompt: prompts.accumulation.clone(),
        init_prompt: (strategy.seed != SeedStrategy::None).then(|| prompts.init.clone()),
        f_prompt: strategy.followup_enabled.then(|| prompts.followup.clone()),
        config: config.clone(),
        started_at: started_at.to_string(),
        seed: None,
        completion_calls: 0,
    }
}

pub struct Accumulator<'a> {
    client: Box<dyn CompletionClient + 'a>,
    prompts: PromptSet,
    strategy: Strategy,
    registry: TraitRegistry,
    cancel: Option<Arc<AtomicBool>>,
    progress: bool,
    calls: usize,
}

impl<'a> Accumulator<'a> {
    /// Templates are validated here so a bad template fails the run before
    /// any species is touched.
    pub fn new(
        client: Box<dyn CompletionClient + 'a>,
        prompts: PromptSet,
        strategy: Strategy,
    ) -> Result<Self, TemplateError> {
        prompts.validate(strategy.followup_enabled, strategy.seed_placeholder())?;

        let client: Box<dyn CompletionClient + 'a> = if strategy.tool_calling_enabled {
            Box::new(ToolCallingClient::new(client).with_tool(RecordTraits))
        } else {
            client
        };

        Ok(Self {
            client,
            prompts,
            strategy,
            registry: TraitRegistry::new(),
            cancel: None,
            progress: false,
            calls: 0,
        })
    }

    /// Stop after the in-flight species once `flag` is set
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Print one line per species to stdout
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Process `species` in order, continuing from whatever `recorder`
    /// already holds. Only sink failures abort the run.
    pub fn run(
        &mut self,
        species: &[Species],
        mut recorder: RunRecorder,
        sink: &mut dyn ArtifactSink,
    ) -> Result<RunArtifact> {
        self.registry = recorder.registry();
        let done = recorder.processed();

        if done > species.len() {
            log::warn!(
                "Artifact already holds {} species but only {} were supplied",
                done,
                species.len()
            );
        }

        if done == 0 && !recorder.has_seed() && self.strategy.seed != SeedStrategy::None && !species.is_empty() {
            let outcome = self.seed(species);
            recorder.add_calls(std::mem::take(&mut self.calls));
            recorder.record_seed(outcome, &self.registry);
            sink.persist(recorder.artifact())?;
        }

        let total = species.len();
        for (index, sp) in species.iter().enumerate().skip(done) {
            if self.cancelled() {
                log::warn!("Cancelled before species {}/{}", index + 1, total);
                break;
            }

            let result = self.process(sp);
            log::info!(
                "Species {}/{} ({}): {}, registry size {}",
                index + 1,
                total,
                sp.label(index),
                result.status,
                self.registry.size()
            );
            if self.progress {
                print_progress(index + 1, total, result.status, self.registry.size());
            }

            recorder.add_calls(std::mem::take(&mut self.calls));
            recorder.record(result, &self.registry);
            sink.persist(recorder.artifact())?;
        }

        Ok(recorder.into_artifact())
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn call(&mut self, request: &CompletionRequest) -> Result<String, String> {
        self.calls += 1;
        log::trace!("Prompt:\n{}", request.last_prompt());
        self.client.complete(request).map_err(|e| {
            log::warn!("Completion via {} failed: {}", self.client.name(), e);
            e.to_string()
        })
    }

    /// One species, start to finish
    pub fn process(&mut self, species: &Species) -> SpeciesResult {
        let characteristics = self.registry.snapshot();
        let rendered = prompt::render_accumulation(&self.prompts.accumulation, &species.description, &characteristics);
        let request = CompletionRequest::prompt(&self.prompts.system, &rendered);

        let first_text = match self.call(&request) {
            Ok(text) => text,
            Err(e) => return SpeciesResult::failure(species, Status::ExceptionThrown, &e),
        };

        let first = parser::parse(&first_text);
        if let Err(e) = &first {
            log::warn!("First response did not parse: {}", e);
        }

        if !self.strategy.followup_enabled {
            return match first {
                Ok(values) => self.accept(species, values),
                Err(e) => SpeciesResult::failure(species, failure_status(&e), &first_text),
            };
        }

        let first_values = first.ok();
        let missing = words::omitted_words(&species.description, first_values.as_deref().unwrap_or_default());
        if let Some(values) = &first_values
            && missing.is_empty()
        {
            log::debug!("No omitted words, skipping follow-up");
            return self.accept(species, values.clone());
        }

        let followup = prompt::render_followup(&self.prompts.followup, &species.description, &missing, &characteristics);
        let request = request
            .then(ChatMessage::assistant(&first_text))
            .then(ChatMessage::user(&followup));

        let followup_text = match self.call(&request) {
            Ok(text) => text,
            Err(e) => return SpeciesResult::failure(species, Status::ExceptionThrown, &e),
        };

        match parser::parse(&followup_text) {
            Ok(extra) => {
                let mut values = first_values.unwrap_or_default();
                values.extend(extra);
                self.accept(species, values)
            }
            Err(e) => {
                log::warn!("Follow-up response did not parse: {}", e);
                SpeciesResult::failure(species, Status::InvalidJsonFollowup, &followup_text)
            }
        }
    }

    fn accept(&mut self, species: &Species, values: Vec<CharValue>) -> SpeciesResult {
        self.registry.merge(values.iter().map(|v| v.characteristic.as_str()));
        SpeciesResult::success(species, values)
    }

    /// Pre-populate the registry before the main loop
    fn seed(&mut self, species: &[Species]) -> SeedOutcome {
        let (strategy, count) = match self.strategy.seed {
            SeedStrategy::Tabulate => ("tabulate", self.strategy.init_species.max(1)),
            _ => ("single", 1),
        };
        let seeds: Vec<(String, String)> = species
            .iter()
            .take(count)
            .enumerate()
            .map(|(i, sp)| (sp.label(i), sp.description.clone()))
            .collect();
        let ids: Vec<String> = seeds.iter().map(|(id, _)| id.clone()).collect();

        let rendered = match self.strategy.seed {
            SeedStrategy::Tabulate => prompt::render_tabulation(&self.prompts.init, &seeds),
            _ => prompt::render_accumulation(&self.prompts.init, &seeds[0].1, &[]),
        };

        let outcome = |status: Status, failed: Option<String>| SeedOutcome {
            strategy: strategy.to_string(),
            species: ids.clone(),
            status,
            failed_str: failed,
        };

        let text = match self.call(&CompletionRequest::prompt(&self.prompts.system, &rendered)) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Seeding failed, starting with an empty registry");
                return outcome(Status::ExceptionThrown, Some(e));
            }
        };

        let names: Result<Vec<String>, ParseError> = match self.strategy.seed {
            SeedStrategy::Tabulate => parser::parse_table(&text, &ids)
                .map(|rows| rows.into_iter().map(|r| r.characteristic).collect()),
            _ => parser::parse(&text).map(|values| values.into_iter().map(|v| v.characteristic).collect()),
        };

        match names {
            Ok(names) => {
                let added = self.registry.merge(&names);
                log::info!("Seeded registry with {} characteristics via {}", added, strategy);
                outcome(Status::Success, None)
            }
            Err(e) => {
                log::warn!("Seed response did not parse ({}), starting with an empty registry", e);
                outcome(failure_status(&e), Some(text))
            }
        }
    }
}

fn failure_status(err: &ParseError) -> Status {
    match err {
        ParseError::InvalidJson => Status::InvalidJson,
        ParseError::BadStructure(_) => Status::BadStructure,
    }
}

fn print_progress(done: usize, total: usize, status: Status, registry_size: usize) {
    use colored::*;

    let status = match status {
        Status::Success => status.as_str().green(),
        Status::ExceptionThrown => status.as_str().red(),
        _ => status.as_str().yellow(),
    };
    println!(
        "  {} {}/{} {} {}",
        "→".blue(),
        done,
        total,
        status,
        format!("({} characteristics)", registry_size).dimmed()
    );
}
