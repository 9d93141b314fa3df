//! The accumulation run
//!
//! Resolves CLI flags over the config file, loads descriptions and
//! templates, then hands everything to the driver. Anything wrong with the
//! inputs fails here, before the first request is sent.

use colored::*;
use eyre::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::cli::RunArgs;
use crate::config::{Config, LlmConfig, PromptsConfig, RunConfig, SeedStrategy};
use crate::driver::{self, Accumulator, Strategy};
use crate::input;
use crate::llm::{CompletionClient, OllamaClient, ReplayClient};
use crate::prompt::PromptSet;
use crate::recorder::{ArtifactSink, JsonFileSink, RunArtifact, RunRecorder, Status};

/// Everything a run needs once flags and config are merged
#[derive(Debug, Clone, PartialEq)]
struct Resolved {
    run: RunConfig,
    llm: LlmConfig,
    prompts: PromptsConfig,
}

fn resolve(args: &RunArgs, config: &Config) -> Resolved {
    let mut llm = config.llm.clone();
    if let Some(model) = &args.model {
        llm.model = model.clone();
    }
    if let Some(host) = &args.host {
        llm.host = host.clone();
    }
    if let Some(temperature) = args.temperature {
        llm.temperature = temperature;
    }
    if let Some(seed) = args.seed {
        llm.seed = seed;
    }
    if let Some(n) = args.repeatlastn {
        llm.repeat_last_n = n;
    }
    if let Some(n) = args.numpredict {
        llm.num_predict = n;
    }
    if let Some(n) = args.numctx {
        llm.num_ctx = n;
    }
    if args.topk.is_some() {
        llm.top_k = args.topk;
    }
    if args.topp.is_some() {
        llm.top_p = args.topp;
    }
    if let Some(secs) = args.timeout {
        llm.timeout_secs = secs;
    }

    let prompts = PromptsConfig {
        system: args.sysprompt.clone().or_else(|| config.prompts.system.clone()),
        accumulation: args.prompt.clone().or_else(|| config.prompts.accumulation.clone()),
        init: args.initprompt.clone().or_else(|| config.prompts.init.clone()),
        followup: args.fprompt.clone().or_else(|| config.prompts.followup.clone()),
    };

    let run = RunConfig {
        description_count_limit: args.spnum,
        start_offset: args.start,
        generation_max_tokens: llm.num_predict,
        context_window_size: llm.num_ctx,
        prompt_template_path: prompts.accumulation.clone(),
        followup_prompt_template_path: prompts.followup.clone(),
        followup_enabled: !args.no_followup && (args.followup || config.run.followup_enabled),
        temperature: llm.temperature,
        seed_strategy: args.seed_strategy.unwrap_or(config.run.seed_strategy),
        init_species_count: args.initspnum.unwrap_or(config.run.init_species_count),
        tool_calling_enabled: args.tools,
        description_type: args.desctype.clone().or_else(|| config.run.description_type.clone()),
    };

    Resolved { run, llm, prompts }
}

pub fn run(args: &RunArgs, config: &Config, quiet: bool, verbose: bool) -> Result<()> {
    let resolved = resolve(args, config);
    let strategy = Strategy::from_config(&resolved.run);
    log::info!("Run mode: {}", strategy.mode_name());

    let prompts = PromptSet::load(&resolved.prompts, strategy.seed == SeedStrategy::Tabulate)
        .context("Failed to load prompt templates")?;

    let species = input::load(&args.descfile, resolved.run.description_type.as_deref())?;
    let species = input::slice(
        species,
        resolved.run.start_offset,
        resolved.run.description_count_limit,
    );
    if species.is_empty() {
        log::warn!("No descriptions selected from {}", args.descfile.display());
    }

    let recorder = if args.resume {
        let artifact = RunArtifact::load(&args.outputfile)?;
        if artifact.metadata.mode != strategy.mode_name() {
            eyre::bail!(
                "Cannot resume: {} was written in mode '{}', current mode is '{}'",
                args.outputfile.display(),
                artifact.metadata.mode,
                strategy.mode_name()
            );
        }
        check_resume_config(&artifact.metadata.config, &resolved.run).context("Cannot resume")?;
        let recorder = RunRecorder::resume(artifact).context("Cannot resume")?;
        recorder.check_species(&species).context("Cannot resume")?;
        recorder
    } else {
        if args.outputfile.exists() {
            log::warn!("Overwriting {}", args.outputfile.display());
        }
        let metadata = driver::run_metadata(
            &strategy,
            &prompts,
            &resolved.llm.model,
            &resolved.llm.params(),
            &resolved.run,
            &chrono::Local::now().to_rfc3339(),
        );
        RunRecorder::new(metadata)
    };

    let client: Box<dyn CompletionClient> = match &args.replay {
        Some(path) => {
            let mut client = ReplayClient::load(path)?;
            client.skip(recorder.metadata().completion_calls);
            Box::new(client)
        }
        None => Box::new(OllamaClient::new(
            &resolved.llm.host,
            &resolved.llm.model,
            resolved.llm.params(),
            Duration::from_secs(resolved.llm.timeout_secs),
        )),
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)).context("Failed to install Ctrl-C handler")?;

    let already = recorder.processed();
    if !quiet {
        println!(
            "{} {} descriptions from {} ({})",
            "→".blue(),
            species.len(),
            args.descfile.display(),
            strategy.mode_name().cyan()
        );
        if already > 0 {
            println!("  {} Resuming after {} species", "↻".blue(), already);
        }
    }

    let mut accumulator = Accumulator::new(client, prompts, strategy)
        .context("Invalid prompt template")?
        .with_cancel(cancel.clone())
        .with_progress(!quiet);
    let mut sink = JsonFileSink::new(args.outputfile.clone());
    let artifact = accumulator.run(&species, recorder, &mut sink)?;

    if artifact.data.is_empty() && artifact.charlist_history.is_empty() {
        // Nothing recorded, so the sink never wrote
        sink.persist(&artifact)?;
    }

    if !quiet {
        report(&artifact, cancel.load(Ordering::SeqCst), verbose);
        println!("  {} Saved to {}", "✓".green(), args.outputfile.display());
    }

    Ok(())
}

/// Settings that decide which descriptions are processed and how must not
/// change between the interrupted run and its continuation. The count limit
/// may, so a run can be extended.
fn check_resume_config(recorded: &RunConfig, current: &RunConfig) -> Result<()> {
    let changed: Vec<&str> = [
        ("start offset", recorded.start_offset != current.start_offset),
        ("description type", recorded.description_type != current.description_type),
        ("prompt template", recorded.prompt_template_path != current.prompt_template_path),
        (
            "follow-up prompt template",
            recorded.followup_prompt_template_path != current.followup_prompt_template_path,
        ),
        ("init species count", recorded.init_species_count != current.init_species_count),
    ]
    .into_iter()
    .filter_map(|(name, differs)| differs.then_some(name))
    .collect();

    if !changed.is_empty() {
        eyre::bail!("settings differ from the stored run: {}", changed.join(", "));
    }
    Ok(())
}

fn report(artifact: &RunArtifact, cancelled: bool, verbose: bool) {
    let successes = artifact.data.iter().filter(|r| r.status == Status::Success).count();
    let registry = artifact.charlist_history.last().cloned().unwrap_or_default();

    if cancelled {
        println!(
            "  {} Interrupted after {} species; continue with --resume",
            "⚠".yellow(),
            artifact.data.len()
        );
    }
    println!(
        "  {} {}/{} species succeeded, {} characteristics",
        "✓".green(),
        successes,
        artifact.data.len(),
        registry.len()
    );

    if verbose {
        for name in &registry {
            println!("    {}", name.dimmed());
        }
    }
}
