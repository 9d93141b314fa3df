use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::config::SeedStrategy;

/// Output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

impl OutputFormat {
    /// Resolve the effective output format.
    /// If user specified a format, use it.
    /// Otherwise: TTY → Text, non-TTY (pipe) → Json
    pub fn resolve(user_choice: Option<OutputFormat>) -> OutputFormat {
        match user_choice {
            Some(fmt) => fmt,
            None => {
                if std::io::stdout().is_terminal() {
                    OutputFormat::Text
                } else {
                    OutputFormat::Json
                }
            }
        }
    }
}

#[derive(Parser)]
#[command(
    name = "desc2matrix",
    about = "Accumulate species-characteristic matrices from botanical descriptions with an LLM",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/desc2matrix/logs/desc2matrix.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to desc2matrix.yaml config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract characteristics from every description, accumulating a shared registry
    Run(Box<RunArgs>),

    /// Summarise a run artifact
    Summary {
        /// Artifact written by `run`
        artifact: PathBuf,

        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Inspect the built-in prompt templates
    Prompts {
        #[command(subcommand)]
        action: PromptsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Description file (TSV with a `description` column, or JSON)
    pub descfile: PathBuf,

    /// Where the run artifact is written (JSON)
    pub outputfile: PathBuf,

    /// Continue the run stored in OUTPUTFILE
    #[arg(long)]
    pub resume: bool,

    /// Replay canned responses from a YAML/JSON file instead of calling the model
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Let the model answer through the record_traits tool
    #[arg(long)]
    pub tools: bool,

    /// Ask a follow-up question about words the first answer left out
    #[arg(long)]
    pub followup: bool,

    /// Disable follow-up even when the config file enables it
    #[arg(long, conflicts_with = "followup")]
    pub no_followup: bool,

    /// How to seed the characteristic registry
    #[arg(long, value_enum)]
    pub seed_strategy: Option<SeedStrategy>,

    /// Number of species tabulated by the tabulate seed strategy
    #[arg(long, value_name = "N")]
    pub initspnum: Option<usize>,

    /// Skip this many descriptions
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Process at most this many descriptions
    #[arg(long, value_name = "N")]
    pub spnum: Option<usize>,

    /// Keep only TSV rows of this description type
    #[arg(long)]
    pub desctype: Option<String>,

    /// System prompt file
    #[arg(long, value_name = "FILE")]
    pub sysprompt: Option<PathBuf>,

    /// Accumulation prompt file
    #[arg(long, value_name = "FILE")]
    pub prompt: Option<PathBuf>,

    /// Init (seed) prompt file
    #[arg(long, value_name = "FILE")]
    pub initprompt: Option<PathBuf>,

    /// Follow-up prompt file
    #[arg(long, value_name = "FILE")]
    pub fprompt: Option<PathBuf>,

    /// Model name
    #[arg(long)]
    pub model: Option<String>,

    /// Model server URL
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub temperature: Option<f64>,

    /// Sampling seed
    #[arg(long)]
    pub seed: Option<i64>,

    /// How far back the model looks to penalise repetition
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub repeatlastn: Option<i64>,

    /// Maximum tokens generated per request
    #[arg(long)]
    pub numpredict: Option<u32>,

    /// Context window size
    #[arg(long)]
    pub numctx: Option<u32>,

    #[arg(long)]
    pub topk: Option<u32>,

    #[arg(long)]
    pub topp: Option<f64>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// Print a built-in template
    Show {
        /// Template name (system, accumulation, init, tabulation, followup)
        name: String,
    },

    /// Write every built-in template to a directory for editing
    Export {
        /// Target directory
        dir: PathBuf,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Get a configuration value
    Get {
        /// Configuration key (dot notation)
        key: String,
    },
}
