use clap::ValueEnum;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::LlmParams;

/// Main desc2matrix configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    pub llm: LlmConfig,
    pub run: RunDefaults,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    pub fn level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// Model endpoint and generation options
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub host: String,
    pub model: String,
    pub temperature: f64,
    pub seed: i64,
    pub repeat_last_n: i64,
    /// Maximum tokens generated per request
    pub num_predict: u32,
    /// Context window size
    pub num_ctx: u32,
    pub top_k: Option<u32>,
    pub top_p: Option<f64>,
    /// Global timeout per request, in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let params = LlmParams::default();
        Self {
            host: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            temperature: params.temperature,
            seed: params.seed,
            repeat_last_n: params.repeat_last_n,
            num_predict: params.num_predict,
            num_ctx: params.num_ctx,
            top_k: params.top_k,
            top_p: params.top_p,
            timeout_secs: 300,
        }
    }
}

impl LlmConfig {
    pub fn params(&self) -> LlmParams {
        LlmParams {
            temperature: self.temperature,
            seed: self.seed,
            repeat_last_n: self.repeat_last_n,
            num_predict: self.num_predict,
            num_ctx: self.num_ctx,
            top_k: self.top_k,
            top_p: self.top_p,
        }
    }
}

/// How the registry is pre-populated before the first species
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SeedStrategy {
    /// Start with an empty registry
    #[default]
    None,
    /// Extract from the first description with the init prompt
    Single,
    /// Tabulate the first few descriptions together
    Tabulate,
}

impl SeedStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeedStrategy::None => "none",
            SeedStrategy::Single => "single",
            SeedStrategy::Tabulate => "tabulate",
        }
    }
}

/// Defaults for `run`; each can be overridden on the command line
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunDefaults {
    pub followup_enabled: bool,
    pub seed_strategy: SeedStrategy,
    /// Species tabulated by the `tabulate` seed strategy
    pub init_species_count: usize,
    /// Keep only TSV rows with this `type`
    pub description_type: Option<String>,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            followup_enabled: false,
            seed_strategy: SeedStrategy::None,
            init_species_count: 3,
            description_type: None,
        }
    }
}

/// Optional template paths; unset entries use the built-ins
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub system: Option<PathBuf>,
    pub accumulation: Option<PathBuf>,
    pub init: Option<PathBuf>,
    pub followup: Option<PathBuf>,
}

/// Resolved settings of one run, snapshotted into the artifact metadata
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    pub description_count_limit: Option<usize>,
    pub start_offset: usize,
    pub generation_max_tokens: u32,
    pub context_window_size: u32,
    pub prompt_template_path: Option<PathBuf>,
    pub followup_prompt_template_path: Option<PathBuf>,
    pub followup_enabled: bool,
    pub temperature: f64,
    pub seed_strategy: SeedStrategy,
    pub init_species_count: usize,
    pub tool_calling_enabled: bool,
    pub description_type: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RunConfig {
    /// Run settings as given by the configuration file alone
    pub fn from_config(config: &Config) -> Self {
        Self {
            description_count_limit: None,
            start_offset: 0,
            generation_max_tokens: config.llm.num_predict,
            context_window_size: config.llm.num_ctx,
            prompt_template_path: config.prompts.accumulation.clone(),
            followup_prompt_template_path: config.prompts.followup.clone(),
            followup_enabled: config.run.followup_enabled,
            temperature: config.llm.temperature,
            seed_strategy: config.run.seed_strategy,
            init_species_count: config.run.init_species_count,
            tool_calling_enabled: false,
            description_type: config.run.description_type.clone(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Check D2M_CONFIG env var
        if let Ok(env_path) = std::env::var("D2M_CONFIG") {
            let path = PathBuf::from(env_path);
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from D2M_CONFIG: {}", e);
                    }
                }
            }
        }

        // Try D2M_DIR/desc2matrix.yaml
        if let Ok(dir) = std::env::var("D2M_DIR") {
            let path = PathBuf::from(dir).join("desc2matrix.yaml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from D2M_DIR: {}", e);
                    }
                }
            }
        }

        // Try ~/.config/desc2matrix/desc2matrix.yaml
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("desc2matrix").join("desc2matrix.yaml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", path.display(), e);
                    }
                }
            }
        }

        // Try ./desc2matrix.yaml
        let local_config = PathBuf::from("desc2matrix.yaml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load local config: {}", e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Expand a path that may contain ~ or env vars
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        let expanded = shellexpand::full(&path_str).unwrap_or_else(|_| path_str.clone());
        PathBuf::from(expanded.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.llm.host, "http://localhost:11434");
        assert_eq!(config.llm.timeout_secs, 300);
        assert!(!config.run.followup_enabled);
        assert_eq!(config.run.init_species_count, 3);
    }

    #[test]
    fn test_params_follow_llm_section() {
        let llm = LlmConfig {
            temperature: 0.7,
            num_ctx: 8192,
            top_k: Some(40),
            ..LlmConfig::default()
        };
        let params = llm.params();
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.num_ctx, 8192);
        assert_eq!(params.top_k, Some(40));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "log_level: debug\nllm:\n  model: mistral\nrun:\n  seed_strategy: tabulate\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.llm.model, "mistral");
        assert_eq!(config.llm.num_predict, LlmParams::default().num_predict);
        assert_eq!(config.run.seed_strategy, SeedStrategy::Tabulate);
        assert_eq!(config.prompts, PromptsConfig::default());
    }

    #[test]
    fn test_run_config_from_config() {
        let mut config = Config::default();
        config.run.followup_enabled = true;
        config.prompts.followup = Some(PathBuf::from("f.txt"));

        let run = RunConfig::from_config(&config);
        assert!(run.followup_enabled);
        assert_eq!(run.followup_prompt_template_path, Some(PathBuf::from("f.txt")));
        assert_eq!(run.generation_max_tokens, config.llm.num_predict);
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("desc2matrix.yaml");
        fs::write(&path, "llm:\n  timeout_secs: 5\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.llm.timeout_secs, 5);

        fs::write(&path, "llm: [not, a, map]\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_expand_path_no_expansion() {
        let path = PathBuf::from("/usr/local/bin");
        let expanded = Config::expand_path(&path);
        assert_eq!(expanded, PathBuf::from("/usr/local/bin"));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/prompts");
        let expanded = Config::expand_path(&path);
        assert!(!expanded.to_string_lossy().contains('~'));
        assert!(expanded.to_string_lossy().contains("prompts"));
    }

    #[test]
    fn test_expand_path_with_env_var() {
        // SAFETY: Test runs single-threaded, env var is test-specific
        unsafe {
            std::env::set_var("D2M_TEST_VAR", "/custom/path");
        }
        let path = PathBuf::from("$D2M_TEST_VAR/accum.txt");
        let expanded = Config::expand_path(&path);
        assert_eq!(expanded, PathBuf::from("/custom/path/accum.txt"));
        unsafe {
            std::env::remove_var("D2M_TEST_VAR");
        }
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let yaml_str = serde_yaml::to_string(&config).expect("Failed to serialize");
        let parsed: Config = serde_yaml::from_str(&yaml_str).expect("Failed to deserialize");
        assert_eq!(parsed.llm, config.llm);
        assert_eq!(parsed.run, config.run);
    }
}
