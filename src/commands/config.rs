use colored::*;
use eyre::Result;

use crate::cli::{ConfigAction, OutputFormat};
use crate::config::Config;

pub fn run(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show { format } => show(OutputFormat::resolve(format), config),
        ConfigAction::Get { key } => get(&key, config),
    }
}

fn show(format: OutputFormat, config: &Config) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        OutputFormat::Text => {
            println!("{}", "desc2matrix Configuration".bold());
            println!();

            println!("log_level: {}", config.log_level.as_filter());
            println!();

            println!("{}:", "llm".cyan());
            println!("  host: {}", config.llm.host);
            println!("  model: {}", config.llm.model);
            println!("  temperature: {}", config.llm.temperature);
            println!("  num_predict: {}", config.llm.num_predict);
            println!("  num_ctx: {}", config.llm.num_ctx);
            println!("  timeout_secs: {}", config.llm.timeout_secs);
            println!();

            println!("{}:", "run".cyan());
            println!("  followup_enabled: {}", config.run.followup_enabled);
            println!("  seed_strategy: {}", config.run.seed_strategy.as_str());
            println!("  init_species_count: {}", config.run.init_species_count);
            println!();

            println!("{}:", "prompts".cyan());
            for (name, path) in [
                ("system", &config.prompts.system),
                ("accumulation", &config.prompts.accumulation),
                ("init", &config.prompts.init),
                ("followup", &config.prompts.followup),
            ] {
                match path {
                    Some(p) => println!("  {}: {}", name, p.display()),
                    None => println!("  {}: {}", name, "built-in".dimmed()),
                }
            }
        }
    }

    Ok(())
}

fn lookup(key: &str, config: &Config) -> Option<String> {
    let path = |p: &Option<std::path::PathBuf>| p.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
    let value = match key {
        "log_level" | "log-level" => config.log_level.as_filter().to_string(),
        "llm.host" => config.llm.host.clone(),
        "llm.model" => config.llm.model.clone(),
        "llm.temperature" => config.llm.temperature.to_string(),
        "llm.seed" => config.llm.seed.to_string(),
        "llm.num_predict" => config.llm.num_predict.to_string(),
        "llm.num_ctx" => config.llm.num_ctx.to_string(),
        "llm.timeout_secs" => config.llm.timeout_secs.to_string(),
        "run.followup_enabled" => config.run.followup_enabled.to_string(),
        "run.seed_strategy" => config.run.seed_strategy.as_str().to_string(),
        "run.init_species_count" => config.run.init_species_count.to_string(),
        "prompts.system" => path(&config.prompts.system),
        "prompts.accumulation" => path(&config.prompts.accumulation),
        "prompts.init" => path(&config.prompts.init),
        "prompts.followup" => path(&config.prompts.followup),
        _ => return None,
    };
    Some(value)
}

fn get(key: &str, config: &Config) -> Result<()> {
    match lookup(key, config) {
        Some(v) => println!("{}", v),
        None => {
            eprintln!("{} Unknown config key: {}", "✗".red(), key);
            std::process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_keys() {
        let config = Config::default();
        assert_eq!(lookup("llm.model", &config).as_deref(), Some("llama3"));
        assert_eq!(lookup("log-level", &config).as_deref(), Some("info"));
        assert_eq!(lookup("prompts.followup", &config).as_deref(), Some(""));
        assert_eq!(lookup("nope", &config), None);
    }
}
