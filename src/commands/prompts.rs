use colored::*;
use eyre::{Context, Result};
use std::fs;
use std::path::Path;

use crate::cli::PromptsAction;
use crate::prompt::{self, BUILTIN_NAMES};

pub fn run(action: PromptsAction) -> Result<()> {
    match action {
        PromptsAction::Show { name } => show(&name),
        PromptsAction::Export { dir, force } => export(&dir, force),
    }
}

fn show(name: &str) -> Result<()> {
    let Some(text) = prompt::builtin(name) else {
        eyre::bail!("Unknown template '{}' (expected one of: {})", name, BUILTIN_NAMES.join(", "));
    };
    print!("{}", text);
    Ok(())
}

fn export(dir: &Path, force: bool) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    for name in BUILTIN_NAMES {
        let path = dir.join(format!("{}.txt", name));
        if path.exists() && !force {
            println!("  {} {} exists, skipping (use --force)", "⚠".yellow(), path.display());
            continue;
        }

        let text = prompt::builtin(name).ok_or_else(|| eyre::eyre!("No built-in template '{}'", name))?;
        fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("  {} {}", "✓".green(), path.display());
    }

    Ok(())
}
