// src/commands/inspect.rs
//! Read-only diagnostics: platform table and archive classification

use anyhow::{Context, Result};
use gamestage::{Classification, PlatformRegistry, Settings, classify};
use std::path::PathBuf;

pub fn cmd_platforms(settings: &Settings) -> Result<()> {
    let registry = PlatformRegistry::load_dir(&settings.paths.platforms_dir)
        .context("Failed to load platform descriptors")?;
    if registry.is_empty() {
        println!(
            "No platform descriptors in {}",
            settings.paths.platforms_dir.display()
        );
        return Ok(());
    }

    for platform in registry.all() {
        let firmware = if platform.required_firmware().is_empty() {
            "-".to_string()
        } else {
            platform.required_firmware().join(",")
        };
        println!(
            "{:<10} {:<28} {:<10} {:<16} {}",
            platform.id,
            platform.name,
            platform.install_method.to_string(),
            platform.launch_profile,
            firmware
        );
        if !platform.extensions.is_empty() {
            println!("           formats: {}", platform.extensions.join(" "));
        }
    }
    Ok(())
}

pub fn cmd_classify(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        let classification =
            classify(path).with_context(|| format!("Failed to classify {}", path.display()))?;
        match classification {
            Classification::Archive { format, warning } => {
                println!("{}: {} archive", path.display(), format);
                if let Some(warning) = warning {
                    println!("  warning: {}", warning.reason);
                }
            }
            Classification::Excluded(reason) => {
                println!("{}: left packed ({})", path.display(), reason);
            }
            Classification::Plain => println!("{}: not an archive", path.display()),
        }
    }
    Ok(())
}
