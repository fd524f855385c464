// src/commands/installed.rs
//! Commands over the installed-content ledger

use anyhow::{Context, Result, bail};
use gamestage::{Ledger, Settings, launch};

pub fn cmd_uninstall(settings: &Settings, id: &str) -> Result<()> {
    let ledger = Ledger::new(&settings.paths.ledger_file);
    let record = launch::uninstall(&settings.paths, &ledger, id)
        .with_context(|| format!("Failed to uninstall {id}"))?;
    println!("Removed {} ({})", record.title, record.install_path.display());
    Ok(())
}

pub fn cmd_list(settings: &Settings, json: bool) -> Result<()> {
    let ledger = Ledger::new(&settings.paths.ledger_file);
    let records = ledger
        .list()
        .with_context(|| format!("Failed to read {}", ledger.path().display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("Nothing installed");
        return Ok(());
    }
    for record in &records {
        println!(
            "{:<24} {:<10} {:<14} {:<9} {}",
            record.content_id,
            record.platform,
            record.emulator_id,
            format!("{:?}", record.current_status()).to_lowercase(),
            record.installed_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("\n{} installed", records.len());
    Ok(())
}

pub fn cmd_launch(settings: &Settings, id: &str) -> Result<()> {
    let ledger = Ledger::new(&settings.paths.ledger_file);
    let status = launch::launch(&ledger, id).with_context(|| format!("Failed to launch {id}"))?;
    if !status.success() {
        bail!("{id} exited with {status}");
    }
    Ok(())
}
