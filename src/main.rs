// src/main.rs

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use gamestage::Settings;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::discover(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Commands::Install {
            id,
            source,
            platform,
            emulator,
            title,
            content_type,
            no_progress,
            dry_run_config,
        } => commands::cmd_install(
            settings,
            commands::InstallArgs {
                id,
                source,
                platform,
                emulator,
                title,
                content_type,
                no_progress,
                dry_run_config,
            },
        ),
        Commands::Uninstall { id } => commands::cmd_uninstall(&settings, &id),
        Commands::List { json } => commands::cmd_list(&settings, json),
        Commands::Launch { id } => commands::cmd_launch(&settings, &id),
        Commands::Platforms => commands::cmd_platforms(&settings),
        Commands::Classify { paths } => commands::cmd_classify(&paths),
    }
}
