// src/commands/install.rs
//! Install command

use super::progress::BarProgress;
use anyhow::{Context, Result};
use gamestage::{
    Aria2Engine, ContentRequest, InstallOrchestrator, LogProgress, ProgressSink, Settings,
    SourceLocator,
};
use std::sync::Arc;
use tracing::info;

pub struct InstallArgs {
    pub id: String,
    pub source: String,
    pub platform: String,
    pub emulator: Option<String>,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub no_progress: bool,
    pub dry_run_config: bool,
}

pub fn cmd_install(settings: Settings, args: InstallArgs) -> Result<()> {
    let source = SourceLocator::parse(&args.source)
        .with_context(|| format!("Invalid source for {}", args.id))?;
    let engine = Aria2Engine::connect(&settings.transfer)
        .context("Failed to reach the transfer engine")?;
    let orchestrator = InstallOrchestrator::from_settings(settings, Arc::new(engine))
        .context("Failed to load platform and launch-profile registries")?;

    let title = args.title.unwrap_or_else(|| args.id.clone());
    let mut request = ContentRequest::new(
        &args.id,
        title,
        &args.platform,
        args.emulator.unwrap_or_default(),
        source,
    )
    .with_config_dry_run(args.dry_run_config);
    if let Some(content_type) = args.content_type {
        request = request.with_content_type(content_type);
    }

    let sink: Arc<dyn ProgressSink> = if args.no_progress {
        Arc::new(LogProgress::new(args.id.clone()))
    } else {
        Arc::new(BarProgress::new(&args.id))
    };

    let handle = orchestrator.start(request, sink)?;
    info!("Session {} started for {}", handle.session_id(), args.id);
    let record = handle
        .wait()
        .with_context(|| format!("Installing {} failed", args.id))?;

    println!("Installed {} [{}]", record.title, record.platform);
    println!("  Directory: {}", record.install_path.display());
    println!("  Launcher:  {}", record.launcher_path.display());
    Ok(())
}
