// src/commands/progress.rs
//! Terminal rendering of install events
//!
//! A stage line on top and a percent bar for the running stage below it.

use gamestage::{InstallEvent, ProgressSink, Stage};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Stages that show a progress bar in the UI, in order
const VISIBLE_STAGES: &[Stage] = &[
    Stage::EmulatorCheck,
    Stage::FirmwareCheck,
    Stage::ConfigApply,
    Stage::ContentAcquire,
    Stage::Finalize,
];

/// Draws one session with indicatif
pub struct BarProgress {
    _multi: MultiProgress,
    overall: ProgressBar,
    stage: ProgressBar,
}

impl BarProgress {
    pub fn new(content_id: &str) -> Self {
        let multi = MultiProgress::new();

        let overall = ProgressBar::new(VISIBLE_STAGES.len() as u64);
        overall.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} ({pos}/{len})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        overall.set_message(format!("Installing {content_id}"));
        overall.enable_steady_tick(Duration::from_millis(100));

        let stage = ProgressBar::new(1000);
        stage.set_style(
            ProgressStyle::default_bar()
                .template("  [{bar:40.cyan/dim}] {percent:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        let overall = multi.add(overall);
        let stage = multi.add(stage);
        Self {
            _multi: multi,
            overall,
            stage,
        }
    }
}

impl ProgressSink for BarProgress {
    fn emit(&self, event: InstallEvent) {
        match event {
            InstallEvent::StageChanged(stage) => {
                let done = VISIBLE_STAGES.iter().take_while(|s| **s != stage).count();
                self.overall.set_position(done as u64);
                self.stage.set_position(0);
                self.stage.set_message(stage.to_string());
            }
            InstallEvent::Progress {
                percent, message, ..
            } => {
                self.stage.set_position((percent * 10.0) as u64);
                self.stage.set_message(message);
            }
            InstallEvent::Finished(record) => {
                self.overall.set_position(VISIBLE_STAGES.len() as u64);
                self.stage.finish_and_clear();
                self.overall.finish_with_message(format!(
                    "Installed {} ({})",
                    record.title,
                    record.launcher_path.display()
                ));
            }
            InstallEvent::Failed {
                stage,
                kind,
                message,
            } => {
                self.stage.abandon_with_message(format!("{stage} failed ({kind}): {message}"));
                self.overall.abandon();
            }
            InstallEvent::Cancelled { stage } => {
                self.stage.abandon_with_message(format!("Cancelled during {stage}"));
                self.overall.abandon();
            }
        }
    }
}
