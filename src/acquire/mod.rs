// src/acquire/mod.rs
//! Content acquisition
//!
//! Drives one transfer to completion through a [`TransferEngine`]:
//!
//! - the destination directory is created before the transfer starts
//! - the source's own trackers are merged with the user tracker list
//! - status is polled every `poll_interval` (50-200ms)
//! - reported percent never decreases
//! - throughput is smoothed over a short sample window, and an ETA is only
//!   shown once that rate is meaningful
//! - progress events are throttled, detailed log lines less often
//!
//! A failed transfer aborts the stage; nothing is retried. Cancellation
//! removes the transfer from the engine and reports `Cancelled`.

mod aria2;
mod engine;
mod rate;
mod source;
mod trackers;

pub use aria2::{Aria2Engine, Aria2Transfer};
pub use engine::{TransferEngine, TransferHandle, TransferRequest, TransferState, TransferStatus};
pub use rate::{ThroughputWindow, format_bytes, format_eta};
pub use source::{MagnetLink, SourceLocator};
pub use trackers::{DEFAULT_TRACKERS, TrackerList};

use crate::config::TransferSettings;
use crate::control::SessionControl;
use crate::error::{Error, Result};
use crate::progress::{StageReporter, Throttle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of a completed transfer
#[derive(Debug, Clone)]
pub struct AcquireSummary {
    pub transfer_id: String,
    pub destination: PathBuf,
    pub bytes_total: u64,
    pub elapsed: Duration,
}

/// Runs transfers with progress reporting and cooperative control
pub struct ContentAcquirer<'a> {
    engine: &'a dyn TransferEngine,
    settings: &'a TransferSettings,
    trackers: &'a TrackerList,
}

impl<'a> ContentAcquirer<'a> {
    pub fn new(
        engine: &'a dyn TransferEngine,
        settings: &'a TransferSettings,
        trackers: &'a TrackerList,
    ) -> Self {
        Self {
            engine,
            settings,
            trackers,
        }
    }

    /// Fetch `source` into `destination`
    pub fn acquire(
        &self,
        source: &SourceLocator,
        destination: &Path,
        reporter: StageReporter<'_>,
        control: &SessionControl,
    ) -> Result<AcquireSummary> {
        std::fs::create_dir_all(destination)?;
        control.check()?;

        let trackers = self.trackers.merged_with(source.trackers());
        self.engine.configure(self.settings)?;

        let request = TransferRequest {
            source,
            destination,
            trackers: &trackers,
            seed: self.settings.seed_after_complete,
        };
        let mut handle = self.engine.add(&request)?;
        info!(
            "Acquiring {} into {} via {} ({} trackers)",
            source,
            destination.display(),
            self.engine.name(),
            trackers.len()
        );
        reporter.report(0.0, format!("Starting transfer of {source}"));

        let started = Instant::now();
        let poll = self.settings.poll_interval();
        let mut window = ThroughputWindow::new(self.settings.rate_window);
        let mut progress_gate = Throttle::new(self.settings.progress_interval());
        let mut log_gate = Throttle::new(self.settings.log_interval());
        let mut last_percent = 0.0_f32;
        let mut last_logged_percent = u32::MAX;
        let mut engine_paused = false;

        loop {
            if control.is_cancelled() {
                info!("Cancelling transfer {}", handle.id());
                if let Err(e) = handle.remove() {
                    warn!("Failed to remove cancelled transfer: {}", e);
                }
                return Err(Error::Cancelled);
            }

            if control.is_paused() != engine_paused {
                let toggled = if engine_paused {
                    handle.resume()
                } else {
                    handle.pause()
                };
                match toggled {
                    Ok(()) => {
                        engine_paused = !engine_paused;
                        info!(
                            "Transfer {} {}",
                            handle.id(),
                            if engine_paused { "paused" } else { "resumed" }
                        );
                    }
                    Err(e) => warn!("Failed to toggle pause on {}: {}", handle.id(), e),
                }
            }

            let status = match handle.status() {
                Ok(status) => status,
                Err(e) => {
                    let _ = handle.remove();
                    return Err(e);
                }
            };

            if let TransferState::Failed(reason) = &status.state {
                let reason = reason.clone();
                let _ = handle.remove();
                return Err(Error::Transfer(reason));
            }

            if status.is_finished() {
                reporter.report(100.0, "Transfer complete");
                let transfer_id = handle.id();
                info!(
                    "Transfer {} finished: {} in {:.1}s",
                    transfer_id,
                    format_bytes(status.bytes_total),
                    started.elapsed().as_secs_f64()
                );
                if !self.settings.seed_after_complete
                    && let Err(e) = handle.remove()
                {
                    debug!("Could not detach finished transfer: {}", e);
                }
                return Ok(AcquireSummary {
                    transfer_id,
                    destination: destination.to_path_buf(),
                    bytes_total: status.bytes_total,
                    elapsed: started.elapsed(),
                });
            }

            let now = Instant::now();
            let rate = window.record(now, status.bytes_done);
            // Completion is only reported through the finished branch
            let percent = last_percent.max(status.percent().min(99.9));
            last_percent = percent;

            let remaining = status.bytes_total.saturating_sub(status.bytes_done);
            let eta = window.eta(remaining, self.settings.eta_min_rate);
            let message = describe(&status, rate, eta);

            if progress_gate.ready_at(now) {
                reporter.report(percent, message.clone());
            }
            let whole = percent as u32;
            if log_gate.ready_at(now) || whole != last_logged_percent {
                last_logged_percent = whole;
                info!("[{}] {:.1}% {}", handle.id(), percent, message);
            }

            std::thread::sleep(poll);
        }
    }
}

fn describe(status: &TransferStatus, rate: f64, eta: Option<Duration>) -> String {
    match status.state {
        TransferState::Downloading => {
            let mut text = format!(
                "{} / {} at {}/s, {} peers",
                format_bytes(status.bytes_done),
                format_bytes(status.bytes_total),
                format_bytes(rate as u64),
                status.peers
            );
            if let Some(eta) = eta {
                text.push_str(&format!(", ETA {}", format_eta(eta)));
            }
            text
        }
        ref other => {
            let mut text = other.to_string();
            text[..1].make_ascii_uppercase();
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::Stage;
    use crate::progress::{CallbackProgress, InstallEvent};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays a fixed status script
    struct ScriptedEngine {
        script: Mutex<Option<VecDeque<TransferStatus>>>,
        removed: Arc<Mutex<bool>>,
    }

    struct ScriptedHandle {
        script: VecDeque<TransferStatus>,
        removed: Arc<Mutex<bool>>,
    }

    impl TransferEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }
        fn configure(&self, _settings: &TransferSettings) -> Result<()> {
            Ok(())
        }
        fn add(&self, _request: &TransferRequest<'_>) -> Result<Box<dyn TransferHandle>> {
            let script = self.script.lock().unwrap().take().unwrap_or_default();
            Ok(Box::new(ScriptedHandle {
                script,
                removed: Arc::clone(&self.removed),
            }))
        }
    }

    impl TransferHandle for ScriptedHandle {
        fn id(&self) -> String {
            "t1".to_string()
        }
        fn status(&mut self) -> Result<TransferStatus> {
            if self.script.len() > 1 {
                Ok(self.script.pop_front().unwrap())
            } else {
                Ok(self.script.front().cloned().unwrap())
            }
        }
        fn pause(&mut self) -> Result<()> {
            Ok(())
        }
        fn resume(&mut self) -> Result<()> {
            Ok(())
        }
        fn remove(self: Box<Self>) -> Result<()> {
            *self.removed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn step(state: TransferState, done: u64) -> TransferStatus {
        TransferStatus {
            state,
            bytes_done: done,
            bytes_total: 1000,
            download_rate: 0,
            peers: 3,
        }
    }

    fn fast_settings() -> TransferSettings {
        TransferSettings {
            poll_interval_ms: 50,
            progress_interval_ms: 0,
            ..TransferSettings::default()
        }
    }

    fn run(script: Vec<TransferStatus>, control: &SessionControl) -> (Result<AcquireSummary>, Vec<f32>, bool) {
        let removed = Arc::new(Mutex::new(false));
        let engine = ScriptedEngine {
            script: Mutex::new(Some(script.into())),
            removed: Arc::clone(&removed),
        };
        let percents = Arc::new(Mutex::new(Vec::new()));
        let sink_percents = Arc::clone(&percents);
        let sink = CallbackProgress::new(move |event| {
            if let InstallEvent::Progress { percent, .. } = event {
                sink_percents.lock().unwrap().push(percent);
            }
        });
        let temp = tempfile::TempDir::new().unwrap();
        let dest = temp.path().join("content/demo");
        let settings = fast_settings();
        let trackers = TrackerList::default();
        let acquirer = ContentAcquirer::new(&engine, &settings, &trackers);
        let source = SourceLocator::parse("https://example.org/demo.zip").unwrap();

        let result = acquirer.acquire(
            &source,
            &dest,
            StageReporter::new(&sink, Stage::ContentAcquire),
            control,
        );
        assert!(dest.is_dir());
        let percents = percents.lock().unwrap().clone();
        let removed = *removed.lock().unwrap();
        (result, percents, removed)
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_100() {
        let script = vec![
            step(TransferState::Downloading, 300),
            // Engine re-check briefly reports less
            step(TransferState::Checking, 100),
            step(TransferState::Downloading, 700),
            step(TransferState::Complete, 1000),
        ];
        let (result, percents, removed) = run(script, &SessionControl::new());

        let summary = result.unwrap();
        assert_eq!(summary.bytes_total, 1000);
        assert!(removed);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
        assert_eq!(percents.last().copied(), Some(100.0));
    }

    #[test]
    fn test_failure_aborts() {
        let script = vec![
            step(TransferState::Downloading, 10),
            step(TransferState::Failed("tracker unreachable".to_string()), 10),
        ];
        let (result, _, removed) = run(script, &SessionControl::new());
        assert!(matches!(result, Err(Error::Transfer(ref m)) if m == "tracker unreachable"));
        assert!(removed);
    }

    #[test]
    fn test_cancel_removes_transfer() {
        let control = SessionControl::new();
        control.cancel();
        let (result, percents, removed) = run(vec![step(TransferState::Downloading, 10)], &control);
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!removed, "cancel before add never reaches the engine");
        assert!(!percents.contains(&100.0));
    }

    #[test]
    fn test_describe() {
        let status = step(TransferState::Downloading, 512);
        let text = describe(&status, 2048.0, Some(Duration::from_secs(65)));
        assert!(text.contains("512 B / 1000 B"));
        assert!(text.ends_with("ETA 1m05s"));
        assert_eq!(describe(&step(TransferState::FetchingMetadata, 0), 0.0, None), "Fetching metadata");
    }
}
