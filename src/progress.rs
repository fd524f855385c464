// src/progress.rs

//! Progress channel between the pipeline and its presentation layer
//!
//! Every long-running stage reports `(percent, message)` pairs at a throttled
//! cadence, and the orchestrator adds terminal success/error/cancel signals.
//! Consumers implement [`ProgressSink`]; the library ships:
//! - `SilentProgress`: drops everything (scripted/quiet modes)
//! - `LogProgress`: forwards to tracing
//! - `CallbackProgress`: calls a closure (GUI integration)
//! - `ChannelProgress`: sends over an mpsc channel
//!
//! # Example
//!
//! ```ignore
//! use gamestage::progress::{ChannelProgress, InstallEvent};
//!
//! let (sink, events) = ChannelProgress::new();
//! let handle = orchestrator.start(request, Arc::new(sink))?;
//! for event in events {
//!     if let InstallEvent::Progress { percent, message, .. } = event {
//!         println!("{percent:5.1}% {message}");
//!     }
//! }
//! ```

use crate::error::ErrorKind;
use crate::install::Stage;
use crate::launch::InstalledRecord;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Events emitted during one install session
#[derive(Debug, Clone)]
pub enum InstallEvent {
    /// Pipeline entered a new stage
    StageChanged(Stage),
    /// Stage-local progress, 0-100
    Progress {
        stage: Stage,
        percent: f32,
        message: String,
    },
    /// Pipeline completed and the ledger holds this record
    Finished(InstalledRecord),
    /// A stage failed; the session is in its error state
    Failed {
        stage: Stage,
        kind: ErrorKind,
        message: String,
    },
    /// User cancelled while `stage` was active
    Cancelled { stage: Stage },
}

/// Consumer of install events
///
/// Implementations must be thread-safe: every session reports from its own
/// worker thread.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: InstallEvent);
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn emit(&self, _event: InstallEvent) {}
}

/// Logs events through tracing
#[derive(Debug, Clone)]
pub struct LogProgress {
    name: String,
}

impl LogProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ProgressSink for LogProgress {
    fn emit(&self, event: InstallEvent) {
        match event {
            InstallEvent::StageChanged(stage) => info!("{}: entering {}", self.name, stage),
            InstallEvent::Progress {
                stage,
                percent,
                message,
            } => info!("{}: [{}] {:.1}% {}", self.name, stage, percent, message),
            InstallEvent::Finished(record) => info!(
                "{}: installed {} -> {}",
                self.name,
                record.content_id,
                record.launcher_path.display()
            ),
            InstallEvent::Failed {
                stage,
                kind,
                message,
            } => warn!("{}: {} failed ({}): {}", self.name, stage, kind, message),
            InstallEvent::Cancelled { stage } => {
                info!("{}: cancelled during {}", self.name, stage)
            }
        }
    }
}

/// Calls a closure for every event
pub struct CallbackProgress<F>
where
    F: Fn(InstallEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackProgress<F>
where
    F: Fn(InstallEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressSink for CallbackProgress<F>
where
    F: Fn(InstallEvent) + Send + Sync,
{
    fn emit(&self, event: InstallEvent) {
        (self.callback)(event);
    }
}

/// Sends events over a channel; a dropped receiver silently discards them
pub struct ChannelProgress {
    sender: Mutex<Sender<InstallEvent>>,
}

impl ChannelProgress {
    pub fn new() -> (Self, Receiver<InstallEvent>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender: Mutex::new(sender),
            },
            receiver,
        )
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: InstallEvent) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(event);
        }
    }
}

/// Stage-bound reporter handed to sub-components
///
/// Components report stage-local percentages without knowing which stage
/// they run in.
#[derive(Clone, Copy)]
pub struct StageReporter<'a> {
    sink: &'a dyn ProgressSink,
    stage: Stage,
}

impl<'a> StageReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink, stage: Stage) -> Self {
        Self { sink, stage }
    }

    pub fn report(&self, percent: f32, message: impl Into<String>) {
        self.sink.emit(InstallEvent::Progress {
            stage: self.stage,
            percent: percent.clamp(0.0, 100.0),
            message: message.into(),
        });
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }
}

/// Rate gate for progress emission
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True if an emission is due now; arms the next window when it is
    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
