// src/install/session.rs

//! Live session state and the handle returned to callers

use super::Stage;
use crate::control::SessionControl;
use crate::error::{Error, Result};
use crate::launch::InstalledRecord;
use crate::progress::{InstallEvent, ProgressSink};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use uuid::Uuid;

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Paused,
    Cancelled,
    Error,
    Done,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub content_id: String,
    pub stage: Stage,
    pub status: SessionStatus,
    /// Stage-local progress of the current stage
    pub percent: f32,
    pub message: String,
    pub install_dir: PathBuf,
}

/// Sink wrapper keeping the session snapshot current
pub(super) struct TrackingSink {
    inner: Arc<dyn ProgressSink>,
    state: Arc<Mutex<SessionSnapshot>>,
}

impl TrackingSink {
    pub(super) fn new(inner: Arc<dyn ProgressSink>, state: Arc<Mutex<SessionSnapshot>>) -> Self {
        Self { inner, state }
    }
}

impl ProgressSink for TrackingSink {
    fn emit(&self, event: InstallEvent) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match &event {
                InstallEvent::StageChanged(stage) => {
                    state.stage = *stage;
                    state.percent = 0.0;
                    state.message.clear();
                    if *stage == Stage::Done {
                        state.status = SessionStatus::Done;
                        state.percent = 100.0;
                    }
                }
                InstallEvent::Progress {
                    stage,
                    percent,
                    message,
                } => {
                    state.stage = *stage;
                    state.percent = *percent;
                    state.message.clone_from(message);
                }
                InstallEvent::Finished(_) => state.status = SessionStatus::Done,
                InstallEvent::Failed { stage, message, .. } => {
                    state.stage = *stage;
                    state.status = SessionStatus::Error;
                    state.message.clone_from(message);
                }
                InstallEvent::Cancelled { stage } => {
                    state.stage = *stage;
                    state.status = SessionStatus::Cancelled;
                }
            }
        }
        self.inner.emit(event);
    }
}

/// Control surface of one running session
pub struct SessionHandle {
    pub(super) control: SessionControl,
    pub(super) state: Arc<Mutex<SessionSnapshot>>,
    pub(super) worker: JoinHandle<Result<InstalledRecord>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.lock_state().session_id
    }

    pub fn content_id(&self) -> String {
        self.lock_state().content_id.clone()
    }

    /// Ask the session to pause at its next checkpoint
    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    /// Terminal: the session stops at its next checkpoint and reports
    /// `Cancelled` instead of finishing
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = self.lock_state().clone();
        if snapshot.status == SessionStatus::Running && self.control.is_paused() {
            snapshot.status = SessionStatus::Paused;
        }
        snapshot
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the worker ends and return its outcome
    pub fn wait(self) -> Result<InstalledRecord> {
        self.worker.join().unwrap_or_else(|_| {
            Err(Error::Configuration(
                "install worker panicked".to_string(),
            ))
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
