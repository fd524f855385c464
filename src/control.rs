// src/control.rs
//! Cooperative cancel/pause token
//!
//! One token is shared by reference between a session handle and every stage
//! working for that session. Stages poll it at their natural checkpoints
//! (stage boundaries, transfer polls, archive entries); nothing is ever
//! interrupted preemptively.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct Flags {
    cancelled: AtomicBool,
    paused: AtomicBool,
}

/// Shared cancel/pause flags for one install session
#[derive(Debug, Clone, Default)]
pub struct SessionControl {
    flags: Arc<Flags>,
}

impl SessionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Terminal: there is no way to un-cancel.
    pub fn cancel(&self) {
        self.flags.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.flags.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.flags.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` if cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Block while paused, waking every `poll` to re-check
    ///
    /// Returns `Err(Cancelled)` if the session is cancelled while waiting.
    pub fn wait_while_paused(&self, poll: Duration) -> Result<()> {
        while self.is_paused() {
            self.check()?;
            std::thread::sleep(poll);
        }
        self.check()
    }
}
