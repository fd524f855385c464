// src/acquire/engine.rs

//! Transfer engine abstraction
//!
//! The acquirer drives a transfer through these traits only, so the
//! peer-to-peer engine can be swapped (or faked in tests) without touching
//! the polling loop.

use super::source::SourceLocator;
use crate::config::TransferSettings;
use crate::error::Result;
use std::fmt;
use std::path::Path;

/// Engine-reported lifecycle of one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Queued,
    /// Magnet link resolving to full metadata
    FetchingMetadata,
    /// Verifying existing data on disk
    Checking,
    Downloading,
    Paused,
    /// All data present, uploading to peers
    Seeding,
    Complete,
    Failed(String),
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::FetchingMetadata => write!(f, "fetching metadata"),
            Self::Checking => write!(f, "checking"),
            Self::Downloading => write!(f, "downloading"),
            Self::Paused => write!(f, "paused"),
            Self::Seeding => write!(f, "seeding"),
            Self::Complete => write!(f, "complete"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Snapshot of one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStatus {
    pub state: TransferState,
    pub bytes_done: u64,
    /// Zero until the size is known
    pub bytes_total: u64,
    /// Engine-reported instantaneous rate, bytes/s
    pub download_rate: u64,
    pub peers: u32,
}

impl TransferStatus {
    /// Data complete (seeding counts as complete)
    pub fn is_finished(&self) -> bool {
        matches!(self.state, TransferState::Complete | TransferState::Seeding)
    }

    /// Raw completion fraction in percent, 0 while the size is unknown
    pub fn percent(&self) -> f32 {
        if self.bytes_total == 0 {
            return 0.0;
        }
        (self.bytes_done.min(self.bytes_total) as f64 * 100.0 / self.bytes_total as f64) as f32
    }
}

/// Parameters for a new transfer
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub source: &'a SourceLocator,
    pub destination: &'a Path,
    /// Trackers to announce to, in addition to any in the source
    pub trackers: &'a [String],
    /// Keep uploading after completion
    pub seed: bool,
}

/// A peer-to-peer (or direct) transfer engine
pub trait TransferEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Apply session-wide tuning: rate limits, connection caps, discovery
    fn configure(&self, settings: &TransferSettings) -> Result<()>;

    /// Start a transfer
    fn add(&self, request: &TransferRequest<'_>) -> Result<Box<dyn TransferHandle>>;
}

/// Control surface for one running transfer
pub trait TransferHandle: Send {
    fn id(&self) -> String;

    fn status(&mut self) -> Result<TransferStatus>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Drop the transfer from the engine; data already written stays
    fn remove(self: Box<Self>) -> Result<()>;
}
