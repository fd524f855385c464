// src/lib.rs

//! Gamestage: staged installer for emulated games
//!
//! Takes a content request (id, title, platform, emulator, source) through a
//! fixed pipeline and leaves behind a launchable entry.
//!
//! # Architecture
//!
//! - Registries: platform descriptors and launch profiles, loaded once and
//!   passed by reference
//! - Provisioning: emulator and firmware presence checks, never installs
//! - Configuration: preset trees or per-file handlers into the user config area
//! - Acquisition: drives an external transfer engine through a narrow trait
//! - Extraction: signature-checked classification and an ordered backend chain
//! - Launch: shell-script synthesis and a locked JSON ledger
//! - Orchestration: one worker thread per session with cooperative pause/cancel

pub mod acquire;
pub mod archive;
pub mod config;
pub mod configure;
pub mod control;
mod error;
pub mod fsutil;
pub mod install;
pub mod launch;
pub mod process;
pub mod progress;
pub mod provision;
pub mod registry;

pub use acquire::{Aria2Engine, ContentAcquirer, SourceLocator, TrackerList, TransferEngine};
pub use archive::{ArchiveFormat, ArchiveResolver, Classification, ExtractionBackend, classify};
pub use config::Settings;
pub use configure::{ConfigApplier, ConfigOutcome};
pub use control::SessionControl;
pub use error::{Error, ErrorKind, IntegrityWarning, Result};
pub use install::{
    ContentRequest, InstallOrchestrator, SessionHandle, SessionSnapshot, SessionStatus, Stage,
};
pub use launch::{
    InstallStatus, InstalledRecord, InstallerRunner, LaunchSynthesizer, Ledger, WineRunner,
};
pub use progress::{
    CallbackProgress, ChannelProgress, InstallEvent, LogProgress, ProgressSink, SilentProgress,
};
pub use provision::{EmulatorLocation, EmulatorProvisioner, FirmwareProvisioner, HostPackages};
pub use registry::{
    InstallMethod, LaunchProfile, LaunchProfileRegistry, PlatformDescriptor, PlatformRegistry,
};
