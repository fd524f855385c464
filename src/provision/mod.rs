// src/provision/mod.rs
//! Emulator and firmware provisioning
//!
//! Both checks are idempotent and read-only apart from creating the expected
//! per-platform directories, so a user can fix what is missing and rerun.

mod emulator;
mod firmware;

pub use emulator::{EmulatorLocation, EmulatorProvisioner, FlatpakHost, HostPackages};
pub use firmware::{FirmwareProvisioner, FirmwareStatus};
