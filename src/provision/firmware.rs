// src/provision/firmware.rs

//! Firmware presence checks

use crate::config::PathSettings;
use crate::error::{Error, Result};
use crate::registry::PlatformRegistry;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Outcome of a successful firmware check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareStatus {
    /// Platform unknown to the registry or lists no firmware
    NotRequired,
    /// Every required file is in `dir`
    Present { dir: PathBuf },
}

/// Verifies required firmware files for a platform
pub struct FirmwareProvisioner<'a> {
    platforms: &'a PlatformRegistry,
    paths: &'a PathSettings,
}

impl<'a> FirmwareProvisioner<'a> {
    pub fn new(platforms: &'a PlatformRegistry, paths: &'a PathSettings) -> Self {
        Self { platforms, paths }
    }

    /// Check firmware for `platform_id`
    ///
    /// Safe to call repeatedly. Missing files fail with
    /// [`Error::FirmwareRequired`]; fetching firmware is left to the user.
    pub fn ensure(&self, platform_id: &str) -> Result<FirmwareStatus> {
        let Some(desc) = self.platforms.get(platform_id) else {
            debug!("No descriptor for {}, firmware not needed", platform_id);
            return Ok(FirmwareStatus::NotRequired);
        };
        let required = desc.required_firmware();
        if required.is_empty() {
            debug!("{} needs no firmware", desc.id);
            return Ok(FirmwareStatus::NotRequired);
        }

        let dir = self.paths.platform_firmware_dir(&desc.id);
        std::fs::create_dir_all(&dir)?;

        let missing = missing_files(&dir, required)?;
        if missing.is_empty() {
            info!("All {} firmware files present for {}", required.len(), desc.id);
            Ok(FirmwareStatus::Present { dir })
        } else {
            warn!(
                "{} of {} firmware files missing for {} in {}",
                missing.len(),
                required.len(),
                desc.id,
                dir.display()
            );
            Err(Error::FirmwareRequired {
                platform: desc.id.clone(),
                missing,
            })
        }
    }
}

/// Required names absent from `dir`, compared case-insensitively
fn missing_files(dir: &std::path::Path, required: &[String]) -> Result<Vec<String>> {
    let present: HashSet<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.file_name().to_string_lossy().to_lowercase())
        .collect();

    Ok(required
        .iter()
        .filter(|name| !present.contains(&name.to_lowercase()))
        .cloned()
        .collect())
}
