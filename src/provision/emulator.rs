// src/provision/emulator.rs

//! Emulator presence checks
//!
//! The provisioner never installs anything: a missing emulator is reported as
//! a missing resource the user has to fix.

use crate::config::PathSettings;
use crate::error::{Error, Result};
use crate::registry::{InstallMethod, PlatformDescriptor, PlatformRegistry};
use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Host package manager for sandboxed emulator packages
pub trait HostPackages: Send + Sync {
    /// Whether the package manager exists on this host
    fn is_available(&self) -> bool;

    /// Application ids currently installed
    fn installed_apps(&self) -> Result<HashSet<String>>;
}

/// Flatpak, queried through its CLI
#[derive(Debug, Clone)]
pub struct FlatpakHost {
    program: String,
}

impl Default for FlatpakHost {
    fn default() -> Self {
        Self {
            program: "flatpak".to_string(),
        }
    }
}

impl HostPackages for FlatpakHost {
    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && which::which(&self.program).is_ok()
    }

    fn installed_apps(&self) -> Result<HashSet<String>> {
        let output = Command::new(&self.program)
            .args(["list", "--app", "--columns=application"])
            .output()
            .map_err(|e| Error::ResourceMissing(format!("Failed to query flatpak: {e}")))?;
        if !output.status.success() {
            return Err(Error::ResourceMissing(format!(
                "flatpak list exited with {}",
                output.status
            )));
        }
        Ok(parse_app_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_app_list(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("application id"))
        .map(str::to_string)
        .collect()
}

/// Where a usable emulator was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorLocation {
    /// Installed sandboxed application
    Flatpak { app_id: String },
    /// Executable in the bundled emulator directory
    Bundled { executable: PathBuf },
    /// Executable found on `PATH`
    System { executable: PathBuf },
}

impl EmulatorLocation {
    /// Command prefix that starts the emulator
    pub fn command(&self) -> Vec<String> {
        match self {
            Self::Flatpak { app_id } => vec!["flatpak".to_string(), "run".to_string(), app_id.clone()],
            Self::Bundled { executable } | Self::System { executable } => {
                vec![executable.to_string_lossy().into_owned()]
            }
        }
    }
}

/// Verifies that an emulator is available for a platform
pub struct EmulatorProvisioner<'a> {
    platforms: &'a PlatformRegistry,
    paths: &'a PathSettings,
    host: &'a dyn HostPackages,
}

impl<'a> EmulatorProvisioner<'a> {
    pub fn new(
        platforms: &'a PlatformRegistry,
        paths: &'a PathSettings,
        host: &'a dyn HostPackages,
    ) -> Self {
        Self {
            platforms,
            paths,
            host,
        }
    }

    /// Locate the emulator for `platform_id`
    pub fn ensure(&self, platform_id: &str) -> Result<EmulatorLocation> {
        let desc = self.platforms.require(platform_id)?;

        if desc.install_method == InstallMethod::Flatpak && self.host.is_available() {
            return self.check_flatpak(desc);
        }

        if let Some(location) = self.check_bundled(desc) {
            info!("Using bundled emulator for {}: {:?}", desc.id, location);
            return Ok(location);
        }

        if let Some(binary) = &desc.emulator_binary
            && let Ok(executable) = which::which(binary)
        {
            info!("Using system emulator for {}: {}", desc.id, executable.display());
            return Ok(EmulatorLocation::System { executable });
        }

        Err(Error::ResourceMissing(format!(
            "No emulator for {} found in {}{}",
            desc.name,
            self.paths.platform_emulator_dir(&desc.id).display(),
            desc.emulator_binary
                .as_deref()
                .map(|b| format!(" or on PATH ({b})"))
                .unwrap_or_default()
        )))
    }

    fn check_flatpak(&self, desc: &PlatformDescriptor) -> Result<EmulatorLocation> {
        let app_id = desc.flatpak_id.as_deref().ok_or_else(|| {
            Error::Configuration(format!("Platform {} is flatpak-based but has no flatpak_id", desc.id))
        })?;
        let installed = self.host.installed_apps()?;
        if installed.contains(app_id) {
            info!("Flatpak {} is installed for {}", app_id, desc.id);
            Ok(EmulatorLocation::Flatpak {
                app_id: app_id.to_string(),
            })
        } else {
            Err(Error::ResourceMissing(format!(
                "Flatpak {app_id} is not installed (flatpak install flathub {app_id})"
            )))
        }
    }

    fn check_bundled(&self, desc: &PlatformDescriptor) -> Option<EmulatorLocation> {
        let dir = self.paths.platform_emulator_dir(&desc.id);
        if !dir.is_dir() {
            debug!("No bundled emulator directory at {}", dir.display());
            return None;
        }
        find_executable(&dir, desc.emulator_binary.as_deref())
            .map(|executable| EmulatorLocation::Bundled { executable })
    }
}

/// Find `name` below `dir`, or the first executable file when no name is given
fn find_executable(dir: &Path, name: Option<&str>) -> Option<PathBuf> {
    WalkDir::new(dir)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| match name {
            Some(name) => entry.file_name().to_string_lossy() == name,
            None => entry
                .metadata()
                .map(|m| m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false),
        })
        .map(|entry| entry.into_path())
}
