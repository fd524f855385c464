// src/launch/installer.rs

//! Installer-driven content
//!
//! Some content ships as a Windows setup program. It is run through a
//! compatibility runner; whatever directory it creates under the install
//! root is then moved into the managed content tree and searched for the
//! game's executable.

use crate::config::InstallerSettings;
use crate::control::SessionControl;
use crate::error::{Error, Result};
use crate::fsutil::{files_under, modified_time, subdirectories};
use crate::process::run_supervised;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{info, warn};

/// Executable names that are never the game itself
const NON_ENTRY_MARKERS: &[&str] = &["unins", "setup", "redist", "crash", "vcredist", "dxsetup"];

/// Runs an external installer to completion
pub trait InstallerRunner: Send + Sync {
    /// Block until the installer exits or `control` is cancelled
    fn run(&self, installer: &Path, control: &SessionControl) -> Result<()>;
}

/// Runs installers through Wine (or any configured runner command)
#[derive(Debug, Clone)]
pub struct WineRunner {
    command: Vec<String>,
    poll: Duration,
    timeout: Option<Duration>,
}

impl WineRunner {
    pub fn new(settings: &InstallerSettings) -> Self {
        Self {
            command: settings.runner.clone(),
            poll: settings.poll_interval(),
            timeout: settings.timeout(),
        }
    }
}

impl InstallerRunner for WineRunner {
    fn run(&self, installer: &Path, control: &SessionControl) -> Result<()> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(Error::Configuration(
                "installer.runner must name a program".to_string(),
            ));
        };

        let mut command = Command::new(program);
        command.args(args).arg(installer);
        if let Some(dir) = installer.parent() {
            command.current_dir(dir);
        }

        info!(
            "Running installer {} (waiting for it to close)",
            installer.display()
        );
        let output = run_supervised(command, "installer", control, self.poll, self.timeout)?;
        if !output.success() {
            // Installers often exit non-zero when closed by the user; the
            // directory scan decides whether anything was installed
            warn!(
                "Installer exited with {}: {}",
                output.status,
                output.last_error_line().unwrap_or("")
            );
        }
        Ok(())
    }
}

/// The setup program inside a downloaded package
///
/// Prefers `setup*.exe` / `install*.exe`, else the first `.exe`.
pub fn find_installer(dir: &Path) -> Option<PathBuf> {
    let executables: Vec<PathBuf> = files_under(dir)
        .into_iter()
        .filter(|p| has_exe_extension(p))
        .collect();
    executables
        .iter()
        .find(|p| {
            let name = lower_name(p);
            name.starts_with("setup") || name.starts_with("install")
        })
        .or_else(|| executables.first())
        .cloned()
}

/// Directories under `root` right now
pub fn snapshot(root: &Path) -> Result<HashSet<PathBuf>> {
    Ok(subdirectories(root)?.into_iter().collect())
}

/// Most recently modified directory under `root` absent from `before`
pub fn newest_new_directory(root: &Path, before: &HashSet<PathBuf>) -> Result<Option<PathBuf>> {
    Ok(subdirectories(root)?
        .into_iter()
        .filter(|dir| !before.contains(dir))
        .max_by_key(|dir| modified_time(dir)))
}

/// The game executable inside an installed directory
///
/// `preferred` (a file name) wins when present. Otherwise helper programs
/// (uninstallers, redistributables, crash reporters) are skipped and the
/// largest remaining executable is taken.
pub fn find_entry_executable(dir: &Path, preferred: Option<&str>) -> Option<PathBuf> {
    let executables: Vec<PathBuf> = files_under(dir)
        .into_iter()
        .filter(|p| has_exe_extension(p))
        .collect();

    if let Some(preferred) = preferred
        && let Some(found) = executables
            .iter()
            .find(|p| lower_name(p) == preferred.to_lowercase())
    {
        return Some(found.clone());
    }

    executables
        .into_iter()
        .filter(|p| {
            let name = lower_name(p);
            !NON_ENTRY_MARKERS.iter().any(|marker| name.contains(marker))
        })
        .max_by_key(|p| {
            let size = std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);
            // Shallower paths win ties
            (size, std::cmp::Reverse(p.components().count()))
        })
}

fn has_exe_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
}

fn lower_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
