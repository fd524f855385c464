// src/launch/mod.rs
//! Launch script synthesis and the installed-content ledger
//!
//! The synthesizer turns an extracted install directory into a runnable
//! entry: it picks the content file (or, for installer-driven platforms,
//! runs the installer and locates the game executable), renders the
//! emulator command from the launch profile, writes an executable shell
//! script and records the entry in the ledger. Nothing is recorded unless
//! every step succeeded.

mod installer;
mod ledger;
mod script;

pub use installer::{
    InstallerRunner, WineRunner, find_entry_executable, find_installer, newest_new_directory,
    snapshot,
};
pub use ledger::{InstallStatus, InstalledRecord, Ledger};
pub use script::{DEFAULT_TEMPLATE, TemplateValues, quote_command, render_command, script_text};

use crate::config::PathSettings;
use crate::control::SessionControl;
use crate::error::{Error, Result};
use crate::fsutil::{files_under, make_executable, move_dir};
use crate::progress::StageReporter;
use crate::provision::EmulatorLocation;
use crate::registry::{InstallMethod, LaunchProfile, LaunchProfileRegistry, PlatformDescriptor};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use tracing::{debug, info, warn};

/// Inputs for one synthesis
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub content_id: &'a str,
    pub title: &'a str,
    pub platform: &'a PlatformDescriptor,
    pub emulator_id: &'a str,
    pub content_type: Option<&'a str>,
    pub emulator: &'a EmulatorLocation,
}

/// Builds launch scripts and ledger records
pub struct LaunchSynthesizer<'a> {
    profiles: &'a LaunchProfileRegistry,
    paths: &'a PathSettings,
    installer: &'a dyn InstallerRunner,
    ledger: &'a Ledger,
}

impl<'a> LaunchSynthesizer<'a> {
    pub fn new(
        profiles: &'a LaunchProfileRegistry,
        paths: &'a PathSettings,
        installer: &'a dyn InstallerRunner,
        ledger: &'a Ledger,
    ) -> Self {
        Self {
            profiles,
            paths,
            installer,
            ledger,
        }
    }

    /// Profile for the request: the emulator's own, else the platform's
    fn profile_for(&self, request: &SynthesisRequest<'_>) -> Result<&'a LaunchProfile> {
        self.profiles
            .get(request.emulator_id)
            .or_else(|| self.profiles.get(&request.platform.launch_profile))
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "No launch profile for emulator '{}' or platform profile '{}'",
                    request.emulator_id, request.platform.launch_profile
                ))
            })
    }

    pub fn synthesize(
        &self,
        request: &SynthesisRequest<'_>,
        reporter: StageReporter<'_>,
        control: &SessionControl,
    ) -> Result<InstalledRecord> {
        let profile = self.profile_for(request)?;
        let install_dir = self.paths.install_dir(request.content_id);
        if !install_dir.is_dir() {
            return Err(Error::ResourceMissing(format!(
                "Install directory {} does not exist",
                install_dir.display()
            )));
        }

        let method = profile
            .install_type
            .unwrap_or(request.platform.install_method);
        let emulator_words = request.emulator.command();

        let (exe, content, working_dir) = if method == InstallMethod::Installer {
            let entry = self.run_installer(&install_dir, profile, reporter, control)?;
            let mut words = emulator_words;
            words.push(entry.to_string_lossy().into_owned());
            let working_dir = entry
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| install_dir.clone());
            (quote_command(&words), None, working_dir)
        } else {
            let content = find_content_file(&install_dir, request.platform)?;
            (quote_command(&emulator_words), Some(content), install_dir.clone())
        };
        control.check()?;

        let template = profile
            .template_for(request.content_type)
            .unwrap_or(DEFAULT_TEMPLATE);
        let config_dir = self.paths.config_dir.join(request.emulator_id.to_lowercase());
        let firmware_dir = self.paths.platform_firmware_dir(&request.platform.id);
        let command = render_command(
            template,
            &TemplateValues {
                exe: &exe,
                content: content.as_deref(),
                config_dir: &config_dir,
                firmware_dir: &firmware_dir,
                content_id: request.content_id,
            },
        );
        debug!("Launch command for {}: {}", request.content_id, command);

        let launcher = self.paths.launcher_path(request.content_id);
        if let Some(parent) = launcher.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(
            &launcher,
            script_text(profile, request.content_id, request.title, &working_dir, &command),
        )?;
        make_executable(&launcher)?;
        reporter.report(90.0, format!("Wrote launcher {}", launcher.display()));

        let record = InstalledRecord {
            content_id: request.content_id.to_string(),
            title: request.title.to_string(),
            platform: request.platform.id.clone(),
            install_path: install_dir,
            launcher_path: launcher,
            emulator_id: request.emulator_id.to_string(),
            installed_at: Utc::now(),
            status: InstallStatus::Installed,
        };
        self.ledger.record(record.clone())?;
        info!(
            "{} is ready: {}",
            request.content_id,
            record.launcher_path.display()
        );
        Ok(record)
    }

    /// Run the package's installer and return the game executable, moved
    /// into the managed install directory
    fn run_installer(
        &self,
        install_dir: &Path,
        profile: &LaunchProfile,
        reporter: StageReporter<'_>,
        control: &SessionControl,
    ) -> Result<PathBuf> {
        let root = &self.paths.installer_root;
        if !root.is_dir() {
            return Err(Error::ResourceMissing(format!(
                "Installer root {} does not exist",
                root.display()
            )));
        }
        let setup = find_installer(install_dir).ok_or_else(|| {
            Error::ResourceMissing(format!("No installer found in {}", install_dir.display()))
        })?;

        let before = snapshot(root)?;
        reporter.report(
            10.0,
            format!("Running installer {}, close it when finished", setup.display()),
        );
        self.installer.run(&setup, control)?;
        control.check()?;

        let created = newest_new_directory(root, &before)?.ok_or_else(|| {
            Error::ResourceMissing(format!(
                "Installer created no directory under {}",
                root.display()
            ))
        })?;
        let name = created.file_name().ok_or_else(|| {
            Error::ResourceMissing(format!("Unusable install directory {}", created.display()))
        })?;
        let target = install_dir.join(name);
        move_dir(&created, &target)?;
        info!("Moved {} to {}", created.display(), target.display());
        reporter.report(60.0, "Installer finished");

        find_entry_executable(&target, profile.executable.as_deref()).ok_or_else(|| {
            Error::ResourceMissing(format!("No game executable found in {}", target.display()))
        })
    }
}

/// Content file to hand to the emulator: the best-ranked extension wins,
/// then the shallowest path
pub fn find_content_file(install_dir: &Path, platform: &PlatformDescriptor) -> Result<PathBuf> {
    files_under(install_dir)
        .into_iter()
        .filter_map(|path| platform.extension_rank(&path).map(|rank| (rank, path)))
        .min_by_key(|(rank, path)| (*rank, path.components().count(), path.clone()))
        .map(|(_, path)| path)
        .ok_or_else(|| {
            Error::ResourceMissing(format!(
                "No {} content file ({}) in {}",
                platform.id,
                platform.extensions.join(", "),
                install_dir.display()
            ))
        })
}

/// Remove an installed entry: its directory, its launcher, then its record
///
/// Files already gone are tolerated. An install path outside the managed
/// content tree is left on disk.
pub fn uninstall(paths: &PathSettings, ledger: &Ledger, content_id: &str) -> Result<InstalledRecord> {
    let record = ledger
        .get(content_id)?
        .ok_or_else(|| Error::NotInstalled(content_id.to_string()))?;

    if record.install_path.starts_with(&paths.content_dir) {
        remove_tolerant(&record.install_path, true)?;
    } else {
        warn!(
            "Not deleting {}: outside {}",
            record.install_path.display(),
            paths.content_dir.display()
        );
    }
    remove_tolerant(&record.launcher_path, false)?;
    ledger.remove(content_id)?;
    info!("Uninstalled {}", content_id);
    Ok(record)
}

fn remove_tolerant(path: &Path, directory: bool) -> Result<()> {
    let result = if directory {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} already gone", path.display());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Run an installed entry's launcher and wait for it
pub fn launch(ledger: &Ledger, content_id: &str) -> Result<ExitStatus> {
    let record = ledger
        .get(content_id)?
        .ok_or_else(|| Error::NotInstalled(content_id.to_string()))?;
    if !record.launcher_path.is_file() {
        return Err(Error::ResourceMissing(format!(
            "Launcher {} is missing; reinstall {}",
            record.launcher_path.display(),
            content_id
        )));
    }
    info!("Launching {} via {}", content_id, record.launcher_path.display());
    Ok(Command::new(&record.launcher_path).status()?)
}
