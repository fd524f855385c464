// src/configure/mod.rs
//! Emulator configuration materialisation
//!
//! Two strategies, tried in order:
//! 1. **Preset tree**: the first existing preset directory from an ordered
//!    candidate list is copied recursively into the user config area,
//!    merging directories and overwriting files.
//! 2. **Single files**: only when no preset directory exists, preset files
//!    named after the emulator are copied one by one through a format
//!    handler that tags them with the installed content. A handler failure
//!    degrades to a verbatim copy.
//!
//! With `dry_run` set nothing is written; the intended actions are logged
//! and returned.

mod handlers;

pub use handlers::{
    default_handlers, ConfigHandler, ContentTag, IniHandler, JsonHandler, KeyValueHandler,
};

use crate::config::PathSettings;
use crate::error::Result;
use crate::fsutil::copy_tree;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What `apply` did (or would do, in dry-run mode)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOutcome {
    /// A preset directory was copied
    PresetTree {
        source: PathBuf,
        target: PathBuf,
        files: usize,
    },
    /// Individual preset files were written
    SingleFiles { files: Vec<PathBuf> },
    /// Nothing shipped for this emulator; emulator defaults apply
    NoPreset,
    /// Dry run: the actions that would have been taken
    DryRun { actions: Vec<String> },
}

/// Preset directory names for one emulator, most specific first
///
/// RPCS3 ships its configuration nested inside a portable install layout,
/// so it gets its own list.
pub fn preset_candidates(emulator_id: &str, platform_id: &str) -> Vec<String> {
    let emulator = emulator_id.to_lowercase();
    let platform = platform_id.to_lowercase();

    let mut candidates: Vec<String> = if emulator == "rpcs3" {
        vec![
            "rpcs3/config/rpcs3".to_string(),
            "rpcs3/.config/rpcs3".to_string(),
            "rpcs3/config".to_string(),
            "RPCS3/config".to_string(),
            "RPCS3".to_string(),
            "rpcs3".to_string(),
        ]
    } else {
        vec![
            emulator_id.to_string(),
            emulator.clone(),
            format!("{platform}/{emulator}"),
            platform,
        ]
    };

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}

/// Materialises emulator configuration into the user's config tree
pub struct ConfigApplier<'a> {
    paths: &'a PathSettings,
    handlers: Vec<Box<dyn ConfigHandler>>,
    dry_run: bool,
}

impl<'a> ConfigApplier<'a> {
    pub fn new(paths: &'a PathSettings) -> Self {
        Self {
            paths,
            handlers: default_handlers(),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Target directory inside the user config area
    pub fn target_dir(&self, emulator_id: &str) -> PathBuf {
        self.paths.config_dir.join(emulator_id.to_lowercase())
    }

    pub fn apply(&self, tag: &ContentTag<'_>, emulator_id: &str) -> Result<ConfigOutcome> {
        let target = self.target_dir(emulator_id);

        if let Some(source) = self.find_preset_dir(emulator_id, tag.platform) {
            if self.dry_run {
                let action = format!("copy {} -> {}", source.display(), target.display());
                info!("[dry-run] {}", action);
                return Ok(ConfigOutcome::DryRun {
                    actions: vec![action],
                });
            }
            fs::create_dir_all(&target)?;
            let files = copy_tree(&source, &target)?;
            info!(
                "Applied preset {} for {} ({} files)",
                source.display(),
                emulator_id,
                files
            );
            return Ok(ConfigOutcome::PresetTree {
                source,
                target,
                files,
            });
        }

        let presets = self.single_file_presets(emulator_id);
        if presets.is_empty() {
            info!("No configuration preset for {}, using emulator defaults", emulator_id);
            return Ok(ConfigOutcome::NoPreset);
        }

        if self.dry_run {
            let actions: Vec<String> = presets
                .iter()
                .map(|p| format!("write {} -> {}", p.display(), target.display()))
                .collect();
            for action in &actions {
                info!("[dry-run] {}", action);
            }
            return Ok(ConfigOutcome::DryRun { actions });
        }

        fs::create_dir_all(&target)?;
        let mut written = Vec::with_capacity(presets.len());
        for preset in presets {
            let Some(file_name) = preset.file_name() else {
                continue;
            };
            let dest = target.join(file_name);
            self.write_single(&preset, &dest, tag)?;
            written.push(dest);
        }
        Ok(ConfigOutcome::SingleFiles { files: written })
    }

    fn find_preset_dir(&self, emulator_id: &str, platform_id: &str) -> Option<PathBuf> {
        preset_candidates(emulator_id, platform_id)
            .into_iter()
            .map(|candidate| self.paths.presets_dir.join(candidate))
            .find(|dir| {
                let found = dir.is_dir();
                debug!("Preset candidate {}: {}", dir.display(), found);
                found
            })
    }

    /// Files `<presets>/<emulator>.<ext>` that some handler understands
    fn single_file_presets(&self, emulator_id: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.paths.presets_dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_stem()
                    .is_some_and(|stem| stem.to_string_lossy().eq_ignore_ascii_case(emulator_id))
            })
            .filter(|path| self.handler_for(path).is_some())
            .collect();
        files.sort();
        files
    }

    fn handler_for(&self, path: &Path) -> Option<&dyn ConfigHandler> {
        self.handlers
            .iter()
            .find(|h| h.handles(path))
            .map(|h| &**h)
    }

    fn write_single(&self, preset: &Path, dest: &Path, tag: &ContentTag<'_>) -> Result<()> {
        let enriched = self.handler_for(preset).and_then(|handler| {
            let original = match fs::read_to_string(preset) {
                Ok(text) => text,
                Err(e) => {
                    warn!("{} handler could not read {}: {}", handler.name(), preset.display(), e);
                    return None;
                }
            };
            match handler.enrich(&original, tag) {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(
                        "{} handler failed for {}, copying verbatim: {}",
                        handler.name(),
                        preset.display(),
                        e
                    );
                    None
                }
            }
        });

        match enriched {
            Some(text) => fs::write(dest, text)?,
            None => {
                fs::copy(preset, dest)?;
            }
        }
        debug!("Wrote {}", dest.display());
        Ok(())
    }
}
