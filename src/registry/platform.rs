// src/registry/platform.rs

//! Platform descriptors and their registry
//!
//! One TOML file per platform lives in the platforms directory. The registry
//! is built once, is read-only afterwards and can be shared by reference
//! between concurrently running sessions.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Legacy platform ids still found in older requests and ledgers
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("psx", "ps1"),
    ("genesis", "megadrive"),
    ("gc", "gamecube"),
    ("windows", "pc"),
];

/// How the emulator for a platform is provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMethod {
    /// Sandboxed package from the host package manager
    Flatpak,
    /// Binary shipped in the bundled emulator directory
    #[default]
    Bundled,
    /// Content ships its own installer, run through a compatibility runner
    Installer,
}

impl fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flatpak => write!(f, "flatpak"),
            Self::Bundled => write!(f, "bundled"),
            Self::Installer => write!(f, "installer"),
        }
    }
}

/// Static capability record for one emulation target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub install_method: InstallMethod,
    /// Application id when `install_method = "flatpak"`
    #[serde(default)]
    pub flatpak_id: Option<String>,
    /// Executable name inside the bundled emulator directory
    #[serde(default)]
    pub emulator_binary: Option<String>,
    /// Content file extensions, most preferred first
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub requires_firmware: bool,
    #[serde(default)]
    pub firmware: Vec<String>,
    /// Key into the launch-profile registry
    pub launch_profile: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl PlatformDescriptor {
    /// Firmware files that must be present, empty when none are needed
    pub fn required_firmware(&self) -> &[String] {
        if self.requires_firmware {
            &self.firmware
        } else {
            &[]
        }
    }

    /// Priority of a file for this platform (lower is better)
    pub fn extension_rank(&self, path: &Path) -> Option<usize> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        self.extensions.iter().position(|ext| {
            let ext = ext.trim_start_matches('.').to_lowercase();
            name.ends_with(&format!(".{ext}"))
        })
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.extension_rank(path).is_some()
    }
}

/// Case-insensitive id -> descriptor map with alias resolution
#[derive(Debug, Clone, Default)]
pub struct PlatformRegistry {
    platforms: HashMap<String, PlatformDescriptor>,
    aliases: HashMap<String, String>,
}

impl PlatformRegistry {
    /// Load every `*.toml` descriptor in `dir`
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Configuration(format!(
                "Cannot read platform directory {}: {e}",
                dir.display()
            ))
        })?;

        let mut files: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        let mut descriptors = Vec::with_capacity(files.len());
        for path in files {
            let text = std::fs::read_to_string(&path)?;
            let descriptor: PlatformDescriptor = toml::from_str(&text).map_err(|e| {
                Error::Configuration(format!("Invalid descriptor {}: {e}", path.display()))
            })?;
            debug!("Loaded platform {} from {}", descriptor.id, path.display());
            descriptors.push(descriptor);
        }

        let registry = Self::from_descriptors(descriptors)?;
        info!("Loaded {} platform descriptors from {}", registry.len(), dir.display());
        Ok(registry)
    }

    /// Build a registry from in-memory descriptors
    pub fn from_descriptors(descriptors: Vec<PlatformDescriptor>) -> Result<Self> {
        let mut platforms = HashMap::new();
        let mut aliases: HashMap<String, String> = LEGACY_ALIASES
            .iter()
            .map(|(alias, id)| (alias.to_string(), id.to_string()))
            .collect();

        for descriptor in descriptors {
            let key = descriptor.id.to_lowercase();
            if key.is_empty() {
                return Err(Error::Configuration(
                    "Platform descriptor with empty id".to_string(),
                ));
            }
            for alias in &descriptor.aliases {
                aliases.insert(alias.to_lowercase(), key.clone());
            }
            if platforms.insert(key, descriptor).is_some() {
                return Err(Error::Configuration(
                    "Duplicate platform id in descriptor set".to_string(),
                ));
            }
        }

        aliases.retain(|alias, target| {
            let keep = platforms.contains_key(target) && !platforms.contains_key(alias);
            if !keep && platforms.contains_key(alias) {
                warn!("Alias '{}' shadows a real platform id, ignoring", alias);
            }
            keep
        });

        Ok(Self { platforms, aliases })
    }

    /// Look up a platform by id or alias, ignoring case
    pub fn get(&self, id: &str) -> Option<&PlatformDescriptor> {
        let key = id.to_lowercase();
        self.platforms.get(&key).or_else(|| {
            self.aliases
                .get(&key)
                .and_then(|target| self.platforms.get(target))
        })
    }

    /// Like [`get`](Self::get) but a missing platform is a configuration error
    pub fn require(&self, id: &str) -> Result<&PlatformDescriptor> {
        self.get(id)
            .ok_or_else(|| Error::Configuration(format!("Unknown platform '{id}'")))
    }

    /// Descriptors sorted by id
    pub fn all(&self) -> Vec<&PlatformDescriptor> {
        let mut all: Vec<_> = self.platforms.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}
