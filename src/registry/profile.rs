// src/registry/profile.rs

//! Launch profiles: how to invoke an emulator for a piece of content

use super::platform::InstallMethod;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

/// Invocation template for one emulator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchProfile {
    /// Filled from the table key when loading
    #[serde(skip)]
    pub emulator_id: String,
    #[serde(default)]
    pub command_template: Option<String>,
    /// Content-type tag -> template override
    #[serde(default)]
    pub content_templates: BTreeMap<String, String>,
    /// Exported before the launch command, in key order
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Shell lines run after the emulator exits
    #[serde(default)]
    pub post_launch: Vec<String>,
    #[serde(default)]
    pub install_type: Option<InstallMethod>,
    /// Executable name when it differs from the platform's `emulator_binary`
    #[serde(default)]
    pub executable: Option<String>,
}

impl LaunchProfile {
    /// Template for a content type, falling back to the profile default
    pub fn template_for(&self, content_type: Option<&str>) -> Option<&str> {
        content_type
            .and_then(|tag| {
                self.content_templates
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(tag))
                    .map(|(_, template)| template.as_str())
            })
            .or(self.command_template.as_deref())
    }
}

/// Emulator id -> profile, case-insensitive
#[derive(Debug, Clone, Default)]
pub struct LaunchProfileRegistry {
    profiles: HashMap<String, LaunchProfile>,
}

impl LaunchProfileRegistry {
    /// Load the profile table file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Cannot read launch profiles {}: {e}",
                path.display()
            ))
        })?;
        let registry = Self::parse(&text).map_err(|e| match e {
            Error::Toml(inner) => Error::Configuration(format!(
                "Invalid launch profiles {}: {inner}",
                path.display()
            )),
            other => other,
        })?;
        info!("Loaded {} launch profiles from {}", registry.len(), path.display());
        Ok(registry)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let table: BTreeMap<String, LaunchProfile> = toml::from_str(text)?;
        Ok(Self::from_profiles(table.into_iter().map(|(id, mut profile)| {
            profile.emulator_id = id;
            profile
        })))
    }

    pub fn from_profiles(profiles: impl IntoIterator<Item = LaunchProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|profile| (profile.emulator_id.to_lowercase(), profile))
                .collect(),
        }
    }

    pub fn get(&self, emulator_id: &str) -> Option<&LaunchProfile> {
        self.profiles.get(&emulator_id.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILES: &str = r#"
[duckstation]
command_template = "{exe} -batch -fullscreen {content}"
post_launch = ["echo bye"]

[duckstation.content_templates]
m3u = "{exe} -batch {content}"

[duckstation.env]
QT_QPA_PLATFORM = "xcb"

[wine]
install_type = "installer"
"#;

    #[test]
    fn test_parse_fills_ids_and_maps() {
        let registry = LaunchProfileRegistry::parse(PROFILES).unwrap();
        assert_eq!(registry.len(), 2);

        let duck = registry.get("DuckStation").unwrap();
        assert_eq!(duck.emulator_id, "duckstation");
        assert_eq!(duck.env.get("QT_QPA_PLATFORM").map(String::as_str), Some("xcb"));
        assert_eq!(duck.post_launch, vec!["echo bye".to_string()]);

        let wine = registry.get("wine").unwrap();
        assert_eq!(wine.install_type, Some(InstallMethod::Installer));
        assert!(wine.command_template.is_none());
    }

    #[test]
    fn test_template_selection() {
        let registry = LaunchProfileRegistry::parse(PROFILES).unwrap();
        let duck = registry.get("duckstation").unwrap();

        assert_eq!(duck.template_for(Some("M3U")), Some("{exe} -batch {content}"));
        assert_eq!(
            duck.template_for(Some("chd")),
            Some("{exe} -batch -fullscreen {content}")
        );
        assert_eq!(duck.template_for(None), Some("{exe} -batch -fullscreen {content}"));
        assert_eq!(registry.get("wine").unwrap().template_for(None), None);
    }

    #[test]
    fn test_bad_file_is_configuration_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("profiles.toml");
        std::fs::write(&path, "[broken").unwrap();
        assert!(matches!(
            LaunchProfileRegistry::load(&path),
            Err(Error::Configuration(_))
        ));
    }
}
