// src/config.rs
//! Settings for the install pipeline
//!
//! Loaded from a TOML file. Every section is optional; missing keys fall back
//! to defaults rooted under the user's data directory. Transfer tuning lives
//! here rather than in code so the same binary can be pointed at slow or fast
//! links.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming an explicit settings file
pub const CONFIG_ENV: &str = "GAMESTAGE_CONFIG";

/// File name looked up under the user config directory
pub const CONFIG_FILE_NAME: &str = "gamestage.toml";

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub transfer: TransferSettings,
    pub extraction: ExtractionSettings,
    pub installer: InstallerSettings,
}

impl Settings {
    /// Load settings from an explicit file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read settings {}: {e}", path.display()))
        })?;
        let settings: Settings = toml::from_str(&text)?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Locate and load settings
    ///
    /// Order: explicit path, `$GAMESTAGE_CONFIG`, the user config directory,
    /// then built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }
        if let Some(dir) = dirs::config_dir() {
            let candidate = dir.join("gamestage").join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Self::load(&candidate);
            }
        }
        debug!("No settings file found, using defaults");
        Ok(Self::default())
    }

    /// Defaults with every path rooted under `root` (used by tests and
    /// portable installs)
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            paths: PathSettings::rooted_at(root),
            ..Self::default()
        }
    }
}

/// Filesystem layout
///
/// In a settings file, omitted entries are derived from `data_dir` and
/// relative entries are anchored there.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawPathSettings")]
pub struct PathSettings {
    /// Root for every relative path below
    pub data_dir: PathBuf,
    /// One descriptor file per platform
    pub platforms_dir: PathBuf,
    /// Launch-profile table
    pub profiles_file: PathBuf,
    /// Installed-content ledger
    pub ledger_file: PathBuf,
    /// Extra trackers, one URI per line
    pub tracker_file: PathBuf,
    /// Bundled emulator binaries, one subdirectory per platform
    pub emulators_dir: PathBuf,
    /// Firmware files, one subdirectory per platform
    pub firmware_dir: PathBuf,
    /// User configuration area emulators read from
    pub config_dir: PathBuf,
    /// Shipped configuration presets
    pub presets_dir: PathBuf,
    /// Managed content tree, one subdirectory per content id
    pub content_dir: PathBuf,
    /// Generated launcher scripts
    pub scripts_dir: PathBuf,
    /// Where external installers drop their output
    pub installer_root: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gamestage")
}

impl Default for PathSettings {
    fn default() -> Self {
        Self::rooted_at(&default_data_dir())
    }
}

/// `[paths]` as written in a settings file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPathSettings {
    data_dir: Option<PathBuf>,
    platforms_dir: Option<PathBuf>,
    profiles_file: Option<PathBuf>,
    ledger_file: Option<PathBuf>,
    tracker_file: Option<PathBuf>,
    emulators_dir: Option<PathBuf>,
    firmware_dir: Option<PathBuf>,
    config_dir: Option<PathBuf>,
    presets_dir: Option<PathBuf>,
    content_dir: Option<PathBuf>,
    scripts_dir: Option<PathBuf>,
    installer_root: Option<PathBuf>,
}

impl From<RawPathSettings> for PathSettings {
    fn from(raw: RawPathSettings) -> Self {
        let root = raw.data_dir.unwrap_or_else(default_data_dir);
        let defaults = PathSettings::rooted_at(&root);
        let pick = |value: Option<PathBuf>, fallback: PathBuf| match value {
            Some(path) if path.is_relative() => root.join(path),
            Some(path) => path,
            None => fallback,
        };

        Self {
            platforms_dir: pick(raw.platforms_dir, defaults.platforms_dir),
            profiles_file: pick(raw.profiles_file, defaults.profiles_file),
            ledger_file: pick(raw.ledger_file, defaults.ledger_file),
            tracker_file: pick(raw.tracker_file, defaults.tracker_file),
            emulators_dir: pick(raw.emulators_dir, defaults.emulators_dir),
            firmware_dir: pick(raw.firmware_dir, defaults.firmware_dir),
            config_dir: pick(raw.config_dir, defaults.config_dir),
            presets_dir: pick(raw.presets_dir, defaults.presets_dir),
            content_dir: pick(raw.content_dir, defaults.content_dir),
            scripts_dir: pick(raw.scripts_dir, defaults.scripts_dir),
            installer_root: pick(raw.installer_root, defaults.installer_root),
            data_dir: defaults.data_dir,
        }
    }
}

impl PathSettings {
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            data_dir: root.to_path_buf(),
            platforms_dir: root.join("platforms"),
            profiles_file: root.join("launch_profiles.toml"),
            ledger_file: root.join("installed.json"),
            tracker_file: root.join("trackers.txt"),
            emulators_dir: root.join("emulators"),
            firmware_dir: root.join("firmware"),
            config_dir: root.join("config"),
            presets_dir: root.join("presets"),
            content_dir: root.join("content"),
            scripts_dir: root.join("launchers"),
            installer_root: root.join("prefix").join("drive_c").join("Games"),
        }
    }

    pub fn platform_emulator_dir(&self, platform_id: &str) -> PathBuf {
        self.emulators_dir.join(platform_id.to_lowercase())
    }

    pub fn platform_firmware_dir(&self, platform_id: &str) -> PathBuf {
        self.firmware_dir.join(platform_id.to_lowercase())
    }

    pub fn install_dir(&self, content_id: &str) -> PathBuf {
        self.content_dir.join(content_id)
    }

    pub fn launcher_path(&self, content_id: &str) -> PathBuf {
        self.scripts_dir.join(format!("{content_id}.sh"))
    }
}

/// Transfer session tuning
///
/// Zero rate limits mean unbounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub download_rate_limit: u64,
    pub upload_rate_limit: u64,
    pub connections_limit: u32,
    pub peers_per_transfer: u32,
    pub disk_cache_mb: u32,
    pub enable_dht: bool,
    pub enable_lpd: bool,
    pub enable_pex: bool,
    /// Keep seeding after completion
    pub seed_after_complete: bool,
    pub poll_interval_ms: u64,
    pub progress_interval_ms: u64,
    pub log_interval_ms: u64,
    /// Number of samples in the throughput window
    pub rate_window: usize,
    /// Minimum smoothed rate (bytes/s) before an ETA is reported
    pub eta_min_rate: u64,
    /// JSON-RPC endpoint of the transfer engine
    pub rpc_url: String,
    pub rpc_secret: Option<String>,
    /// Start the engine daemon ourselves instead of attaching to one
    pub spawn_engine: bool,
    pub engine_program: String,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            download_rate_limit: 0,
            upload_rate_limit: 0,
            connections_limit: 500,
            peers_per_transfer: 200,
            disk_cache_mb: 512,
            enable_dht: true,
            enable_lpd: true,
            enable_pex: true,
            seed_after_complete: false,
            poll_interval_ms: 100,
            progress_interval_ms: 200,
            log_interval_ms: 1500,
            rate_window: 8,
            eta_min_rate: 16 * 1024,
            rpc_url: "http://127.0.0.1:6800/jsonrpc".to_string(),
            rpc_secret: None,
            spawn_engine: true,
            engine_program: "aria2c".to_string(),
        }
    }
}

impl TransferSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.clamp(50, 200))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_millis(self.log_interval_ms)
    }
}

/// Archive extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub progress_interval_ms: u64,
    /// Poll interval while an external extraction tool runs
    pub tool_poll_ms: u64,
    pub unrar_program: String,
    pub unzip_program: String,
    pub tar_program: String,
    /// libarchive front end, the multi-format fallback for RAR and 7z
    pub bsdtar_program: String,
    /// Tried in order for the multi-format system utility
    pub sevenzip_programs: Vec<String>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            progress_interval_ms: 500,
            tool_poll_ms: 100,
            unrar_program: "unrar".to_string(),
            unzip_program: "unzip".to_string(),
            tar_program: "tar".to_string(),
            bsdtar_program: "bsdtar".to_string(),
            sevenzip_programs: vec!["7zz".to_string(), "7z".to_string(), "7za".to_string()],
        }
    }
}

impl ExtractionSettings {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn tool_poll(&self) -> Duration {
        Duration::from_millis(self.tool_poll_ms.max(10))
    }
}

/// Installer-driven packages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerSettings {
    /// Program that runs installers (the installer path is appended)
    pub runner: Vec<String>,
    pub poll_interval_ms: u64,
    /// Upper bound on the installer run; `None` waits until the user closes it
    pub timeout_secs: Option<u64>,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            runner: vec!["wine".to_string()],
            poll_interval_ms: 500,
            timeout_secs: None,
        }
    }
}

impl InstallerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
