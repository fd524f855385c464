// tests/common/mod.rs

//! Shared fixtures for the pipeline integration tests.
//!
//! Every test gets its own data root with four platforms:
//! - `PS1`: bundled duckstation, no firmware
//! - `PSP`: bundled ppsspp, firmware flag set but an empty file list
//! - `PS2`: bundled pcsx2, one required BIOS file that is never present
//! - `GBA`: no emulator anywhere

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use gamestage::acquire::{
    TransferEngine, TransferHandle, TransferRequest, TransferState, TransferStatus,
};
use gamestage::archive::{ArchiveFormat, BackendTier, ExtractReport, ExtractionJob};
use gamestage::config::{PathSettings, TransferSettings};
use gamestage::{
    ExtractionBackend, HostPackages, InstallEvent, InstallOrchestrator, Ledger, ProgressSink,
    Result, Settings, Stage,
};
use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const PS1_MAGNET: &str =
    "magnet:?xt=urn:btih:c9e15763f722f23e98a29decdfae341b98d53056&dn=ps1_demo";

const PROFILES: &str = r#"
[duckstation]
command_template = "{exe} -batch -- {content}"
env = { DUCKSTATION_PORTABLE = "1" }

[ppsspp]

[pcsx2]
command_template = "{exe} -bios {firmware_dir} {content}"

[mgba]
"#;

const DESCRIPTORS: &[(&str, &str)] = &[
    (
        "ps1.toml",
        r#"
id = "PS1"
name = "PlayStation"
install_method = "bundled"
emulator_binary = "duckstation"
extensions = ["cue", "chd", "bin"]
launch_profile = "duckstation"
"#,
    ),
    (
        "psp.toml",
        r#"
id = "PSP"
name = "PlayStation Portable"
install_method = "bundled"
emulator_binary = "ppsspp"
extensions = ["cso", "iso"]
requires_firmware = true
firmware = []
launch_profile = "ppsspp"
"#,
    ),
    (
        "ps2.toml",
        r#"
id = "PS2"
name = "PlayStation 2"
install_method = "bundled"
emulator_binary = "pcsx2"
extensions = ["chd", "iso"]
requires_firmware = true
firmware = ["scph39001.bin"]
launch_profile = "pcsx2"
"#,
    ),
    (
        "gba.toml",
        r#"
id = "GBA"
name = "Game Boy Advance"
install_method = "bundled"
emulator_binary = "gamestage-test-no-such-emulator"
extensions = ["gba"]
launch_profile = "mgba"
"#,
    ),
];

/// Isolated data root with registries, tracker list and bundled emulators
pub struct TestEnv {
    pub temp: TempDir,
    pub settings: Settings,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let mut settings = Settings::rooted_at(temp.path());
        settings.transfer = TransferSettings {
            poll_interval_ms: 50,
            progress_interval_ms: 0,
            log_interval_ms: 0,
            ..TransferSettings::default()
        };
        let paths = &settings.paths;

        fs::create_dir_all(&paths.platforms_dir).unwrap();
        for (name, text) in DESCRIPTORS {
            fs::write(paths.platforms_dir.join(name), text).unwrap();
        }
        fs::write(&paths.profiles_file, PROFILES).unwrap();
        fs::write(&paths.tracker_file, "udp://tracker.example.org:1337/announce\n").unwrap();

        for (platform, binary) in [("PS1", "duckstation"), ("PSP", "ppsspp"), ("PS2", "pcsx2")] {
            let dir = paths.platform_emulator_dir(platform);
            fs::create_dir_all(&dir).unwrap();
            let exe = dir.join(binary);
            fs::write(&exe, "#!/bin/sh\nexit 0\n").unwrap();
            fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        }

        Self { temp, settings }
    }

    pub fn paths(&self) -> &PathSettings {
        &self.settings.paths
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(&self.settings.paths.ledger_file)
    }

    /// Orchestrator loaded from the on-disk registries, with no host
    /// package manager
    pub fn orchestrator(&self, engine: &Arc<FakeEngine>) -> InstallOrchestrator {
        InstallOrchestrator::from_settings(self.settings.clone(), engine.clone())
            .unwrap()
            .with_host(Arc::new(NoHostPackages))
    }
}

/// Host without a sandboxed package manager
pub struct NoHostPackages;

impl HostPackages for NoHostPackages {
    fn is_available(&self) -> bool {
        false
    }

    fn installed_apps(&self) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }
}

/// What the fake engine "downloads"
#[derive(Clone)]
pub enum Payload {
    /// Written into the destination, then reported complete after a few polls
    File { name: String, bytes: Vec<u8> },
    /// Stuck at 40% until removed
    Stall,
}

/// Transfer engine that writes a payload locally instead of downloading
pub struct FakeEngine {
    payload: Payload,
    steps: u64,
    pub added: AtomicUsize,
    pub removed: Arc<AtomicUsize>,
    pub trackers_seen: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn delivering(name: &str, bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(Self::new(Payload::File {
            name: name.to_string(),
            bytes,
        }))
    }

    pub fn stalling() -> Arc<Self> {
        Arc::new(Self::new(Payload::Stall))
    }

    fn new(payload: Payload) -> Self {
        Self {
            payload,
            steps: 5,
            added: AtomicUsize::new(0),
            removed: Arc::new(AtomicUsize::new(0)),
            trackers_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn added(&self) -> usize {
        self.added.load(Ordering::SeqCst)
    }

    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }
}

impl TransferEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn configure(&self, _settings: &TransferSettings) -> Result<()> {
        Ok(())
    }

    fn add(&self, request: &TransferRequest<'_>) -> Result<Box<dyn TransferHandle>> {
        self.added.fetch_add(1, Ordering::SeqCst);
        *self.trackers_seen.lock().unwrap() = request.trackers.to_vec();

        let total = match &self.payload {
            Payload::File { name, bytes } => {
                fs::write(request.destination.join(name), bytes)?;
                bytes.len().max(1) as u64
            }
            Payload::Stall => 1_000_000,
        };
        Ok(Box::new(FakeTransfer {
            stall: matches!(self.payload, Payload::Stall),
            total,
            done: 0,
            step: total.div_ceil(self.steps),
            removed: Arc::clone(&self.removed),
        }))
    }
}

pub struct FakeTransfer {
    stall: bool,
    total: u64,
    done: u64,
    step: u64,
    removed: Arc<AtomicUsize>,
}

impl TransferHandle for FakeTransfer {
    fn id(&self) -> String {
        "fake-1".to_string()
    }

    fn status(&mut self) -> Result<TransferStatus> {
        let state = if self.stall {
            self.done = self.total * 2 / 5;
            TransferState::Downloading
        } else {
            self.done = (self.done + self.step).min(self.total);
            if self.done == self.total {
                TransferState::Complete
            } else {
                TransferState::Downloading
            }
        };
        Ok(TransferStatus {
            state,
            bytes_done: self.done,
            bytes_total: self.total,
            download_rate: self.step * 10,
            peers: 3,
        })
    }

    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn remove(self: Box<Self>) -> Result<()> {
        self.removed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Extraction backend that fails or writes a fixed file, counting calls
pub struct ScriptedBackend {
    name: &'static str,
    tier: BackendTier,
    writes: Option<(&'static str, &'static [u8])>,
    pub calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn failing(name: &'static str, tier: BackendTier) -> Arc<Self> {
        Arc::new(Self {
            name,
            tier,
            writes: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn writing(
        name: &'static str,
        tier: BackendTier,
        file: &'static str,
        bytes: &'static [u8],
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            tier,
            writes: Some((file, bytes)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExtractionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn tier(&self) -> BackendTier {
        self.tier
    }

    fn supports(&self, _format: ArchiveFormat) -> bool {
        true
    }

    fn attempt(&self, job: &ExtractionJob<'_>) -> Result<ExtractReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.writes {
            Some((file, bytes)) => {
                fs::write(job.destination.join(file), bytes)?;
                Ok(ExtractReport {
                    backend: self.name.to_string(),
                    entries: Some(1),
                })
            }
            None => Err(job.failure(self.name, "simulated failure")),
        }
    }
}

/// Shares one scripted backend with the resolver while the test keeps a
/// handle for call counts
pub struct Shared(pub Arc<ScriptedBackend>);

impl ExtractionBackend for Shared {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn tier(&self) -> BackendTier {
        self.0.tier()
    }

    fn supports(&self, format: ArchiveFormat) -> bool {
        self.0.supports(format)
    }

    fn attempt(&self, job: &ExtractionJob<'_>) -> Result<ExtractReport> {
        self.0.attempt(job)
    }
}

/// Records every event for later inspection
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<InstallEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<InstallEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                InstallEvent::StageChanged(stage) => Some(stage),
                _ => None,
            })
            .collect()
    }

    pub fn progress_for(&self, wanted: Stage) -> Vec<f32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                InstallEvent::Progress { stage, percent, .. } if stage == wanted => Some(percent),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> bool {
        self.events()
            .iter()
            .any(|event| matches!(event, InstallEvent::Finished(_)))
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: InstallEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Gzipped tarball with the given entries
pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Bytes that carry a RAR 4 signature
pub fn fake_rar() -> Vec<u8> {
    let mut bytes = b"Rar!\x1a\x07\x00".to_vec();
    bytes.resize(512, 0);
    bytes
}

/// Poll `condition` until it holds or five seconds pass
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}
