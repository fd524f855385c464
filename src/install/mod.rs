// src/install/mod.rs
//! Install orchestration
//!
//! One [`ContentRequest`] runs through a fixed sequence of stages:
//!
//! ```text
//! Init -> EmulatorCheck -> FirmwareCheck -> ConfigApply -> ContentAcquire
//!      -> Finalize (extract + synthesize) -> Done
//! ```
//!
//! Each stage must succeed before the next begins. The first failure ends the
//! session in its error state with that stage's message; completed stages are
//! not rolled back and nothing is retried. Pause is checked at every stage
//! boundary and forwarded to the running transfer. Cancel is terminal and is
//! reported apart from failure; it suppresses the finished signal.
//!
//! Every session runs on its own worker thread. Sessions share only the
//! read-only registries and the ledger (which locks its own file).

mod session;

pub use session::{SessionHandle, SessionSnapshot, SessionStatus};

use crate::acquire::{ContentAcquirer, SourceLocator, TrackerList, TransferEngine};
use crate::archive::ArchiveResolver;
use crate::config::Settings;
use crate::configure::{ConfigApplier, ConfigOutcome, ContentTag};
use crate::control::SessionControl;
use crate::error::{Error, Result};
use crate::launch::{
    InstalledRecord, InstallerRunner, LaunchSynthesizer, Ledger, SynthesisRequest, WineRunner,
};
use crate::progress::{InstallEvent, ProgressSink, StageReporter};
use crate::provision::{
    EmulatorProvisioner, FirmwareProvisioner, FirmwareStatus, FlatpakHost, HostPackages,
};
use crate::registry::{LaunchProfileRegistry, PlatformRegistry};
use session::TrackingSink;
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Init,
    EmulatorCheck,
    FirmwareCheck,
    ConfigApply,
    ContentAcquire,
    /// Archive extraction followed by launch-script synthesis
    Finalize,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::EmulatorCheck => "emulator-check",
            Self::FirmwareCheck => "firmware-check",
            Self::ConfigApply => "config-apply",
            Self::ContentAcquire => "content-acquire",
            Self::Finalize => "finalize",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// A user's intent to install one package
#[derive(Debug, Clone)]
pub struct ContentRequest {
    /// Unique content id, also the install directory name
    pub id: String,
    pub title: String,
    pub platform: String,
    /// Preferred emulator; empty means the platform's launch profile
    pub emulator: String,
    pub source: SourceLocator,
    /// Selects a per-content-type launch template
    pub content_type: Option<String>,
    /// Plan the configuration step without writing anything
    pub config_dry_run: bool,
}

impl ContentRequest {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        platform: impl Into<String>,
        emulator: impl Into<String>,
        source: SourceLocator,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            platform: platform.into(),
            emulator: emulator.into(),
            source,
            content_type: None,
            config_dry_run: false,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_config_dry_run(mut self, dry_run: bool) -> Self {
        self.config_dry_run = dry_run;
        self
    }
}

/// Everything a worker needs; cheap to clone into a thread
#[derive(Clone)]
struct Pipeline {
    settings: Arc<Settings>,
    platforms: Arc<PlatformRegistry>,
    profiles: Arc<LaunchProfileRegistry>,
    trackers: Arc<TrackerList>,
    ledger: Ledger,
    engine: Arc<dyn TransferEngine>,
    host: Arc<dyn HostPackages>,
    resolver: Arc<ArchiveResolver>,
    installer: Arc<dyn InstallerRunner>,
}

/// Releases a content id from the active set when dropped
struct ActiveGuard {
    active: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Starts and tracks install sessions
pub struct InstallOrchestrator {
    pipeline: Pipeline,
    active: Arc<Mutex<HashSet<String>>>,
}

impl InstallOrchestrator {
    /// Orchestrator with host defaults: Flatpak for sandboxed emulators,
    /// Wine for installers, the default extraction backends and no extra
    /// trackers
    pub fn new(
        settings: Settings,
        platforms: PlatformRegistry,
        profiles: LaunchProfileRegistry,
        engine: Arc<dyn TransferEngine>,
    ) -> Self {
        let ledger = Ledger::new(&settings.paths.ledger_file);
        let resolver = ArchiveResolver::new(&settings.extraction);
        let installer = WineRunner::new(&settings.installer);
        Self {
            pipeline: Pipeline {
                settings: Arc::new(settings),
                platforms: Arc::new(platforms),
                profiles: Arc::new(profiles),
                trackers: Arc::new(TrackerList::default()),
                ledger,
                engine,
                host: Arc::new(FlatpakHost::default()),
                resolver: Arc::new(resolver),
                installer: Arc::new(installer),
            },
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Load both registries and the tracker list from the configured paths
    pub fn from_settings(settings: Settings, engine: Arc<dyn TransferEngine>) -> Result<Self> {
        let platforms = PlatformRegistry::load_dir(&settings.paths.platforms_dir)?;
        let profiles = LaunchProfileRegistry::load(&settings.paths.profiles_file)?;
        let trackers = TrackerList::load_or_create(&settings.paths.tracker_file)?;
        Ok(Self::new(settings, platforms, profiles, engine).with_trackers(trackers))
    }

    pub fn with_trackers(mut self, trackers: TrackerList) -> Self {
        self.pipeline.trackers = Arc::new(trackers);
        self
    }

    pub fn with_host(mut self, host: Arc<dyn HostPackages>) -> Self {
        self.pipeline.host = host;
        self
    }

    pub fn with_resolver(mut self, resolver: ArchiveResolver) -> Self {
        self.pipeline.resolver = Arc::new(resolver);
        self
    }

    pub fn with_installer(mut self, installer: Arc<dyn InstallerRunner>) -> Self {
        self.pipeline.installer = installer;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.pipeline.settings
    }

    pub fn platforms(&self) -> &PlatformRegistry {
        &self.pipeline.platforms
    }

    pub fn ledger(&self) -> &Ledger {
        &self.pipeline.ledger
    }

    /// Whether a session for `content_id` is running
    pub fn is_active(&self, content_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(content_id)
    }

    fn claim(&self, content_id: &str) -> Result<ActiveGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(content_id.to_string()) {
            return Err(Error::SessionActive(content_id.to_string()));
        }
        Ok(ActiveGuard {
            active: Arc::clone(&self.active),
            id: content_id.to_string(),
        })
    }

    /// Start a session on its own worker thread
    ///
    /// Fails with [`Error::SessionActive`] while another session for the
    /// same content id is running.
    pub fn start(
        &self,
        request: ContentRequest,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<SessionHandle> {
        let guard = self.claim(&request.id)?;
        let session_id = Uuid::new_v4();
        let control = SessionControl::new();
        let state = Arc::new(Mutex::new(SessionSnapshot {
            session_id,
            content_id: request.id.clone(),
            stage: Stage::Init,
            status: SessionStatus::Running,
            percent: 0.0,
            message: String::new(),
            install_dir: self.pipeline.settings.paths.install_dir(&request.id),
        }));

        let pipeline = self.pipeline.clone();
        let worker_control = control.clone();
        let tracking = TrackingSink::new(sink, Arc::clone(&state));
        let worker = std::thread::Builder::new()
            .name(format!("install-{}", request.id))
            .spawn(move || {
                let _guard = guard;
                pipeline.execute(&request, &tracking, &worker_control, session_id)
            })?;

        Ok(SessionHandle {
            control,
            state,
            worker,
        })
    }

    /// Run a session on the calling thread
    pub fn run_blocking(
        &self,
        request: &ContentRequest,
        sink: &dyn ProgressSink,
        control: &SessionControl,
    ) -> Result<InstalledRecord> {
        let _guard = self.claim(&request.id)?;
        self.pipeline
            .execute(request, sink, control, Uuid::new_v4())
    }
}

impl Pipeline {
    /// Run every stage and emit the terminal event
    fn execute(
        &self,
        request: &ContentRequest,
        sink: &dyn ProgressSink,
        control: &SessionControl,
        session_id: Uuid,
    ) -> Result<InstalledRecord> {
        info!(
            "Session {} started for {} ({} via {})",
            session_id, request.id, request.platform, request.source
        );
        let mut stage = Stage::Init;
        let result = self.run_stages(request, sink, control, &mut stage);

        match &result {
            Ok(record) => {
                sink.emit(InstallEvent::StageChanged(Stage::Done));
                sink.emit(InstallEvent::Finished(record.clone()));
                info!("Session {} finished: {} installed", session_id, request.id);
            }
            Err(e) if e.is_cancelled() => {
                warn!("Session {} cancelled during {}", session_id, stage);
                sink.emit(InstallEvent::Cancelled { stage });
            }
            Err(e) => {
                error!("Session {} failed during {}: {}", session_id, stage, e);
                sink.emit(InstallEvent::Failed {
                    stage,
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }
        result
    }

    /// Wait out a pause, then move to `next`
    fn enter(
        &self,
        next: Stage,
        stage: &mut Stage,
        sink: &dyn ProgressSink,
        control: &SessionControl,
    ) -> Result<()> {
        control.wait_while_paused(self.settings.transfer.poll_interval())?;
        *stage = next;
        sink.emit(InstallEvent::StageChanged(next));
        info!("Entering {}", next);
        Ok(())
    }

    fn run_stages(
        &self,
        request: &ContentRequest,
        sink: &dyn ProgressSink,
        control: &SessionControl,
        stage: &mut Stage,
    ) -> Result<InstalledRecord> {
        let paths = &self.settings.paths;

        self.enter(Stage::Init, stage, sink, control)?;
        validate_content_id(&request.id)?;
        let platform = self.platforms.require(&request.platform)?;
        let emulator_id = if request.emulator.trim().is_empty() {
            platform.launch_profile.as_str()
        } else {
            request.emulator.as_str()
        };
        let install_dir = paths.install_dir(&request.id);
        StageReporter::new(sink, Stage::Init).report(
            100.0,
            format!("{} for {} using {}", request.title, platform.name, emulator_id),
        );

        self.enter(Stage::EmulatorCheck, stage, sink, control)?;
        let emulator =
            EmulatorProvisioner::new(&self.platforms, paths, &*self.host).ensure(&platform.id)?;
        StageReporter::new(sink, Stage::EmulatorCheck)
            .report(100.0, format!("Emulator found: {}", emulator.command().join(" ")));

        self.enter(Stage::FirmwareCheck, stage, sink, control)?;
        let firmware = FirmwareProvisioner::new(&self.platforms, paths).ensure(&platform.id)?;
        let message = match firmware {
            FirmwareStatus::NotRequired => "No firmware required".to_string(),
            FirmwareStatus::Present { dir } => format!("Firmware present in {}", dir.display()),
        };
        StageReporter::new(sink, Stage::FirmwareCheck).report(100.0, message);

        self.enter(Stage::ConfigApply, stage, sink, control)?;
        let tag = ContentTag {
            content_id: &request.id,
            title: &request.title,
            platform: &platform.id,
        };
        let outcome = ConfigApplier::new(paths)
            .with_dry_run(request.config_dry_run)
            .apply(&tag, emulator_id)?;
        let message = match outcome {
            ConfigOutcome::PresetTree { files, .. } => format!("Applied preset ({files} files)"),
            ConfigOutcome::SingleFiles { files } => {
                format!("Wrote {} configuration file(s)", files.len())
            }
            ConfigOutcome::NoPreset => "No preset, emulator defaults apply".to_string(),
            ConfigOutcome::DryRun { actions } => format!("{} planned action(s)", actions.len()),
        };
        StageReporter::new(sink, Stage::ConfigApply).report(100.0, message);

        self.enter(Stage::ContentAcquire, stage, sink, control)?;
        ContentAcquirer::new(&*self.engine, &self.settings.transfer, &self.trackers).acquire(
            &request.source,
            &install_dir,
            StageReporter::new(sink, Stage::ContentAcquire),
            control,
        )?;

        self.enter(Stage::Finalize, stage, sink, control)?;
        let reporter = StageReporter::new(sink, Stage::Finalize);
        let resolved = self.resolver.resolve(&install_dir, reporter, control)?;
        if !resolved.extracted.is_empty() {
            reporter.report(
                100.0,
                format!("Extracted {} archive(s)", resolved.extracted.len()),
            );
        }
        control.check()?;

        LaunchSynthesizer::new(&self.profiles, paths, &*self.installer, &self.ledger).synthesize(
            &SynthesisRequest {
                content_id: &request.id,
                title: &request.title,
                platform,
                emulator_id,
                content_type: request.content_type.as_deref(),
                emulator: &emulator,
            },
            reporter,
            control,
        )
    }
}

/// Content ids name a directory and a script, so they must be one plain
/// path component without control characters
fn validate_content_id(id: &str) -> Result<()> {
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None)
            if !id.trim().is_empty() && !id.chars().any(char::is_control) =>
        {
            Ok(())
        }
        _ => Err(Error::Configuration(format!("Invalid content id '{id}'"))),
    }
}
