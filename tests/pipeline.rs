// tests/pipeline.rs

//! End-to-end install sessions against fake transfer engines and
//! extraction backends.

mod common;

use common::{
    FakeEngine, PS1_MAGNET, RecordingSink, ScriptedBackend, Shared, TestEnv, fake_rar, tar_gz,
    wait_for,
};
use gamestage::archive::BackendTier;
use gamestage::provision::FirmwareStatus;
use gamestage::{
    ArchiveResolver, ContentRequest, Error, ErrorKind, FirmwareProvisioner, InstallEvent,
    PlatformRegistry, SessionControl, SessionStatus, SourceLocator, Stage, launch,
};
use std::fs;
use std::sync::Arc;

fn ps1_request(id: &str) -> ContentRequest {
    ContentRequest::new(
        id,
        "PS1 Demo",
        "PS1",
        "duckstation",
        SourceLocator::parse(PS1_MAGNET).unwrap(),
    )
}

fn ps1_tarball() -> Vec<u8> {
    tar_gz(&[
        ("Demo/demo.cue", b"FILE \"demo.bin\" BINARY\n"),
        ("Demo/demo.bin", &[0u8; 2048]),
    ])
}

#[test]
fn test_ps1_demo_reaches_done() {
    let env = TestEnv::new();
    let engine = FakeEngine::delivering("ps1_demo.tar.gz", ps1_tarball());
    let orchestrator = env.orchestrator(&engine);
    let sink = Arc::new(RecordingSink::default());

    let handle = orchestrator.start(ps1_request("ps1_demo"), sink.clone()).unwrap();
    let record = handle.wait().unwrap();

    assert_eq!(
        sink.stages(),
        vec![
            Stage::Init,
            Stage::EmulatorCheck,
            Stage::FirmwareCheck,
            Stage::ConfigApply,
            Stage::ContentAcquire,
            Stage::Finalize,
            Stage::Done,
        ]
    );
    assert!(sink.finished());

    let entries = env.ledger().list().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].emulator_id, "duckstation");
    assert_eq!(entries[0], record);

    let install_dir = env.paths().install_dir("ps1_demo");
    assert!(install_dir.join("Demo/demo.cue").is_file());
    // Source archive is left in place
    assert!(install_dir.join("ps1_demo.tar.gz").is_file());

    let script = fs::read_to_string(&record.launcher_path).unwrap();
    assert!(script.starts_with("#!/bin/sh\n"));
    assert!(script.contains("export DUCKSTATION_PORTABLE='1'"));
    assert!(script.contains(&format!(
        "-batch -- '{}'",
        install_dir.join("Demo/demo.cue").display()
    )));

    // The tracker file is merged into every transfer
    let trackers = engine.trackers_seen.lock().unwrap().clone();
    assert_eq!(trackers, vec!["udp://tracker.example.org:1337/announce".to_string()]);
    assert!(!orchestrator.is_active("ps1_demo"));
}

#[test]
fn test_acquire_progress_is_monotonic() {
    let env = TestEnv::new();
    let engine = FakeEngine::delivering("ps1_demo.tar.gz", ps1_tarball());
    let orchestrator = env.orchestrator(&engine);
    let sink = RecordingSink::default();

    orchestrator
        .run_blocking(&ps1_request("ps1_demo"), &sink, &SessionControl::new())
        .unwrap();

    let percents = sink.progress_for(Stage::ContentAcquire);
    assert!(percents.len() >= 2, "expected several progress events");
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert_eq!(percents.last().copied(), Some(100.0));
}

#[test]
fn test_rar_with_every_backend_failing() {
    let env = TestEnv::new();
    let engine = FakeEngine::delivering("game.rar", fake_rar());
    let backends = [
        ScriptedBackend::failing("dedicated", BackendTier::Dedicated),
        ScriptedBackend::failing("system", BackendTier::System),
        ScriptedBackend::failing("generic", BackendTier::Generic),
    ];
    let resolver = ArchiveResolver::with_backends(
        &env.settings.extraction,
        backends
            .iter()
            .map(|b| Box::new(Shared(b.clone())) as Box<dyn gamestage::ExtractionBackend>)
            .collect(),
    );
    let orchestrator = env.orchestrator(&engine).with_resolver(resolver);
    let sink = Arc::new(RecordingSink::default());

    let handle = orchestrator.start(ps1_request("rar_demo"), sink.clone()).unwrap();
    assert!(wait_for(|| handle.is_finished()));
    assert_eq!(handle.snapshot().status, SessionStatus::Error);

    let err = handle.wait().unwrap_err();
    match err {
        Error::Extraction {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 3);
            assert!(source.to_string().contains("generic"));
        }
        other => panic!("expected aggregated extraction error, got {other:?}"),
    }
    for backend in &backends {
        assert_eq!(backend.calls(), 1);
    }

    assert!(sink.events().iter().any(|event| matches!(
        event,
        InstallEvent::Failed {
            stage: Stage::Finalize,
            kind: ErrorKind::Extraction,
            ..
        }
    )));
    assert!(!sink.finished());
    assert!(env.ledger().list().unwrap().is_empty());
    assert!(!env.paths().launcher_path("rar_demo").exists());
    assert!(env.paths().install_dir("rar_demo").join("game.rar").is_file());
}

#[test]
fn test_last_backend_rescues_extraction() {
    let env = TestEnv::new();
    let engine = FakeEngine::delivering("game.rar", fake_rar());
    let dedicated = ScriptedBackend::failing("dedicated", BackendTier::Dedicated);
    let system = ScriptedBackend::failing("system", BackendTier::System);
    let generic =
        ScriptedBackend::writing("generic", BackendTier::Generic, "game.cue", b"FILE x BINARY\n");
    let resolver = ArchiveResolver::with_backends(
        &env.settings.extraction,
        vec![
            Box::new(Shared(generic.clone())),
            Box::new(Shared(system.clone())),
            Box::new(Shared(dedicated.clone())),
        ],
    );
    let orchestrator = env.orchestrator(&engine).with_resolver(resolver);

    let record = orchestrator
        .run_blocking(
            &ps1_request("rar_demo"),
            &RecordingSink::default(),
            &SessionControl::new(),
        )
        .unwrap();

    assert_eq!((dedicated.calls(), system.calls(), generic.calls()), (1, 1, 1));
    assert!(record.launcher_path.is_file());
    assert_eq!(env.ledger().list().unwrap().len(), 1);
}

#[test]
fn test_cancel_during_transfer_leaves_nothing_behind() {
    let env = TestEnv::new();
    let engine = FakeEngine::stalling();
    let orchestrator = env.orchestrator(&engine);
    let sink = Arc::new(RecordingSink::default());

    let handle = orchestrator.start(ps1_request("ps1_demo"), sink.clone()).unwrap();
    assert!(wait_for(|| {
        !sink.progress_for(Stage::ContentAcquire).is_empty()
    }));
    handle.cancel();

    let err = handle.wait().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(engine.removed(), 1);

    let events = sink.events();
    assert!(events.iter().any(|event| matches!(
        event,
        InstallEvent::Cancelled {
            stage: Stage::ContentAcquire
        }
    )));
    assert!(!sink.finished());
    assert!(env.ledger().get("ps1_demo").unwrap().is_none());
    assert!(!env.paths().launcher_path("ps1_demo").exists());
}

#[test]
fn test_second_session_for_same_id_is_refused() {
    let env = TestEnv::new();
    let engine = FakeEngine::stalling();
    let orchestrator = env.orchestrator(&engine);

    let first = orchestrator
        .start(ps1_request("ps1_demo"), Arc::new(RecordingSink::default()))
        .unwrap();
    assert!(orchestrator.is_active("ps1_demo"));

    let second = orchestrator.start(ps1_request("ps1_demo"), Arc::new(RecordingSink::default()));
    assert!(matches!(second, Err(Error::SessionActive(id)) if id == "ps1_demo"));

    first.cancel();
    assert!(first.wait().unwrap_err().is_cancelled());
    assert!(!orchestrator.is_active("ps1_demo"));
}

#[test]
fn test_pause_is_visible_and_resumable() {
    let env = TestEnv::new();
    let engine = FakeEngine::stalling();
    let orchestrator = env.orchestrator(&engine);
    let sink = Arc::new(RecordingSink::default());

    let handle = orchestrator.start(ps1_request("ps1_demo"), sink.clone()).unwrap();
    assert!(wait_for(|| handle.snapshot().stage == Stage::ContentAcquire));

    handle.pause();
    assert_eq!(handle.snapshot().status, SessionStatus::Paused);
    handle.resume();
    assert_eq!(handle.snapshot().status, SessionStatus::Running);

    handle.cancel();
    assert!(handle.wait().unwrap_err().is_cancelled());
}

#[test]
fn test_reinstall_and_uninstall_keep_one_record() {
    let env = TestEnv::new();
    let engine = FakeEngine::delivering("ps1_demo.tar.gz", ps1_tarball());
    let orchestrator = env.orchestrator(&engine);
    let sink = RecordingSink::default();

    for _ in 0..2 {
        orchestrator
            .run_blocking(&ps1_request("ps1_demo"), &sink, &SessionControl::new())
            .unwrap();
        assert_eq!(env.ledger().list().unwrap().len(), 1);
    }

    let removed = launch::uninstall(env.paths(), &env.ledger(), "ps1_demo").unwrap();
    assert!(!removed.install_path.exists());
    assert!(!removed.launcher_path.exists());
    assert!(env.ledger().list().unwrap().is_empty());
    assert!(matches!(
        launch::uninstall(env.paths(), &env.ledger(), "ps1_demo"),
        Err(Error::NotInstalled(_))
    ));
}

#[test]
fn test_psp_with_empty_firmware_list_needs_nothing() {
    let env = TestEnv::new();
    let registry = PlatformRegistry::load_dir(&env.paths().platforms_dir).unwrap();
    let provisioner = FirmwareProvisioner::new(&registry, env.paths());

    assert_eq!(provisioner.ensure("PSP").unwrap(), FirmwareStatus::NotRequired);
    assert_eq!(provisioner.ensure("psp").unwrap(), FirmwareStatus::NotRequired);
    assert!(!env.paths().platform_firmware_dir("PSP").exists());
}

#[test]
fn test_missing_firmware_stops_before_transfer() {
    let env = TestEnv::new();
    let engine = FakeEngine::delivering("game.chd", vec![1, 2, 3]);
    let orchestrator = env.orchestrator(&engine);
    let sink = RecordingSink::default();
    let request = ContentRequest::new(
        "ps2_demo",
        "PS2 Demo",
        "PS2",
        "pcsx2",
        SourceLocator::parse(PS1_MAGNET).unwrap(),
    );

    let err = orchestrator
        .run_blocking(&request, &sink, &SessionControl::new())
        .unwrap_err();
    match err {
        Error::FirmwareRequired { platform, missing } => {
            assert_eq!(platform, "PS2");
            assert_eq!(missing, vec!["scph39001.bin".to_string()]);
        }
        other => panic!("expected FirmwareRequired, got {other:?}"),
    }
    assert_eq!(engine.added(), 0);
    assert!(!sink.stages().contains(&Stage::ContentAcquire));
}

#[test]
fn test_missing_emulator_is_resource_error() {
    let env = TestEnv::new();
    let engine = FakeEngine::delivering("game.gba", vec![0; 16]);
    let orchestrator = env.orchestrator(&engine);
    let sink = RecordingSink::default();
    let request = ContentRequest::new(
        "gba_demo",
        "GBA Demo",
        "GBA",
        "mgba",
        SourceLocator::parse(PS1_MAGNET).unwrap(),
    );

    let err = orchestrator
        .run_blocking(&request, &sink, &SessionControl::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceMissing);
    assert!(sink.events().iter().any(|event| matches!(
        event,
        InstallEvent::Failed {
            stage: Stage::EmulatorCheck,
            ..
        }
    )));
    assert_eq!(engine.added(), 0);
}

#[test]
fn test_unknown_platform_is_configuration_error() {
    let env = TestEnv::new();
    let engine = FakeEngine::stalling();
    let orchestrator = env.orchestrator(&engine);
    let mut request = ps1_request("x");
    request.platform = "Dreamcast".to_string();

    let err = orchestrator
        .run_blocking(&request, &RecordingSink::default(), &SessionControl::new())
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_legacy_platform_alias_installs() {
    let env = TestEnv::new();
    let engine = FakeEngine::delivering("ps1_demo.tar.gz", ps1_tarball());
    let orchestrator = env.orchestrator(&engine);
    let mut request = ps1_request("psx_demo");
    request.platform = "psx".to_string();

    let record = orchestrator
        .run_blocking(&request, &RecordingSink::default(), &SessionControl::new())
        .unwrap();
    assert_eq!(record.platform, "PS1");
}

#[test]
fn test_config_dry_run_writes_no_configuration() {
    let env = TestEnv::new();
    let preset = env.paths().presets_dir.join("duckstation");
    fs::create_dir_all(&preset).unwrap();
    fs::write(preset.join("settings.ini"), "[Main]\nStartFullscreen = true\n").unwrap();
    let applied = env.paths().config_dir.join("duckstation/settings.ini");

    let engine = FakeEngine::delivering("ps1_demo.tar.gz", ps1_tarball());
    let orchestrator = env.orchestrator(&engine);
    let sink = RecordingSink::default();
    orchestrator
        .run_blocking(
            &ps1_request("ps1_demo").with_config_dry_run(true),
            &sink,
            &SessionControl::new(),
        )
        .unwrap();

    assert!(!applied.exists());
    let planned = sink.events().into_iter().any(|event| {
        matches!(
            event,
            InstallEvent::Progress { stage: Stage::ConfigApply, ref message, .. }
                if message.contains("planned action")
        )
    });
    assert!(planned);
    assert_eq!(env.ledger().list().unwrap().len(), 1);

    let engine = FakeEngine::delivering("ps1_demo.tar.gz", ps1_tarball());
    env.orchestrator(&engine)
        .run_blocking(
            &ps1_request("ps1_demo"),
            &RecordingSink::default(),
            &SessionControl::new(),
        )
        .unwrap();
    assert!(applied.is_file());
}
