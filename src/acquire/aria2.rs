// src/acquire/aria2.rs

//! aria2 transfer engine over JSON-RPC
//!
//! Talks to an aria2 daemon's JSON-RPC endpoint. When no daemon answers and
//! `spawn_engine` is set, one is started with RPC enabled and the session
//! tuning flags, and is shut down again when the engine is dropped.
//!
//! Magnet links are resolved by aria2 in two steps: a metadata download
//! whose completion hands over (`followedBy`) to the real transfer. The
//! handle follows that hand-off transparently.

use super::engine::{TransferEngine, TransferHandle, TransferRequest, TransferState, TransferStatus};
use super::source::SourceLocator;
use crate::config::TransferSettings;
use crate::error::{Error, Result};
use base64::Engine as _;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Timeout for a single RPC round trip
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a freshly spawned daemon gets to open its RPC port
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Fields requested from `aria2.tellStatus`
const STATUS_KEYS: &[&str] = &[
    "status",
    "totalLength",
    "completedLength",
    "downloadSpeed",
    "connections",
    "seeder",
    "followedBy",
    "errorMessage",
    "verifyIntegrityPending",
    "bittorrent",
];

#[derive(Debug, Deserialize)]
struct RpcReply {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC 2.0 client
#[derive(Debug)]
struct RpcClient {
    client: Client,
    endpoint: String,
    secret: Option<String>,
    next_id: AtomicU64,
}

impl RpcClient {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let mut all = Vec::with_capacity(params.len() + 1);
        if let Some(secret) = &self.secret {
            all.push(json!(format!("token:{secret}")));
        }
        all.extend(params);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id.to_string(),
            "method": method,
            "params": all,
        });

        let reply: RpcReply = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .and_then(|response| response.json())
            .map_err(|e| Error::Transfer(format!("{method}: {e}")))?;

        if let Some(error) = reply.error {
            return Err(Error::Transfer(format!(
                "{method} failed ({}): {}",
                error.code, error.message
            )));
        }
        reply
            .result
            .ok_or_else(|| Error::Transfer(format!("{method} returned no result")))
    }
}

/// Transfer engine backed by an aria2 daemon
pub struct Aria2Engine {
    rpc: Arc<RpcClient>,
    tuning: Mutex<TransferSettings>,
    daemon: Mutex<Option<Child>>,
}

impl Aria2Engine {
    /// Attach to the configured RPC endpoint, spawning a daemon if needed
    pub fn connect(settings: &TransferSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create RPC client: {e}")))?;

        let rpc = Arc::new(RpcClient {
            client,
            endpoint: settings.rpc_url.clone(),
            secret: settings.rpc_secret.clone(),
            next_id: AtomicU64::new(1),
        });

        if let Ok(version) = rpc.call("aria2.getVersion", vec![]) {
            info!(
                "Attached to aria2 {} at {}",
                version["version"].as_str().unwrap_or("?"),
                settings.rpc_url
            );
            return Ok(Self {
                rpc,
                tuning: Mutex::new(settings.clone()),
                daemon: Mutex::new(None),
            });
        }

        if !settings.spawn_engine {
            return Err(Error::ResourceMissing(format!(
                "No aria2 RPC endpoint answering at {}",
                settings.rpc_url
            )));
        }

        let port = Url::parse(&settings.rpc_url)
            .ok()
            .and_then(|url| url.port_or_known_default())
            .unwrap_or(6800);
        let args = daemon_args(settings, port);
        debug!("Spawning {} {:?}", settings.engine_program, args);
        let child = Command::new(&settings.engine_program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::ResourceMissing(format!(
                    "Transfer engine '{}' could not be started: {e}",
                    settings.engine_program
                ))
            })?;

        let engine = Self {
            rpc,
            tuning: Mutex::new(settings.clone()),
            daemon: Mutex::new(Some(child)),
        };
        engine.wait_until_ready()?;
        info!("Started {} on port {}", settings.engine_program, port);
        Ok(engine)
    }

    fn wait_until_ready(&self) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.rpc.call("aria2.getVersion", vec![]).is_ok() {
                return Ok(());
            }
            if let Ok(mut guard) = self.daemon.lock()
                && let Some(child) = guard.as_mut()
                && let Ok(Some(status)) = child.try_wait()
            {
                return Err(Error::Transfer(format!(
                    "Transfer engine exited during startup ({status})"
                )));
            }
            if started.elapsed() >= STARTUP_TIMEOUT {
                return Err(Error::Transfer(
                    "Transfer engine did not open its RPC port in time".to_string(),
                ));
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    fn transfer_options(&self, request: &TransferRequest<'_>) -> Value {
        let peers = self
            .tuning
            .lock()
            .map(|t| t.peers_per_transfer.min(t.connections_limit))
            .unwrap_or(200);

        let mut options = Map::new();
        options.insert(
            "dir".into(),
            json!(request.destination.to_string_lossy()),
        );
        options.insert("bt-max-peers".into(), json!(peers.to_string()));
        if !request.trackers.is_empty() {
            options.insert("bt-tracker".into(), json!(request.trackers.join(",")));
        }
        if !request.seed {
            options.insert("seed-time".into(), json!("0"));
        }
        Value::Object(options)
    }
}

impl TransferEngine for Aria2Engine {
    fn name(&self) -> &str {
        "aria2"
    }

    fn configure(&self, settings: &TransferSettings) -> Result<()> {
        self.rpc.call(
            "aria2.changeGlobalOption",
            vec![json!({
                "max-overall-download-limit": settings.download_rate_limit.to_string(),
                "max-overall-upload-limit": settings.upload_rate_limit.to_string(),
            })],
        )?;
        if let Ok(mut tuning) = self.tuning.lock() {
            *tuning = settings.clone();
        }
        Ok(())
    }

    fn add(&self, request: &TransferRequest<'_>) -> Result<Box<dyn TransferHandle>> {
        let options = self.transfer_options(request);

        let gid = match request.source {
            SourceLocator::Magnet(magnet) => {
                self.rpc.call("aria2.addUri", vec![json!([magnet.uri]), options])?
            }
            SourceLocator::Url(url) => {
                self.rpc.call("aria2.addUri", vec![json!([url.as_str()]), options])?
            }
            SourceLocator::TorrentFile(path) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    Error::ResourceMissing(format!(
                        "Cannot read torrent file {}: {e}",
                        path.display()
                    ))
                })?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                self.rpc
                    .call("aria2.addTorrent", vec![json!(encoded), json!([]), options])?
            }
        };

        let gid = gid
            .as_str()
            .ok_or_else(|| Error::Transfer("aria2 returned a non-string gid".to_string()))?
            .to_string();
        info!("Added transfer {} for {}", gid, request.source);

        Ok(Box::new(Aria2Transfer {
            rpc: Arc::clone(&self.rpc),
            gid,
        }))
    }
}

impl Drop for Aria2Engine {
    fn drop(&mut self) {
        let Ok(mut guard) = self.daemon.lock() else {
            return;
        };
        if let Some(mut child) = guard.take() {
            if let Err(e) = self.rpc.call("aria2.shutdown", vec![]) {
                debug!("RPC shutdown failed, killing daemon: {}", e);
            }
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Command-line flags for a spawned daemon
fn daemon_args(settings: &TransferSettings, port: u16) -> Vec<String> {
    let mut args = vec![
        "--enable-rpc=true".to_string(),
        format!("--rpc-listen-port={port}"),
        "--rpc-listen-all=false".to_string(),
        format!("--max-overall-download-limit={}", settings.download_rate_limit),
        format!("--max-overall-upload-limit={}", settings.upload_rate_limit),
        format!(
            "--bt-max-peers={}",
            settings.peers_per_transfer.min(settings.connections_limit)
        ),
        format!("--enable-dht={}", settings.enable_dht),
        format!("--bt-enable-lpd={}", settings.enable_lpd),
        format!("--enable-peer-exchange={}", settings.enable_pex),
        format!("--disk-cache={}M", settings.disk_cache_mb),
        "--follow-torrent=mem".to_string(),
        "--bt-save-metadata=false".to_string(),
        "--quiet=true".to_string(),
    ];
    if let Some(secret) = &settings.rpc_secret {
        args.push(format!("--rpc-secret={secret}"));
    }
    if !settings.seed_after_complete {
        args.push("--seed-time=0".to_string());
    }
    args
}

/// One aria2 download, addressed by gid
pub struct Aria2Transfer {
    rpc: Arc<RpcClient>,
    gid: String,
}

impl TransferHandle for Aria2Transfer {
    fn id(&self) -> String {
        self.gid.clone()
    }

    fn status(&mut self) -> Result<TransferStatus> {
        let reply = self
            .rpc
            .call("aria2.tellStatus", vec![json!(self.gid), json!(STATUS_KEYS)])?;
        let (status, followed_by) = parse_status(&reply);
        if let Some(next) = followed_by {
            debug!("Transfer {} continued as {}", self.gid, next);
            self.gid = next;
        }
        Ok(status)
    }

    fn pause(&mut self) -> Result<()> {
        self.rpc.call("aria2.pause", vec![json!(self.gid)])?;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.rpc.call("aria2.unpause", vec![json!(self.gid)])?;
        Ok(())
    }

    fn remove(self: Box<Self>) -> Result<()> {
        // Completed downloads can't be removed, only their result purged
        if let Err(e) = self.rpc.call("aria2.forceRemove", vec![json!(self.gid)]) {
            debug!("forceRemove {}: {}", self.gid, e);
        }
        if let Err(e) = self
            .rpc
            .call("aria2.removeDownloadResult", vec![json!(self.gid)])
        {
            warn!("Could not purge transfer {}: {}", self.gid, e);
        }
        Ok(())
    }
}

fn number(value: &Value, key: &str) -> u64 {
    value[key]
        .as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| value[key].as_u64())
        .unwrap_or(0)
}

/// Map a `tellStatus` reply onto [`TransferStatus`], plus the gid that
/// continues this transfer when it completed a metadata step
fn parse_status(reply: &Value) -> (TransferStatus, Option<String>) {
    let total = number(reply, "totalLength");
    let done = number(reply, "completedLength");
    let followed_by = reply["followedBy"]
        .as_array()
        .and_then(|gids| gids.first())
        .and_then(Value::as_str)
        .map(str::to_string);

    let metadata_only = reply.get("bittorrent").is_some() && reply["bittorrent"].get("info").is_none();

    let state = match reply["status"].as_str().unwrap_or("") {
        "active" if reply["seeder"].as_str() == Some("true") => TransferState::Seeding,
        "active" if reply["verifyIntegrityPending"].as_str() == Some("true") => {
            TransferState::Checking
        }
        "active" if metadata_only || total == 0 => TransferState::FetchingMetadata,
        "active" => TransferState::Downloading,
        "waiting" => TransferState::Queued,
        "paused" => TransferState::Paused,
        "complete" if followed_by.is_some() => TransferState::FetchingMetadata,
        "complete" => TransferState::Complete,
        "error" => TransferState::Failed(
            reply["errorMessage"]
                .as_str()
                .unwrap_or("unknown engine error")
                .to_string(),
        ),
        "removed" => TransferState::Failed("transfer was removed".to_string()),
        other => TransferState::Failed(format!("unexpected engine status '{other}'")),
    };

    let (bytes_done, bytes_total) = if followed_by.is_some() {
        (0, 0)
    } else {
        (done, total)
    };

    (
        TransferStatus {
            state,
            bytes_done,
            bytes_total,
            download_rate: number(reply, "downloadSpeed"),
            peers: number(reply, "connections") as u32,
        },
        followed_by,
    )
}
