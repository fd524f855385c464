// src/launch/ledger.rs

//! Installed-content ledger
//!
//! A single JSON object keyed by content id. Every mutation reads the whole
//! file, changes it and writes it back through a temp file + rename, holding
//! an exclusive advisory lock on a sibling `.lock` file for the whole
//! read-modify-write so concurrent sessions cannot lose each other's updates.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// State of an installed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    Installed,
    /// Launcher script vanished since installation
    Missing,
}

/// One installed piece of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRecord {
    pub content_id: String,
    pub title: String,
    pub platform: String,
    pub install_path: PathBuf,
    pub launcher_path: PathBuf,
    pub emulator_id: String,
    pub installed_at: DateTime<Utc>,
    pub status: InstallStatus,
}

impl InstalledRecord {
    /// Status as seen on disk right now
    pub fn current_status(&self) -> InstallStatus {
        if self.launcher_path.is_file() {
            InstallStatus::Installed
        } else {
            InstallStatus::Missing
        }
    }
}

type Entries = BTreeMap<String, InstalledRecord>;

/// Lock held for one ledger transaction; released when dropped
struct LedgerLock {
    _file: File,
}

/// Handle on the ledger file
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "ledger".into());
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn lock(&self, exclusive: bool) -> Result<LedgerLock> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        if exclusive {
            file.lock_exclusive()?;
        } else {
            file.lock_shared()?;
        }
        Ok(LedgerLock { _file: file })
    }

    fn read(&self) -> Result<Entries> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Entries::new());
        }
        serde_json::from_str(&text).map_err(|e| {
            Error::Configuration(format!("Corrupt ledger {}: {e}", self.path.display()))
        })
    }

    fn write(&self, entries: &Entries) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp, entries)?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        debug!("Wrote {} ledger entries to {}", entries.len(), self.path.display());
        Ok(())
    }

    /// Read-modify-write under the exclusive lock
    fn update<T>(&self, change: impl FnOnce(&mut Entries) -> T) -> Result<T> {
        let _lock = self.lock(true)?;
        let mut entries = self.read()?;
        let result = change(&mut entries);
        self.write(&entries)?;
        Ok(result)
    }

    /// Store `record`, replacing any earlier record for the same id
    pub fn record(&self, record: InstalledRecord) -> Result<Option<InstalledRecord>> {
        let id = record.content_id.clone();
        let previous = self.update(|entries| entries.insert(id.clone(), record))?;
        info!(
            "Ledger: {} {}",
            if previous.is_some() { "replaced" } else { "recorded" },
            id
        );
        Ok(previous)
    }

    pub fn remove(&self, content_id: &str) -> Result<Option<InstalledRecord>> {
        let removed = self.update(|entries| entries.remove(content_id))?;
        if removed.is_some() {
            info!("Ledger: removed {}", content_id);
        }
        Ok(removed)
    }

    pub fn get(&self, content_id: &str) -> Result<Option<InstalledRecord>> {
        let _lock = self.lock(false)?;
        Ok(self.read()?.remove(content_id))
    }

    /// Every record, ordered by content id
    pub fn list(&self) -> Result<Vec<InstalledRecord>> {
        let _lock = self.lock(false)?;
        Ok(self.read()?.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(id: &str, emulator: &str) -> InstalledRecord {
        InstalledRecord {
            content_id: id.to_string(),
            title: format!("{id} title"),
            platform: "PS1".to_string(),
            install_path: PathBuf::from(format!("/games/{id}")),
            launcher_path: PathBuf::from(format!("/launchers/{id}.sh")),
            emulator_id: emulator.to_string(),
            installed_at: Utc::now(),
            status: InstallStatus::Installed,
        }
    }

    #[test]
    fn test_missing_ledger_is_empty() {
        let temp = TempDir::new().unwrap();
        let ledger = Ledger::new(temp.path().join("installed.json"));
        assert!(ledger.list().unwrap().is_empty());
        assert!(ledger.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_record_overwrites_same_id() {
        let temp = TempDir::new().unwrap();
        let ledger = Ledger::new(temp.path().join("installed.json"));

        assert!(ledger.record(record("ps1_demo", "duckstation")).unwrap().is_none());
        let previous = ledger.record(record("ps1_demo", "mednafen")).unwrap();
        assert_eq!(previous.unwrap().emulator_id, "duckstation");

        let all = ledger.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].emulator_id, "mednafen");
    }

    #[test]
    fn test_remove_and_on_disk_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("installed.json");
        let ledger = Ledger::new(&path);
        ledger.record(record("a", "x")).unwrap();
        ledger.record(record("b", "y")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["a"]["emulator_id"], "x");
        assert_eq!(raw["b"]["status"], "installed");

        assert!(ledger.remove("a").unwrap().is_some());
        assert!(ledger.remove("a").unwrap().is_none());
        assert_eq!(ledger.list().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_ledger_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("installed.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Ledger::new(&path).list(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(Ledger::new(temp.path().join("installed.json")));

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    ledger.record(record(&format!("game{i}"), "emu")).unwrap();
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(ledger.list().unwrap().len(), 8);
    }

    #[test]
    fn test_current_status() {
        let temp = TempDir::new().unwrap();
        let mut entry = record("a", "x");
        entry.launcher_path = temp.path().join("a.sh");
        assert_eq!(entry.current_status(), InstallStatus::Missing);
        fs::write(&entry.launcher_path, "#!/bin/sh\n").unwrap();
        assert_eq!(entry.current_status(), InstallStatus::Installed);
    }
}
