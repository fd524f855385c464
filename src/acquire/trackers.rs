// src/acquire/trackers.rs

//! Tracker list file: one URI per line, `#` starts a comment

use crate::error::Result;
use std::fs;
use std::path::Path;
use tracing::info;

/// Written when the tracker file does not exist yet
pub const DEFAULT_TRACKERS: &[&str] = &[
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://open.demonii.com:1337/announce",
    "udp://open.stealth.si:80/announce",
    "udp://tracker.torrent.eu.org:451/announce",
    "udp://exodus.desync.com:6969/announce",
    "udp://tracker.openbittorrent.com:6969/announce",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerList {
    trackers: Vec<String>,
}

impl TrackerList {
    /// Read `path`, creating it with the default trackers if missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut text = String::from("# Extra trackers added to every transfer, one per line\n");
            for tracker in DEFAULT_TRACKERS {
                text.push_str(tracker);
                text.push('\n');
            }
            fs::write(path, text)?;
            info!("Created default tracker list at {}", path.display());
        }
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn parse(text: &str) -> Self {
        let mut trackers: Vec<String> = Vec::new();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if !line.is_empty() && !trackers.iter().any(|t| t == line) {
                trackers.push(line.to_string());
            }
        }
        Self { trackers }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.trackers
    }

    /// `first` followed by our trackers, without duplicates
    pub fn merged_with(&self, first: &[String]) -> Vec<String> {
        let mut merged: Vec<String> = Vec::with_capacity(first.len() + self.trackers.len());
        for tracker in first.iter().chain(self.trackers.iter()) {
            if !merged.contains(tracker) {
                merged.push(tracker.clone());
            }
        }
        merged
    }
}
