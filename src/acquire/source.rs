// src/acquire/source.rs

//! Source locators: magnet links, `.torrent` descriptors and direct URIs

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// A parsed `magnet:` link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// The original link, passed to the engine untouched
    pub uri: String,
    /// BitTorrent info hash (hex lowercased, base32 uppercased)
    pub info_hash: String,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

/// Where content is fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    Magnet(MagnetLink),
    /// Local `.torrent` descriptor file
    TorrentFile(PathBuf),
    /// Direct http(s)/ftp URI
    Url(Url),
}

impl SourceLocator {
    /// Parse a user-supplied locator
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::Configuration("Empty source locator".to_string()));
        }

        if input.len() > 7
            && input
                .get(..7)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("magnet:"))
        {
            return parse_magnet(input).map(Self::Magnet);
        }

        if let Ok(url) = Url::parse(input) {
            return match url.scheme() {
                "http" | "https" | "ftp" => Ok(Self::Url(url)),
                "file" => url
                    .to_file_path()
                    .map(Self::TorrentFile)
                    .map_err(|_| Error::Configuration(format!("Invalid file URI: {input}"))),
                other => Err(Error::Configuration(format!(
                    "Unsupported source scheme '{other}'"
                ))),
            };
        }

        if input.to_lowercase().ends_with(".torrent") {
            return Ok(Self::TorrentFile(PathBuf::from(input)));
        }

        Err(Error::Configuration(format!(
            "Unrecognised source locator: {input}"
        )))
    }

    /// Trackers embedded in the locator itself
    pub fn trackers(&self) -> &[String] {
        match self {
            Self::Magnet(magnet) => &magnet.trackers,
            _ => &[],
        }
    }

    pub fn is_peer_to_peer(&self) -> bool {
        match self {
            Self::Magnet(_) | Self::TorrentFile(_) => true,
            Self::Url(url) => url.path().to_lowercase().ends_with(".torrent"),
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Magnet(magnet) => write!(f, "magnet:{}", magnet.info_hash),
            Self::TorrentFile(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

fn parse_magnet(input: &str) -> Result<MagnetLink> {
    let url = Url::parse(input)
        .map_err(|e| Error::Configuration(format!("Malformed magnet link: {e}")))?;

    let mut info_hash = None;
    let mut display_name = None;
    let mut trackers = Vec::new();

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "xt" => {
                if let Some(hash) = value.strip_prefix("urn:btih:") {
                    info_hash = Some(normalize_info_hash(hash)?);
                }
            }
            "dn" => display_name = Some(value.into_owned()),
            "tr" => {
                let tracker = value.into_owned();
                if !trackers.contains(&tracker) {
                    trackers.push(tracker);
                }
            }
            _ => {}
        }
    }

    let info_hash = info_hash.ok_or_else(|| {
        Error::Configuration("Magnet link has no urn:btih info hash".to_string())
    })?;

    Ok(MagnetLink {
        uri: input.to_string(),
        info_hash,
        display_name,
        trackers,
    })
}

fn normalize_info_hash(hash: &str) -> Result<String> {
    match hash.len() {
        40 if hash.chars().all(|c| c.is_ascii_hexdigit()) => Ok(hash.to_lowercase()),
        32 if hash
            .chars()
            .all(|c| c.is_ascii_alphabetic() || ('2'..='7').contains(&c)) =>
        {
            Ok(hash.to_uppercase())
        }
        _ => Err(Error::Configuration(format!("Invalid info hash '{hash}'"))),
    }
}
