// src/error.rs

//! Error types shared by every pipeline stage
//!
//! The variants follow the failure taxonomy of the install pipeline: registry
//! problems are configuration errors, absent emulators/firmware/files are
//! missing resources, transfer and extraction failures are reported per
//! attempt, and a user cancel is kept apart from genuine failures.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing registry, profile or settings data
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Emulator, firmware or file absent; the user has to remediate
    #[error("Missing resource: {0}")]
    ResourceMissing(String),

    /// Required firmware files are not present for a platform
    #[error("Firmware acquisition required for {platform}: missing {}", .missing.join(", "))]
    FirmwareRequired {
        platform: String,
        missing: Vec<String>,
    },

    /// Content acquisition failed
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// One extraction strategy failed
    #[error("{backend} could not extract {}: {message}", .archive.display())]
    Backend {
        backend: String,
        archive: PathBuf,
        message: String,
    },

    /// Every extraction strategy was exhausted
    #[error("Extraction of {} failed after {attempts} backend(s)", .archive.display())]
    Extraction {
        archive: PathBuf,
        attempts: usize,
        #[source]
        source: Box<Error>,
    },

    /// User-initiated cancellation
    #[error("Operation cancelled")]
    Cancelled,

    /// A session for this content id is already running
    #[error("An install session for '{0}' is already active")]
    SessionActive(String),

    /// Content id has no ledger record
    #[error("'{0}' is not installed")]
    NotInstalled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failure category, used when reporting a failed stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    ResourceMissing,
    Transfer,
    Extraction,
    Cancelled,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::ResourceMissing => "resource-missing",
            Self::Transfer => "transfer",
            Self::Extraction => "extraction",
            Self::Cancelled => "cancelled",
            Self::Io => "io",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::SessionActive(_) | Self::Toml(_) => {
                ErrorKind::Configuration
            }
            Self::ResourceMissing(_) | Self::FirmwareRequired { .. } | Self::NotInstalled(_) => {
                ErrorKind::ResourceMissing
            }
            Self::Transfer(_) => ErrorKind::Transfer,
            Self::Backend { .. } | Self::Extraction { .. } => ErrorKind::Extraction,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) | Self::Json(_) => ErrorKind::Io,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A best-effort archive pre-check that did not pass
///
/// Never fatal: extraction is still attempted after this is logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityWarning {
    pub archive: PathBuf,
    pub reason: String,
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.archive.display(), self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_extraction_wraps_last_failure() {
        let last = Error::Backend {
            backend: "7z".to_string(),
            archive: PathBuf::from("/tmp/a.rar"),
            message: "exit code 2".to_string(),
        };
        let err = Error::Extraction {
            archive: PathBuf::from("/tmp/a.rar"),
            attempts: 3,
            source: Box::new(last),
        };

        assert_eq!(err.kind(), ErrorKind::Extraction);
        let source = err.source().expect("source should be kept");
        assert!(source.to_string().contains("exit code 2"));
    }

    #[test]
    fn test_firmware_message_lists_files() {
        let err = Error::FirmwareRequired {
            platform: "PS2".to_string(),
            missing: vec!["scph10000.bin".to_string(), "rom1.bin".to_string()],
        };
        assert_eq!(err.kind(), ErrorKind::ResourceMissing);
        assert!(err.to_string().contains("scph10000.bin, rom1.bin"));
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Transfer("stalled".to_string()).is_cancelled());
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
    }
}
