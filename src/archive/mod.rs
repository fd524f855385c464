// src/archive/mod.rs
//! Archive resolution: find downloaded archives and unpack them in place
//!
//! Every file under the install directory is classified. Archives are
//! extracted next to themselves through a format-ordered chain of backends:
//! the first backend to succeed wins, each failure is logged and the next
//! one tried, and when every backend has failed one aggregated
//! [`Error::Extraction`] wrapping the last failure is returned.
//!
//! Source archives are never modified or deleted. Files already written by
//! an interrupted or failed attempt stay on disk.

mod backends;
mod classify;
mod compression;

pub use backends::{
    BackendTier, ExtractReport, ExtractionBackend, ExtractionJob, NativeBackend, ToolBackend,
    default_backends,
};
pub use classify::{
    ArchiveFormat, Classification, classify, is_archive, is_secondary_volume, looks_like_tar,
};
pub use compression::StreamCodec;

use crate::config::ExtractionSettings;
use crate::control::SessionControl;
use crate::error::{Error, IntegrityWarning, Result};
use crate::fsutil::files_under;
use crate::progress::StageReporter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An archive found while scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCandidate {
    pub path: PathBuf,
    pub format: ArchiveFormat,
    pub warning: Option<IntegrityWarning>,
}

/// One archive that was unpacked
#[derive(Debug, Clone)]
pub struct ExtractedArchive {
    pub archive: PathBuf,
    pub format: ArchiveFormat,
    pub backend: String,
    pub warning: Option<IntegrityWarning>,
}

/// Result of resolving a directory
#[derive(Debug, Clone, Default)]
pub struct ResolveSummary {
    pub extracted: Vec<ExtractedArchive>,
    /// Files deliberately left packed (installer packages, disc images,
    /// later volumes of a split set)
    pub excluded: Vec<PathBuf>,
}

/// Classifies and unpacks archives with an ordered fallback chain
pub struct ArchiveResolver {
    backends: Vec<Box<dyn ExtractionBackend>>,
    settings: ExtractionSettings,
}

impl ArchiveResolver {
    /// Resolver with the default backend set
    pub fn new(settings: &ExtractionSettings) -> Self {
        Self::with_backends(settings, default_backends(settings))
    }

    /// Resolver with a custom backend set
    pub fn with_backends(
        settings: &ExtractionSettings,
        backends: Vec<Box<dyn ExtractionBackend>>,
    ) -> Self {
        Self {
            backends,
            settings: settings.clone(),
        }
    }

    /// Backends to try for `format`, in attempt order
    pub fn chain_for(&self, format: ArchiveFormat) -> Vec<&dyn ExtractionBackend> {
        BackendTier::order_for(format)
            .into_iter()
            .flat_map(|tier| {
                self.backends
                    .iter()
                    .filter(move |b| b.tier() == tier && b.supports(format))
                    .map(|b| &**b)
            })
            .collect()
    }

    /// Archives under `dir`, sorted by path, plus excluded files
    pub fn scan(&self, dir: &Path) -> (Vec<ArchiveCandidate>, Vec<PathBuf>) {
        let mut candidates = Vec::new();
        let mut excluded = Vec::new();
        for path in files_under(dir) {
            match classify(&path) {
                Ok(Classification::Archive { format, warning }) => {
                    candidates.push(ArchiveCandidate {
                        path,
                        format,
                        warning,
                    });
                }
                Ok(Classification::Excluded(reason)) => {
                    info!("Not extracting {} ({})", path.display(), reason);
                    excluded.push(path);
                }
                Ok(Classification::Plain) => {}
                Err(e) => warn!("Could not classify {}: {}", path.display(), e),
            }
        }
        (candidates, excluded)
    }

    /// Extract one archive into `destination`, walking the backend chain
    pub fn extract(&self, job: &ExtractionJob<'_>) -> Result<ExtractReport> {
        let chain = self.chain_for(job.format);
        if chain.is_empty() {
            return Err(Error::Extraction {
                archive: job.archive.to_path_buf(),
                attempts: 0,
                source: Box::new(Error::ResourceMissing(format!(
                    "No extraction backend handles {}",
                    job.format
                ))),
            });
        }

        let mut last_failure = None;
        for (index, backend) in chain.iter().enumerate() {
            job.control.check()?;
            info!(
                "Extracting {} with {} (attempt {}/{})",
                job.archive.display(),
                backend.name(),
                index + 1,
                chain.len()
            );
            match backend.attempt(job) {
                Ok(report) => {
                    if index > 0 {
                        info!(
                            "{} succeeded after {} failed attempt(s)",
                            backend.name(),
                            index
                        );
                    }
                    return Ok(report);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    let failure = match e {
                        backend_error @ Error::Backend { .. } => backend_error,
                        other => job.failure(backend.name(), other.to_string()),
                    };
                    warn!("{}", failure);
                    last_failure = Some(failure);
                }
            }
        }

        Err(Error::Extraction {
            archive: job.archive.to_path_buf(),
            attempts: chain.len(),
            source: Box::new(last_failure.unwrap_or_else(|| {
                Error::ResourceMissing("no extraction backend was attempted".to_string())
            })),
        })
    }

    /// Find every archive under `dir` and unpack each beside itself
    pub fn resolve(
        &self,
        dir: &Path,
        reporter: StageReporter<'_>,
        control: &SessionControl,
    ) -> Result<ResolveSummary> {
        let (candidates, excluded) = self.scan(dir);
        let mut summary = ResolveSummary {
            extracted: Vec::with_capacity(candidates.len()),
            excluded,
        };
        if candidates.is_empty() {
            debug!("No archives under {}", dir.display());
            return Ok(summary);
        }

        let count = candidates.len() as f32;
        for (index, candidate) in candidates.into_iter().enumerate() {
            control.check()?;
            if let Some(warning) = &candidate.warning {
                warn!("Integrity warning: {}", warning);
            }
            let destination = candidate.path.parent().unwrap_or(dir);
            let job = ExtractionJob::new(
                &candidate.path,
                candidate.format,
                destination,
                control,
                &self.settings,
                reporter,
            )
            .with_span(index as f32 * 100.0 / count, (index + 1) as f32 * 100.0 / count);

            let report = self.extract(&job)?;
            summary.extracted.push(ExtractedArchive {
                archive: candidate.path.clone(),
                format: candidate.format,
                backend: report.backend,
                warning: candidate.warning.clone(),
            });
        }

        info!(
            "Extracted {} archive(s) under {}",
            summary.extracted.len(),
            dir.display()
        );
        Ok(summary)
    }
}
