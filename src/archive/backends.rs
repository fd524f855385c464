// src/archive/backends.rs

//! Extraction backends
//!
//! Three tiers of strategy, each behind [`ExtractionBackend`]:
//! - **Dedicated** tools for one format family (`unrar`, `unzip`, `tar`)
//! - the **System** multi-format utility (`7zz`/`7z`/`7za`)
//! - **Generic** multi-format libraries: the in-process extractor (zip, and
//!   tar with gzip/bzip2/xz/zstd), then libarchive through `bsdtar`
//!
//! The in-process backend iterates entries, so it reports throttled progress
//! and checks for cancellation between entries. External tools only report
//! start and completion; cancelling kills the child process.

use super::classify::ArchiveFormat;
use super::compression::StreamCodec;
use crate::config::ExtractionSettings;
use crate::control::SessionControl;
use crate::error::{Error, Result};
use crate::process::run_supervised;
use crate::progress::{StageReporter, Throttle};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Which kind of strategy a backend is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendTier {
    Dedicated,
    System,
    Generic,
}

impl BackendTier {
    /// Tier order for a format: RAR goes dedicated-first, everything else
    /// starts with the in-process extractor
    pub fn order_for(format: ArchiveFormat) -> [BackendTier; 3] {
        match format {
            ArchiveFormat::Rar => [Self::Dedicated, Self::System, Self::Generic],
            _ => [Self::Generic, Self::System, Self::Dedicated],
        }
    }
}

/// Everything a backend needs for one attempt
pub struct ExtractionJob<'a> {
    pub archive: &'a Path,
    pub format: ArchiveFormat,
    pub destination: &'a Path,
    pub control: &'a SessionControl,
    pub settings: &'a ExtractionSettings,
    reporter: StageReporter<'a>,
    /// Slice of the stage's 0-100 range this archive occupies
    span: (f32, f32),
}

impl<'a> ExtractionJob<'a> {
    pub fn new(
        archive: &'a Path,
        format: ArchiveFormat,
        destination: &'a Path,
        control: &'a SessionControl,
        settings: &'a ExtractionSettings,
        reporter: StageReporter<'a>,
    ) -> Self {
        Self {
            archive,
            format,
            destination,
            control,
            settings,
            reporter,
            span: (0.0, 100.0),
        }
    }

    pub fn with_span(mut self, start: f32, end: f32) -> Self {
        self.span = (start, end);
        self
    }

    /// Report progress local to this archive (0-100)
    pub fn report(&self, percent: f32, message: impl Into<String>) {
        let (start, end) = self.span;
        self.reporter
            .report(start + (end - start) * percent.clamp(0.0, 100.0) / 100.0, message);
    }

    /// Backend error for this archive
    pub fn failure(&self, backend: &str, message: impl Into<String>) -> Error {
        Error::Backend {
            backend: backend.to_string(),
            archive: self.archive.to_path_buf(),
            message: message.into(),
        }
    }
}

/// What a successful attempt produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub backend: String,
    /// Entries written, when the backend can count them
    pub entries: Option<usize>,
}

/// One extraction strategy
pub trait ExtractionBackend: Send + Sync {
    fn name(&self) -> &str;

    fn tier(&self) -> BackendTier;

    fn supports(&self, format: ArchiveFormat) -> bool;

    /// Extract `job.archive` into `job.destination`
    ///
    /// Must leave the source archive untouched.
    fn attempt(&self, job: &ExtractionJob<'_>) -> Result<ExtractReport>;
}

/// The default backend set, in registration order
pub fn default_backends(settings: &ExtractionSettings) -> Vec<Box<dyn ExtractionBackend>> {
    vec![
        Box::new(ToolBackend::unrar(&settings.unrar_program)),
        Box::new(ToolBackend::unzip(&settings.unzip_program)),
        Box::new(ToolBackend::tar(&settings.tar_program)),
        Box::new(ToolBackend::sevenzip(&settings.sevenzip_programs)),
        Box::new(NativeBackend),
        Box::new(ToolBackend::bsdtar(&settings.bsdtar_program)),
    ]
}

/// Reader that counts bytes pulled through it
struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// In-process extractor for zip, tarballs and single compressed streams
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl NativeBackend {
    const NAME: &'static str = "native";

    fn extract_tar(
        &self,
        job: &ExtractionJob<'_>,
        reader: Box<dyn Read + '_>,
        consumed: &AtomicU64,
        size: u64,
    ) -> Result<usize> {
        let mut archive = tar::Archive::new(reader);
        archive.set_overwrite(true);
        archive.set_preserve_mtime(true);

        let mut gate = Throttle::new(job.settings.progress_interval());
        let mut entries = 0usize;
        for entry in archive.entries()? {
            job.control.check()?;
            let mut entry = entry?;
            let entry_path = entry.path()?.into_owned();
            if !entry.unpack_in(job.destination)? {
                warn!("Skipped entry outside destination: {}", entry_path.display());
                continue;
            }
            entries += 1;
            if gate.ready() {
                let read = consumed.load(Ordering::Relaxed);
                job.report(
                    read as f32 * 100.0 / size as f32,
                    format!("Extracted {entries} entries"),
                );
            }
        }
        Ok(entries)
    }

    fn extract_zip(&self, job: &ExtractionJob<'_>, size: u64) -> Result<usize> {
        let file = BufReader::new(File::open(job.archive)?);
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| job.failure(Self::NAME, format!("Unreadable zip: {e}")))?;

        let mut gate = Throttle::new(job.settings.progress_interval());
        let mut consumed = 0u64;
        let mut entries = 0usize;
        for index in 0..archive.len() {
            job.control.check()?;
            let mut entry = archive
                .by_index(index)
                .map_err(|e| job.failure(Self::NAME, format!("Bad zip entry {index}: {e}")))?;
            consumed += entry.compressed_size();
            let Some(relative) = entry.enclosed_name() else {
                warn!("Skipped entry outside destination: {}", entry.name());
                continue;
            };

            let target = job.destination.join(relative);
            if entry.is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut output = File::create(&target)?;
                std::io::copy(&mut entry, &mut output)?;
                if let Some(mode) = entry.unix_mode() {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o777))?;
                }
            }

            entries += 1;
            if gate.ready() {
                job.report(
                    consumed as f32 * 100.0 / size as f32,
                    format!("Extracted {entries} entries"),
                );
            }
        }
        Ok(entries)
    }

    fn extract_stream(
        &self,
        job: &ExtractionJob<'_>,
        mut reader: Box<dyn Read + '_>,
        consumed: &AtomicU64,
        size: u64,
    ) -> Result<usize> {
        let output = job.destination.join(stream_output_name(job.archive));
        let mut file = File::create(&output)?;
        let mut gate = Throttle::new(job.settings.progress_interval());
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            job.control.check()?;
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])?;
            if gate.ready() {
                let read = consumed.load(Ordering::Relaxed);
                job.report(read as f32 * 100.0 / size as f32, format!("Decompressing to {}", output.display()));
            }
        }
        file.flush()?;
        Ok(1)
    }
}

impl ExtractionBackend for NativeBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn tier(&self) -> BackendTier {
        BackendTier::Generic
    }

    fn supports(&self, format: ArchiveFormat) -> bool {
        format == ArchiveFormat::Zip || StreamCodec::for_format(format).is_some()
    }

    fn attempt(&self, job: &ExtractionJob<'_>) -> Result<ExtractReport> {
        if !self.supports(job.format) {
            return Err(job.failure(Self::NAME, format!("{} is not supported", job.format)));
        }
        let size = fs::metadata(job.archive)?.len().max(1);
        fs::create_dir_all(job.destination)?;
        job.report(0.0, format!("Extracting {}", display_name(job.archive)));

        let entries = match StreamCodec::for_format(job.format) {
            None => {
                debug!("Native zip extraction of {}", job.archive.display());
                self.extract_zip(job, size)?
            }
            Some(codec) => {
                let consumed = Arc::new(AtomicU64::new(0));
                let reader = CountingReader {
                    inner: BufReader::new(File::open(job.archive)?),
                    count: Arc::clone(&consumed),
                };
                let decoder = codec.decoder(reader)?;
                debug!("Native extraction of {} ({} codec)", job.archive.display(), codec);
                if job.format.is_tarball() {
                    self.extract_tar(job, decoder, &consumed, size)?
                } else {
                    self.extract_stream(job, decoder, &consumed, size)?
                }
            }
        };
        job.report(100.0, format!("Extracted {}", display_name(job.archive)));

        Ok(ExtractReport {
            backend: Self::NAME.to_string(),
            entries: Some(entries),
        })
    }
}

/// Output file name for a single compressed stream: the archive name minus
/// its compression suffix
fn stream_output_name(archive: &Path) -> PathBuf {
    match (archive.file_stem(), archive.extension()) {
        (Some(stem), Some(_)) => PathBuf::from(stem),
        _ => PathBuf::from(format!("{}.out", display_name(archive))),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

type ArgBuilder = fn(&Path, &Path) -> Vec<OsString>;

/// Extraction through an external program
pub struct ToolBackend {
    name: &'static str,
    tier: BackendTier,
    /// Candidate executables, first found on `PATH` wins
    programs: Vec<String>,
    formats: &'static [ArchiveFormat],
    args: ArgBuilder,
}

impl ToolBackend {
    pub fn unrar(program: &str) -> Self {
        Self {
            name: "unrar",
            tier: BackendTier::Dedicated,
            programs: vec![program.to_string()],
            formats: &[ArchiveFormat::Rar],
            args: |archive, dest| {
                // Trailing separator marks the destination as a directory
                let mut dest = dest.as_os_str().to_os_string();
                dest.push("/");
                vec!["x".into(), "-o+".into(), "-y".into(), "-idq".into(), archive.into(), dest]
            },
        }
    }

    pub fn unzip(program: &str) -> Self {
        Self {
            name: "unzip",
            tier: BackendTier::Dedicated,
            programs: vec![program.to_string()],
            formats: &[ArchiveFormat::Zip],
            args: |archive, dest| {
                vec!["-o".into(), "-q".into(), archive.into(), "-d".into(), dest.into()]
            },
        }
    }

    pub fn tar(program: &str) -> Self {
        Self {
            name: "tar",
            tier: BackendTier::Dedicated,
            programs: vec![program.to_string()],
            formats: &[
                ArchiveFormat::Tar,
                ArchiveFormat::TarGz,
                ArchiveFormat::TarBz2,
                ArchiveFormat::TarXz,
                ArchiveFormat::TarZst,
            ],
            args: |archive, dest| vec!["-xf".into(), archive.into(), "-C".into(), dest.into()],
        }
    }

    pub fn sevenzip(programs: &[String]) -> Self {
        Self {
            name: "7-zip",
            tier: BackendTier::System,
            programs: programs.to_vec(),
            formats: &[
                ArchiveFormat::Zip,
                ArchiveFormat::SevenZip,
                ArchiveFormat::Rar,
                ArchiveFormat::Tar,
                ArchiveFormat::Gzip,
                ArchiveFormat::Bzip2,
                ArchiveFormat::Xz,
            ],
            args: |archive, dest| {
                let mut output = OsString::from("-o");
                output.push(dest.as_os_str());
                vec!["x".into(), "-y".into(), "-bd".into(), output, archive.into()]
            },
        }
    }

    /// libarchive's command-line front end
    pub fn bsdtar(program: &str) -> Self {
        Self {
            name: "libarchive",
            tier: BackendTier::Generic,
            programs: vec![program.to_string()],
            formats: &[
                ArchiveFormat::Zip,
                ArchiveFormat::SevenZip,
                ArchiveFormat::Rar,
                ArchiveFormat::Tar,
                ArchiveFormat::TarGz,
                ArchiveFormat::TarBz2,
                ArchiveFormat::TarXz,
                ArchiveFormat::TarZst,
            ],
            args: |archive, dest| vec!["-xf".into(), archive.into(), "-C".into(), dest.into()],
        }
    }

    /// First configured program present on this host
    fn locate(&self) -> Option<PathBuf> {
        self.programs
            .iter()
            .find_map(|program| which::which(program).ok())
    }
}

impl ExtractionBackend for ToolBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn tier(&self) -> BackendTier {
        self.tier
    }

    fn supports(&self, format: ArchiveFormat) -> bool {
        self.formats.contains(&format)
    }

    fn attempt(&self, job: &ExtractionJob<'_>) -> Result<ExtractReport> {
        let program = self.locate().ok_or_else(|| {
            job.failure(
                self.name,
                format!("none of [{}] found on PATH", self.programs.join(", ")),
            )
        })?;

        fs::create_dir_all(job.destination)?;
        job.report(0.0, format!("Extracting with {}", self.name));

        let mut command = Command::new(&program);
        command.args((self.args)(job.archive, job.destination));
        let output = run_supervised(
            command,
            self.name,
            job.control,
            job.settings.tool_poll(),
            None,
        )?;

        if !output.success() {
            let detail = output
                .last_error_line()
                .map(str::to_string)
                .unwrap_or_else(|| output.status.to_string());
            return Err(job.failure(self.name, detail));
        }

        job.report(100.0, format!("Extracted with {}", self.name));
        Ok(ExtractReport {
            backend: self.name.to_string(),
            entries: None,
        })
    }
}
