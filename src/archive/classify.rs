// src/archive/classify.rs

//! Archive classification
//!
//! A file is treated as an archive when its name carries an allow-listed
//! extension. The header is then sniffed against a signature table (plus a
//! structural check for uncompressed tar, which has no magic at offset 0).
//! A header that contradicts the extension is not fatal: extraction is still
//! attempted, with an [`IntegrityWarning`] attached.
//!
//! Console installer packages (`.pkg`) and disc images (`.iso`) are content
//! in their own right and are never extracted.

use crate::error::{IntegrityWarning, Result};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes read from the start of a file for sniffing (one tar header block)
const SNIFF_LEN: usize = 512;

/// Extensions that are never extracted
const EXCLUDED_EXTENSIONS: &[&str] = &["pkg", "iso"];

/// Archive container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Zip,
    SevenZip,
    Rar,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    TarZst,
    /// Single compressed stream, not a tarball
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl ArchiveFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::SevenZip => "7z",
            Self::Rar => "rar",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarBz2 => "tar.bz2",
            Self::TarXz => "tar.xz",
            Self::TarZst => "tar.zst",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }

    /// Format of the outermost layer, which is what the header shows
    pub fn outer(&self) -> Self {
        match self {
            Self::TarGz => Self::Gzip,
            Self::TarBz2 => Self::Bzip2,
            Self::TarXz => Self::Xz,
            Self::TarZst => Self::Zstd,
            other => *other,
        }
    }

    pub fn is_tarball(&self) -> bool {
        matches!(
            self,
            Self::Tar | Self::TarGz | Self::TarBz2 | Self::TarXz | Self::TarZst
        )
    }

    /// Detect from the file name, including compound tar suffixes
    pub fn from_name(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        let suffixes: &[(&str, Self)] = &[
            (".tar.gz", Self::TarGz),
            (".tgz", Self::TarGz),
            (".tar.bz2", Self::TarBz2),
            (".tbz2", Self::TarBz2),
            (".tbz", Self::TarBz2),
            (".tar.xz", Self::TarXz),
            (".txz", Self::TarXz),
            (".tar.zst", Self::TarZst),
            (".tzst", Self::TarZst),
            (".tar", Self::Tar),
            (".zip", Self::Zip),
            (".7z", Self::SevenZip),
            (".rar", Self::Rar),
            (".gz", Self::Gzip),
            (".bz2", Self::Bzip2),
            (".xz", Self::Xz),
            (".zst", Self::Zstd),
        ];
        suffixes
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, format)| *format)
    }

    /// Detect the outer layer from a file header
    pub fn from_signature(header: &[u8]) -> Option<Self> {
        const TABLE: &[(&[u8], ArchiveFormat)] = &[
            (b"PK\x03\x04", ArchiveFormat::Zip),
            (b"PK\x05\x06", ArchiveFormat::Zip),
            (b"PK\x07\x08", ArchiveFormat::Zip),
            (&[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c], ArchiveFormat::SevenZip),
            (b"Rar!\x1a\x07\x00", ArchiveFormat::Rar),
            (b"Rar!\x1a\x07\x01\x00", ArchiveFormat::Rar),
            (&[0x1f, 0x8b], ArchiveFormat::Gzip),
            (b"BZh", ArchiveFormat::Bzip2),
            (&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00], ArchiveFormat::Xz),
            (&[0x28, 0xb5, 0x2f, 0xfd], ArchiveFormat::Zstd),
        ];
        TABLE
            .iter()
            .find(|(magic, _)| header.starts_with(magic))
            .map(|(_, format)| *format)
            .or_else(|| looks_like_tar(header).then_some(ArchiveFormat::Tar))
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structural tar check: `ustar` magic at offset 257, or a header whose
/// checksum field at offset 148 matches its contents
pub fn looks_like_tar(header: &[u8]) -> bool {
    if header.len() >= 262 && &header[257..262] == b"ustar" {
        return true;
    }
    if header.len() < SNIFF_LEN || header[..SNIFF_LEN].iter().all(|&b| b == 0) {
        return false;
    }

    let field = &header[148..156];
    let digits: String = field
        .iter()
        .skip_while(|&&b| b == b' ')
        .take_while(|&&b| b != 0 && b != b' ')
        .map(|&b| b as char)
        .collect();
    let Ok(recorded) = u32::from_str_radix(digits.trim(), 8) else {
        return false;
    };

    let computed: u32 = header[..SNIFF_LEN]
        .iter()
        .enumerate()
        .map(|(i, &b)| if (148..156).contains(&i) { b' ' as u32 } else { b as u32 })
        .sum();
    computed == recorded
}

/// Volumes after the first of a multi-volume RAR set
///
/// `name.part2.rar` and later, or old-style `name.r00`, `name.r01`, ...
pub fn is_secondary_volume(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
        return false;
    };

    if let Some(stem) = name.strip_suffix(".rar")
        && let Some((_, part)) = stem.rsplit_once(".part")
        && let Ok(number) = part.parse::<u32>()
    {
        return number > 1;
    }

    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| {
            ext.len() == 3 && ext.starts_with('r') && ext[1..].chars().all(|c| c.is_ascii_digit())
        })
}

/// Outcome of classifying one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Extract this file
    Archive {
        format: ArchiveFormat,
        warning: Option<IntegrityWarning>,
    },
    /// Never extracted (installer package, disc image, later RAR volume)
    Excluded(&'static str),
    /// Not an archive
    Plain,
}

impl Classification {
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Archive { .. })
    }
}

/// Classify a file by name and header
pub fn classify(path: &Path) -> Result<Classification> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if EXCLUDED_EXTENSIONS.contains(&extension.as_str()) {
        return Ok(Classification::Excluded("package or disc image"));
    }
    if is_secondary_volume(path) {
        return Ok(Classification::Excluded("secondary archive volume"));
    }

    let Some(named) = ArchiveFormat::from_name(path) else {
        return Ok(Classification::Plain);
    };

    let header = read_header(path)?;
    let classification = match ArchiveFormat::from_signature(&header) {
        Some(sniffed) if sniffed == named.outer() => Classification::Archive {
            format: named,
            warning: None,
        },
        // A plain .tar whose header also parses as tar
        Some(ArchiveFormat::Tar) if named.is_tarball() => Classification::Archive {
            format: ArchiveFormat::Tar,
            warning: None,
        },
        Some(sniffed) => Classification::Archive {
            format: sniffed,
            warning: Some(IntegrityWarning {
                archive: path.to_path_buf(),
                reason: format!("named as {named} but content looks like {sniffed}"),
            }),
        },
        None => Classification::Archive {
            format: named,
            warning: Some(IntegrityWarning {
                archive: path.to_path_buf(),
                reason: format!("no {named} signature found"),
            }),
        },
    };
    Ok(classification)
}

/// Convenience wrapper: true only for extractable archives
pub fn is_archive(path: &Path) -> Result<bool> {
    Ok(classify(path)?.is_archive())
}

fn read_header(path: &Path) -> Result<Vec<u8>> {
    let mut header = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut header)?;
    Ok(header)
}
