// src/archive/compression.rs
//! Stream decompression for the in-process extraction backend
//!
//! Gzip, bzip2, xz and zstd streams are decoded on the fly, wrapping whatever reader
//! the caller supplies so byte counting and cancellation stay outside.

use super::classify::ArchiveFormat;
use crate::error::{Error, Result};
use std::io::Read;

/// Compression layer wrapped around a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCodec {
    /// Raw data
    Identity,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl StreamCodec {
    /// Codec for the outer layer of `format`, `None` when the format is not
    /// a (possibly compressed) stream we can decode in-process
    pub fn for_format(format: ArchiveFormat) -> Option<Self> {
        match format {
            ArchiveFormat::Tar => Some(Self::Identity),
            ArchiveFormat::TarGz | ArchiveFormat::Gzip => Some(Self::Gzip),
            ArchiveFormat::TarBz2 | ArchiveFormat::Bzip2 => Some(Self::Bzip2),
            ArchiveFormat::TarXz | ArchiveFormat::Xz => Some(Self::Xz),
            ArchiveFormat::TarZst | ArchiveFormat::Zstd => Some(Self::Zstd),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }

    /// Wrap `reader` in a decoder for this codec
    pub fn decoder<'a, R: Read + 'a>(&self, reader: R) -> Result<Box<dyn Read + 'a>> {
        match self {
            Self::Identity => Ok(Box::new(reader)),
            Self::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
            Self::Bzip2 => Ok(Box::new(bzip2::read::BzDecoder::new(reader))),
            Self::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
            Self::Zstd => {
                let decoder = zstd::Decoder::new(reader).map_err(|e| Error::Backend {
                    backend: "native".to_string(),
                    archive: Default::default(),
                    message: format!("Failed to create zstd decoder: {e}"),
                })?;
                Ok(Box::new(decoder))
            }
        }
    }
}

impl std::fmt::Display for StreamCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_codec_selection() {
        assert_eq!(StreamCodec::for_format(ArchiveFormat::TarGz), Some(StreamCodec::Gzip));
        assert_eq!(StreamCodec::for_format(ArchiveFormat::Tar), Some(StreamCodec::Identity));
        assert_eq!(StreamCodec::for_format(ArchiveFormat::Zstd), Some(StreamCodec::Zstd));
        assert_eq!(StreamCodec::for_format(ArchiveFormat::Rar), None);
        assert_eq!(StreamCodec::for_format(ArchiveFormat::TarBz2), Some(StreamCodec::Bzip2));
        assert_eq!(StreamCodec::for_format(ArchiveFormat::Zip), None);
    }

    #[test]
    fn test_gzip_decoding() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"save data").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut out = String::new();
        StreamCodec::Gzip
            .decoder(compressed.as_slice())
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "save data");
    }

    #[test]
    fn test_zstd_decoding() {
        let compressed = zstd::encode_all(&b"zstd payload"[..], 3).unwrap();
        let mut out = Vec::new();
        StreamCodec::Zstd
            .decoder(compressed.as_slice())
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"zstd payload");
    }

    #[test]
    fn test_bzip2_decoding() {
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::fast());
        encoder.write_all(b"bios notes").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut out = String::new();
        StreamCodec::Bzip2
            .decoder(compressed.as_slice())
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "bios notes");
    }
}
