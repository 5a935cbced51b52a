//! Archive format detection from leading bytes.
//!
//! Detection never trusts file names. It reads the first few bytes to find
//! a compression wrapper, then the first block of the (decompressed) data
//! to find the archive format, and always leaves the stream where it found
//! it.

use std::fmt;
use std::io;
use std::io::Read;
use std::io::SeekFrom;

use log::debug;

use super::Codec;
use crate::ArcError;
use crate::Result;
use crate::config::ReaderConfig;
use crate::io::ArcStream;
use crate::io::Decoded;
use crate::io::Filter;
use crate::io::FilterLimit;

/// Size of a TAR header block, and of the window inspected for one.
const BLOCK_SIZE: usize = 512;

/// Offset of the ustar magic within a TAR header.
const USTAR_MAGIC_OFFSET: usize = 257;

/// ZIP local file header, end of central directory, central directory entry.
const ZIP_SIGNATURES: [&[u8; 4]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x01\x02"];

/// Container format behind any compression wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ArchiveFormat {
    /// POSIX ustar, GNU or v7 tar.
    Tar,
    /// ZIP. Recognized, not readable.
    Zip,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tar => "tar",
            Self::Zip => "zip",
        })
    }
}

/// Result of inspecting a stream's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    /// Compression wrapper, if any.
    pub compression: Option<Codec>,
    /// Archive format inside the wrapper.
    pub format: ArchiveFormat,
}

/// A detected stream, positioned at the start of the archive data.
#[derive(Debug)]
pub struct Detected<S> {
    /// What was found.
    pub sniffed: Sniffed,
    /// The archive bytes, decompressed if needed.
    pub stream: Decoded<S>,
}

/// Identifies compression and archive format without consuming input.
///
/// The stream is returned to its starting position whether detection
/// succeeds or not. Compressed input is probed through a temporary
/// [`Filter`] limited by `config.decompressed_limit`, resolved against the
/// budget the stream had before sniffing.
///
/// # Errors
///
/// [`ArcError::UnrecognizedFormat`] when no signature matches, or the
/// stream error that interrupted detection (a corrupt compressed prefix is
/// [`ArcError::Malformed`]).
pub fn sniff<S: ArcStream>(stream: &mut S, config: &ReaderConfig) -> Result<Sniffed> {
    let limit = FilterLimit::Exact(config.decompressed_limit.resolve(stream.remaining()));
    sniff_with(stream, limit)
}

fn sniff_with<S: ArcStream>(stream: &mut S, limit: FilterLimit) -> Result<Sniffed> {
    let start = stream.stream_position()?;
    let outcome = sniff_at(stream, start, limit);
    let restored = stream.seek(SeekFrom::Start(start));
    let sniffed = outcome?;
    restored?;
    debug!(
        "detected {} archive, compression {:?}",
        sniffed.format, sniffed.compression
    );
    Ok(sniffed)
}

/// Sniffs `stream` and wraps it in the matching decompression filter.
///
/// An inherited filter limit is taken from the stream's budget before
/// sniffing, so the bytes read during detection are not charged twice.
pub fn detect<S: ArcStream>(mut stream: S, config: &ReaderConfig) -> Result<Detected<S>> {
    let limit = FilterLimit::Exact(config.decompressed_limit.resolve(stream.remaining()));
    let sniffed = sniff_with(&mut stream, limit)?;
    let stream = match sniffed.compression {
        Some(codec) => Decoded::Filtered(Filter::new(codec, stream, limit)?),
        None => Decoded::Plain(stream),
    };
    Ok(Detected { sniffed, stream })
}

fn sniff_at<S: ArcStream>(stream: &mut S, start: u64, limit: FilterLimit) -> Result<Sniffed> {
    let mut block = [0u8; BLOCK_SIZE];
    let n = read_up_to(stream, &mut block[..4])?;
    if n < 2 {
        return Err(ArcError::UnrecognizedFormat);
    }

    if let Some(codec) = Codec::from_magic(&block[..n]) {
        stream.seek(SeekFrom::Start(start))?;
        let mut filter = Filter::new(codec, &mut *stream, limit)?;
        let n = read_up_to(&mut filter, &mut block)?;
        let format = classify(&block[..n]).ok_or(ArcError::UnrecognizedFormat)?;
        return Ok(Sniffed {
            compression: Some(codec),
            format,
        });
    }

    let rest = read_up_to(stream, &mut block[n..])?;
    let format = classify(&block[..n + rest]).ok_or(ArcError::UnrecognizedFormat)?;
    Ok(Sniffed {
        compression: None,
        format,
    })
}

/// Matches archive signatures against the first block of data.
fn classify(block: &[u8]) -> Option<ArchiveFormat> {
    if ZIP_SIGNATURES.iter().any(|sig| block.starts_with(*sig)) {
        return Some(ArchiveFormat::Zip);
    }
    if block.len() < BLOCK_SIZE {
        return None;
    }

    let magic = &block[USTAR_MAGIC_OFFSET..USTAR_MAGIC_OFFSET + 5];
    // Pre-POSIX tar has no magic; a printable first name byte is the best hint.
    if magic == b"ustar" || magic == b"USTAR" || is_printable(block[0]) {
        Some(ArchiveFormat::Tar)
    } else {
        None
    }
}

const fn is_printable(byte: u8) -> bool {
    matches!(byte, 0x20..=0x7e)
}

/// Fills as much of `buf` as the stream provides.
pub(crate) fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
