//! Decompression filters over bounded streams.
//!
//! A [`Filter`] decodes gzip, bzip2 or xz data pulled from another
//! [`ArcStream`] and is itself an `ArcStream`, with an independent limit on
//! the number of *decompressed* bytes it will produce. That limit is the
//! defense against decompression bombs: the raw stream's limit bounds what
//! is read from disk, the filter's limit bounds what the decoder may expand
//! it into.
//!
//! Filters decode lazily. Seeking forward decodes and discards; seeking
//! backwards rewinds the underlying stream to where the filter started and
//! decodes again from there.

use std::fmt;
use std::io;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

use bzip2::bufread::MultiBzDecoder;
use flate2::bufread::MultiGzDecoder;
use log::debug;
use log::trace;
#[cfg(feature = "xz")]
use xz2::bufread::XzDecoder;

use super::ArcStream;
use super::Backing;
use super::ByteLimit;
use super::FilterLimit;
use super::limit::LimitGuard;
use crate::ArcError;
use crate::Result;
use crate::error::StreamFault;
use crate::formats::Codec;

/// Read-ahead buffer between the compressed stream and the decoder.
const INPUT_BUFFER_SIZE: usize = 32 * 1024;

/// Scratch space used when seeking forward.
const DISCARD_CHUNK: usize = 8 * 1024;

enum Decoder<S> {
    Gzip(MultiGzDecoder<BufReader<S>>),
    Bzip2(MultiBzDecoder<BufReader<S>>),
    #[cfg(feature = "xz")]
    Xz(XzDecoder<BufReader<S>>),
    #[cfg(not(feature = "xz"))]
    Unavailable(BufReader<S>),
}

impl<S: Read> Decoder<S> {
    fn new(codec: Codec, inner: S) -> Self {
        let input = BufReader::with_capacity(INPUT_BUFFER_SIZE, inner);
        match codec {
            Codec::Gzip => Self::Gzip(MultiGzDecoder::new(input)),
            Codec::Bzip2 => Self::Bzip2(MultiBzDecoder::new(input)),
            #[cfg(feature = "xz")]
            Codec::Xz => Self::Xz(XzDecoder::new_multi_decoder(input)),
            #[cfg(not(feature = "xz"))]
            Codec::Xz => Self::Unavailable(input),
        }
    }

    fn into_inner(self) -> S {
        match self {
            Self::Gzip(d) => d.into_inner().into_inner(),
            Self::Bzip2(d) => d.into_inner().into_inner(),
            #[cfg(feature = "xz")]
            Self::Xz(d) => d.into_inner().into_inner(),
            #[cfg(not(feature = "xz"))]
            Self::Unavailable(input) => input.into_inner(),
        }
    }
}

impl<S: Read> Read for Decoder<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Gzip(d) => d.read(buf),
            Self::Bzip2(d) => d.read(buf),
            #[cfg(feature = "xz")]
            Self::Xz(d) => d.read(buf),
            #[cfg(not(feature = "xz"))]
            Self::Unavailable(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "xz support is not compiled in",
            )),
        }
    }
}

/// Decompressing view of another stream.
///
/// The filter owns whatever `S` it is given: pass `&mut stream` to keep
/// ownership with the caller. Dropping the filter never closes a borrowed
/// stream.
///
/// # Examples
///
/// ```
/// use arcpeek_core::formats::Codec;
/// use arcpeek_core::io::BoundedStream;
/// use arcpeek_core::io::ByteLimit;
/// use arcpeek_core::io::Filter;
/// use arcpeek_core::io::FilterLimit;
/// use flate2::Compression;
/// use flate2::write::GzEncoder;
/// use std::io::Read;
/// use std::io::Write;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
/// encoder.write_all(&[0u8; 4096])?;
/// let compressed = encoder.finish()?;
///
/// let raw = BoundedStream::from_memory(compressed, ByteLimit::Unlimited);
/// let mut filter = Filter::new(Codec::Gzip, raw, FilterLimit::Exact(ByteLimit::Bytes(1024)))?;
///
/// let mut out = Vec::new();
/// assert!(filter.read_to_end(&mut out).is_err());
/// assert_eq!(out.len(), 1024);
/// # Ok(())
/// # }
/// ```
pub struct Filter<S> {
    decoder: Option<Decoder<S>>,
    codec: Codec,
    origin: u64,
    pos: u64,
    guard: LimitGuard,
}

impl<S: ArcStream> Filter<S> {
    /// Starts decoding `inner` from its current position.
    ///
    /// [`FilterLimit::Inherit`] takes the limit left on `inner` at this
    /// point.
    pub fn new(codec: Codec, mut inner: S, limit: FilterLimit) -> Result<Self> {
        if !codec.is_available() {
            return Err(ArcError::Unsupported(format!(
                "{codec} decompression is not enabled in this build"
            )));
        }

        let origin = inner.stream_position()?;
        let limit = limit.resolve(inner.remaining());
        debug!("{codec} filter at offset {origin} with output limit {limit:?}");

        Ok(Self {
            decoder: Some(Decoder::new(codec, inner)),
            codec,
            origin,
            pos: 0,
            guard: LimitGuard::new(limit),
        })
    }
}

impl<S> Filter<S> {
    /// The codec being decoded.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Returns the underlying stream without closing it.
    ///
    /// The stream's position is unspecified: the decoder reads ahead.
    /// Returns `None` only if a rewind was interrupted by a panic.
    pub fn into_inner(self) -> Option<S>
    where
        S: Read,
    {
        self.decoder.map(Decoder::into_inner)
    }
}

impl<S: Read + Seek> Filter<S> {
    fn rewind(&mut self) -> io::Result<()> {
        let decoder = self.decoder.take().ok_or_else(poisoned)?;
        let mut inner = decoder.into_inner();
        let seeked = inner.seek(SeekFrom::Start(self.origin));
        self.decoder = Some(Decoder::new(self.codec, inner));
        self.pos = 0;
        seeked?;
        debug!("{} filter rewound to offset {}", self.codec, self.origin);
        Ok(())
    }

    fn discard(&mut self, mut n: u64) -> io::Result<()> {
        let mut scratch = [0u8; DISCARD_CHUNK];
        while n > 0 {
            let want = usize::try_from(n).map_or(DISCARD_CHUNK, |n| n.min(DISCARD_CHUNK));
            let got = self.read(&mut scratch[..want])?;
            if got == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} stream ended before the seek target", self.codec),
                ));
            }
            n -= got as u64;
        }
        Ok(())
    }
}

impl<S: Read> Read for Filter<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let codec = self.codec;
        let decoder = self.decoder.as_mut().ok_or_else(poisoned)?;
        let n = self
            .guard
            .read_with(buf, |b| decoder.read(b).map_err(|e| decode_error(codec, e)))?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<S: Read + Seek> Seek for Filter<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n,
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "seek to a negative or overflowing position",
                )
            })?,
            SeekFrom::End(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "cannot seek relative to the end of a compressed stream",
                ));
            }
        };

        if target != self.pos {
            trace!("{} filter seek {} -> {target}", self.codec, self.pos);
        }
        if target < self.pos {
            self.rewind()?;
        }
        self.discard(target - self.pos)?;
        Ok(self.pos)
    }
}

impl<S: ArcStream> ArcStream for Filter<S> {
    fn limit(&self) -> ByteLimit {
        self.guard.limit()
    }

    fn bytes_read(&self) -> u64 {
        self.guard.consumed()
    }

    fn backing(&self) -> Backing {
        Backing::Filter(self.codec)
    }
}

impl<S> fmt::Debug for Filter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("codec", &self.codec)
            .field("origin", &self.origin)
            .field("pos", &self.pos)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

fn poisoned() -> io::Error {
    io::Error::other("decompression filter lost its decoder")
}

/// Turns decoder complaints into [`StreamFault::Corrupt`].
///
/// Errors that already carry a fault, or come from the operating system,
/// pass through untouched.
fn decode_error(codec: Codec, err: io::Error) -> io::Error {
    if StreamFault::from_io(&err).is_some()
        || err.raw_os_error().is_some()
        || matches!(
            err.kind(),
            io::ErrorKind::Interrupted | io::ErrorKind::Unsupported
        )
    {
        return err;
    }
    StreamFault::Corrupt {
        codec: codec.name(),
        detail: err.to_string(),
    }
    .into_io()
}

/// An archive's byte stream, either as-is or behind a decompression filter.
#[derive(Debug)]
pub enum Decoded<S> {
    /// Uncompressed.
    Plain(S),
    /// Compressed with a recognized codec.
    Filtered(Filter<S>),
}

impl<S> Decoded<S> {
    /// The codec, if the stream is compressed.
    pub fn codec(&self) -> Option<Codec> {
        match self {
            Self::Plain(_) => None,
            Self::Filtered(filter) => Some(filter.codec()),
        }
    }

    /// Returns the original stream without closing it.
    pub fn into_inner(self) -> Option<S>
    where
        S: Read,
    {
        match self {
            Self::Plain(inner) => Some(inner),
            Self::Filtered(filter) => filter.into_inner(),
        }
    }
}

impl<S: Read> Read for Decoded<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(inner) => inner.read(buf),
            Self::Filtered(filter) => filter.read(buf),
        }
    }
}

impl<S: Read + Seek> Seek for Decoded<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::Plain(inner) => inner.seek(pos),
            Self::Filtered(filter) => filter.seek(pos),
        }
    }
}

impl<S: ArcStream> ArcStream for Decoded<S> {
    fn limit(&self) -> ByteLimit {
        match self {
            Self::Plain(inner) => inner.limit(),
            Self::Filtered(filter) => filter.limit(),
        }
    }

    fn bytes_read(&self) -> u64 {
        match self {
            Self::Plain(inner) => inner.bytes_read(),
            Self::Filtered(filter) => filter.bytes_read(),
        }
    }

    fn backing(&self) -> Backing {
        match self {
            Self::Plain(inner) => inner.backing(),
            Self::Filtered(filter) => filter.backing(),
        }
    }

    fn known_len(&self) -> Option<u64> {
        match self {
            Self::Plain(inner) => inner.known_len(),
            Self::Filtered(_) => None,
        }
    }
}
