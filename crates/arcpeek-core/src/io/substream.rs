//! Fixed window over a parent stream.

use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

use super::ArcStream;
use super::Backing;
use super::ByteLimit;

/// Reads exactly `[start, start + len)` of a parent stream.
///
/// Reading past the window reports end of stream. A parent that ends
/// before the window does is reported as [`io::ErrorKind::UnexpectedEof`]
/// rather than a short read, so truncated entry data never looks like a
/// complete file. Every byte passes through the parent, so the parent's
/// limit applies as well.
#[derive(Debug)]
pub struct SubStream<'a, S: ?Sized> {
    parent: &'a mut S,
    start: u64,
    len: u64,
    pos: u64,
}

impl<'a, S: ArcStream + ?Sized> SubStream<'a, S> {
    /// Creates a window of `len` bytes at the parent's current position.
    pub fn new(parent: &'a mut S, len: u64) -> io::Result<Self> {
        let start = parent.stream_position()?;
        Ok(Self {
            parent,
            start,
            len,
            pos: 0,
        })
    }

    /// Creates a window whose first `pos` bytes were already consumed.
    pub(crate) fn resume(parent: &'a mut S, start: u64, len: u64, pos: u64) -> Self {
        Self {
            parent,
            start,
            len,
            pos: pos.min(len),
        }
    }

    /// Length of the window.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` for an empty window.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of the window not yet read.
    pub fn left(&self) -> u64 {
        self.len - self.pos
    }

    /// Position within the window.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl<S: ArcStream + ?Sized> Read for SubStream<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.len - self.pos;
        if left == 0 || buf.is_empty() {
            return Ok(0);
        }
        let window = usize::try_from(left).map_or(buf.len(), |left| left.min(buf.len()));
        let n = self.parent.read(&mut buf[..window])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "entry data truncated: {} of {} bytes available",
                    self.pos, self.len
                ),
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}

impl<S: ArcStream + ?Sized> Seek for SubStream<'_, S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
        }
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )
        })?
        .min(self.len);

        self.parent.seek(SeekFrom::Start(self.start + target))?;
        self.pos = target;
        Ok(target)
    }
}

impl<S: ArcStream + ?Sized> ArcStream for SubStream<'_, S> {
    fn limit(&self) -> ByteLimit {
        ByteLimit::Bytes(self.len)
    }

    fn bytes_read(&self) -> u64 {
        self.pos
    }

    fn backing(&self) -> Backing {
        Backing::Substream
    }

    fn known_len(&self) -> Option<u64> {
        Some(self.len)
    }
}
