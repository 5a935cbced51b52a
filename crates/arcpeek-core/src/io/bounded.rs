//! Seekable byte source with a cumulative read limit.

use std::fs::File;
use std::io;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;

use super::ArcStream;
use super::Backing;
use super::ByteLimit;
use super::limit::LimitGuard;
use crate::ArcError;
use crate::Result;

/// A seekable reader that refuses to yield more than its limit.
///
/// Ownership of the backing source follows the type parameter:
/// `BoundedStream<File>` closes its file when dropped, while
/// `BoundedStream<&File>` or `BoundedStream<&mut R>` only borrow and leave
/// the source open. [`into_inner`](Self::into_inner) hands the source back
/// without closing it.
///
/// # Examples
///
/// ```
/// use arcpeek_core::io::BoundedStream;
/// use arcpeek_core::io::ByteLimit;
/// use std::io::Read;
///
/// let mut stream = BoundedStream::from_memory(vec![0u8; 16], ByteLimit::Bytes(8));
/// let mut buf = [0u8; 8];
/// stream.read_exact(&mut buf)?;
///
/// // The data goes on, the limit does not.
/// assert!(stream.read(&mut buf).is_err());
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct BoundedStream<S> {
    inner: S,
    guard: LimitGuard,
    backing: Backing,
    len: Option<u64>,
}

impl BoundedStream<File> {
    /// Opens `path` for reading.
    pub fn open(path: impl AsRef<Path>, limit: ByteLimit) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ArcError::filesystem(path, e))?;
        Self::from_file(file, limit)
    }

    /// Wraps an owned file, which is closed when the stream is dropped.
    pub fn from_file(file: File, limit: ByteLimit) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            inner: file,
            guard: LimitGuard::new(limit),
            backing: Backing::File,
            len: Some(len),
        })
    }
}

impl<'a> BoundedStream<&'a File> {
    /// Borrows a file; the caller keeps ownership of the descriptor.
    pub fn from_file_ref(file: &'a File, limit: ByteLimit) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            inner: file,
            guard: LimitGuard::new(limit),
            backing: Backing::File,
            len: Some(len),
        })
    }
}

impl<T: AsRef<[u8]>> BoundedStream<Cursor<T>> {
    /// Reads from an in-memory buffer.
    pub fn from_memory(data: T, limit: ByteLimit) -> Self {
        let len = data.as_ref().len() as u64;
        Self {
            inner: Cursor::new(data),
            guard: LimitGuard::new(limit),
            backing: Backing::Memory,
            len: Some(len),
        }
    }
}

impl<S: Read + Seek> BoundedStream<S> {
    /// Wraps an arbitrary seekable reader of unknown length.
    pub fn new(inner: S, limit: ByteLimit) -> Self {
        Self {
            inner,
            guard: LimitGuard::new(limit),
            backing: Backing::Reader,
            len: None,
        }
    }
}

impl<S> BoundedStream<S> {
    /// Returns a reference to the backing source.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Returns the backing source without closing it.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Read> Read for BoundedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.guard.read_with(buf, |b| self.inner.read(b))
    }
}

impl<S: Seek> Seek for BoundedStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl<S: Read + Seek> ArcStream for BoundedStream<S> {
    fn limit(&self) -> ByteLimit {
        self.guard.limit()
    }

    fn bytes_read(&self) -> u64 {
        self.guard.consumed()
    }

    fn backing(&self) -> Backing {
        self.backing
    }

    fn known_len(&self) -> Option<u64> {
        self.len
    }
}
