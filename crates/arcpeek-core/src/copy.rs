//! Entry data copying with a reusable buffer.
//!
//! Read and write failures are told apart: a read error comes from the
//! archive stream and keeps its classification (a limit trip stays
//! [`ArcError::LimitExceeded`]), while a write error is a
//! [`ArcError::Filesystem`] failure for the output path.

use std::io;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use crate::ArcError;
use crate::Result;

/// Buffer size for entry copies (64KB).
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Heap buffer reused across every entry of one extraction.
#[derive(Debug)]
pub struct CopyBuffer {
    buf: Box<[u8]>,
}

impl CopyBuffer {
    /// Creates a new copy buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; COPY_BUFFER_SIZE].into_boxed_slice(),
        }
    }

    /// Returns the buffer size in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.buf.len()
    }
}

impl Default for CopyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies `reader` into `writer`, which writes to `dest`.
///
/// # Errors
///
/// - the [`ArcError`] converted from a read failure
/// - [`ArcError::Filesystem`] for `dest` on a write failure
pub fn copy_with_buffer<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    buffer: &mut CopyBuffer,
    dest: &Path,
) -> Result<u64> {
    let mut total: u64 = 0;

    loop {
        let bytes_read = match reader.read(&mut buffer.buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArcError::from(e)),
        };

        writer
            .write_all(&buffer.buf[..bytes_read])
            .map_err(|e| ArcError::filesystem(dest, e))?;

        total = total.saturating_add(bytes_read as u64);
    }

    Ok(total)
}
