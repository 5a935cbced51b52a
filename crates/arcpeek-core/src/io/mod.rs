//! Bounded byte streams and the adapters layered on them.
//!
//! Every byte the crate pulls from an archive flows through an
//! [`ArcStream`]: a seekable reader that also reports how much of its
//! [`ByteLimit`] it has used. The concrete layers are
//!
//! - [`BoundedStream`]: a file, memory buffer, or arbitrary seekable reader
//!   with a read limit,
//! - [`Filter`]: a decompressor over another stream, with its own limit on
//!   decompressed output,
//! - [`SubStream`]: a fixed window of a parent stream, used for entry data.

pub mod bounded;
pub mod filter;
pub mod limit;
pub mod substream;

use std::io::Read;
use std::io::Seek;

pub use bounded::BoundedStream;
pub use filter::Decoded;
pub use filter::Filter;
pub use limit::ByteLimit;
pub use limit::FilterLimit;
pub use substream::SubStream;

use crate::formats::Codec;

/// What a stream reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backing {
    /// An open file.
    File,
    /// An in-memory buffer.
    Memory,
    /// A caller-supplied reader.
    Reader,
    /// A window of another stream.
    Substream,
    /// Decompressed output of another stream.
    Filter(Codec),
}

/// Seekable byte source that accounts for a read limit.
///
/// Implementations never return more bytes in total than
/// [`limit`](Self::limit) allows; a read that would cross it fails with an
/// error that converts to [`ArcError::LimitExceeded`](crate::ArcError).
pub trait ArcStream: Read + Seek {
    /// The limit this stream enforces.
    fn limit(&self) -> ByteLimit;

    /// Total bytes returned by `read` so far.
    fn bytes_read(&self) -> u64;

    /// What is left of the limit.
    fn remaining(&self) -> ByteLimit {
        self.limit().remaining_after(self.bytes_read())
    }

    /// What the stream reads from.
    fn backing(&self) -> Backing;

    /// Total length of the stream, when the backing knows it.
    fn known_len(&self) -> Option<u64> {
        None
    }
}

impl<T: ArcStream + ?Sized> ArcStream for &mut T {
    fn limit(&self) -> ByteLimit {
        (**self).limit()
    }

    fn bytes_read(&self) -> u64 {
        (**self).bytes_read()
    }

    fn remaining(&self) -> ByteLimit {
        (**self).remaining()
    }

    fn backing(&self) -> Backing {
        (**self).backing()
    }

    fn known_len(&self) -> Option<u64> {
        (**self).known_len()
    }
}

impl<T: ArcStream + ?Sized> ArcStream for Box<T> {
    fn limit(&self) -> ByteLimit {
        (**self).limit()
    }

    fn bytes_read(&self) -> u64 {
        (**self).bytes_read()
    }

    fn remaining(&self) -> ByteLimit {
        (**self).remaining()
    }

    fn backing(&self) -> Backing {
        (**self).backing()
    }

    fn known_len(&self) -> Option<u64> {
        (**self).known_len()
    }
}
