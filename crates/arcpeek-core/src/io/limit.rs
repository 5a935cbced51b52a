//! Byte limits for streams and decompression filters.

use std::io;

use crate::error::StreamFault;

/// Ceiling on the total number of bytes a stream may yield.
///
/// The limit is cumulative over the lifetime of a stream instance: seeking
/// backwards and reading again consumes more of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ByteLimit {
    /// No ceiling.
    ///
    /// Only appropriate for trusted input: an unlimited filter over an
    /// attacker-supplied stream has no defense against decompression bombs.
    Unlimited,
    /// At most this many bytes.
    Bytes(u64),
}

impl ByteLimit {
    /// Returns the limit as a number, or `None` when unlimited.
    #[inline]
    #[must_use]
    pub const fn get(self) -> Option<u64> {
        match self {
            Self::Unlimited => None,
            Self::Bytes(n) => Some(n),
        }
    }

    /// Returns what is left of this limit after `consumed` bytes.
    #[inline]
    #[must_use]
    pub const fn remaining_after(self, consumed: u64) -> Self {
        match self {
            Self::Unlimited => Self::Unlimited,
            Self::Bytes(n) => Self::Bytes(n.saturating_sub(consumed)),
        }
    }

    /// Returns `true` if `len` more bytes fit within this limit.
    #[inline]
    #[must_use]
    pub const fn allows(self, len: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Bytes(n) => len <= n,
        }
    }
}

/// Output limit of a decompression filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FilterLimit {
    /// Use whatever the underlying stream has left when the filter is built.
    #[default]
    Inherit,
    /// Use exactly this limit.
    Exact(ByteLimit),
}

impl FilterLimit {
    /// Resolves against the limit remaining on the underlying stream.
    #[inline]
    #[must_use]
    pub const fn resolve(self, inherited: ByteLimit) -> ByteLimit {
        match self {
            Self::Inherit => inherited,
            Self::Exact(limit) => limit,
        }
    }
}

/// Tracks consumption against a [`ByteLimit`] for one stream instance.
///
/// Reads are clamped to the remaining budget. Once the budget is spent,
/// the next read probes a single byte from the source: a source that is
/// also exhausted reports a clean end of stream, anything else trips the
/// guard and every later read fails with [`StreamFault::LimitExceeded`].
#[derive(Debug, Clone)]
pub(crate) struct LimitGuard {
    limit: ByteLimit,
    consumed: u64,
    tripped: bool,
}

impl LimitGuard {
    pub(crate) const fn new(limit: ByteLimit) -> Self {
        Self {
            limit,
            consumed: 0,
            tripped: false,
        }
    }

    pub(crate) const fn limit(&self) -> ByteLimit {
        self.limit
    }

    pub(crate) const fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Reads through `source`, enforcing the limit.
    pub(crate) fn read_with<F>(&mut self, buf: &mut [u8], mut source: F) -> io::Result<usize>
    where
        F: FnMut(&mut [u8]) -> io::Result<usize>,
    {
        if self.tripped {
            return Err(self.fault());
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let window = match self.limit {
            ByteLimit::Unlimited => buf.len(),
            ByteLimit::Bytes(max) => {
                let left = max.saturating_sub(self.consumed);
                if left == 0 {
                    let mut probe = [0u8; 1];
                    if source(&mut probe)? == 0 {
                        return Ok(0);
                    }
                    self.tripped = true;
                    return Err(self.fault());
                }
                usize::try_from(left).map_or(buf.len(), |left| left.min(buf.len()))
            }
        };

        let n = source(&mut buf[..window])?;
        self.consumed = self.consumed.saturating_add(n as u64);
        Ok(n)
    }

    fn fault(&self) -> io::Error {
        StreamFault::LimitExceeded {
            limit: self.limit.get().unwrap_or(u64::MAX),
        }
        .into_io()
    }
}
