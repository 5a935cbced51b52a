//! Compression codecs recognized in front of an archive.
//!
//! # Supported Codecs
//!
//! - **Gzip** (.tar.gz, .tgz): multi-member streams are read to the end
//! - **Bzip2** (.tar.bz2, .tbz2): multi-stream files as written by `pbzip2`
//! - **Xz** (.tar.xz, .txz): requires the `xz` feature (on by default)

use std::fmt;

/// Compression wrapper around an archive.
///
/// # Examples
///
/// ```
/// use arcpeek_core::formats::Codec;
///
/// assert_eq!(Codec::from_magic(&[0x1f, 0x8b, 0x08, 0x00]), Some(Codec::Gzip));
/// assert_eq!(Codec::from_magic(b"BZh9"), Some(Codec::Bzip2));
/// assert_eq!(Codec::from_magic(b"ustar"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Codec {
    /// Gzip (deflate).
    Gzip,
    /// Bzip2 (Burrows-Wheeler).
    Bzip2,
    /// Xz (LZMA2).
    Xz,
}

impl Codec {
    /// All codecs in detection order.
    pub const ALL: [Self; 3] = [Self::Gzip, Self::Bzip2, Self::Xz];

    /// Leading bytes that identify a stream of this codec.
    #[must_use]
    pub const fn magic(self) -> &'static [u8] {
        match self {
            Self::Gzip => &[0x1f, 0x8b],
            Self::Bzip2 => b"BZh",
            Self::Xz => &[0xfd, 0x37, 0x7a, 0x58],
        }
    }

    /// Identifies the codec whose magic `prefix` starts with.
    #[must_use]
    pub fn from_magic(prefix: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|codec| prefix.starts_with(codec.magic()))
    }

    /// Returns a short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
        }
    }

    /// Returns `true` if this build can decode the codec.
    #[must_use]
    pub const fn is_available(self) -> bool {
        match self {
            Self::Gzip | Self::Bzip2 => true,
            Self::Xz => cfg!(feature = "xz"),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
