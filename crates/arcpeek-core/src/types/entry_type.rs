//! Archive entry type enumeration.

/// Type of entry in an archive.
///
/// Link targets live inside the variants that need them, so a file or
/// directory can never carry a stray target.
///
/// # Examples
///
/// ```
/// use arcpeek_core::EntryType;
///
/// let symlink = EntryType::Symlink {
///     target: "../shared/config".to_string(),
/// };
/// assert!(symlink.is_symlink());
/// assert_eq!(symlink.link_target(), Some("../shared/config"));
/// assert_eq!(EntryType::File.link_target(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum EntryType {
    /// Regular file entry.
    File,

    /// Directory entry.
    Directory,

    /// Symbolic link entry.
    ///
    /// The target is stored verbatim and has NOT been validated.
    Symlink {
        /// The symlink target as recorded in the archive.
        target: String,
    },

    /// Hard link to an earlier entry.
    ///
    /// The target is an archive path and has NOT been validated.
    Hardlink {
        /// Archive path of the linked entry.
        target: String,
    },

    /// Anything else (devices, FIFOs, vendor extensions).
    Other {
        /// The raw TAR typeflag byte.
        typeflag: u8,
    },
}

impl EntryType {
    /// Returns `true` if this is a regular file.
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self, Self::File)
    }

    /// Returns `true` if this is a directory.
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        matches!(self, Self::Directory)
    }

    /// Returns `true` if this is a symlink.
    #[must_use]
    pub const fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink { .. })
    }

    /// Returns `true` if this is a hardlink.
    #[must_use]
    pub const fn is_hardlink(&self) -> bool {
        matches!(self, Self::Hardlink { .. })
    }

    /// Returns the link target of symlinks and hardlinks.
    #[must_use]
    pub fn link_target(&self) -> Option<&str> {
        match self {
            Self::Symlink { target } | Self::Hardlink { target } => Some(target),
            _ => None,
        }
    }

    /// Short label for logs and listings.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink { .. } => "symlink",
            Self::Hardlink { .. } => "hardlink",
            Self::Other { .. } => "other",
        }
    }
}
