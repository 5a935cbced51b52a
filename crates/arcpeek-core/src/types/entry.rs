//! Archive entry metadata.

use std::time::Duration;
use std::time::SystemTime;

use super::EntryType;

/// Metadata of one archive member.
///
/// Produced by [`ArchiveReader::next`](crate::ArchiveReader::next) in
/// archive order. The entry owns all of its strings; its data is read
/// separately through the reader while the entry is current.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Entry {
    /// Normalized archive path (see [`normalize_path`]).
    pub path: String,
    /// Size of the entry's data in bytes.
    pub size: u64,
    /// POSIX mode bits as recorded in the archive.
    pub mode: u32,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
    /// Sub-second part of the modification time.
    pub mtime_nanos: u32,
    /// Entry type, including any link target.
    pub entry_type: EntryType,
    /// Numeric owner.
    pub uid: u64,
    /// Numeric group.
    pub gid: u64,
    /// Owner name, when recorded.
    pub uname: Option<String>,
    /// Group name, when recorded.
    pub gname: Option<String>,
    /// Whether the header checksum verified.
    pub checksum_valid: bool,
}

impl Entry {
    /// Creates an entry with the given path and type and zeroed metadata.
    pub fn new(path: &str, entry_type: EntryType) -> Self {
        Self {
            path: normalize_path(path),
            size: 0,
            mode: 0,
            mtime: 0,
            mtime_nanos: 0,
            entry_type,
            uid: 0,
            gid: 0,
            uname: None,
            gname: None,
            checksum_valid: true,
        }
    }

    /// Permission bits without setuid, setgid and sticky.
    #[must_use]
    pub const fn permissions(&self) -> u32 {
        self.mode & 0o777
    }

    /// Modification time as a [`SystemTime`], if representable.
    #[must_use]
    pub fn modified(&self) -> Option<SystemTime> {
        let nanos = Duration::from_nanos(u64::from(self.mtime_nanos));
        if self.mtime >= 0 {
            SystemTime::UNIX_EPOCH
                .checked_add(Duration::from_secs(self.mtime.unsigned_abs()))?
                .checked_add(nanos)
        } else {
            SystemTime::UNIX_EPOCH
                .checked_sub(Duration::from_secs(self.mtime.unsigned_abs()))?
                .checked_add(nanos)
        }
    }
}

/// Canonical spelling of an archive path.
///
/// Empty and `.` components are dropped, so `./a//b/` becomes `a/b`. A
/// leading `/` and any `..` components are kept verbatim for the extractor
/// to reject. A path with nothing left is `.`.
///
/// # Examples
///
/// ```
/// use arcpeek_core::types::normalize_path;
///
/// assert_eq!(normalize_path("./docs//readme.md"), "docs/readme.md");
/// assert_eq!(normalize_path("dir/"), "dir");
/// assert_eq!(normalize_path("./"), ".");
/// assert_eq!(normalize_path("/etc/passwd"), "/etc/passwd");
/// ```
#[must_use]
pub fn normalize_path(raw: &str) -> String {
    let joined = raw
        .split('/')
        .filter(|component| !component.is_empty() && *component != ".")
        .collect::<Vec<_>>()
        .join("/");

    if raw.starts_with('/') {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
