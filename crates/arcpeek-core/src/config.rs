//! Reader and extraction configuration.

use crate::io::ByteLimit;
use crate::io::FilterLimit;

/// What to do when a TAR header checksum does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Fail with [`ArcError::ChecksumMismatch`](crate::ArcError).
    #[default]
    Strict,
    /// Log a warning, mark the entry, and keep going.
    Lenient,
}

/// Limits and parsing policy for reading archives.
///
/// # Examples
///
/// ```
/// use arcpeek_core::ReaderConfig;
/// use arcpeek_core::io::ByteLimit;
/// use arcpeek_core::io::FilterLimit;
///
/// // Never decompress more than 64 MiB, whatever the file size.
/// let config = ReaderConfig::default()
///     .with_decompressed_limit(FilterLimit::Exact(ByteLimit::Bytes(64 << 20)));
/// assert_eq!(config.expansion_factor, 100);
/// ```
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Multiplier on the file size that bounds a path-opened stream.
    ///
    /// Decompression filters inherit that bound, so this is also the
    /// largest expansion ratio accepted by default.
    pub expansion_factor: u64,

    /// Smallest bound given to a path-opened stream.
    ///
    /// TAR block padding makes tiny archives compress far better than the
    /// expansion factor, so small files get at least this much.
    pub min_expanded_limit: u64,

    /// Output limit of any decompression filter.
    pub decompressed_limit: FilterLimit,

    /// Handling of header checksum mismatches.
    pub checksum_policy: ChecksumPolicy,

    /// Largest pax or GNU long-name record accepted, in bytes.
    pub max_metadata_size: u64,
}

impl Default for ReaderConfig {
    /// Creates a `ReaderConfig` with conservative defaults.
    ///
    /// Default values:
    /// - `expansion_factor`: 100
    /// - `min_expanded_limit`: 64 MiB
    /// - `decompressed_limit`: inherit from the raw stream
    /// - `checksum_policy`: strict
    /// - `max_metadata_size`: 1 MiB
    fn default() -> Self {
        Self {
            expansion_factor: 100,
            min_expanded_limit: 64 * 1024 * 1024, // 64 MiB
            decompressed_limit: FilterLimit::Inherit,
            checksum_policy: ChecksumPolicy::Strict,
            max_metadata_size: 1024 * 1024, // 1 MiB
        }
    }
}

impl ReaderConfig {
    /// Creates a configuration for trusted archives.
    ///
    /// Decompressed output is unlimited and bad checksums are only logged.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            decompressed_limit: FilterLimit::Exact(ByteLimit::Unlimited),
            checksum_policy: ChecksumPolicy::Lenient,
            max_metadata_size: 16 * 1024 * 1024,
            ..Default::default()
        }
    }

    /// Sets the expansion factor.
    pub fn with_expansion_factor(mut self, factor: u64) -> Self {
        self.expansion_factor = factor;
        self
    }

    /// Sets the decompressed output limit.
    pub fn with_decompressed_limit(mut self, limit: FilterLimit) -> Self {
        self.decompressed_limit = limit;
        self
    }

    /// Sets the smallest bound for path-opened streams.
    pub fn with_min_expanded_limit(mut self, limit: u64) -> Self {
        self.min_expanded_limit = limit;
        self
    }

    /// Sets the checksum policy.
    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }

    /// Raw stream limit for a file of `file_len` bytes: the file size times
    /// the expansion factor, but never less than `min_expanded_limit`.
    #[must_use]
    pub const fn raw_limit(&self, file_len: u64) -> ByteLimit {
        let scaled = file_len.saturating_mul(self.expansion_factor);
        if scaled < self.min_expanded_limit {
            ByteLimit::Bytes(self.min_expanded_limit)
        } else {
            ByteLimit::Bytes(scaled)
        }
    }
}

/// Controls how entries are materialized on disk.
///
/// Path containment checks are not configurable: entries that would land
/// outside the destination are always rejected.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Apply the entry's permission bits (setuid, setgid and sticky are
    /// always dropped).
    pub preserve_permissions: bool,

    /// Apply the entry's modification time.
    pub preserve_timestamps: bool,

    /// Apply the entry's owner and group. Failures are logged, not fatal.
    pub preserve_ownership: bool,

    /// Create symlink entries.
    pub allow_symlinks: bool,

    /// Create hardlink entries.
    pub allow_hardlinks: bool,

    /// Maximum number of components in an entry path.
    pub max_path_depth: usize,
}

impl Default for ExtractConfig {
    /// Creates an `ExtractConfig` with default settings.
    ///
    /// Default values:
    /// - `preserve_permissions`: false (files 0o644, directories umask default)
    /// - `preserve_timestamps`: false
    /// - `preserve_ownership`: false
    /// - `allow_symlinks`: true
    /// - `allow_hardlinks`: true
    /// - `max_path_depth`: 32
    fn default() -> Self {
        Self {
            preserve_permissions: false,
            preserve_timestamps: false,
            preserve_ownership: false,
            allow_symlinks: true,
            allow_hardlinks: true,
            max_path_depth: 32,
        }
    }
}

impl ExtractConfig {
    /// Preserves permissions and timestamps, the usual `tar -xp` behavior.
    #[must_use]
    pub fn preserving() -> Self {
        Self {
            preserve_permissions: true,
            preserve_timestamps: true,
            ..Default::default()
        }
    }

    /// Creates a configuration that writes only regular files and
    /// directories.
    #[must_use]
    pub fn files_only() -> Self {
        Self {
            allow_symlinks: false,
            allow_hardlinks: false,
            ..Default::default()
        }
    }
}
