//! Extraction operation reporting.

use std::time::Duration;

use crate::ArcError;

/// An entry that could not be extracted.
#[derive(Debug)]
pub struct EntryFailure {
    /// Entry path as stored in the archive (normalized).
    pub path: String,
    /// Why extraction failed.
    pub error: ArcError,
}

/// Report of an archive extraction operation.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Number of regular files written.
    pub files_extracted: usize,

    /// Number of directory entries created or reused.
    pub directories_created: usize,

    /// Number of symlinks created.
    pub symlinks_created: usize,

    /// Number of hardlinks created as links.
    pub hardlinks_created: usize,

    /// Number of hardlinks that fell back to copying the target.
    pub hardlinks_copied: usize,

    /// Total bytes of file data written to disk.
    pub bytes_written: u64,

    /// Entries skipped by configuration (disabled link types, root entry).
    pub entries_skipped: usize,

    /// Duration of the extraction operation.
    pub duration: Duration,

    /// Per-entry failures that did not stop the extraction.
    pub failures: Vec<EntryFailure>,
}

impl ExtractionReport {
    /// Creates a new empty extraction report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a recoverable failure for `path`.
    pub fn record_failure(&mut self, path: impl Into<String>, error: ArcError) {
        self.failures.push(EntryFailure {
            path: path.into(),
            error,
        });
    }

    /// Returns total number of items materialized on disk.
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.files_extracted
            + self.directories_created
            + self.symlinks_created
            + self.hardlinks_created
            + self.hardlinks_copied
    }

    /// Returns whether any entry failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
