//! Core extraction engine.

use std::fs;
use std::io;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use log::debug;
use log::warn;

use super::atomic::FileAttributes;
use super::atomic::write_file;
use super::links::LinkOutcome;
use super::links::create_symlink;
use super::links::link_or_copy;
use super::metadata::DeferredDir;
use super::metadata::apply_owner;
use crate::ArcError;
use crate::ExtractionReport;
use crate::Result;
use crate::archive::ArchiveReader;
use crate::config::ExtractConfig;
use crate::copy::CopyBuffer;
use crate::io::ArcStream;
use crate::types::DestDir;
use crate::types::Entry;
use crate::types::EntryType;
use crate::types::SafePath;
use crate::types::SafeSymlink;

/// Permission bits for regular files when modes are not preserved.
const DEFAULT_FILE_MODE: u32 = 0o644;

/// Materializes archive entries under one destination directory.
///
/// Entries are written as they arrive. Directory permissions and times are
/// held back until [`finish`](Self::finish), so a read-only directory
/// does not block the entries written into it later.
///
/// # Examples
///
/// ```no_run
/// use arcpeek_core::ArchiveReader;
/// use arcpeek_core::ExtractConfig;
/// use arcpeek_core::ReaderConfig;
/// use arcpeek_core::extraction::Extractor;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut reader = ArchiveReader::open_path("site.tar.xz", &ReaderConfig::default())?;
/// let mut extractor = Extractor::new("/srv/site", ExtractConfig::preserving())?;
/// extractor.extract_all(&mut reader)?;
/// let report = extractor.finish();
/// println!("{} files, {} failures", report.files_extracted, report.failures.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Extractor {
    dest: DestDir,
    config: ExtractConfig,
    report: ExtractionReport,
    deferred: Vec<DeferredDir>,
    buffer: CopyBuffer,
    started: Instant,
}

impl Extractor {
    /// Creates the destination if needed and prepares to extract into it.
    ///
    /// # Errors
    ///
    /// [`ArcError::Filesystem`] if the destination cannot be created or is
    /// not a directory.
    pub fn new(dest: impl AsRef<Path>, config: ExtractConfig) -> Result<Self> {
        let dest = DestDir::create(dest.as_ref())?;
        debug!("extracting into {}", dest.as_path().display());
        Ok(Self {
            dest,
            config,
            report: ExtractionReport::new(),
            deferred: Vec::new(),
            buffer: CopyBuffer::new(),
            started: Instant::now(),
        })
    }

    /// The canonical destination root.
    pub fn dest(&self) -> &DestDir {
        &self.dest
    }

    /// Counters so far.
    pub fn report(&self) -> &ExtractionReport {
        &self.report
    }

    /// Writes one entry. `data` is read only for regular files, and only
    /// up to `entry.size` bytes.
    ///
    /// # Errors
    ///
    /// - [`ArcError::PathTraversal`], [`ArcError::UnsafePath`],
    ///   [`ArcError::SymlinkEscape`], [`ArcError::HardlinkEscape`] for
    ///   entries that would land outside the destination
    /// - [`ArcError::Unsupported`] for special files, and symlinks off Unix
    /// - [`ArcError::Filesystem`] for failed filesystem operations
    /// - errors from reading `data`
    pub fn extract_one<R: Read + ?Sized>(&mut self, entry: &Entry, data: &mut R) -> Result<()> {
        let target = SafePath::validate(&entry.path, &self.dest, self.config.max_path_depth)?;
        if target.is_root() {
            if entry.entry_type.is_directory() {
                self.report.entries_skipped += 1;
                return Ok(());
            }
            return Err(ArcError::UnsafePath {
                path: entry.path.clone().into(),
                reason: "entry resolves to the destination root".into(),
            });
        }

        match &entry.entry_type {
            EntryType::File => self.write_regular(entry, &target, data),
            EntryType::Directory => self.make_directory(entry, &target),
            EntryType::Symlink { target: link_target } => {
                self.make_symlink(entry, &target, link_target)
            }
            EntryType::Hardlink { target: link_target } => {
                self.make_hardlink(entry, &target, link_target)
            }
            EntryType::Other { typeflag } => Err(ArcError::Unsupported(format!(
                "entry type {:?} of {}",
                char::from(*typeflag),
                entry.path
            ))),
        }
    }

    /// Extracts every remaining entry of `reader`.
    ///
    /// Per-entry failures ([`is_recoverable`](ArcError::is_recoverable))
    /// are recorded in the report and extraction continues. Anything else
    /// stops it and is returned.
    pub fn extract_all<S: ArcStream>(&mut self, reader: &mut ArchiveReader<S>) -> Result<()> {
        while let Some(entry) = reader.next()? {
            let outcome = if entry.entry_type.is_file() {
                let mut data = reader.open_data()?;
                self.extract_one(&entry, &mut data)
            } else {
                self.extract_one(&entry, &mut io::empty())
            };

            match outcome {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => {
                    warn!("skipping {}: {err}", entry.path);
                    self.report.record_failure(entry.path, err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Applies deferred directory metadata and returns the report.
    ///
    /// Directories are processed deepest first. Failures are recorded in
    /// the report.
    pub fn finish(mut self) -> ExtractionReport {
        self.deferred
            .sort_by_key(|dir| std::cmp::Reverse(dir.path.components().count()));
        for dir in &self.deferred {
            if let Err(err) = dir.apply() {
                warn!("cannot apply metadata to {}: {err}", dir.path.display());
                let path = dir
                    .path
                    .strip_prefix(self.dest.as_path())
                    .unwrap_or(&dir.path)
                    .to_string_lossy()
                    .into_owned();
                self.report.record_failure(path, err);
            }
        }
        self.report.duration = self.started.elapsed();
        debug!(
            "extraction finished: {} items, {} failures",
            self.report.total_items(),
            self.report.failures.len()
        );
        self.report
    }

    fn write_regular<R: Read + ?Sized>(
        &mut self,
        entry: &Entry,
        target: &SafePath,
        data: &mut R,
    ) -> Result<()> {
        let path = self.dest.join(target);
        create_parent(&path)?;

        let attrs = FileAttributes {
            mode: if self.config.preserve_permissions {
                entry.permissions()
            } else {
                DEFAULT_FILE_MODE
            },
            mtime: self
                .config
                .preserve_timestamps
                .then(|| entry.modified())
                .flatten(),
        };
        let written = write_file(&path, data, entry.size, &mut self.buffer, attrs)?;
        debug!("wrote {} ({written} bytes)", path.display());

        if self.config.preserve_ownership {
            apply_owner(&path, entry.uid, entry.gid);
        }
        self.report.files_extracted += 1;
        self.report.bytes_written = self.report.bytes_written.saturating_add(written);
        Ok(())
    }

    fn make_directory(&mut self, entry: &Entry, target: &SafePath) -> Result<()> {
        let path = self.dest.join(target);
        fs::create_dir_all(&path).map_err(|e| ArcError::filesystem(&path, e))?;
        if !fs::symlink_metadata(&path)
            .map_err(|e| ArcError::filesystem(&path, e))?
            .is_dir()
        {
            return Err(ArcError::filesystem(
                &path,
                io::Error::new(io::ErrorKind::AlreadyExists, "not a directory"),
            ));
        }

        if self.config.preserve_ownership {
            apply_owner(&path, entry.uid, entry.gid);
        }
        let mode = self
            .config
            .preserve_permissions
            .then(|| entry.permissions());
        let mtime = self
            .config
            .preserve_timestamps
            .then(|| entry.modified())
            .flatten();
        if mode.is_some() || mtime.is_some() {
            self.deferred.push(DeferredDir { path, mode, mtime });
        }
        self.report.directories_created += 1;
        Ok(())
    }

    fn make_symlink(&mut self, entry: &Entry, target: &SafePath, link_target: &str) -> Result<()> {
        if !self.config.allow_symlinks {
            debug!("symlinks disabled, skipping {}", entry.path);
            self.report.entries_skipped += 1;
            return Ok(());
        }

        let symlink = SafeSymlink::validate(target, link_target, &self.dest)?;
        let path = self.dest.join(target);
        create_parent(&path)?;
        create_symlink(symlink.target_path(), &path)?;

        if self.config.preserve_ownership {
            apply_owner(&path, entry.uid, entry.gid);
        }
        self.report.symlinks_created += 1;
        Ok(())
    }

    fn make_hardlink(&mut self, entry: &Entry, target: &SafePath, link_target: &str) -> Result<()> {
        if !self.config.allow_hardlinks {
            debug!("hardlinks disabled, skipping {}", entry.path);
            self.report.entries_skipped += 1;
            return Ok(());
        }

        let escape = || ArcError::HardlinkEscape {
            path: entry.path.clone().into(),
            target: link_target.into(),
        };
        let source = SafePath::validate(link_target, &self.dest, self.config.max_path_depth)
            .map_err(|err| match err {
                ArcError::PathTraversal { .. } => escape(),
                other => other,
            })?;
        if source.is_root() {
            return Err(escape());
        }
        if source == *target {
            return Err(ArcError::UnsafePath {
                path: entry.path.clone().into(),
                reason: "hard link points to itself".into(),
            });
        }

        let link = self.dest.join(target);
        create_parent(&link)?;
        match link_or_copy(&self.dest.join(&source), &link, |a, b| fs::hard_link(a, b))? {
            LinkOutcome::Linked => self.report.hardlinks_created += 1,
            LinkOutcome::Copied => self.report.hardlinks_copied += 1,
        }
        Ok(())
    }
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|e| ArcError::filesystem(parent, e)),
        None => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn file(path: &str, data: &[u8]) -> Entry {
        let mut entry = Entry::new(path, EntryType::File);
        entry.size = data.len() as u64;
        entry.mode = 0o755;
        entry.mtime = 1_234_567_890;
        entry
    }

    fn extractor(config: ExtractConfig) -> (TempDir, Extractor) {
        let temp = TempDir::new().unwrap();
        let extractor = Extractor::new(temp.path(), config).unwrap();
        (temp, extractor)
    }

    #[test]
    fn test_new_creates_destination() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("new/dest");
        let extractor = Extractor::new(&dest, ExtractConfig::default()).unwrap();
        assert!(dest.is_dir());
        assert_eq!(extractor.dest().as_path(), dest.canonicalize().unwrap());
    }

    #[test]
    fn test_extract_file_creates_parents() {
        let (temp, mut extractor) = extractor(ExtractConfig::default());
        extractor
            .extract_one(&file("a/b/c.txt", b"hi"), &mut Cursor::new(b"hi"))
            .unwrap();

        assert_eq!(fs::read(temp.path().join("a/b/c.txt")).unwrap(), b"hi");
        let report = extractor.finish();
        assert_eq!(report.files_extracted, 1);
        assert_eq!(report.bytes_written, 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_default_mode_ignores_entry_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (temp, mut extractor) = extractor(ExtractConfig::default());
        extractor
            .extract_one(&file("run.sh", b"#!"), &mut Cursor::new(b"#!"))
            .unwrap();
        let mode = fs::metadata(temp.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, DEFAULT_FILE_MODE);
    }

    #[cfg(unix)]
    #[test]
    fn test_preserved_mode_drops_special_bits() {
        use std::os::unix::fs::PermissionsExt;

        let (temp, mut extractor) = extractor(ExtractConfig::preserving());
        let mut entry = file("suid", b"x");
        entry.mode = 0o4755;
        extractor.extract_one(&entry, &mut Cursor::new(b"x")).unwrap();
        let mode = fs::metadata(temp.path().join("suid"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o7777, 0o755);
    }

    #[test]
    fn test_preserved_mtime() {
        let (temp, mut extractor) = extractor(ExtractConfig::preserving());
        let entry = file("old.txt", b"x");
        extractor.extract_one(&entry, &mut Cursor::new(b"x")).unwrap();
        let modified = fs::metadata(temp.path().join("old.txt"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(Some(modified), entry.modified());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_directory_applied_last() {
        use std::os::unix::fs::PermissionsExt;

        let (temp, mut extractor) = extractor(ExtractConfig::preserving());
        let mut dir = Entry::new("locked/", EntryType::Directory);
        dir.mode = 0o555;
        extractor.extract_one(&dir, &mut io::empty()).unwrap();
        extractor
            .extract_one(&file("locked/inner.txt", b"ok"), &mut Cursor::new(b"ok"))
            .unwrap();
        let report = extractor.finish();
        assert!(!report.has_failures());

        let locked = temp.path().join("locked");
        let mode = fs::metadata(&locked).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o555);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_traversal_rejected_and_nothing_written() {
        let (temp, mut extractor) = extractor(ExtractConfig::default());
        let err = extractor
            .extract_one(&file("../evil.txt", b"x"), &mut Cursor::new(b"x"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsafePath);
        assert!(!temp.path().parent().unwrap().join("evil.txt").exists());
    }

    #[test]
    fn test_root_entry() {
        let (_temp, mut extractor) = extractor(ExtractConfig::default());
        extractor
            .extract_one(&Entry::new("./", EntryType::Directory), &mut io::empty())
            .unwrap();
        let err = extractor
            .extract_one(&file(".", b""), &mut io::empty())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsafePath);
    }

    #[test]
    fn test_other_types_unsupported() {
        let (_temp, mut extractor) = extractor(ExtractConfig::default());
        let entry = Entry::new("fifo", EntryType::Other { typeflag: b'6' });
        let err = extractor.extract_one(&entry, &mut io::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
        assert!(err.is_recoverable());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_created_verbatim() {
        let (temp, mut extractor) = extractor(ExtractConfig::default());
        let entry = Entry::new(
            "dir/link",
            EntryType::Symlink {
                target: "../data.txt".into(),
            },
        );
        extractor.extract_one(&entry, &mut io::empty()).unwrap();
        assert_eq!(
            fs::read_link(temp.path().join("dir/link")).unwrap(),
            Path::new("../data.txt")
        );
    }

    #[test]
    fn test_symlink_escape_rejected() {
        let (temp, mut extractor) = extractor(ExtractConfig::default());
        let entry = Entry::new(
            "link",
            EntryType::Symlink {
                target: "../../etc/passwd".into(),
            },
        );
        let err = extractor.extract_one(&entry, &mut io::empty()).unwrap_err();
        assert!(matches!(err, ArcError::SymlinkEscape { .. }));
        assert!(fs::symlink_metadata(temp.path().join("link")).is_err());
    }

    #[test]
    fn test_symlinks_disabled_are_skipped() {
        let (temp, mut extractor) = extractor(ExtractConfig::files_only());
        let entry = Entry::new("link", EntryType::Symlink { target: "x".into() });
        extractor.extract_one(&entry, &mut io::empty()).unwrap();
        assert!(fs::symlink_metadata(temp.path().join("link")).is_err());
        assert_eq!(extractor.finish().entries_skipped, 1);
    }

    #[test]
    fn test_hardlink() {
        let (temp, mut extractor) = extractor(ExtractConfig::default());
        extractor
            .extract_one(&file("orig.txt", b"same"), &mut Cursor::new(b"same"))
            .unwrap();
        let link = Entry::new(
            "copy.txt",
            EntryType::Hardlink {
                target: "orig.txt".into(),
            },
        );
        extractor.extract_one(&link, &mut io::empty()).unwrap();

        assert_eq!(fs::read(temp.path().join("copy.txt")).unwrap(), b"same");
        let report = extractor.finish();
        assert_eq!(report.hardlinks_created + report.hardlinks_copied, 1);
    }

    #[test]
    fn test_hardlink_escape() {
        let (_temp, mut extractor) = extractor(ExtractConfig::default());
        let link = Entry::new(
            "link",
            EntryType::Hardlink {
                target: "../outside".into(),
            },
        );
        let err = extractor.extract_one(&link, &mut io::empty()).unwrap_err();
        assert!(matches!(err, ArcError::HardlinkEscape { .. }));
    }

    #[test]
    fn test_hardlink_to_itself() {
        let (_temp, mut extractor) = extractor(ExtractConfig::default());
        let link = Entry::new("same", EntryType::Hardlink { target: "same".into() });
        let err = extractor.extract_one(&link, &mut io::empty()).unwrap_err();
        assert!(matches!(err, ArcError::UnsafePath { .. }));
    }
}
