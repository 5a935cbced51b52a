//! High-level public API for listing and extracting archives.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::ExtractionReport;
use crate::Result;
use crate::archive::ArchiveReader;
use crate::config::ExtractConfig;
use crate::config::ReaderConfig;
use crate::extraction::Extractor;
use crate::io::ArcStream;
use crate::io::BoundedStream;
use crate::types::Entry;

/// Opens an archive file with the default [`ReaderConfig`].
///
/// # Errors
///
/// See [`ArchiveReader::open_path`].
pub fn open_archive<P: AsRef<Path>>(path: P) -> Result<ArchiveReader<BoundedStream<File>>> {
    ArchiveReader::open_path(path, &ReaderConfig::default())
}

/// Lists every entry of an archive without reading entry data.
///
/// # Errors
///
/// Any error from opening the archive or reading its headers.
///
/// # Examples
///
/// ```no_run
/// use arcpeek_core::ReaderConfig;
/// use arcpeek_core::list_archive;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// for entry in list_archive("backup.tar.bz2", &ReaderConfig::default())? {
///     println!("{:>10} {}", entry.size, entry.path);
/// }
/// # Ok(())
/// # }
/// ```
pub fn list_archive<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> Result<Vec<Entry>> {
    let mut reader = ArchiveReader::open_path(path, config)?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next()? {
        reader.skip_data()?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Extracts an archive file into `output_dir`.
///
/// The archive format is detected from its contents. Entries that cannot
/// be extracted safely are recorded in [`ExtractionReport::failures`].
///
/// # Errors
///
/// Returns an error if:
/// - the archive cannot be opened or its format is not supported
/// - the output directory cannot be created
/// - the archive turns out malformed, or exceeds its read limits
///
/// # Examples
///
/// ```no_run
/// use arcpeek_core::ExtractConfig;
/// use arcpeek_core::ReaderConfig;
/// use arcpeek_core::extract_archive;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let report = extract_archive(
///     "archive.tar.gz",
///     "/tmp/output",
///     &ReaderConfig::default(),
///     &ExtractConfig::default(),
/// )?;
/// println!("Extracted {} files", report.files_extracted);
/// # Ok(())
/// # }
/// ```
pub fn extract_archive<P: AsRef<Path>, Q: AsRef<Path>>(
    archive_path: P,
    output_dir: Q,
    reader_config: &ReaderConfig,
    extract_config: &ExtractConfig,
) -> Result<ExtractionReport> {
    let mut reader = ArchiveReader::open_path(archive_path, reader_config)?;
    extract_to_path(&mut reader, output_dir, extract_config)
}

/// Extracts the remaining entries of an open reader into `dest`.
///
/// # Errors
///
/// Fatal reader errors, or failure to create `dest`.
pub fn extract_to_path<S: ArcStream, Q: AsRef<Path>>(
    reader: &mut ArchiveReader<S>,
    dest: Q,
    config: &ExtractConfig,
) -> Result<ExtractionReport> {
    let mut extractor = Extractor::new(dest, config.clone())?;
    extractor.extract_all(reader)?;
    Ok(extractor.finish())
}

/// Extracts a single entry whose data is read from `data`.
///
/// # Errors
///
/// Any error [`Extractor::extract_one`] reports, including recoverable
/// ones.
pub fn extract_entry<R: Read + ?Sized, Q: AsRef<Path>>(
    entry: &Entry,
    data: &mut R,
    dest: Q,
    config: &ExtractConfig,
) -> Result<()> {
    let mut extractor = Extractor::new(dest, config.clone())?;
    extractor.extract_one(entry, data)?;
    let mut report = extractor.finish();
    match report.failures.pop() {
        Some(failure) => Err(failure.error),
        None => Ok(()),
    }
}
