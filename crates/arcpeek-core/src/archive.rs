//! Format-independent archive reader.

use std::fs::File;
use std::path::Path;

use log::debug;

use crate::ArcError;
use crate::Result;
use crate::config::ReaderConfig;
use crate::formats::ArchiveFormat;
use crate::formats::Codec;
use crate::formats::TarReader;
use crate::formats::detect;
use crate::io::ArcStream;
use crate::io::BoundedStream;
use crate::io::Decoded;
use crate::io::SubStream;
use crate::types::Entry;

/// Data of the current entry, borrowed from an [`ArchiveReader`].
pub type EntryData<'a, S> = SubStream<'a, Decoded<S>>;

#[derive(Debug)]
enum Format<S> {
    Tar(TarReader<Decoded<S>>),
}

/// Reads entries from a detected, possibly compressed archive.
///
/// The format and compression are chosen once, when the reader is built.
/// Ownership of the underlying stream follows its type: an owned stream is
/// dropped with the reader, a `&mut` stream is left open for the caller.
///
/// # Examples
///
/// ```no_run
/// use std::io::Read;
///
/// use arcpeek_core::ArchiveReader;
/// use arcpeek_core::ReaderConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut reader = ArchiveReader::open_path("logs.tar.gz", &ReaderConfig::default())?;
/// while let Some(entry) = reader.next()? {
///     if entry.path.ends_with(".log") {
///         let mut text = String::new();
///         reader.open_data()?.read_to_string(&mut text)?;
///         println!("{}: {} lines", entry.path, text.lines().count());
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ArchiveReader<S> {
    format: ArchiveFormat,
    compression: Option<Codec>,
    inner: Format<S>,
}

impl ArchiveReader<BoundedStream<File>> {
    /// Opens an archive file.
    ///
    /// The raw stream is limited by [`ReaderConfig::raw_limit`]: the file
    /// size times the expansion factor, with a floor for small files.
    /// Decompression filters inherit that budget unless configured
    /// otherwise.
    ///
    /// # Errors
    ///
    /// [`ArcError::Filesystem`] if the file cannot be opened, otherwise
    /// anything [`open_stream`](Self::open_stream) returns.
    pub fn open_path(path: impl AsRef<Path>, config: &ReaderConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ArcError::filesystem(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| ArcError::filesystem(path, e))?
            .len();
        debug!("opening {} ({len} bytes)", path.display());
        let stream = BoundedStream::from_file(file, config.raw_limit(len))?;
        Self::open_stream(stream, config)
    }
}

impl<S: ArcStream> ArchiveReader<S> {
    /// Detects the format of `stream` and prepares to read entries.
    ///
    /// # Errors
    ///
    /// - [`ArcError::UnrecognizedFormat`] if no known signature matches
    /// - [`ArcError::Unsupported`] for ZIP archives and codecs compiled out
    /// - stream errors raised while sniffing
    pub fn open_stream(stream: S, config: &ReaderConfig) -> Result<Self> {
        let detected = detect(stream, config)?;
        let sniffed = detected.sniffed;
        let inner = match sniffed.format {
            ArchiveFormat::Tar => Format::Tar(TarReader::new(detected.stream, config)?),
            ArchiveFormat::Zip => {
                return Err(ArcError::Unsupported(
                    "zip archives can be detected but not read".into(),
                ));
            }
        };
        Ok(Self {
            format: sniffed.format,
            compression: sniffed.compression,
            inner,
        })
    }

    /// Advances to the next entry, or `Ok(None)` at the end.
    pub fn next(&mut self) -> Result<Option<Entry>> {
        match &mut self.inner {
            Format::Tar(tar) => tar.next(),
        }
    }

    /// Opens the current entry's data.
    pub fn open_data(&mut self) -> Result<EntryData<'_, S>> {
        match &mut self.inner {
            Format::Tar(tar) => tar.open_data(),
        }
    }

    /// Skips the current entry's data.
    pub fn skip_data(&mut self) -> Result<()> {
        match &mut self.inner {
            Format::Tar(tar) => tar.skip_data(),
        }
    }
}

impl<S> ArchiveReader<S> {
    /// Container format.
    pub const fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Compression wrapper, if any.
    pub const fn compression(&self) -> Option<Codec> {
        self.compression
    }

    /// Releases the underlying stream.
    ///
    /// Behind a decompression filter the stream's position is unspecified.
    /// Returns `None` only if a filter lost the stream during a rewind that
    /// panicked.
    pub fn into_inner(self) -> Option<S>
    where
        S: std::io::Read,
    {
        match self.inner {
            Format::Tar(tar) => tar.into_inner().into_inner(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::io::ByteLimit;
    use std::io::Cursor;
    use std::io::Read;
    use std::io::Write;

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_ustar();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_plain_tar() {
        let data = tar_bytes(&[("a.txt", b"alpha"), ("b.txt", b"beta")]);
        let stream = BoundedStream::from_memory(data, ByteLimit::Unlimited);
        let mut reader = ArchiveReader::open_stream(stream, &ReaderConfig::default()).unwrap();
        assert_eq!(reader.format(), ArchiveFormat::Tar);
        assert_eq!(reader.compression(), None);

        let entry = reader.next().unwrap().unwrap();
        assert_eq!(entry.path, "a.txt");
        let mut text = String::new();
        reader.open_data().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "alpha");

        assert_eq!(reader.next().unwrap().unwrap().path, "b.txt");
        assert!(reader.next().unwrap().is_none());
    }

    #[test]
    fn test_gzip_tar() {
        let data = gzip(&tar_bytes(&[("inner.txt", b"compressed")]));
        let stream = BoundedStream::from_memory(data, ByteLimit::Unlimited);
        let mut reader = ArchiveReader::open_stream(stream, &ReaderConfig::default()).unwrap();
        assert_eq!(reader.compression(), Some(Codec::Gzip));

        reader.next().unwrap().unwrap();
        let mut out = Vec::new();
        reader.open_data().unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"compressed");
    }

    #[test]
    fn test_zip_detected_but_unsupported() {
        let mut data = b"PK\x03\x04".to_vec();
        data.resize(64, 0);
        let stream = BoundedStream::from_memory(data, ByteLimit::Unlimited);
        let err = ArchiveReader::open_stream(stream, &ReaderConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
    }

    #[test]
    fn test_unrecognized() {
        let stream = BoundedStream::from_memory(b"\x01\x02\x03\x04".to_vec(), ByteLimit::Unlimited);
        let err = ArchiveReader::open_stream(stream, &ReaderConfig::default()).unwrap_err();
        assert!(matches!(err, ArcError::UnrecognizedFormat));
    }

    #[test]
    fn test_borrowed_stream_survives_reader() {
        let data = tar_bytes(&[("x", b"1")]);
        let mut cursor = Cursor::new(data);
        {
            let mut stream = BoundedStream::new(&mut cursor, ByteLimit::Unlimited);
            let mut reader =
                ArchiveReader::open_stream(&mut stream, &ReaderConfig::default()).unwrap();
            while reader.next().unwrap().is_some() {}
        }
        assert!(cursor.position() > 0);
    }

    #[test]
    fn test_into_inner_plain() {
        let data = tar_bytes(&[("x", b"1")]);
        let stream = BoundedStream::from_memory(data, ByteLimit::Unlimited);
        let reader = ArchiveReader::open_stream(stream, &ReaderConfig::default()).unwrap();
        assert!(reader.into_inner().is_some());
    }

    #[test]
    fn test_into_inner_compressed_after_rewind() {
        let data = gzip(&tar_bytes(&[("a.txt", b"first"), ("b.txt", b"second")]));
        let stream = BoundedStream::from_memory(data, ByteLimit::Unlimited);
        let mut reader = ArchiveReader::open_stream(stream, &ReaderConfig::default()).unwrap();
        reader.next().unwrap();
        let mut text = String::new();
        reader.open_data().unwrap().read_to_string(&mut text).unwrap();
        text.clear();
        reader.open_data().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "first");

        let inner = reader.into_inner().unwrap();
        assert!(inner.bytes_read() > 0);
    }

    #[test]
    fn test_open_path_small_gzip_with_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tiny.tar.gz");
        let data = gzip(&tar_bytes(&[("note.txt", b"hello")]));
        assert!(data.len() < 200);
        std::fs::write(&path, &data).unwrap();

        let mut reader = ArchiveReader::open_path(&path, &ReaderConfig::default()).unwrap();
        let entry = reader.next().unwrap().unwrap();
        assert_eq!(entry.path, "note.txt");
        let mut text = String::new();
        reader.open_data().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello");
        assert!(reader.next().unwrap().is_none());
    }

    #[test]
    fn test_open_path_missing_file() {
        let err = ArchiveReader::open_path("/nonexistent/archive.tar", &ReaderConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FilesystemFailure);
    }
}
