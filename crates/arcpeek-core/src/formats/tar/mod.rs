//! Streaming TAR reader.
//!
//! Understands POSIX ustar, GNU (long names via `L`/`K` records) and v7
//! headers, plus pax extended (`x`) and global (`g`) headers. Metadata
//! records are folded into the entry they describe and never surface on
//! their own.
//!
//! The reader is a small state machine:
//!
//! ```text
//! BeforeEntry --next()--> Entry(unread) --open_data()--> Entry(opened)
//!      ^                        |                            |
//!      +------- next() ---------+---- skip_data()/next() ----+
//!
//! any state --zero block / end of input--> End
//! any state --error from next()----------> Failed
//! ```

mod header;
mod pax;

use std::io::Read;
use std::io::SeekFrom;

use log::debug;
use log::trace;
use log::warn;

use self::header::BLOCK_SIZE;
use self::header::Header;
use self::header::field_string;
use self::header::is_zero_block;
use self::header::padded;
use self::pax::PaxOverrides;
use super::detect::read_up_to;
use crate::ArcError;
use crate::Result;
use crate::config::ChecksumPolicy;
use crate::config::ReaderConfig;
use crate::io::ArcStream;
use crate::io::SubStream;
use crate::types::Entry;
use crate::types::EntryType;
use crate::types::normalize_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataState {
    Unread,
    Opened,
    Skipped,
}

#[derive(Debug, Clone, Copy)]
struct Current {
    data_start: u64,
    size: u64,
    data: DataState,
}

#[derive(Debug, Clone, Copy)]
enum State {
    BeforeEntry,
    Entry(Current),
    End,
    Failed,
}

/// Metadata that applies to the next real entry only.
#[derive(Debug, Default)]
struct Pending {
    pax: PaxOverrides,
    long_name: Option<String>,
    long_link: Option<String>,
}

/// Sequential reader over the blocks of a TAR archive.
///
/// Entries come out in archive order. The data of the current entry can
/// be read through [`open_data`](Self::open_data) until the next call to
/// [`next`](Self::next); the returned [`SubStream`] borrows the reader, so
/// advancing while it is alive does not compile.
#[derive(Debug)]
pub struct TarReader<S> {
    stream: S,
    offset: u64,
    state: State,
    globals: PaxOverrides,
    checksum_policy: ChecksumPolicy,
    max_metadata_size: u64,
}

impl<S> TarReader<S> {
    /// Returns the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Returns a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

impl<S: ArcStream> TarReader<S> {
    /// Starts reading at the stream's current position.
    pub fn new(mut stream: S, config: &ReaderConfig) -> Result<Self> {
        let offset = stream.stream_position()?;
        Ok(Self {
            stream,
            offset,
            state: State::BeforeEntry,
            globals: PaxOverrides::default(),
            checksum_policy: config.checksum_policy,
            max_metadata_size: config.max_metadata_size,
        })
    }

    /// Advances to the next entry.
    ///
    /// Any data of the current entry that was not read is skipped first.
    /// Returns `Ok(None)` at the end of the archive. An error leaves the
    /// reader failed; later calls return an error as well.
    pub fn next(&mut self) -> Result<Option<Entry>> {
        match self.state {
            State::End => return Ok(None),
            State::Failed => {
                return Err(ArcError::Malformed(
                    "archive reader stopped after an earlier error".into(),
                ));
            }
            State::BeforeEntry | State::Entry(_) => {}
        }

        let result = self.advance();
        match &result {
            Ok(Some(_)) => {}
            Ok(None) => self.state = State::End,
            Err(e) => {
                debug!("tar reader failed at offset {}: {e}", self.offset);
                self.state = State::Failed;
            }
        }
        result
    }

    /// Opens a bounded view of the current entry's data.
    ///
    /// Opening again after a partial read starts over from the first byte
    /// of the entry.
    ///
    /// # Errors
    ///
    /// - [`ArcError::NoCurrentEntry`] without a current entry, or after
    ///   [`skip_data`](Self::skip_data)
    /// - [`ArcError::LimitExceeded`] if the declared size exceeds what the
    ///   stream may still yield
    pub fn open_data(&mut self) -> Result<SubStream<'_, S>> {
        let State::Entry(current) = &mut self.state else {
            return Err(ArcError::NoCurrentEntry);
        };
        let Current {
            data_start, size, ..
        } = *current;

        match current.data {
            DataState::Skipped => return Err(ArcError::NoCurrentEntry),
            DataState::Opened => {
                self.stream.seek(SeekFrom::Start(data_start))?;
            }
            DataState::Unread => {}
        }

        if !self.stream.remaining().allows(size) {
            return Err(ArcError::LimitExceeded {
                limit: self.stream.limit().get().unwrap_or(u64::MAX),
            });
        }

        current.data = DataState::Opened;
        Ok(SubStream::resume(&mut self.stream, data_start, size, 0))
    }

    /// Moves past the current entry's data without exposing it.
    pub fn skip_data(&mut self) -> Result<()> {
        let State::Entry(current) = self.state else {
            return Err(ArcError::NoCurrentEntry);
        };
        if current.data == DataState::Skipped {
            return Ok(());
        }

        match self.skip_past(current.data_start, current.size) {
            Ok(()) => {
                self.state = State::Entry(Current {
                    data: DataState::Skipped,
                    ..current
                });
                Ok(())
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<Option<Entry>> {
        if let State::Entry(current) = self.state
            && current.data != DataState::Skipped
        {
            self.skip_past(current.data_start, current.size)?;
        }
        self.state = State::BeforeEntry;

        let mut pending = Pending::default();
        loop {
            let header_offset = self.offset;
            let Some(block) = self.read_block()? else {
                debug!("end of input at offset {header_offset}");
                return Ok(None);
            };
            if is_zero_block(&block) {
                debug!("end-of-archive marker at offset {header_offset}");
                return Ok(None);
            }

            let header = Header::new(&block);
            let checksum_valid = self.verify_checksum(&header)?;
            let size = header.size()?;
            trace!(
                "header at {header_offset}: typeflag {:?}, size {size}",
                char::from(header.typeflag())
            );

            match header.typeflag() {
                b'x' => pending.pax.apply(&self.read_metadata(size)?)?,
                b'g' => {
                    let data = self.read_metadata(size)?;
                    self.globals.apply(&data)?;
                }
                b'L' => pending.long_name = Some(field_string(&self.read_metadata(size)?)),
                b'K' => pending.long_link = Some(field_string(&self.read_metadata(size)?)),
                _ => {
                    let entry = self.build_entry(&header, pending, checksum_valid)?;
                    self.state = State::Entry(Current {
                        data_start: self.offset,
                        size: entry.size,
                        data: DataState::Unread,
                    });
                    return Ok(Some(entry));
                }
            }
        }
    }

    fn build_entry(&self, header: &Header<'_>, pending: Pending, checksum_valid: bool) -> Result<Entry> {
        let Pending {
            mut pax,
            long_name,
            long_link,
        } = pending;
        pax.inherit(&self.globals);

        let raw_path = pax
            .path
            .take()
            .or(long_name)
            .unwrap_or_else(|| header.path_name());
        let link = || {
            pax.linkpath
                .clone()
                .or_else(|| long_link.clone())
                .unwrap_or_else(|| header.link_name())
        };

        let entry_type = match header.typeflag() {
            b'0' | b'\0' | b'7' if raw_path.ends_with('/') => EntryType::Directory,
            b'0' | b'\0' | b'7' => EntryType::File,
            b'1' => EntryType::Hardlink {
                target: normalize_path(&link()),
            },
            b'2' => EntryType::Symlink { target: link() },
            b'5' => EntryType::Directory,
            typeflag => EntryType::Other { typeflag },
        };

        let (mtime, mtime_nanos) = match pax.mtime {
            Some(time) => time,
            None => (header.mtime()?, 0),
        };

        let mut entry = Entry::new(&raw_path, entry_type);
        entry.size = match pax.size {
            Some(size) => size,
            None => header.size()?,
        };
        entry.mode = header.mode()?;
        entry.mtime = mtime;
        entry.mtime_nanos = mtime_nanos;
        entry.uid = pax.uid.map_or_else(|| header.uid(), Ok)?;
        entry.gid = pax.gid.map_or_else(|| header.gid(), Ok)?;
        entry.uname = pax.uname.or_else(|| header.uname());
        entry.gname = pax.gname.or_else(|| header.gname());
        entry.checksum_valid = checksum_valid;

        debug!(
            "entry {} ({}, {} bytes)",
            entry.path,
            entry.entry_type.label(),
            entry.size
        );
        Ok(entry)
    }

    fn verify_checksum(&self, header: &Header<'_>) -> Result<bool> {
        let stored = header.stored_checksum();
        if let Ok(stored) = stored
            && header.checksum_matches(stored)
        {
            return Ok(true);
        }

        match self.checksum_policy {
            ChecksumPolicy::Strict => {
                let stored = stored?;
                Err(ArcError::ChecksumMismatch {
                    stored,
                    computed: header.computed_checksums().0,
                })
            }
            ChecksumPolicy::Lenient => {
                warn!(
                    "ignoring bad header checksum at offset {}",
                    self.offset - BLOCK_SIZE as u64
                );
                Ok(false)
            }
        }
    }

    /// Reads one header block; `None` at a clean end of input.
    fn read_block(&mut self) -> Result<Option<[u8; BLOCK_SIZE]>> {
        let mut block = [0u8; BLOCK_SIZE];
        let n = read_up_to(&mut self.stream, &mut block)?;
        self.offset += n as u64;
        match n {
            0 => Ok(None),
            BLOCK_SIZE => Ok(Some(block)),
            short => Err(ArcError::Malformed(format!(
                "truncated header: {short} of {BLOCK_SIZE} bytes"
            ))),
        }
    }

    /// Reads the data of a metadata record and its padding.
    fn read_metadata(&mut self, size: u64) -> Result<Vec<u8>> {
        if size > self.max_metadata_size {
            return Err(ArcError::LimitExceeded {
                limit: self.max_metadata_size,
            });
        }
        let len = usize::try_from(size)
            .map_err(|_| ArcError::Malformed(format!("metadata record of {size} bytes")))?;
        let total = padded(size).ok_or_else(|| ArcError::Malformed("metadata size overflows".into()))?;

        let mut data = Vec::with_capacity(len);
        let read = (&mut self.stream).take(total).read_to_end(&mut data)?;
        self.offset += read as u64;
        if (read as u64) < total {
            return Err(ArcError::Malformed(format!(
                "truncated metadata record: {read} of {total} bytes"
            )));
        }
        data.truncate(len);
        Ok(data)
    }

    /// Positions the stream at the header following an entry's data.
    fn skip_past(&mut self, data_start: u64, size: u64) -> Result<()> {
        let next = padded(size)
            .and_then(|padded| data_start.checked_add(padded))
            .ok_or_else(|| ArcError::Malformed(format!("entry size {size} overflows")))?;

        if let Some(len) = self.stream.known_len()
            && next > len
        {
            return Err(ArcError::Malformed(format!(
                "entry data truncated: needs {next} bytes, archive has {len}"
            )));
        }

        trace!("skipping to offset {next}");
        self.stream.seek(SeekFrom::Start(next))?;
        self.offset = next;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::io::BoundedStream;
    use crate::io::ByteLimit;
    use std::io::Cursor;

    fn header(name: &str, typeflag: u8, size: u64) -> [u8; BLOCK_SIZE] {
        let mut block = [0u8; BLOCK_SIZE];
        block[..name.len()].copy_from_slice(name.as_bytes());
        block[100..108].copy_from_slice(b"0000644\0");
        block[108..116].copy_from_slice(b"0001750\0");
        block[116..124].copy_from_slice(b"0001750\0");
        block[124..136].copy_from_slice(format!("{size:011o}\0").as_bytes());
        block[136..148].copy_from_slice(b"14540000000\0");
        block[156] = typeflag;
        block[257..263].copy_from_slice(b"ustar\0");
        block[263..265].copy_from_slice(b"00");
        seal(&mut block);
        block
    }

    fn seal(block: &mut [u8; BLOCK_SIZE]) {
        block[148..156].fill(b' ');
        let sum: u64 = block.iter().map(|&b| u64::from(b)).sum();
        block[148..156].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
    }

    fn push(archive: &mut Vec<u8>, block: [u8; BLOCK_SIZE], data: &[u8]) {
        archive.extend_from_slice(&block);
        archive.extend_from_slice(data);
        archive.resize(archive.len().next_multiple_of(BLOCK_SIZE), 0);
    }

    fn finish(mut archive: Vec<u8>) -> Vec<u8> {
        archive.extend([0u8; 2 * BLOCK_SIZE]);
        archive
    }

    fn reader(data: Vec<u8>) -> TarReader<BoundedStream<Cursor<Vec<u8>>>> {
        TarReader::new(
            BoundedStream::from_memory(data, ByteLimit::Unlimited),
            &ReaderConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_reads_entries_in_order() {
        let mut archive = Vec::new();
        push(&mut archive, header("a.txt", b'0', 5), b"hello");
        push(&mut archive, header("dir/", b'5', 0), b"");
        push(&mut archive, header("b.txt", b'0', 3), b"abc");
        let mut tar = reader(finish(archive));

        let a = tar.next().unwrap().unwrap();
        assert_eq!(a.path, "a.txt");
        assert_eq!(a.size, 5);
        assert_eq!(a.mode, 0o644);
        assert_eq!(a.uid, 1000);
        assert_eq!(a.mtime, 0o14540000000);
        let mut data = String::new();
        tar.open_data().unwrap().read_to_string(&mut data).unwrap();
        assert_eq!(data, "hello");

        let dir = tar.next().unwrap().unwrap();
        assert_eq!(dir.path, "dir");
        assert!(dir.entry_type.is_directory());

        let b = tar.next().unwrap().unwrap();
        assert_eq!(b.path, "b.txt");
        assert!(tar.next().unwrap().is_none());
        assert!(tar.next().unwrap().is_none());
    }

    #[test]
    fn test_unread_data_is_skipped() {
        let mut archive = Vec::new();
        push(&mut archive, header("big", b'0', 2000), &[1u8; 2000]);
        push(&mut archive, header("small", b'0', 1), b"x");
        let mut tar = reader(finish(archive));

        tar.next().unwrap();
        let mut partial = [0u8; 10];
        tar.open_data().unwrap().read_exact(&mut partial).unwrap();
        assert_eq!(tar.next().unwrap().unwrap().path, "small");
    }

    #[test]
    fn test_reopen_starts_over() {
        let mut archive = Vec::new();
        push(&mut archive, header("f", b'0', 6), b"abcdef");
        let mut tar = reader(finish(archive));
        tar.next().unwrap();

        let mut two = [0u8; 2];
        tar.open_data().unwrap().read_exact(&mut two).unwrap();
        let mut all = String::new();
        tar.open_data().unwrap().read_to_string(&mut all).unwrap();
        assert_eq!(all, "abcdef");
    }

    #[test]
    fn test_open_data_state_errors() {
        let mut archive = Vec::new();
        push(&mut archive, header("f", b'0', 1), b"z");
        let mut tar = reader(finish(archive));

        assert!(matches!(tar.open_data(), Err(ArcError::NoCurrentEntry)));
        assert!(matches!(tar.skip_data(), Err(ArcError::NoCurrentEntry)));
        tar.next().unwrap();
        tar.skip_data().unwrap();
        tar.skip_data().unwrap();
        assert!(matches!(tar.open_data(), Err(ArcError::NoCurrentEntry)));
        assert!(tar.next().unwrap().is_none());
    }

    #[test]
    fn test_end_of_input_without_marker() {
        let mut archive = Vec::new();
        push(&mut archive, header("f", b'0', 1), b"z");
        let mut tar = reader(archive);
        assert!(tar.next().unwrap().is_some());
        assert!(tar.next().unwrap().is_none());
    }

    #[test]
    fn test_truncated_header_is_malformed_and_poisons() {
        let mut archive = Vec::new();
        push(&mut archive, header("f", b'0', 1), b"z");
        archive.extend_from_slice(&header("g", b'0', 0)[..100]);
        let mut tar = reader(archive);

        tar.next().unwrap();
        let err = tar.next().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert!(tar.next().is_err());
    }

    #[test]
    fn test_checksum_policy() {
        let mut block = header("f", b'0', 0);
        block[0] = b'g';
        let data = finish(block.to_vec());

        let mut strict = reader(data.clone());
        assert!(matches!(
            strict.next(),
            Err(ArcError::ChecksumMismatch { .. })
        ));

        let config = ReaderConfig::default().with_checksum_policy(ChecksumPolicy::Lenient);
        let mut lenient =
            TarReader::new(BoundedStream::from_memory(data, ByteLimit::Unlimited), &config).unwrap();
        let entry = lenient.next().unwrap().unwrap();
        assert_eq!(entry.path, "g");
        assert!(!entry.checksum_valid);
    }

    #[test]
    fn test_gnu_long_name_and_link() {
        let long_name = format!("{}/file.txt", "d".repeat(150));
        let long_target = format!("{}/target", "t".repeat(120));
        let mut archive = Vec::new();
        let mut name_data = long_name.clone().into_bytes();
        name_data.push(0);
        push(&mut archive, header("././@LongLink", b'L', name_data.len() as u64), &name_data);
        push(&mut archive, header("././@LongLink", b'K', long_target.len() as u64), long_target.as_bytes());
        push(&mut archive, header("truncated", b'2', 0), b"");
        let mut tar = reader(finish(archive));

        let entry = tar.next().unwrap().unwrap();
        assert_eq!(entry.path, long_name);
        assert_eq!(
            entry.entry_type,
            EntryType::Symlink {
                target: long_target
            }
        );
    }

    #[test]
    fn test_pax_local_and_global() {
        let global = b"18 uname=everyone\n14 mtime=42.5\n";
        let local = b"26 path=from/pax/name.txt\n";
        let mut archive = Vec::new();
        push(&mut archive, header("pax_global_header", b'g', global.len() as u64), global);
        push(&mut archive, header("PaxHeaders/x", b'x', local.len() as u64), local);
        push(&mut archive, header("short", b'0', 0), b"");
        push(&mut archive, header("second", b'0', 0), b"");
        let mut tar = reader(finish(archive));

        let first = tar.next().unwrap().unwrap();
        assert_eq!(first.path, "from/pax/name.txt");
        assert_eq!(first.uname.as_deref(), Some("everyone"));
        assert_eq!((first.mtime, first.mtime_nanos), (42, 500_000_000));

        let second = tar.next().unwrap().unwrap();
        assert_eq!(second.path, "second");
        assert_eq!(second.uname.as_deref(), Some("everyone"));
    }

    #[test]
    fn test_pax_size_overrides_header() {
        let local = b"13 size=2000\n";
        let mut archive = Vec::new();
        push(&mut archive, header("PaxHeaders/big", b'x', local.len() as u64), local);
        let mut big = header("big", b'0', 0);
        big[124..136].copy_from_slice(b"00000000000\0");
        seal(&mut big);
        push(&mut archive, big, &[3u8; 2000]);
        push(&mut archive, header("after", b'0', 0), b"");
        let mut tar = reader(finish(archive));

        assert_eq!(tar.next().unwrap().unwrap().size, 2000);
        assert_eq!(tar.next().unwrap().unwrap().path, "after");
    }

    #[test]
    fn test_metadata_record_cap() {
        let mut archive = Vec::new();
        push(&mut archive, header("PaxHeaders/x", b'x', 4096), &[b'x'; 4096]);
        let config = ReaderConfig {
            max_metadata_size: 1024,
            ..ReaderConfig::default()
        };
        let mut tar =
            TarReader::new(BoundedStream::from_memory(finish(archive), ByteLimit::Unlimited), &config)
                .unwrap();
        assert_eq!(tar.next().unwrap_err().kind(), ErrorKind::LimitExceeded);
    }

    #[test]
    fn test_type_mapping() {
        let mut archive = Vec::new();
        push(&mut archive, header("old-dir/", b'\0', 0), b"");
        push(&mut archive, header("contig", b'7', 0), b"");
        let mut link = header("hard", b'1', 0);
        link[157..165].copy_from_slice(b"./contig");
        seal(&mut link);
        push(&mut archive, link, b"");
        push(&mut archive, header("fifo", b'6', 0), b"");
        let mut tar = reader(finish(archive));

        assert_eq!(tar.next().unwrap().unwrap().entry_type, EntryType::Directory);
        assert_eq!(tar.next().unwrap().unwrap().entry_type, EntryType::File);
        assert_eq!(
            tar.next().unwrap().unwrap().entry_type,
            EntryType::Hardlink {
                target: "contig".into()
            }
        );
        assert_eq!(
            tar.next().unwrap().unwrap().entry_type,
            EntryType::Other { typeflag: b'6' }
        );
    }

    #[test]
    fn test_skip_past_truncated_data() {
        let mut archive = Vec::new();
        archive.extend_from_slice(&header("f", b'0', 5000));
        archive.extend_from_slice(&[0u8; 100]);
        let mut tar = reader(archive);

        tar.next().unwrap();
        assert_eq!(tar.skip_data().unwrap_err().kind(), ErrorKind::MalformedInput);
        assert!(tar.next().is_err());
    }

    #[test]
    fn test_open_data_over_budget() {
        let mut archive = Vec::new();
        push(&mut archive, header("f", b'0', 4000), &[0u8; 4000]);
        let stream = BoundedStream::from_memory(finish(archive), ByteLimit::Bytes(2048));
        let mut tar = TarReader::new(stream, &ReaderConfig::default()).unwrap();

        tar.next().unwrap();
        assert!(matches!(tar.open_data(), Err(ArcError::LimitExceeded { .. })));
    }
}
