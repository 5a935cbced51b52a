//! Fixtures shared by the integration tests.
//!
//! Well-formed archives come from the `tar` crate. Malicious or broken ones
//! are assembled block by block with [`RawTar`], since well-behaved writers
//! refuse to produce them.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

pub const BLOCK: usize = 512;

/// A member of a fixture archive built with the `tar` crate.
pub enum Member<'a> {
    File {
        path: &'a str,
        data: &'a [u8],
        mode: u32,
        mtime: u64,
    },
    Dir {
        path: &'a str,
        mode: u32,
        mtime: u64,
    },
    Symlink {
        path: &'a str,
        target: &'a str,
    },
    Hardlink {
        path: &'a str,
        target: &'a str,
    },
}

pub fn file<'a>(path: &'a str, data: &'a [u8]) -> Member<'a> {
    Member::File {
        path,
        data,
        mode: 0o644,
        mtime: 1_600_000_000,
    }
}

pub fn dir(path: &str) -> Member<'_> {
    Member::Dir {
        path,
        mode: 0o755,
        mtime: 1_600_000_000,
    }
}

/// Builds a GNU-format tar archive in memory.
pub fn tar_archive(members: &[Member<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for member in members {
        let mut header = tar::Header::new_gnu();
        match *member {
            Member::File {
                path,
                data,
                mode,
                mtime,
            } => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(data.len() as u64);
                header.set_mode(mode);
                header.set_mtime(mtime);
                builder.append_data(&mut header, path, data).unwrap();
            }
            Member::Dir { path, mode, mtime } => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(mode);
                header.set_mtime(mtime);
                builder.append_data(&mut header, path, std::io::empty()).unwrap();
            }
            Member::Symlink { path, target } => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                builder.append_link(&mut header, path, target).unwrap();
            }
            Member::Hardlink { path, target } => {
                header.set_entry_type(tar::EntryType::Link);
                header.set_size(0);
                header.set_mode(0o644);
                builder.append_link(&mut header, path, target).unwrap();
            }
        }
    }
    builder.into_inner().unwrap()
}

/// Block-level archive writer that accepts any header contents.
#[derive(Default)]
pub struct RawTar {
    bytes: Vec<u8>,
}

impl RawTar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header and its data, padded to a block boundary.
    pub fn entry(mut self, name: &str, typeflag: u8, data: &[u8]) -> Self {
        self.bytes
            .extend_from_slice(&raw_header(name, typeflag, data.len() as u64, ""));
        self.bytes.extend_from_slice(data);
        self.pad();
        self
    }

    /// Appends a link entry.
    pub fn link(mut self, name: &str, typeflag: u8, target: &str) -> Self {
        self.bytes
            .extend_from_slice(&raw_header(name, typeflag, 0, target));
        self
    }

    /// Appends a header that declares `size` bytes without any data.
    pub fn header_only(mut self, name: &str, size: u64) -> Self {
        self.bytes.extend_from_slice(&raw_header(name, b'0', size, ""));
        self
    }

    /// Appends arbitrary bytes.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Adds the two-block end marker and returns the archive.
    pub fn finish(mut self) -> Vec<u8> {
        self.bytes.extend_from_slice(&[0u8; 2 * BLOCK]);
        self.bytes
    }

    /// Returns the bytes written so far, without an end marker.
    pub fn unterminated(self) -> Vec<u8> {
        self.bytes
    }

    fn pad(&mut self) {
        let len = self.bytes.len().next_multiple_of(BLOCK);
        self.bytes.resize(len, 0);
    }
}

/// A ustar header block with a valid checksum.
pub fn raw_header(name: &str, typeflag: u8, size: u64, link: &str) -> [u8; BLOCK] {
    let mut block = [0u8; BLOCK];
    block[..name.len()].copy_from_slice(name.as_bytes());
    block[100..108].copy_from_slice(b"0000644\0");
    block[108..116].copy_from_slice(b"0000000\0");
    block[116..124].copy_from_slice(b"0000000\0");
    block[124..136].copy_from_slice(format!("{size:011o}\0").as_bytes());
    block[136..148].copy_from_slice(b"14000000000\0");
    block[156] = typeflag;
    block[157..157 + link.len()].copy_from_slice(link.as_bytes());
    block[257..263].copy_from_slice(b"ustar\0");
    block[263..265].copy_from_slice(b"00");
    seal(&mut block);
    block
}

/// Recomputes the header checksum.
pub fn seal(block: &mut [u8; BLOCK]) {
    block[148..156].fill(b' ');
    let sum: u64 = block.iter().map(|&b| u64::from(b)).sum();
    block[148..156].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[cfg(feature = "xz")]
pub fn xz(data: &[u8]) -> Vec<u8> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Writes `bytes` to `dir/name` and returns the path.
pub fn write_archive(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Lists every file below `root`, relative and sorted.
pub fn tree(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            out.push(
                path.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/"),
            );
            if entry.file_type().unwrap().is_dir() {
                walk(root, &path, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
