//! Bounded archive preview and safe extraction.
//!
//! `arcpeek-core` reads TAR archives, plain or wrapped in gzip, bzip2 or
//! xz, without trusting anything they declare. Every byte flows through a
//! stream with a read limit, so a decompression bomb fails with
//! [`ArcError::LimitExceeded`] instead of filling memory or disk, and
//! extraction refuses entries that would land outside the destination.
//!
//! # Examples
//!
//! Listing without touching entry data:
//!
//! ```no_run
//! use arcpeek_core::ReaderConfig;
//! use arcpeek_core::list_archive;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! for entry in list_archive("release.tar.xz", &ReaderConfig::default())? {
//!     println!("{} {}", entry.entry_type.label(), entry.path);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Extracting:
//!
//! ```no_run
//! use arcpeek_core::ExtractConfig;
//! use arcpeek_core::ReaderConfig;
//! use arcpeek_core::extract_archive;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = extract_archive(
//!     "archive.tar.gz",
//!     "/output/dir",
//!     &ReaderConfig::default(),
//!     &ExtractConfig::default(),
//! )?;
//! println!("Extracted {} files", report.files_extracted);
//! for failure in &report.failures {
//!     eprintln!("{}: {}", failure.path, failure.error);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod archive;
pub mod config;
pub mod copy;
pub mod error;
pub mod extraction;
pub mod formats;
pub mod io;
pub mod report;
pub mod types;

pub use api::extract_archive;
pub use api::extract_entry;
pub use api::extract_to_path;
pub use api::list_archive;
pub use api::open_archive;
pub use archive::ArchiveReader;
pub use archive::EntryData;
pub use config::ChecksumPolicy;
pub use config::ExtractConfig;
pub use config::ReaderConfig;
pub use error::ArcError;
pub use error::ErrorKind;
pub use error::Result;
pub use extraction::Extractor;
pub use formats::ArchiveFormat;
pub use formats::Codec;
pub use report::EntryFailure;
pub use report::ExtractionReport;

pub use types::DestDir;
pub use types::Entry;
pub use types::EntryType;
pub use types::SafePath;
pub use types::SafeSymlink;
