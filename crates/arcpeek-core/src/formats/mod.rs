//! Archive format detection and parsing.

pub mod compression;
pub mod detect;
pub mod tar;

pub use compression::Codec;
pub use detect::ArchiveFormat;
pub use detect::Detected;
pub use detect::Sniffed;
pub use detect::detect;
pub use detect::sniff;
pub use tar::TarReader;
