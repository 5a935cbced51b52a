//! Entry metadata and validated path types.
//!
//! [`Entry`] and [`EntryType`] describe what the archive reader yields.
//! [`DestDir`], [`SafePath`] and [`SafeSymlink`] can only be built through
//! validation, so the extraction engine never joins an unchecked entry path
//! onto the destination.

pub mod dest_dir;
pub mod entry;
pub mod entry_type;
pub mod safe_path;
pub mod safe_symlink;

pub use dest_dir::DestDir;
pub use entry::Entry;
pub use entry::normalize_path;
pub use entry_type::EntryType;
pub use safe_path::SafePath;
pub use safe_symlink::SafeSymlink;
