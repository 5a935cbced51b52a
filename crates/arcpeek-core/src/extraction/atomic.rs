//! Atomic regular-file creation.
//!
//! Data goes to a temporary file in the target's directory and is renamed
//! over the target only once it is fully copied. A failed or truncated
//! copy drops the temporary file, leaving nothing behind.

use std::io;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use log::trace;

use crate::ArcError;
use crate::Result;
use crate::copy::CopyBuffer;
use crate::copy::copy_with_buffer;

/// Attributes applied to the file before it is renamed into place.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FileAttributes {
    /// Permission bits.
    pub(crate) mode: u32,
    /// Modification time; `None` keeps the time of writing.
    pub(crate) mtime: Option<SystemTime>,
}

/// Writes exactly `size` bytes of `data` to `path`.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// - [`ArcError::Malformed`] if `data` ends before `size` bytes
/// - [`ArcError::Filesystem`] for temporary file, write or rename failures
/// - whatever reading `data` produced
pub(crate) fn write_file<R: Read + ?Sized>(
    path: &Path,
    data: &mut R,
    size: u64,
    buffer: &mut CopyBuffer,
    attrs: FileAttributes,
) -> Result<u64> {
    let Some(parent) = path.parent() else {
        return Err(ArcError::filesystem(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "no parent directory"),
        ));
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".arcpeek.")
        .suffix(".part")
        .tempfile_in(parent)
        .map_err(|e| ArcError::filesystem(parent, e))?;

    let written = {
        let mut writer = BufWriter::with_capacity(64 * 1024, temp.as_file_mut());
        let written = copy_with_buffer(&mut data.take(size), &mut writer, buffer, path)?;
        writer.flush().map_err(|e| ArcError::filesystem(path, e))?;
        written
    };
    if written < size {
        return Err(ArcError::Malformed(format!(
            "entry data ended after {written} of {size} bytes"
        )));
    }

    set_mode(temp.as_file(), attrs.mode).map_err(|e| ArcError::filesystem(path, e))?;
    if let Some(mtime) = attrs.mtime {
        temp.as_file()
            .set_modified(mtime)
            .map_err(|e| ArcError::filesystem(path, e))?;
    }

    trace!("renaming {} into place", temp.path().display());
    temp.persist(path)
        .map_err(|e| ArcError::filesystem(path, e.error))?;
    Ok(written)
}

#[cfg(unix)]
fn set_mode(file: &std::fs::File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(file: &std::fs::File, mode: u32) -> io::Result<()> {
    let mut permissions = file.metadata()?.permissions();
    permissions.set_readonly(mode & 0o222 == 0);
    file.set_permissions(permissions)
}
