//! Symlink and hardlink creation.

use std::fs;
use std::io;
use std::path::Path;

use log::warn;

use crate::ArcError;
use crate::Result;

/// How a hardlink entry ended up on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkOutcome {
    /// A real hard link.
    Linked,
    /// The target's contents were copied.
    Copied,
}

/// Removes a non-directory at `path` so a link can take its place.
pub(crate) fn clear_for_link(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Err(ArcError::filesystem(
            path,
            io::Error::new(io::ErrorKind::AlreadyExists, "a directory is in the way"),
        )),
        Ok(_) => fs::remove_file(path).map_err(|e| ArcError::filesystem(path, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ArcError::filesystem(path, e)),
    }
}

/// Creates a symlink at `link` pointing to `target` verbatim.
#[cfg(unix)]
pub(crate) fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    clear_for_link(link)?;
    std::os::unix::fs::symlink(target, link).map_err(|e| ArcError::filesystem(link, e))
}

#[cfg(not(unix))]
pub(crate) fn create_symlink(_target: &Path, _link: &Path) -> Result<()> {
    Err(ArcError::Unsupported(
        "symlinks are only supported on Unix".into(),
    ))
}

/// Hard-links `link` to `target` with `make_link`, copying the target's
/// contents if linking fails and the target is a regular file.
pub(crate) fn link_or_copy<F>(target: &Path, link: &Path, make_link: F) -> Result<LinkOutcome>
where
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    clear_for_link(link)?;
    let link_error = match make_link(target, link) {
        Ok(()) => return Ok(LinkOutcome::Linked),
        Err(e) => e,
    };

    let meta = fs::symlink_metadata(target).map_err(|e| ArcError::filesystem(target, e))?;
    if !meta.is_file() {
        return Err(ArcError::filesystem(link, link_error));
    }

    warn!(
        "hard link {} -> {} failed ({link_error}); copying instead",
        link.display(),
        target.display()
    );
    fs::copy(target, link).map_err(|e| ArcError::filesystem(link, e))?;
    Ok(LinkOutcome::Copied)
}
