//! Permission, timestamp and ownership application.

use std::fs::File;
use std::io;
use std::path::Path;
use std::time::SystemTime;

#[cfg(unix)]
use log::warn;

use crate::ArcError;
use crate::Result;

/// Directory metadata applied once every entry has been written.
#[derive(Debug, Clone)]
pub(crate) struct DeferredDir {
    pub(crate) path: std::path::PathBuf,
    pub(crate) mode: Option<u32>,
    pub(crate) mtime: Option<SystemTime>,
}

impl DeferredDir {
    pub(crate) fn apply(&self) -> Result<()> {
        if let Some(mtime) = self.mtime {
            File::open(&self.path)
                .and_then(|dir| dir.set_modified(mtime))
                .map_err(|e| ArcError::filesystem(&self.path, e))?;
        }
        if let Some(mode) = self.mode {
            set_path_mode(&self.path, mode).map_err(|e| ArcError::filesystem(&self.path, e))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_path_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_path_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_readonly(mode & 0o222 == 0);
    std::fs::set_permissions(path, permissions)
}

/// Sets owner and group without following a final symlink.
///
/// Failures (typically `EPERM` for unprivileged users) are logged and
/// otherwise ignored.
#[cfg(unix)]
pub(crate) fn apply_owner(path: &Path, uid: u64, gid: u64) {
    let (Ok(uid), Ok(gid)) = (u32::try_from(uid), u32::try_from(gid)) else {
        warn!("owner {uid}:{gid} of {} out of range", path.display());
        return;
    };
    if let Err(e) = std::os::unix::fs::lchown(path, Some(uid), Some(gid)) {
        warn!("cannot set owner of {} to {uid}:{gid}: {e}", path.display());
    }
}

#[cfg(not(unix))]
pub(crate) fn apply_owner(_path: &Path, _uid: u64, _gid: u64) {}
