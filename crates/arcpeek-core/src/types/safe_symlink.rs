//! Validated symlink type.

use std::ffi::OsString;
use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::ArcError;
use crate::Result;

use super::DestDir;
use super::SafePath;

/// A symlink whose target stays inside the destination.
///
/// The target is kept verbatim for creation. Validation resolves it
/// against the directory the link will actually be created in: the
/// existing part of the parent chain is canonicalized, so a parent that is
/// itself an extracted symlink is followed. `..` is then walked with a
/// stack and anything that climbs above the destination root is rejected.
///
/// # Examples
///
/// ```no_run
/// use arcpeek_core::types::DestDir;
/// use arcpeek_core::types::SafePath;
/// use arcpeek_core::types::SafeSymlink;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dest = DestDir::new("/tmp")?;
/// let link = SafePath::validate("dir/link", &dest, 32)?;
///
/// assert!(SafeSymlink::validate(&link, "../file.txt", &dest).is_ok());
/// assert!(SafeSymlink::validate(&link, "../../file.txt", &dest).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeSymlink {
    link: PathBuf,
    target: PathBuf,
}

impl SafeSymlink {
    /// Validates `target` as the target of a symlink created at `link`
    /// inside `dest`.
    ///
    /// # Errors
    ///
    /// - [`ArcError::SymlinkEscape`] for absolute targets, targets that
    ///   resolve outside the destination, or a parent chain that already
    ///   leaves it
    /// - [`ArcError::UnsafePath`] for empty targets or NUL bytes
    /// - [`ArcError::Filesystem`] if the parent chain cannot be inspected
    pub fn validate(link: &SafePath, target: &str, dest: &DestDir) -> Result<Self> {
        let escape = || ArcError::SymlinkEscape {
            path: link.as_path().to_path_buf(),
            target: PathBuf::from(target),
        };

        if target.is_empty() || target.contains('\0') {
            return Err(ArcError::UnsafePath {
                path: link.as_path().to_path_buf(),
                reason: "symlink target is empty or contains a NUL byte".into(),
            });
        }
        if target.starts_with('/') || target.starts_with('\\') {
            return Err(escape());
        }

        let mut stack = resolved_parent(link, dest)?.ok_or_else(escape)?;

        for component in Path::new(target).components() {
            match component {
                Component::Normal(part) => stack.push(part.to_os_string()),
                Component::CurDir => {}
                Component::ParentDir => {
                    if stack.pop().is_none() {
                        return Err(escape());
                    }
                }
                Component::RootDir | Component::Prefix(_) => return Err(escape()),
            }
        }

        Ok(Self {
            link: link.as_path().to_path_buf(),
            target: PathBuf::from(target),
        })
    }

    /// Returns the link location, relative to the destination.
    #[inline]
    #[must_use]
    pub fn link_path(&self) -> &Path {
        &self.link
    }

    /// Returns the verbatim target.
    #[inline]
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target
    }
}

/// Components of the directory `link` will be created in, relative to the
/// destination, after following symlinks already on disk.
///
/// The deepest existing ancestor is canonicalized and the missing tail is
/// appended as is. Returns `None` when the canonical ancestor lies outside
/// the destination.
fn resolved_parent(link: &SafePath, dest: &DestDir) -> Result<Option<Vec<OsString>>> {
    let full = dest.join(link);
    let mut missing = Vec::new();
    let mut candidate = full.parent();

    while let Some(path) = candidate {
        match path.canonicalize() {
            Ok(canonical) => {
                let Ok(relative) = canonical.strip_prefix(dest.as_path()) else {
                    return Ok(None);
                };
                let mut parts: Vec<OsString> = relative
                    .components()
                    .map(|c| c.as_os_str().to_os_string())
                    .collect();
                parts.extend(missing.into_iter().rev());
                return Ok(Some(parts));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(name) = path.file_name() {
                    missing.push(name.to_os_string());
                }
                candidate = path.parent();
            }
            Err(e) => return Err(ArcError::filesystem(path, e)),
        }
    }
    Ok(None)
}
