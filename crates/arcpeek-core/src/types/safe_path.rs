//! Validated entry path type for extraction.

use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::ArcError;
use crate::Result;

use super::DestDir;

/// An entry path that is safe to join under a [`DestDir`].
///
/// `SafePath` is relative, contains no `..`, `.`, root or prefix
/// components, no NUL bytes, and stays within the configured depth. Its
/// nearest existing ancestor on disk resolves inside the destination, so
/// symlinks planted by earlier entries cannot redirect writes.
///
/// An empty `SafePath` denotes the destination root itself (an entry named
/// `.` or `./`).
///
/// # Examples
///
/// ```no_run
/// use arcpeek_core::types::DestDir;
/// use arcpeek_core::types::SafePath;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dest = DestDir::new("/tmp")?;
///
/// let safe = SafePath::validate("foo/bar.txt", &dest, 32)?;
/// assert_eq!(safe.as_path(), std::path::Path::new("foo/bar.txt"));
///
/// assert!(SafePath::validate("../etc/passwd", &dest, 32).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafePath(PathBuf);

impl SafePath {
    /// Validates an archive entry path against `dest`.
    ///
    /// # Validation Steps
    ///
    /// 1. Reject NUL bytes
    /// 2. Reject absolute paths (leading `/`, root or prefix components)
    /// 3. Reject `..` components; drop `.` and empty components
    /// 4. Enforce `max_depth`
    /// 5. Canonicalize the nearest existing ancestor and require it to stay
    ///    under the destination
    ///
    /// # Errors
    ///
    /// - [`ArcError::PathTraversal`] for absolute paths, `..`, or an
    ///   ancestor resolving outside the destination
    /// - [`ArcError::UnsafePath`] for NUL bytes or excessive depth
    /// - [`ArcError::Filesystem`] if an existing ancestor cannot be resolved
    pub fn validate(raw: &str, dest: &DestDir, max_depth: usize) -> Result<Self> {
        let relative = Self::lexical(raw, max_depth)?;
        let resolved = dest.as_path().join(&relative);
        check_containment(&resolved, dest, raw)?;
        Ok(Self(relative))
    }

    /// Performs the lexical checks only, without touching the filesystem.
    pub(crate) fn lexical(raw: &str, max_depth: usize) -> Result<PathBuf> {
        if raw.contains('\0') {
            return Err(ArcError::UnsafePath {
                path: PathBuf::from(raw.replace('\0', "\\0")),
                reason: "path contains a NUL byte".into(),
            });
        }

        let traversal = || ArcError::PathTraversal {
            path: PathBuf::from(raw),
        };

        if raw.starts_with('/') || raw.starts_with('\\') {
            return Err(traversal());
        }

        let mut depth = 0;
        let mut normalized = PathBuf::new();
        for component in Path::new(raw).components() {
            match component {
                Component::Normal(part) => {
                    depth += 1;
                    normalized.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(traversal());
                }
            }
        }

        if depth > max_depth {
            return Err(ArcError::UnsafePath {
                path: PathBuf::from(raw),
                reason: format!("path depth {depth} exceeds maximum {max_depth}"),
            });
        }

        Ok(normalized)
    }

    /// Returns the relative path.
    #[inline]
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Returns `true` if this path denotes the destination root.
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.as_os_str().is_empty()
    }

    /// Returns the number of components.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.components().count()
    }
}

/// Walks up from `resolved` to the first path that exists and checks that
/// its canonical form lies under the destination.
///
/// A dangling symlink does not exist for `canonicalize`, so the walk moves
/// past it and the later create or rename fails on its own.
fn check_containment(resolved: &Path, dest: &DestDir, raw: &str) -> Result<()> {
    let mut candidate = Some(resolved);
    while let Some(path) = candidate {
        match path.canonicalize() {
            Ok(canonical) => {
                if canonical.starts_with(dest.as_path()) {
                    return Ok(());
                }
                return Err(ArcError::PathTraversal {
                    path: PathBuf::from(raw),
                });
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                candidate = path.parent();
            }
            Err(e) => return Err(ArcError::filesystem(path, e)),
        }
    }
    Ok(())
}
