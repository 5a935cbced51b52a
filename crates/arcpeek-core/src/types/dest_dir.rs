//! Validated destination directory type.

use std::path::Path;
use std::path::PathBuf;

use crate::ArcError;
use crate::Result;

use super::SafePath;

/// A canonical, existing directory that extraction writes into.
///
/// Every output path is produced by joining a [`SafePath`] onto this root,
/// and containment checks compare against the canonical form stored here.
///
/// # Examples
///
/// ```no_run
/// use arcpeek_core::types::DestDir;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dest = DestDir::new("/tmp/extract")?;
/// assert!(dest.as_path().is_absolute());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestDir(PathBuf);

impl DestDir {
    /// Validates and canonicalizes an existing directory.
    ///
    /// # Errors
    ///
    /// [`ArcError::Filesystem`] if the path does not exist, is not a
    /// directory, or cannot be canonicalized.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let canonical = path
            .canonicalize()
            .map_err(|e| ArcError::filesystem(&path, e))?;

        if !canonical.is_dir() {
            return Err(ArcError::filesystem(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
            ));
        }

        Ok(Self(canonical))
    }

    /// Creates the directory (and parents) if needed, then validates it.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path).map_err(|e| ArcError::filesystem(&path, e))?;
        Self::new(path)
    }

    /// Returns the canonical root.
    #[inline]
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Resolves a validated entry path under the root.
    #[inline]
    #[must_use]
    pub fn join(&self, safe_path: &SafePath) -> PathBuf {
        self.0.join(safe_path.as_path())
    }
}
