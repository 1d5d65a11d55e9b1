//! Ephemeral workspace owning one clone of the target repository.

use log::*;
use std::path::Path;
use tempfile::TempDir;

use crate::result::Result;

/// Uniquely-named temporary directory holding the working clone.
///
/// Removal is bound to the destructor, so the directory disappears on every
/// exit path that unwinds or returns: normal completion, early failure, and
/// the interrupt arm in `main` that drops the workspace before exiting.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace directory under the system temp dir.
    pub fn create() -> Result<Self> {
        let dir = TempDir::with_prefix("mainline-")?;
        debug!("created workspace: {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Root of the workspace; the repository is cloned beneath it.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
