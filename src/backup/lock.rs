use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Marker file that keeps two runs for the same client from sharing a staging area.
///
/// The file is created with create-new semantics and removed on drop. A lock left behind by a
/// killed process has to be deleted by hand.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn path_for<P: AsRef<Path>>(root: P, client_name: &str) -> PathBuf {
        root.as_ref().join(format!(".{client_name}.lock"))
    }

    pub fn acquire<P: AsRef<Path>>(root: P, client_name: &str) -> Result<RunLock> {
        let path = Self::path_for(root, client_name);
        let mut file = File::create_new(&path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => Error::RunLocked(path.clone()),
            _ => Error::from(e),
        })?;
        let lock = RunLock { path };
        writeln!(file, "{}", std::process::id())?;
        tracing::debug!("Acquired run lock {:?}", lock.path);

        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove run lock {:?}: {e}", self.path);
        }
    }
}
