use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};

/// Name of the file written to prove the directory is writable.
const WRITE_CHECK_FILE: &str = ".qdb-write-check";

/// The server's local data directory, checked to be usable.
#[derive(Debug)]
pub struct DataDirectory {
    path: PathBuf,
}

impl DataDirectory {
    /// Creates `path` if missing and checks it is a writable directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let unusable = |reason: String| Error::DataDirectory {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            fs::create_dir_all(path)
                .map_err(|e| unusable(format!("could not be created: {e}")))?;
        }

        if !path.is_dir() {
            return Err(unusable("is not a directory".to_string()));
        }

        let marker = path.join(WRITE_CHECK_FILE);
        fs::write(&marker, b"")
            .and_then(|()| fs::remove_file(&marker))
            .map_err(|e| unusable(format!("is not writable: {e}")))?;

        let path = fs::canonicalize(path)
            .map_err(|e| unusable(format!("could not be resolved: {e}")))?;
        info!("Using data directory {}", path.display());

        Ok(Self { path })
    }

    /// Absolute path of the directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
