use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use fs4::fs_std::FileExt;
use tracing::debug;

use crate::errors::{AppError, Result};

const LOCK_FILE: &str = "bridge.lock";

/// Exclusive advisory lock held for the lifetime of a bridge process.
#[derive(Debug)]
pub struct BridgeLock {
    file: File,
    path: PathBuf,
}

impl BridgeLock {
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        fs::create_dir_all(state_dir)
            .map_err(|_| AppError::CreateDir(state_dir.display().to_string()))?;
        let path = state_dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(true) => {}
            Ok(false) => {
                return Err(AppError::BridgeAlreadyRunning(
                    state_dir.display().to_string(),
                ));
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                return Err(AppError::BridgeAlreadyRunning(
                    state_dir.display().to_string(),
                ));
            }
            Err(err) => return Err(AppError::BridgeLock(err.to_string())),
        }

        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "bridge lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BridgeLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
