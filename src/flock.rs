//! Advisory lock serializing pinpack runs on one workspace.

use std::{
    fs::File,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::{debug, info};
use thiserror::Error;

const LOCK_TIMEOUT: Duration = Duration::from_secs(300);
const RETRY_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum Error {
    #[error("Could not open lock file {path}: {error}")]
    Open {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("Could not lock {path}: {error}")]
    Lock {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("Gave up waiting for the lock on {path} after {}s", .waited.as_secs())]
    Timeout { path: PathBuf, waited: Duration },
}

/// Exclusive lock on a file, released when dropped.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    pub fn acquire(path: &Path) -> Result<Self, Error> {
        Self::acquire_within(path, LOCK_TIMEOUT)
    }

    /// Polls the lock until it is free or `timeout` has passed.
    pub fn acquire_within(path: &Path, timeout: Duration) -> Result<Self, Error> {
        let file = File::create(path).map_err(|error| Error::Open {
            path: path.to_path_buf(),
            error,
        })?;
        let start = Instant::now();
        let mut announced = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(_) => {
                    debug!("Locked {}", path.display());
                    return Ok(Self {
                        _file: file,
                        path: path.to_path_buf(),
                    });
                }
                Err(error) if error.raw_os_error() == fs4::lock_contended_error().raw_os_error() => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        return Err(Error::Timeout {
                            path: path.to_path_buf(),
                            waited,
                        });
                    }
                    if !announced {
                        info!("Waiting for another pinpack run on {}", path.display());
                        announced = true;
                    }
                    std::thread::sleep(RETRY_INTERVAL.min(timeout - waited));
                }
                Err(error) => {
                    return Err(Error::Lock {
                        path: path.to_path_buf(),
                        error,
                    })
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        debug!("Released {}", self.path.display());
    }
}
