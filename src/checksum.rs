use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use log::{debug, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChecksumError {
    #[error("Could not read declaration {path} to compute its checksum: {error}")]
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("Could not write checksum {path}: {error}")]
    Write {
        path: PathBuf,
        error: std::io::Error,
    },
}

/// Decides whether the previous resolution of a declaration file can be trusted.
#[derive(Debug)]
pub struct ChecksumGate {
    declaration: PathBuf,
    checksum: PathBuf,
    digest: OnceLock<String>,
}

impl ChecksumGate {
    pub fn new(declaration: impl Into<PathBuf>, checksum: impl Into<PathBuf>) -> Self {
        ChecksumGate {
            declaration: declaration.into(),
            checksum: checksum.into(),
            digest: OnceLock::new(),
        }
    }

    /// Hex SHA-256 of the declaration file, computed on first use.
    pub fn digest(&self) -> Result<&str, ChecksumError> {
        if let Some(digest) = self.digest.get() {
            return Ok(digest);
        }
        let contents = std::fs::read(&self.declaration).map_err(|error| ChecksumError::Read {
            path: self.declaration.clone(),
            error,
        })?;
        let digest = hex::encode(Sha256::digest(&contents));
        Ok(self.digest.get_or_init(|| digest))
    }

    /// True when no usable checksum was recorded or the declaration changed since.
    pub fn is_modified(&self) -> Result<bool, ChecksumError> {
        let digest = self.digest()?;
        match std::fs::read(&self.checksum) {
            Ok(recorded) => Ok(recorded != digest.as_bytes()),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("No checksum recorded at {}", self.checksum.display());
                Ok(true)
            }
            Err(error) => {
                warn!(
                    "Could not read checksum {}, resolving from scratch: {}",
                    self.checksum.display(),
                    error
                );
                Ok(true)
            }
        }
    }

    pub fn write(&self) -> Result<(), ChecksumError> {
        let digest = self.digest()?;
        let write_err = |error| ChecksumError::Write {
            path: self.checksum.clone(),
            error,
        };
        if let Some(parent) = self.checksum.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(&self.checksum, digest).map_err(write_err)?;
        debug!("Recorded checksum {} in {}", digest, self.checksum.display());
        Ok(())
    }

    pub fn declaration(&self) -> &Path {
        &self.declaration
    }
}
