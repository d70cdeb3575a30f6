//! Freezing the resolved sources into the workspace.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    dependencies::{Dependencies, DependencyError},
    fetch::{FetchError, Fetcher},
    graph::ImportGraph,
    scan::SourceScanner,
    scm::{self, ScmError, ScmProvider},
    workspace::Workspace,
};

pub const VENDOR_MARKER: &str = "vendor = true";

#[derive(Error, Debug)]
pub enum VendorError {
    #[error("IO error on {path}: {error}")]
    IO {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("Could not load the vendor lock: {0}")]
    Lock(#[from] DependencyError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Unknown scm at {0}")]
    UnknownScm(PathBuf),
    #[error("Could not write ignore patterns: {0}")]
    Scm(#[from] ScmError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> VendorError + '_ {
    move |error| VendorError::IO {
        path: path.to_path_buf(),
        error,
    }
}

/// Moves the declaration file to the vendor lock and rewrites it with the vendor marker.
///
/// The marked copy is written next to the declaration first, so the project keeps a
/// declaration whichever step fails.
pub fn write_vendor(workspace: &Workspace) -> Result<(), VendorError> {
    let declaration = workspace.declaration();
    let lock = workspace.vendor_lock();
    let content = std::fs::read_to_string(declaration).map_err(io_error(declaration))?;

    let vendor = workspace.vendor();
    std::fs::create_dir_all(&vendor).map_err(io_error(&vendor))?;

    let marked = if content.lines().next().map(str::trim) == Some(VENDOR_MARKER) {
        content
    } else {
        format!("{VENDOR_MARKER}\n{content}")
    };
    let staged = staged_path(declaration);
    std::fs::write(&staged, marked).map_err(io_error(&staged))?;

    if let Err(error) = std::fs::rename(declaration, &lock) {
        if let Err(cleanup) = std::fs::remove_file(&staged) {
            warn!("Could not remove {}: {}", staged.display(), cleanup);
        }
        return Err(io_error(&lock)(error));
    }
    std::fs::rename(&staged, declaration).map_err(io_error(declaration))?;
    info!(
        "Vendored {}, lock written to {}",
        declaration.display(),
        lock.display()
    );
    Ok(())
}

/// Sibling of `declaration` holding the marked copy until it replaces the declaration.
fn staged_path(declaration: &Path) -> PathBuf {
    let mut name = declaration
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".vendoring");
    declaration.with_file_name(name)
}

/// Removes repository metadata and build output from the vendored sources: every entry named
/// `bin` or starting with `.` or `_`.
pub fn clean_scms(src: &Path) -> Result<(), VendorError> {
    if !src.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(src).map_err(io_error(src))? {
        let path = entry.map_err(io_error(src))?.path();
        let strip = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name == "bin" || name.starts_with('.') || name.starts_with('_'));
        if strip {
            debug!("Removing {}", path.display());
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            removed.map_err(io_error(&path))?;
        } else if path.is_dir() {
            clean_scms(&path)?;
        }
    }
    Ok(())
}

/// Vendors the resolved tree of `dependencies`.
///
/// A project that is already vendored first re-fetches, in clean mode, the dependencies whose
/// pin changed since the lock was written.
pub async fn vendor(
    workspace: &Workspace,
    dependencies: &Dependencies,
    already_vendored: bool,
    scm: Arc<dyn ScmProvider>,
    scanner: Arc<dyn SourceScanner>,
) -> Result<(), VendorError> {
    if already_vendored {
        let lock = Dependencies::load(&workspace.vendor_lock(), ImportGraph::new(), false)?;
        let diff = dependencies.diff_against(&lock);
        if diff.is_empty() {
            debug!("Vendored dependencies are up to date");
        } else {
            info!("Updating {} vendored dependencies", diff.len());
            Fetcher::cleaning(workspace.clone(), scm.clone(), scanner)
                .fetch(diff)
                .await?;
        }
    }

    let kind = scm::detect(workspace.root(), 1)
        .ok_or_else(|| VendorError::UnknownScm(workspace.root().to_path_buf()))?;

    clean_scms(&workspace.vendor_src())?;

    if already_vendored {
        debug!("Keeping the existing {} ignore patterns", kind);
    } else {
        scm.backend(kind).write_ignore_patterns(workspace)?;
    }

    write_vendor(workspace)
}
