//! Repository backends used to fetch and pin dependency sources.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::trace;
use thiserror::Error;

use crate::{
    model::{
        dep::{Checkout, Dep, ScmKind},
        import_path,
    },
    workspace::Workspace,
};

pub mod command;
#[cfg(test)]
pub(crate) mod fake;
pub mod git;
mod known_hosts;

pub use command::CommandScm;
pub use git::GitScm;

#[derive(Error, Debug)]
pub enum ScmError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Could not run `{command}`: {error}")]
    Spawn {
        command: String,
        error: std::io::Error,
    },
    #[error("`{command}` failed in {dir}: {stderr}")]
    Command {
        command: String,
        dir: PathBuf,
        stderr: String,
    },
    #[error("Reference {reference} not found in {dir}")]
    ReferenceNotFound { reference: String, dir: PathBuf },
}

/// Operations pinpack needs from a version control system.
///
/// Every operation receives the directory it acts on explicitly.
pub trait Scm: Send + Sync {
    fn kind(&self) -> ScmKind;

    fn clone_repo(&self, source: &str, destination: &Path) -> Result<(), ScmError>;

    fn fetch_updates(&self, dir: &Path) -> Result<(), ScmError>;

    fn checkout(&self, dir: &Path, checkout: &Checkout) -> Result<(), ScmError>;

    /// Keeps the build output of the vendor area out of the project's repository.
    fn write_ignore_patterns(&self, workspace: &Workspace) -> Result<(), ScmError>;
}

/// Hands out the backend for a kind of repository.
pub trait ScmProvider: Send + Sync {
    fn backend(&self, kind: ScmKind) -> Arc<dyn Scm>;
}

/// Backends talking to real repositories: git through libgit2, the others through their
/// command line tools.
#[derive(Clone, Default)]
pub struct SystemScm {
    git: Arc<GitScm>,
}

impl ScmProvider for SystemScm {
    fn backend(&self, kind: ScmKind) -> Arc<dyn Scm> {
        match CommandScm::new(kind) {
            Some(command) => Arc::new(command),
            None => self.git.clone(),
        }
    }
}

/// Finds the repository kind owning `path` by looking for a metadata directory in `path` and
/// up to `depth - 1` of its ancestors.
pub fn detect(path: &Path, depth: usize) -> Option<ScmKind> {
    path.ancestors().take(depth.max(1)).find_map(|dir| {
        ScmKind::ALL.into_iter().find(|kind| {
            let found = dir.join(kind.marker()).is_dir();
            if found {
                trace!("Found {} metadata in {}", kind, dir.display());
            }
            found
        })
    })
}

/// Backend for `dep` checked out at `dir`: the declared override, then whatever is on disk,
/// then the kind implied by the import host.
pub fn select_kind(dep: &Dep, dir: &Path) -> ScmKind {
    if let Some(kind) = dep.scm {
        return kind;
    }
    let depth = import_path::segments(dep.root()).count();
    detect(dir, depth).unwrap_or_else(|| dep.default_scm())
}
