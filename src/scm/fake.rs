//! In-memory backend for tests.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::{
    model::dep::{Checkout, ScmKind},
    workspace::Workspace,
};

use super::{Scm, ScmError, ScmProvider};

/// Serves repositories keyed by source URL. Clones share one operation log.
#[derive(Clone, Default)]
pub struct FakeScm {
    repos: HashMap<String, Vec<(String, String)>>,
    unreachable: HashSet<String>,
    broken_checkout: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeScm {
    pub fn repo(mut self, source: &str, files: &[(&str, &str)]) -> Self {
        self.repos.insert(
            source.to_owned(),
            files
                .iter()
                .map(|(name, content)| (name.to_string(), content.to_string()))
                .collect(),
        );
        self
    }

    pub fn unreachable(mut self, source: &str) -> Self {
        self.unreachable.insert(source.to_owned());
        self
    }

    pub fn broken_checkout(mut self) -> Self {
        self.broken_checkout = true;
        self
    }

    /// Every operation so far, sorted.
    pub fn log(&self) -> Vec<String> {
        let mut log = self.log.lock().unwrap().clone();
        log.sort();
        log
    }

    fn record(&self, line: String) {
        self.log.lock().unwrap().push(line);
    }
}

impl Scm for FakeScm {
    fn kind(&self) -> ScmKind {
        ScmKind::Git
    }

    fn clone_repo(&self, source: &str, destination: &Path) -> Result<(), ScmError> {
        self.record(format!("clone {source}"));
        if self.unreachable.contains(source) {
            return Err(ScmError::Command {
                command: format!("clone {source}"),
                dir: destination.to_path_buf(),
                stderr: "repository not found".into(),
            });
        }
        std::fs::create_dir_all(destination.join(".git"))?;
        for (name, content) in self.repos.get(source).into_iter().flatten() {
            let path = destination.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }
        Ok(())
    }

    fn fetch_updates(&self, dir: &Path) -> Result<(), ScmError> {
        self.record(format!("fetch {}", dir.display()));
        Ok(())
    }

    fn checkout(&self, _dir: &Path, checkout: &Checkout) -> Result<(), ScmError> {
        self.record(format!("checkout {checkout}"));
        if self.broken_checkout {
            return Err(ScmError::ReferenceNotFound {
                reference: checkout.to_string(),
                dir: PathBuf::new(),
            });
        }
        Ok(())
    }

    fn write_ignore_patterns(&self, workspace: &Workspace) -> Result<(), ScmError> {
        self.record(format!("ignore {}", workspace.vendor().display()));
        Ok(())
    }
}

impl ScmProvider for FakeScm {
    fn backend(&self, _kind: ScmKind) -> Arc<dyn Scm> {
        Arc::new(self.clone())
    }
}
