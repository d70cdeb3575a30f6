use std::path::{Component, Path, PathBuf};

use crate::{
    flock::FileLock,
    model::{dep::Dep, import_path},
};

pub const DECLARATION_FILE: &str = "pinpack.toml";
pub const WORKSPACE_DIR: &str = ".pinpack";
pub const CHECKSUM_FILE: &str = "checksum";
pub const LOCK_FILE: &str = ".lock";
pub const VENDOR_DIR: &str = "vendor";
pub const VENDOR_LOCK_FILE: &str = "pinpack.lock";

/// Locations of everything pinpack reads or writes for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    declaration: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let declaration = root.join(DECLARATION_FILE);
        Workspace { root, declaration }
    }

    pub fn with_declaration(mut self, name: impl AsRef<Path>) -> Self {
        self.declaration = self.root.join(name);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn declaration(&self) -> &Path {
        &self.declaration
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    pub fn checksum(&self) -> PathBuf {
        self.dir().join(CHECKSUM_FILE)
    }

    pub fn vendor(&self) -> PathBuf {
        self.dir().join(VENDOR_DIR)
    }

    /// Root of the fetched source trees.
    pub fn vendor_src(&self) -> PathBuf {
        self.vendor().join("src")
    }

    pub fn vendor_lock(&self) -> PathBuf {
        self.vendor().join(VENDOR_LOCK_FILE)
    }

    /// Local checkout of `dep`, keyed by its canonical root.
    pub fn src_dir(&self, dep: &Dep) -> Option<PathBuf> {
        self.import_dir(dep.root())
    }

    /// Directory of `import` under the vendor sources, `None` when the identifier would
    /// resolve outside of them.
    pub fn import_dir(&self, import: &str) -> Option<PathBuf> {
        if !import_path::is_plain(import) {
            return None;
        }
        let relative = Path::new(import.trim_end_matches('/'));
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return None;
        }
        let dir = self.vendor_src().join(relative);
        dir.starts_with(self.vendor_src()).then_some(dir)
    }

    /// Takes the exclusive workspace lock, creating `.pinpack/` if needed.
    pub fn lock(&self) -> Result<FileLock, crate::flock::Error> {
        let dir = self.dir();
        std::fs::create_dir_all(&dir).map_err(|error| crate::flock::Error::Open {
            path: dir.clone(),
            error,
        })?;
        FileLock::acquire(&dir.join(LOCK_FILE))
    }
}
