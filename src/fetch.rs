//! Fetches, pins and recursively resolves the dependencies of a declaration.
//!
//! Every dependency of a resolution set is handled by its own task. Nested declarations found
//! in fetched sources become new resolution sets bound to the same import graph, so conflicts
//! between nesting levels surface as soon as the nested declaration is loaded.

use std::{
    collections::BTreeSet,
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
};

use dashmap::DashSet;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::{
    dependencies::{Dependencies, DependencyError},
    graph::ImportGraph,
    model::{dep::Dep, import_path},
    scan::SourceScanner,
    scm::{self, Scm, ScmError, ScmProvider},
    workspace::{Workspace, DECLARATION_FILE},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error("Could not download {import} from {source_url}: {error}")]
    Download {
        import: String,
        source_url: String,
        error: ScmError,
    },
    #[error("Could not update {import} in {dir}: {error}")]
    Update {
        import: String,
        dir: PathBuf,
        error: ScmError,
    },
    #[error("IO error on {path}: {error}")]
    IO {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("{0} does not name a directory inside the vendor area")]
    OutsideVendor(String),
    #[error("Fetch worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Run-wide fetch state. Cloning shares it.
#[derive(Clone)]
pub struct Fetcher {
    inner: Arc<Inner>,
}

struct Inner {
    workspace: Workspace,
    scm: Arc<dyn ScmProvider>,
    scanner: Arc<dyn SourceScanner>,
    claimed: DashSet<String>,
    clean: bool,
}

impl Fetcher {
    pub fn new(
        workspace: Workspace,
        scm: Arc<dyn ScmProvider>,
        scanner: Arc<dyn SourceScanner>,
    ) -> Self {
        Self::with_mode(workspace, scm, scanner, false)
    }

    /// A fetcher that also removes vendored sources the re-fetched dependencies no longer
    /// import.
    pub fn cleaning(
        workspace: Workspace,
        scm: Arc<dyn ScmProvider>,
        scanner: Arc<dyn SourceScanner>,
    ) -> Self {
        Self::with_mode(workspace, scm, scanner, true)
    }

    fn with_mode(
        workspace: Workspace,
        scm: Arc<dyn ScmProvider>,
        scanner: Arc<dyn SourceScanner>,
        clean: bool,
    ) -> Self {
        Fetcher {
            inner: Arc::new(Inner {
                workspace,
                scm,
                scanner,
                claimed: DashSet::new(),
                clean,
            }),
        }
    }

    /// Resolves `dependencies` and everything they declare. The first fatal error aborts the
    /// remaining workers of its set.
    pub async fn fetch(&self, dependencies: Dependencies) -> Result<(), FetchError> {
        self.fetch_set(dependencies).await
    }

    fn fetch_set(&self, dependencies: Dependencies) -> BoxFuture<'static, Result<(), FetchError>> {
        let fetcher = self.clone();
        Box::pin(async move {
            let graph = dependencies.graph().clone();
            let mut workers = JoinSet::new();
            for entry in dependencies {
                let fetcher = fetcher.clone();
                let graph = graph.clone();
                workers.spawn(async move { fetcher.fetch_dependency(entry.dep, graph).await });
            }
            while let Some(result) = workers.join_next().await {
                result??;
            }
            Ok(())
        })
    }

    async fn fetch_dependency(self, dep: Dep, graph: ImportGraph) -> Result<(), FetchError> {
        let dep = pinned(dep, &graph);
        if !self.inner.claimed.insert(dep.root().to_owned()) {
            debug!("{} is already being resolved", dep.root());
            return Ok(());
        }

        let fetcher = self.clone();
        let nested =
            tokio::task::spawn_blocking(move || fetcher.prepare(&dep, &graph)).await??;
        if let Some(nested) = nested {
            self.fetch_set(nested).await?;
        }
        Ok(())
    }

    /// Downloads or updates one dependency, points it at its reference and loads its own
    /// declaration when the sources changed.
    fn prepare(&self, dep: &Dep, graph: &ImportGraph) -> Result<Option<Dependencies>, FetchError> {
        let inner = &self.inner;
        let dir = inner
            .workspace
            .src_dir(dep)
            .ok_or_else(|| FetchError::OutsideVendor(dep.import.clone()))?;

        let previous = if inner.clean {
            let previous = self.used_imports(&dir);
            remove_dir(&dir)?;
            previous
        } else {
            BTreeSet::new()
        };

        let backend = inner.scm.backend(scm::select_kind(dep, &dir));
        let updated = self.ensure_sources(dep, &dir, backend.as_ref())?;

        if dep.checkout.is_set() {
            info!("Pointing {} at {}", dep.import, dep.checkout);
            if let Err(error) = backend.checkout(&dir, &dep.checkout) {
                warn!("Could not check out {} for {}: {}", dep.checkout, dep.import, error);
            }
        }

        if inner.clean {
            self.remove_stale_imports(dep, graph, &dir, previous);
        }

        if !updated {
            return Ok(None);
        }
        let declaration = dir.join(DECLARATION_FILE);
        if !declaration.is_file() {
            debug!("{} declares no dependencies", dep.import);
            return Ok(None);
        }
        Ok(Some(Dependencies::load(&declaration, graph.clone(), true)?))
    }

    /// Returns whether the sources were downloaded or updated.
    fn ensure_sources(&self, dep: &Dep, dir: &Path, backend: &dyn Scm) -> Result<bool, FetchError> {
        if dir.join(backend.kind().marker()).is_dir() {
            if !dep.needs_fetch() {
                debug!("{} is pinned and unchanged, not updating", dep.import);
                return Ok(false);
            }
            info!("Updating {}", dep.import);
            backend
                .fetch_updates(dir)
                .map_err(|error| FetchError::Update {
                    import: dep.import.clone(),
                    dir: dir.to_path_buf(),
                    error,
                })?;
            return Ok(true);
        }

        if dir.exists() {
            warn!(
                "{} has no {} metadata, downloading it again",
                dir.display(),
                backend.kind()
            );
            remove_dir(dir)?;
        }
        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent).map_err(|error| FetchError::IO {
                path: parent.to_path_buf(),
                error,
            })?;
        }
        let source_url = dep.source_url();
        info!("Downloading {}", source_url);
        backend
            .clone_repo(&source_url, dir)
            .map_err(|error| FetchError::Download {
                import: dep.import.clone(),
                source_url,
                error,
            })?;
        Ok(true)
    }

    /// Remote imports the sources in `dir` use outside of tests.
    fn used_imports(&self, dir: &Path) -> BTreeSet<String> {
        match self.inner.scanner.analyze(dir) {
            Ok(stats) => stats.remote_imports().map(|s| s.import.clone()).collect(),
            Err(error) => {
                warn!("Could not scan {}: {}", dir.display(), error);
                BTreeSet::new()
            }
        }
    }

    fn remove_stale_imports(
        &self,
        dep: &Dep,
        graph: &ImportGraph,
        dir: &Path,
        previous: BTreeSet<String>,
    ) {
        let current = self.used_imports(dir);
        for import in previous.difference(&current) {
            if import_path::is_within(import, dep.root()) || graph.search(import).is_some() {
                continue;
            }
            let root = import_path::canonical_root(import);
            let Some(stale) = self.inner.workspace.import_dir(root) else {
                warn!("Not removing {} which lies outside the vendor area", root);
                continue;
            };
            if stale.exists() {
                info!("Removing {} which {} no longer uses", stale.display(), dep.import);
                if let Err(error) = std::fs::remove_dir_all(&stale) {
                    warn!("Could not remove {}: {}", stale.display(), error);
                }
            }
        }
    }
}

/// A compatible declaration resolves to the reference already in the graph.
fn pinned(dep: Dep, graph: &ImportGraph) -> Dep {
    match graph.search(&dep.import) {
        Some(mut resolved) if resolved.checkout != dep.checkout => {
            debug!("{} resolves to {}", dep, resolved);
            if dep.needs_fetch() {
                resolved.force_fetch();
            }
            resolved
        }
        _ => dep,
    }
}

fn remove_dir(dir: &Path) -> Result<(), FetchError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(FetchError::IO {
            path: dir.to_path_buf(),
            error,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        model::{declaration::Declaration, dep::Checkout},
        scan::ImportScanner,
        scm::fake::FakeScm,
    };
    use pretty_assertions::assert_eq;

    fn declaration(deps: &[(&str, &str)]) -> String {
        deps.iter()
            .map(|(key, body)| format!("[deps.{key}]\n{body}\n"))
            .collect()
    }

    fn load(deps: &[(&str, &str)], graph: ImportGraph, modified: bool) -> Dependencies {
        let declaration = Declaration::from_toml_str(&declaration(deps)).unwrap();
        Dependencies::from_declaration(&declaration, graph, modified).unwrap()
    }

    fn fetcher(workspace: &Workspace, scm: &FakeScm, clean: bool) -> Fetcher {
        let provider = Arc::new(scm.clone());
        let scanner = Arc::new(ImportScanner::default());
        if clean {
            Fetcher::cleaning(workspace.clone(), provider, scanner)
        } else {
            Fetcher::new(workspace.clone(), provider, scanner)
        }
    }

    #[tokio::test]
    async fn fetches_nested_declarations() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let nested = declaration(&[("b", "import = \"github.com/acme/b\"\ntag = \"v1.0.0\"")]);
        let scm = FakeScm::default()
            .repo("https://github.com/acme/a", &[("pinpack.toml", nested.as_str())])
            .repo("https://github.com/acme/b", &[("b.go", "package b\n")]);

        let graph = ImportGraph::new();
        let deps = load(
            &[("a", "import = \"github.com/acme/a/pkg\"\nbranch = \"main\"")],
            graph.clone(),
            true,
        );
        fetcher(&workspace, &scm, false).fetch(deps).await.unwrap();

        assert!(workspace
            .import_dir("github.com/acme/b")
            .unwrap()
            .join("b.go")
            .is_file());
        assert_eq!(
            scm.log(),
            vec![
                "checkout branch = main",
                "checkout tag = v1.0.0",
                "clone https://github.com/acme/a",
                "clone https://github.com/acme/b",
            ]
        );
        assert_eq!(
            graph
                .dependencies()
                .into_iter()
                .map(|d| d.import)
                .collect::<Vec<_>>(),
            vec!["github.com/acme/a/pkg", "github.com/acme/b"]
        );
    }

    #[tokio::test]
    async fn mutual_dependencies_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let needs_b = declaration(&[("b", "import = \"github.com/acme/b\"")]);
        let needs_a = declaration(&[("a", "import = \"github.com/acme/a\"")]);
        let scm = FakeScm::default()
            .repo("https://github.com/acme/a", &[("pinpack.toml", needs_b.as_str())])
            .repo("https://github.com/acme/b", &[("pinpack.toml", needs_a.as_str())]);

        let deps = load(&[("a", "import = \"github.com/acme/a\"")], ImportGraph::new(), true);
        fetcher(&workspace, &scm, false).fetch(deps).await.unwrap();
        assert_eq!(
            scm.log(),
            vec![
                "clone https://github.com/acme/a",
                "clone https://github.com/acme/b"
            ]
        );
    }

    #[tokio::test]
    async fn existing_checkout_is_updated_only_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let pinned = workspace.import_dir("github.com/acme/pinned").unwrap();
        let moving = workspace.import_dir("github.com/acme/moving").unwrap();
        std::fs::create_dir_all(pinned.join(".git")).unwrap();
        std::fs::create_dir_all(moving.join(".git")).unwrap();
        let scm = FakeScm::default();

        let deps = load(
            &[
                ("pinned", "import = \"github.com/acme/pinned\"\ncommit = \"abc\""),
                ("moving", "import = \"github.com/acme/moving\"\nbranch = \"dev\""),
            ],
            ImportGraph::new(),
            false,
        );
        fetcher(&workspace, &scm, false).fetch(deps).await.unwrap();

        assert_eq!(
            scm.log(),
            vec![
                "checkout branch = dev".to_string(),
                "checkout commit = abc".to_string(),
                format!("fetch {}", moving.display()),
            ]
        );
    }

    #[tokio::test]
    async fn checkout_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let scm = FakeScm::default().broken_checkout();
        let deps = load(
            &[("a", "import = \"github.com/acme/a\"\ntag = \"v9.9.9\"")],
            ImportGraph::new(),
            true,
        );
        fetcher(&workspace, &scm, false).fetch(deps).await.unwrap();
        assert!(workspace.import_dir("github.com/acme/a").unwrap().is_dir());
    }

    #[tokio::test]
    async fn download_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let scm = FakeScm::default().unreachable("https://github.com/acme/gone");
        let deps = load(
            &[("gone", "import = \"github.com/acme/gone\"")],
            ImportGraph::new(),
            true,
        );
        let err = fetcher(&workspace, &scm, false)
            .fetch(deps)
            .await
            .unwrap_err();
        assert!(
            matches!(err, FetchError::Download { ref import, .. } if import == "github.com/acme/gone")
        );
    }

    #[tokio::test]
    async fn nested_conflict_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let nested = declaration(&[("b", "import = \"github.com/acme/b\"\ncommit = \"abc\"")]);
        let scm = FakeScm::default().repo("https://github.com/acme/a", &[("pinpack.toml", nested.as_str())]);
        let deps = load(
            &[
                ("a", "import = \"github.com/acme/a\""),
                ("b", "import = \"github.com/acme/b\"\nbranch = \"master\""),
            ],
            ImportGraph::new(),
            true,
        );
        let err = fetcher(&workspace, &scm, false)
            .fetch(deps)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Dependency(DependencyError::Conflict { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sibling_declarations_pinning_one_root_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let from_a = declaration(&[("c", "import = \"github.com/acme/c\"\ncommit = \"aaa\"")]);
        let from_b = declaration(&[("c", "import = \"github.com/acme/c\"\ncommit = \"bbb\"")]);
        let scm = FakeScm::default()
            .repo("https://github.com/acme/a", &[("pinpack.toml", from_a.as_str())])
            .repo("https://github.com/acme/b", &[("pinpack.toml", from_b.as_str())]);
        let deps = load(
            &[
                ("a", "import = \"github.com/acme/a\""),
                ("b", "import = \"github.com/acme/b\""),
            ],
            ImportGraph::new(),
            true,
        );

        let err = fetcher(&workspace, &scm, false)
            .fetch(deps)
            .await
            .unwrap_err();
        match err {
            FetchError::Dependency(DependencyError::Conflict { root, .. }) => {
                assert_eq!(root, "github.com/acme/c")
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn clean_mode_removes_stale_imports() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());

        let a = workspace.import_dir("github.com/acme/a").unwrap();
        std::fs::create_dir_all(a.join(".git")).unwrap();
        std::fs::write(
            a.join("a.go"),
            "package a\nimport (\n\"github.com/old/lib/sub\"\n\"github.com/kept/lib\"\n\"github.com/acme/a/internal\"\n)\n",
        )
        .unwrap();
        let old = workspace.import_dir("github.com/old/lib").unwrap();
        let kept = workspace.import_dir("github.com/kept/lib").unwrap();
        std::fs::create_dir_all(&old).unwrap();
        std::fs::create_dir_all(&kept).unwrap();

        let scm = FakeScm::default().repo(
            "https://github.com/acme/a",
            &[("a.go", "package a\nimport \"fmt\"\n")],
        );
        let graph = ImportGraph::new();
        graph.insert(Dep::new("github.com/kept/lib"));
        let deps = load(
            &[("a", "import = \"github.com/acme/a\"\nbranch = \"main\"")],
            graph,
            true,
        );
        fetcher(&workspace, &scm, true).fetch(deps).await.unwrap();

        assert!(!old.exists());
        assert!(kept.exists());
        assert_eq!(
            std::fs::read_to_string(a.join("a.go")).unwrap(),
            "package a\nimport \"fmt\"\n"
        );
        assert!(scm
            .log()
            .contains(&"clone https://github.com/acme/a".to_string()));
    }

    #[tokio::test]
    async fn clean_mode_keeps_paths_outside_the_vendor_area() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let precious = dir.path().join("precious");
        std::fs::create_dir_all(&precious).unwrap();

        let a = workspace.import_dir("github.com/acme/a").unwrap();
        std::fs::create_dir_all(a.join(".git")).unwrap();
        std::fs::write(
            a.join("a.go"),
            "package a\nimport \"../../../precious\"\n",
        )
        .unwrap();

        let scm = FakeScm::default().repo(
            "https://github.com/acme/a",
            &[("a.go", "package a\nimport \"fmt\"\n")],
        );
        let deps = load(
            &[("a", "import = \"github.com/acme/a\"\nbranch = \"main\"")],
            ImportGraph::new(),
            true,
        );
        fetcher(&workspace, &scm, true).fetch(deps).await.unwrap();

        assert!(precious.is_dir());
    }

    #[test]
    fn compatible_pins_resolve_to_graph() {
        let graph = ImportGraph::new();
        let resolved =
            Dep::new("github.com/acme/codec").with_checkout(Checkout::Tag("v1.2.8".into()));
        graph.insert(resolved.clone());
        let mut requested =
            Dep::new("github.com/acme/codec/json").with_checkout(Checkout::Tag("v1.2.0".into()));
        requested.force_fetch();

        let dep = pinned(requested, &graph);
        assert_eq!(dep.checkout, resolved.checkout);
        assert!(dep.needs_fetch());
    }
}
