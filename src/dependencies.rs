use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use log::{debug, trace};
use thiserror::Error;

use crate::{
    graph::{ImportGraph, Validity},
    model::{declaration::Declaration, dep::Dep, ParseError},
    scan::ProjectStats,
};

#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("Error while parsing declaration: {0}")]
    Parsing(#[from] ParseError),
    #[error("Conflicting declarations for {root}: `{existing}` is already resolved but `{key}` requests `{candidate}`")]
    Conflict {
        root: String,
        key: String,
        existing: Dep,
        candidate: Dep,
    },
}

/// A problem found by comparing the declared dependencies with the imports in use.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectError {
    #[error("{import} is imported but not managed by any declared dependency (used in {})", display_locations(.locations))]
    UnmanagedImport {
        import: String,
        locations: Vec<PathBuf>,
    },
    #[error("{import} is declared but never imported")]
    UnusedDependency { import: String },
}

fn display_locations(locations: &[PathBuf]) -> String {
    locations
        .iter()
        .map(|l| l.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every validation error of a run, reported together.
#[derive(Error, Debug)]
#[error("{} validation error(s): {}", .0.len(), .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
pub struct ValidationFailed(pub Vec<ProjectError>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Key of the entry in the `[deps]` table.
    pub key: String,
    pub dep: Dep,
}

/// The dependencies of one declaration file, bound to the graph shared by the whole run.
#[derive(Debug, Clone)]
pub struct Dependencies {
    entries: Vec<Entry>,
    graph: ImportGraph,
}

impl Dependencies {
    pub fn new(graph: ImportGraph) -> Self {
        Dependencies {
            entries: Vec::new(),
            graph,
        }
    }

    pub fn load(
        path: &Path,
        graph: ImportGraph,
        declaration_modified: bool,
    ) -> Result<Self, DependencyError> {
        let declaration = Declaration::from_file(path)?;
        Self::from_declaration(&declaration, graph, declaration_modified)
    }

    /// Builds the set, validating each entry against `graph` before inserting it.
    /// The first conflict aborts construction.
    pub fn from_declaration(
        declaration: &Declaration,
        graph: ImportGraph,
        declaration_modified: bool,
    ) -> Result<Self, DependencyError> {
        let mut dependencies = Dependencies::new(graph);
        for declared in &declaration.deps {
            let mut dep = declared.to_dep()?;
            dep.decide_fetch(declaration_modified);
            dependencies.push(declared.key.clone(), dep)?;
        }
        Ok(dependencies)
    }

    pub fn push(&mut self, key: String, dep: Dep) -> Result<(), DependencyError> {
        match self.graph.insert_if_valid(&dep) {
            Validity::Absent => {
                trace!("Inserted {} into the import graph", dep);
            }
            Validity::Compatible(existing) => {
                debug!("{} is already satisfied by {}", dep, existing);
            }
            Validity::Conflicting(existing) => {
                return Err(DependencyError::Conflict {
                    root: dep.root().to_owned(),
                    key,
                    existing,
                    candidate: dep,
                })
            }
        }
        self.entries.push(Entry { key, dep });
        Ok(())
    }

    pub fn graph(&self) -> &ImportGraph {
        &self.graph
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn deps(&self) -> impl Iterator<Item = &Dep> {
        self.entries.iter().map(|e| &e.dep)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    /// The dependency managing `import`, if any.
    pub fn includes(&self, import: &str) -> Option<Dep> {
        self.graph.search(import)
    }

    /// Collects every remote import that no dependency manages and every declared
    /// dependency that nothing imports.
    pub fn validate(&self, stats: &ProjectStats) -> Vec<ProjectError> {
        let mut errors = Vec::new();
        let mut included = HashSet::new();

        for (import, usage) in &stats.imports {
            if !usage.remote {
                continue;
            }
            match self.includes(import) {
                Some(dep) => {
                    included.insert(dep.root().to_owned());
                }
                None => errors.push(ProjectError::UnmanagedImport {
                    import: import.clone(),
                    locations: usage.locations.iter().cloned().collect(),
                }),
            }
        }

        for dep in self.deps() {
            if !included.contains(dep.root()) && !stats.is_import_used(&dep.import) {
                errors.push(ProjectError::UnusedDependency {
                    import: dep.import.clone(),
                });
            }
        }
        errors
    }

    /// Entries that are missing from `lock` or pinned differently there, each forced to be
    /// fetched. The result stays bound to this set's graph.
    pub fn diff_against(&self, lock: &Dependencies) -> Dependencies {
        let mut diff = Dependencies::new(self.graph.clone());
        for entry in &self.entries {
            let changed = match lock.includes(&entry.dep.import) {
                None => true,
                Some(locked) => entry.dep.differs_from(&locked),
            };
            if changed {
                let mut dep = entry.dep.clone();
                dep.force_fetch();
                diff.entries.push(Entry {
                    key: entry.key.clone(),
                    dep,
                });
            } else {
                debug!("{} is unchanged since it was vendored", entry.dep.import);
            }
        }
        diff
    }
}

impl IntoIterator for Dependencies {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
