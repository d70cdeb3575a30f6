use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use log::trace;
use regex_lite::Regex;
use thiserror::Error;

use crate::model::import_path;

pub const DEFAULT_EXTENSION: &str = "go";

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Error while scanning {path}: {error}")]
    IO {
        path: PathBuf,
        error: std::io::Error,
    },
}

/// How a single import identifier is used across a source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub import: String,
    /// The identifier names a remote repository rather than a local or standard package.
    pub remote: bool,
    /// Every location is a test file.
    pub test: bool,
    pub locations: BTreeSet<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectStats {
    pub files: Vec<PathBuf>,
    pub imports: BTreeMap<String, ImportStats>,
}

impl ProjectStats {
    pub fn record(&mut self, import: &str, location: &Path, test: bool) {
        let stats = self
            .imports
            .entry(import.to_owned())
            .or_insert_with(|| ImportStats {
                import: import.to_owned(),
                remote: is_remote(import),
                test: true,
                locations: BTreeSet::new(),
            });
        stats.test &= test;
        stats.locations.insert(location.to_path_buf());
    }

    /// Whether `import` or one of its sub-packages is imported anywhere.
    pub fn is_import_used(&self, import: &str) -> bool {
        self.imports
            .keys()
            .any(|used| import_path::is_within(used, import))
    }

    /// Remote imports used outside of tests.
    pub fn remote_imports(&self) -> impl Iterator<Item = &ImportStats> {
        self.imports.values().filter(|s| s.remote && !s.test)
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        let remote = self.imports.values().filter(|s| s.remote).count();
        let _ = writeln!(out, "{} source files", self.files.len());
        let _ = writeln!(
            out,
            "{} imports ({} remote, {} local)",
            self.imports.len(),
            remote,
            self.imports.len() - remote
        );
        for stats in self.imports.values() {
            let _ = writeln!(
                out,
                "  {}{}{} - {} location(s)",
                stats.import,
                if stats.remote { " [remote]" } else { "" },
                if stats.test { " [test]" } else { "" },
                stats.locations.len()
            );
        }
        out
    }
}

fn is_remote(import: &str) -> bool {
    import_path::is_plain(import)
        && import_path::segments(import)
            .next()
            .is_some_and(|host| host.contains('.'))
}

/// Produces the import-usage report of a source tree.
pub trait SourceScanner: Send + Sync {
    fn analyze(&self, root: &Path) -> Result<ProjectStats, ScanError>;
}

/// Scans source files of one extension for `import "path"` clauses, single or grouped.
#[derive(Debug, Clone)]
pub struct ImportScanner {
    extension: String,
}

impl Default for ImportScanner {
    fn default() -> Self {
        ImportScanner::new(DEFAULT_EXTENSION)
    }
}

impl ImportScanner {
    pub fn new(extension: impl Into<String>) -> Self {
        ImportScanner {
            extension: extension.into(),
        }
    }

    fn is_test_file(&self, path: &Path) -> bool {
        path.file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.ends_with("_test"))
    }

    fn scan_dir(&self, root: &Path, dir: &Path, stats: &mut ProjectStats) -> Result<(), ScanError> {
        let io = |error| ScanError::IO {
            path: dir.to_path_buf(),
            error,
        };
        let mut entries = std::fs::read_dir(dir)
            .map_err(io)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(io)?;
        entries.sort();

        for path in entries {
            if path.is_dir() {
                if !skip_dir(&path) {
                    self.scan_dir(root, &path, stats)?;
                }
            } else if path.extension().is_some_and(|e| e == self.extension.as_str()) {
                let source = std::fs::read_to_string(&path).map_err(|error| ScanError::IO {
                    path: path.clone(),
                    error,
                })?;
                let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                let test = self.is_test_file(&path);
                for import in scan_imports_in_text(&source) {
                    stats.record(&import, &relative, test);
                }
                trace!("Scanned {}", relative.display());
                stats.files.push(relative);
            }
        }
        Ok(())
    }
}

impl SourceScanner for ImportScanner {
    fn analyze(&self, root: &Path) -> Result<ProjectStats, ScanError> {
        let mut stats = ProjectStats::default();
        if root.is_dir() {
            self.scan_dir(root, root, &mut stats)?;
        }
        Ok(stats)
    }
}

fn skip_dir(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.starts_with('.') || name.starts_with('_') || name == "testdata",
        None => true,
    }
}

pub fn scan_imports_in_text(src: &str) -> BTreeSet<String> {
    static SINGLE: OnceLock<Regex> = OnceLock::new();
    static GROUP: OnceLock<Regex> = OnceLock::new();
    static GROUP_LINE: OnceLock<Regex> = OnceLock::new();

    let single = SINGLE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*import\s+(?:[A-Za-z_.][A-Za-z0-9_]*\s+)?"([^"]+)""#).unwrap()
    });
    let group = GROUP.get_or_init(|| Regex::new(r"(?m)^\s*import\s*\(([^)]*)\)").unwrap());
    let group_line = GROUP_LINE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*(?:[A-Za-z_.][A-Za-z0-9_]*\s+)?"([^"]+)""#).unwrap()
    });

    let mut imports: BTreeSet<String> = single
        .captures_iter(src)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();
    for block in group.captures_iter(src).filter_map(|c| c.get(1)) {
        imports.extend(
            group_line
                .captures_iter(block.as_str())
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string())),
        );
    }
    imports
}
