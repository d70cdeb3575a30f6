//! Prefix tree of resolved dependencies keyed by canonical repository root.
//!
//! Every distinct repository root owns exactly one leaf. Sub-package imports walk the tree
//! until they reach that leaf, which is how two imports of the same repository end up sharing
//! one pinned reference.
//!
//! The graph is shared by every [`crate::dependencies::Dependencies`] of a run, including the
//! sets loaded concurrently by fetch workers. Declarations go through
//! [`ImportGraph::insert_if_valid`], which checks and inserts under one write lock, so two
//! workers pinning the same root differently always produce one conflict.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use semver::Version;

use crate::model::{
    dep::{Checkout, Dep},
    import_path,
};

#[derive(Debug, Default)]
struct Node {
    segment: String,
    dependency: Option<Dep>,
    children: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<Node>,
    roots: BTreeMap<String, usize>,
}

/// Outcome of checking a candidate against the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    /// No dependency resolved for this root yet.
    Absent,
    /// The resolved dependency already satisfies the candidate.
    Compatible(Dep),
    /// The resolved dependency pins the root to something else.
    Conflicting(Dep),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Validity::Conflicting(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportGraph {
    arena: Arc<RwLock<Arena>>,
}

impl ImportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, dependency: Dep) {
        self.write().insert(dependency);
    }

    /// Finds the dependency owning `import`: the first leaf along its segments.
    pub fn search(&self, import: &str) -> Option<Dep> {
        self.read().search(import).cloned()
    }

    pub fn valid(&self, candidate: &Dep) -> Validity {
        validity(self.read().search(&candidate.import), candidate)
    }

    /// Checks `candidate` and inserts it when its root is absent, under one write lock.
    /// Concurrent callers racing on the same root see each other's insert.
    pub fn insert_if_valid(&self, candidate: &Dep) -> Validity {
        let mut arena = self.write();
        let validity = validity(arena.search(&candidate.import), candidate);
        if validity == Validity::Absent {
            arena.insert(candidate.clone());
        }
        validity
    }

    /// Pre-order walk: `visit(segment, depth, dependency)` for every node.
    pub fn visit(&self, mut visit: impl FnMut(&str, usize, Option<&Dep>)) {
        let arena = self.read();
        let mut stack: Vec<(usize, usize)> = arena.roots.values().rev().map(|&i| (i, 0)).collect();
        while let Some((index, depth)) = stack.pop() {
            let node = &arena.nodes[index];
            visit(&node.segment, depth, node.dependency.as_ref());
            stack.extend(node.children.values().rev().map(|&i| (i, depth + 1)));
        }
    }

    /// Every resolved dependency, ordered by root.
    pub fn dependencies(&self) -> Vec<Dep> {
        let mut dependencies = Vec::new();
        self.visit(|_, _, dependency| {
            if let Some(dependency) = dependency {
                dependencies.push(dependency.clone());
            }
        });
        dependencies
    }

    // Poisoning is ignored: an interrupted insert leaves at most an empty interior node.
    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.arena.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Arena {
    fn insert(&mut self, dependency: Dep) {
        let root = dependency.root().to_owned();
        let mut segments = import_path::segments(&root);
        let Some(first) = segments.next() else {
            return;
        };

        let mut current = self.root_child(first);
        for segment in segments {
            current = self.child(current, segment);
        }
        self.nodes[current].dependency = Some(dependency);
    }

    fn search(&self, import: &str) -> Option<&Dep> {
        let mut segments = import_path::segments(import);
        let mut current = *self.roots.get(segments.next()?)?;
        loop {
            let node = &self.nodes[current];
            if let Some(dependency) = &node.dependency {
                return Some(dependency);
            }
            current = *node.children.get(segments.next()?)?;
        }
    }

    fn push(&mut self, segment: &str) -> usize {
        self.nodes.push(Node {
            segment: segment.to_owned(),
            ..Default::default()
        });
        self.nodes.len() - 1
    }

    fn root_child(&mut self, segment: &str) -> usize {
        if let Some(&index) = self.roots.get(segment) {
            return index;
        }
        let index = self.push(segment);
        self.roots.insert(segment.to_owned(), index);
        index
    }

    fn child(&mut self, parent: usize, segment: &str) -> usize {
        if let Some(&index) = self.nodes[parent].children.get(segment) {
            return index;
        }
        let index = self.push(segment);
        self.nodes[parent].children.insert(segment.to_owned(), index);
        index
    }
}

fn validity(existing: Option<&Dep>, candidate: &Dep) -> Validity {
    match existing {
        None => Validity::Absent,
        Some(existing) if compatible(existing, candidate) => Validity::Compatible(existing.clone()),
        Some(existing) => Validity::Conflicting(existing.clone()),
    }
}

fn compatible(existing: &Dep, candidate: &Dep) -> bool {
    match (&existing.checkout, &candidate.checkout) {
        (Checkout::Tag(resolved), Checkout::Tag(requested)) => {
            resolved == requested || pessimistic_satisfies(resolved, requested)
        }
        (resolved, requested) => resolved == requested,
    }
}

/// `resolved` satisfies `requested` when both share major.minor and the resolved patch is
/// at least the requested one.
fn pessimistic_satisfies(resolved: &str, requested: &str) -> bool {
    match (parse_tag(resolved), parse_tag(requested)) {
        (Some(resolved), Some(requested)) => {
            resolved.major == requested.major
                && resolved.minor == requested.minor
                && resolved.patch >= requested.patch
        }
        _ => false,
    }
}

/// Tags may carry any prefix up to their last `v` and omit trailing components.
fn parse_tag(tag: &str) -> Option<Version> {
    let version = tag.rsplit('v').next().unwrap_or(tag);
    let mut parts = version.splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Some(0), |m| m.parse().ok())?;
    let patch = match parts.next() {
        Some(rest) => Version::parse(&format!("{major}.{minor}.{rest}")).ok()?.patch,
        None => 0,
    };
    Some(Version::new(major, minor, patch))
}
