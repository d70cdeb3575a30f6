use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use super::{import_path, ParseError};

/// Repository backends a dependency can be fetched with.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Default, Ord, PartialOrd)]
pub enum ScmKind {
    #[default]
    Git,
    Hg,
    Svn,
    Bzr,
}

impl ScmKind {
    pub const ALL: [ScmKind; 4] = [ScmKind::Git, ScmKind::Hg, ScmKind::Svn, ScmKind::Bzr];

    /// Metadata directory a checkout of this kind carries at its root.
    pub fn marker(&self) -> &'static str {
        match self {
            ScmKind::Git => ".git",
            ScmKind::Hg => ".hg",
            ScmKind::Svn => ".svn",
            ScmKind::Bzr => ".bzr",
        }
    }
}

impl FromStr for ScmKind {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.to_ascii_lowercase();
        match value.as_str() {
            "git" => Ok(ScmKind::Git),
            "hg" => Ok(ScmKind::Hg),
            "svn" => Ok(ScmKind::Svn),
            "bzr" => Ok(ScmKind::Bzr),
            _ => Err(ParseError::InvalidScm(value)),
        }
    }
}

impl Display for ScmKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScmKind::Git => f.write_str("git"),
            ScmKind::Hg => f.write_str("hg"),
            ScmKind::Svn => f.write_str("svn"),
            ScmKind::Bzr => f.write_str("bzr"),
        }
    }
}

/// Which state of the repository a dependency is pinned to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Checkout {
    #[default]
    Unset,
    Branch(String),
    Commit(String),
    Tag(String),
}

impl Checkout {
    /// Builds a selector from the optional declaration fields.
    /// Returns `None` when more than one of them is set.
    pub fn from_fields(
        branch: Option<String>,
        commit: Option<String>,
        tag: Option<String>,
    ) -> Option<Checkout> {
        match (branch, commit, tag) {
            (None, None, None) => Some(Checkout::Unset),
            (Some(branch), None, None) => Some(Checkout::Branch(branch)),
            (None, Some(commit), None) => Some(Checkout::Commit(commit)),
            (None, None, Some(tag)) => Some(Checkout::Tag(tag)),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Checkout::Unset => None,
            Checkout::Branch(_) => Some("branch"),
            Checkout::Commit(_) => Some("commit"),
            Checkout::Tag(_) => Some("tag"),
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            Checkout::Unset => None,
            Checkout::Branch(r) | Checkout::Commit(r) | Checkout::Tag(r) => Some(r),
        }
    }

    pub fn is_set(&self) -> bool {
        self != &Checkout::Unset
    }

    /// Commits and tags never move once resolved.
    pub fn is_immutable(&self) -> bool {
        matches!(self, Checkout::Commit(_) | Checkout::Tag(_))
    }
}

impl Display for Checkout {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.kind(), self.reference()) {
            (Some(kind), Some(reference)) => write!(f, "{} = {}", kind, reference),
            _ => f.write_str("unpinned"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dep {
    pub import: String,
    pub checkout: Checkout,
    pub source: Option<String>,
    pub scm: Option<ScmKind>,
    needs_fetch: bool,
}

impl Dep {
    pub fn new(import: impl Into<String>) -> Dep {
        Dep {
            import: import.into(),
            checkout: Checkout::Unset,
            source: None,
            scm: None,
            needs_fetch: false,
        }
    }

    pub fn with_checkout(mut self, checkout: Checkout) -> Dep {
        self.checkout = checkout;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Dep {
        self.source = Some(source.into());
        self
    }

    pub fn with_scm(mut self, scm: ScmKind) -> Dep {
        self.scm = Some(scm);
        self
    }

    /// Canonical repository root of the import identifier.
    pub fn root(&self) -> &str {
        import_path::canonical_root(&self.import)
    }

    pub fn source_url(&self) -> String {
        self.source
            .clone()
            .unwrap_or_else(|| format!("https://{}", self.root()))
    }

    /// Backend to use when nothing is found on disk.
    pub fn default_scm(&self) -> ScmKind {
        self.scm
            .unwrap_or_else(|| import_path::implied_scm(&self.import))
    }

    pub fn needs_fetch(&self) -> bool {
        self.needs_fetch
    }

    /// A changed declaration invalidates every previous resolution, otherwise only moving
    /// references (branches and unpinned heads) are refreshed.
    pub fn decide_fetch(&mut self, declaration_modified: bool) {
        self.needs_fetch = declaration_modified || !self.checkout.is_immutable();
    }

    pub fn force_fetch(&mut self) {
        self.needs_fetch = true;
    }

    /// Whether `other` pins to a different selector or reference.
    pub fn differs_from(&self, other: &Dep) -> bool {
        self.checkout != other.checkout
    }
}

impl Display for Dep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.checkout {
            Checkout::Unset => write!(f, "import = {}", self.import),
            ref checkout => write!(f, "import = {}, {}", self.import, checkout),
        }
    }
}
