//! Import identifiers and the repository hosting shapes used to derive their canonical root.
//!
//! A sub-package import such as `github.com/acme/lib/codec` lives in the repository
//! `github.com/acme/lib`. Hosts that are not recognized keep the full identifier as root.

use std::sync::OnceLock;

use regex_lite::Regex;

use super::dep::ScmKind;

struct HostPattern {
    regex: Regex,
    scm: Option<ScmKind>,
}

impl HostPattern {
    fn new(pattern: &str, scm: Option<ScmKind>) -> Self {
        HostPattern {
            regex: Regex::new(pattern).unwrap(),
            scm,
        }
    }
}

fn host_patterns() -> &'static [HostPattern] {
    static PATTERNS: OnceLock<Vec<HostPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            HostPattern::new(
                r"^(?P<root>code\.google\.com/p/(?P<project>[a-z0-9\-]+)(\.(?P<subrepo>[a-z0-9\-]+))?)(/[A-Za-z0-9_.\-]+)*$",
                Some(ScmKind::Hg),
            ),
            HostPattern::new(
                r"^(?P<root>github\.com/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
                Some(ScmKind::Git),
            ),
            HostPattern::new(
                r"^(?P<root>bitbucket\.org/(?P<bitname>[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+))(/[A-Za-z0-9_.\-]+)*$",
                Some(ScmKind::Git),
            ),
            HostPattern::new(
                r"^(?P<root>launchpad\.net/((?P<project>[A-Za-z0-9_.\-]+)(?P<series>/[A-Za-z0-9_.\-]+)?|~[A-Za-z0-9_.\-]+/(\+junk|[A-Za-z0-9_.\-]+)/[A-Za-z0-9_.\-]+))(/[A-Za-z0-9_.\-]+)*$",
                Some(ScmKind::Bzr),
            ),
            // Any server, with the scm spelled out as a path suffix.
            HostPattern::new(
                r"^(?P<root>(?P<repo>([a-z0-9.\-]+\.)+[a-z0-9.\-]+(:[0-9]+)?/[A-Za-z0-9_.\-/]*?)\.(?P<vcs>bzr|git|hg|svn))(/[A-Za-z0-9_.\-]+)*$",
                None,
            ),
        ]
    })
}

/// Returns the repository root owning `import`.
pub fn canonical_root(import: &str) -> &str {
    for pattern in host_patterns() {
        if let Some(root) = pattern.regex.captures(import).and_then(|c| c.name("root")) {
            return root.as_str();
        }
    }
    import.trim_end_matches('/')
}

/// The backend a repository host implies, `git` when the host says nothing.
pub fn implied_scm(import: &str) -> ScmKind {
    for pattern in host_patterns() {
        if let Some(captures) = pattern.regex.captures(import) {
            if let Some(scm) = pattern.scm {
                return scm;
            }
            if let Some(vcs) = captures.name("vcs") {
                return vcs.as_str().parse().unwrap_or_default();
            }
        }
    }
    ScmKind::default()
}

pub fn segments(import: &str) -> impl Iterator<Item = &str> {
    import.split('/').filter(|segment| !segment.is_empty())
}

/// Whether every segment of `import` is a plain name: not empty, `.` or `..`, and not
/// absolute. A trailing `/` is tolerated.
pub fn is_plain(import: &str) -> bool {
    let trimmed = import.trim_end_matches('/');
    !trimmed.is_empty()
        && !trimmed.contains('\\')
        && trimmed
            .split('/')
            .all(|segment| !matches!(segment, "" | "." | ".."))
}

/// Whether `import` is `root` itself or one of its sub-packages.
pub fn is_within(import: &str, root: &str) -> bool {
    match import.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
