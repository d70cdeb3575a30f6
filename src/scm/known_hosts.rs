//! Host key verification for ssh remotes against OpenSSH `known_hosts` files.

use std::path::{Path, PathBuf};

use git2::{cert::Cert, CertificateCheckStatus};
use log::trace;
use ssh_key::{known_hosts::HostPatterns, KnownHosts};

const GLOBAL_KNOWN_HOSTS: &str = "/etc/ssh/ssh_known_hosts";

/// The user's `known_hosts`, then the system-wide one.
fn known_hosts_files() -> Vec<PathBuf> {
    let mut files = Vec::with_capacity(2);
    if let Some(home) = std::env::var_os("HOME") {
        files.push(Path::new(&home).join(".ssh/known_hosts"));
    }
    files.push(PathBuf::from(GLOBAL_KNOWN_HOSTS));
    files
}

/// Accepts host keys listed in a `known_hosts` file and leaves every other certificate to
/// libgit2.
pub fn check_certificate(
    certificate: &Cert<'_>,
    host: &str,
) -> Result<CertificateCheckStatus, git2::Error> {
    let Some(hostkey) = certificate.as_hostkey().and_then(|h| h.hostkey()) else {
        return Ok(CertificateCheckStatus::CertificatePassthrough);
    };
    if is_known(host, hostkey, &known_hosts_files()) {
        Ok(CertificateCheckStatus::CertificateOk)
    } else {
        trace!("No known host entry for {}", host);
        Ok(CertificateCheckStatus::CertificatePassthrough)
    }
}

fn is_known(host: &str, hostkey: &[u8], files: &[PathBuf]) -> bool {
    let host = host.to_lowercase();
    files.iter().any(|file| {
        let entries = match KnownHosts::read_file(file) {
            Ok(entries) => entries,
            Err(error) => {
                trace!("Skipping {}: {}", file.display(), error);
                return false;
            }
        };
        entries.iter().any(|entry| {
            host_matches(&host, entry.host_patterns())
                && entry.public_key().to_bytes().as_deref() == Ok(hostkey)
        })
    })
}

/// OpenSSH pattern-list semantics: a negated pattern that matches rejects the host outright.
fn host_matches(host: &str, patterns: &HostPatterns) -> bool {
    let HostPatterns::Patterns(patterns) = patterns else {
        // Hashed names need HMAC support
        return false;
    };
    let mut matched = false;
    for pattern in patterns {
        let pattern = pattern.to_lowercase();
        match pattern.strip_prefix('!') {
            Some(negated) if wildcard_match(negated, host) => return false,
            Some(_) => {}
            None => matched |= wildcard_match(&pattern, host),
        }
    }
    matched
}

/// `*` and `?` wildcards. A pattern that does not parse matches nothing.
fn wildcard_match(pattern: &str, host: &str) -> bool {
    glob::Pattern::new(pattern).is_ok_and(|pattern| pattern.matches(host))
}
