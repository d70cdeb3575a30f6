use std::path::Path;

use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    AutotagOption, Config, Cred, CredentialType, FetchOptions, Object, RemoteCallbacks,
    Repository,
};
use log::{debug, trace};

use crate::{
    model::dep::{Checkout, ScmKind},
    workspace::Workspace,
};

use super::{known_hosts, Scm, ScmError};

const SSH_USER: &str = "git";
const FETCH_REFSPECS: [&str; 2] = [
    "+refs/heads/*:refs/remotes/origin/*",
    "+refs/tags/*:refs/tags/*",
];
const IGNORE_PATTERNS: &str = "/bin\n/pkg\n";

#[derive(Debug, Default)]
pub struct GitScm;

impl GitScm {
    fn fetch_options(&self) -> FetchOptions<'static> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(credentials);
        callbacks.certificate_check(known_hosts::check_certificate);

        let mut fetch_options = FetchOptions::new();
        fetch_options
            .remote_callbacks(callbacks)
            .download_tags(AutotagOption::All);
        fetch_options
    }

    fn resolve<'r>(
        &self,
        repo: &'r Repository,
        dir: &Path,
        checkout: &Checkout,
    ) -> Result<Option<Object<'r>>, ScmError> {
        let candidates = match checkout {
            Checkout::Unset => return Ok(None),
            Checkout::Branch(branch) => vec![format!("origin/{branch}"), branch.clone()],
            Checkout::Commit(commit) => vec![commit.clone()],
            Checkout::Tag(tag) => vec![format!("refs/tags/{tag}")],
        };
        for candidate in &candidates {
            match repo.revparse_single(candidate) {
                Ok(object) => return Ok(Some(object)),
                Err(error) if error.code() == git2::ErrorCode::NotFound => {
                    trace!("{} not found in {}", candidate, dir.display());
                }
                Err(error) => return Err(error.into()),
            }
        }
        Err(ScmError::ReferenceNotFound {
            reference: checkout.to_string(),
            dir: dir.to_path_buf(),
        })
    }
}

impl Scm for GitScm {
    fn kind(&self) -> ScmKind {
        ScmKind::Git
    }

    fn clone_repo(&self, source: &str, destination: &Path) -> Result<(), ScmError> {
        trace!("Cloning {} into {}", source, destination.display());
        RepoBuilder::new()
            .fetch_options(self.fetch_options())
            .clone(source, destination)?;
        Ok(())
    }

    fn fetch_updates(&self, dir: &Path) -> Result<(), ScmError> {
        let repo = Repository::open(dir)?;
        let mut remote = repo.find_remote("origin")?;
        trace!("Fetching {:?} into {}", remote.url(), dir.display());
        remote.fetch(&FETCH_REFSPECS, Some(&mut self.fetch_options()), None)?;
        Ok(())
    }

    fn checkout(&self, dir: &Path, checkout: &Checkout) -> Result<(), ScmError> {
        let repo = Repository::open(dir)?;
        let Some(object) = self.resolve(&repo, dir, checkout)? else {
            return Ok(());
        };
        let commit = object.peel_to_commit()?;
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        repo.set_head_detached(commit.id())?;
        debug!("Checked out {} at {} in {}", checkout, commit.id(), dir.display());
        Ok(())
    }

    fn write_ignore_patterns(&self, workspace: &Workspace) -> Result<(), ScmError> {
        let vendor = workspace.vendor();
        std::fs::create_dir_all(&vendor)?;
        std::fs::write(vendor.join(".gitignore"), IGNORE_PATTERNS)?;
        Ok(())
    }
}

/// ssh remotes authenticate through the agent, http remotes through the configured git
/// credential helper.
fn credentials(
    url: &str,
    username: Option<&str>,
    allowed_types: CredentialType,
) -> Result<Cred, git2::Error> {
    trace!("{} asks for {:?} credentials", url, allowed_types);
    if allowed_types.contains(CredentialType::USERNAME) {
        Cred::username(SSH_USER)
    } else if allowed_types.contains(CredentialType::SSH_KEY) {
        Cred::ssh_key_from_agent(username.unwrap_or(SSH_USER))
    } else if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
        let config = Config::open_default()?;
        Cred::credential_helper(&config, url, username)
    } else {
        Err(git2::Error::from_str(&format!(
            "no supported credentials for {url}"
        )))
    }
}
