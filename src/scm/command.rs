use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

use log::{debug, trace};

use crate::{
    model::dep::{Checkout, ScmKind},
    workspace::{Workspace, VENDOR_DIR, WORKSPACE_DIR},
};

use super::{Scm, ScmError};

/// The kinds driven through a command line tool. Git goes through libgit2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tool {
    Hg,
    Svn,
    Bzr,
}

/// A backend driven through its command line tool.
#[derive(Debug, Clone)]
pub struct CommandScm {
    tool: Tool,
}

impl CommandScm {
    /// `None` for git, which has no command line backend.
    pub fn new(kind: ScmKind) -> Option<Self> {
        let tool = match kind {
            ScmKind::Git => return None,
            ScmKind::Hg => Tool::Hg,
            ScmKind::Svn => Tool::Svn,
            ScmKind::Bzr => Tool::Bzr,
        };
        Some(CommandScm { tool })
    }

    fn program(&self) -> &'static str {
        match self.tool {
            Tool::Hg => "hg",
            Tool::Svn => "svn",
            Tool::Bzr => "bzr",
        }
    }

    fn run(&self, args: &[String], dir: &Path) -> Result<String, ScmError> {
        let command = format!("{} {}", self.program(), args.join(" "));
        trace!("Running `{}` in {}", command, dir.display());
        let out = Command::new(self.program())
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(|error| ScmError::Spawn {
                command: command.clone(),
                error,
            })?;
        if !out.status.success() {
            return Err(ScmError::Command {
                command,
                dir: dir.to_path_buf(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    fn clone_args(&self, source: &str, destination: &Path) -> Vec<String> {
        let verb = match self.tool {
            Tool::Hg => "clone",
            Tool::Svn => "checkout",
            Tool::Bzr => "branch",
        };
        vec![
            verb.to_string(),
            source.to_string(),
            destination.to_string_lossy().into_owned(),
        ]
    }

    fn update_args(&self) -> Vec<String> {
        let args: &[&str] = match self.tool {
            Tool::Hg | Tool::Bzr => &["pull"],
            Tool::Svn => &["update"],
        };
        args.iter().map(|a| a.to_string()).collect()
    }

    fn checkout_args(&self, checkout: &Checkout) -> Option<Vec<String>> {
        let args = match (self.tool, checkout) {
            (_, Checkout::Unset) => return None,
            (Tool::Hg, Checkout::Commit(c)) => vec!["update".into(), "-c".into(), c.clone()],
            (Tool::Hg, Checkout::Branch(r) | Checkout::Tag(r)) => {
                vec!["checkout".into(), r.clone()]
            }
            (Tool::Svn, Checkout::Commit(c)) => vec!["up".into(), "-r".into(), c.clone()],
            (Tool::Svn, Checkout::Branch(b)) => {
                vec!["switch".into(), format!("^/branches/{b}")]
            }
            (Tool::Svn, Checkout::Tag(t)) => vec!["switch".into(), format!("^/tags/{t}")],
            (Tool::Bzr, Checkout::Commit(c)) => vec!["update".into(), "-r".into(), c.clone()],
            (Tool::Bzr, Checkout::Branch(b)) => {
                vec!["update".into(), "-r".into(), format!("branch:{b}")]
            }
            (Tool::Bzr, Checkout::Tag(t)) => {
                vec!["update".into(), "-r".into(), format!("tag:{t}")]
            }
        };
        Some(args)
    }
}

/// Vendor build directories relative to the project root.
fn ignored_dirs() -> [String; 2] {
    ["bin", "pkg"].map(|d| format!("{WORKSPACE_DIR}/{VENDOR_DIR}/{d}"))
}

impl Scm for CommandScm {
    fn kind(&self) -> ScmKind {
        match self.tool {
            Tool::Hg => ScmKind::Hg,
            Tool::Svn => ScmKind::Svn,
            Tool::Bzr => ScmKind::Bzr,
        }
    }

    fn clone_repo(&self, source: &str, destination: &Path) -> Result<(), ScmError> {
        let parent = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;
        self.run(&self.clone_args(source, destination), &parent)?;
        Ok(())
    }

    fn fetch_updates(&self, dir: &Path) -> Result<(), ScmError> {
        self.run(&self.update_args(), dir)?;
        Ok(())
    }

    fn checkout(&self, dir: &Path, checkout: &Checkout) -> Result<(), ScmError> {
        if let Some(args) = self.checkout_args(checkout) {
            self.run(&args, dir)?;
            debug!("Checked out {} in {}", checkout, dir.display());
        }
        Ok(())
    }

    fn write_ignore_patterns(&self, workspace: &Workspace) -> Result<(), ScmError> {
        let [bin, pkg] = ignored_dirs();
        match self.tool {
            Tool::Hg => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(workspace.root().join(".hgignore"))?;
                write!(file, "\nsyntax: glob\n{bin}\n{pkg}\n")?;
            }
            Tool::Svn => {
                let args = vec![
                    "propset".to_string(),
                    "svn:ignore".to_string(),
                    "bin\npkg".to_string(),
                    format!("{WORKSPACE_DIR}/{VENDOR_DIR}"),
                ];
                self.run(&args, workspace.root())?;
            }
            Tool::Bzr => {
                self.run(&["ignore".to_string(), bin, pkg], workspace.root())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn args(kind: ScmKind, checkout: Checkout) -> Option<Vec<String>> {
        CommandScm::new(kind).unwrap().checkout_args(&checkout)
    }

    #[test]
    fn checkout_commands() {
        assert_eq!(args(ScmKind::Hg, Checkout::Unset), None);
        assert_eq!(
            args(ScmKind::Hg, Checkout::Commit("abc".into())).unwrap(),
            vec!["update", "-c", "abc"]
        );
        assert_eq!(
            args(ScmKind::Hg, Checkout::Tag("v1.0".into())).unwrap(),
            vec!["checkout", "v1.0"]
        );
        assert_eq!(
            args(ScmKind::Svn, Checkout::Branch("stable".into())).unwrap(),
            vec!["switch", "^/branches/stable"]
        );
        assert_eq!(
            args(ScmKind::Svn, Checkout::Commit("42".into())).unwrap(),
            vec!["up", "-r", "42"]
        );
        assert_eq!(
            args(ScmKind::Bzr, Checkout::Tag("1.2".into())).unwrap(),
            vec!["update", "-r", "tag:1.2"]
        );
        assert_eq!(
            args(ScmKind::Bzr, Checkout::Branch("trunk".into())).unwrap(),
            vec!["update", "-r", "branch:trunk"]
        );
    }

    #[test]
    fn git_has_no_command_backend() {
        assert!(CommandScm::new(ScmKind::Git).is_none());
        for kind in [ScmKind::Hg, ScmKind::Svn, ScmKind::Bzr] {
            assert_eq!(CommandScm::new(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn clone_commands() {
        let destination = Path::new("/vendor/src/launchpad.net/goyaml");
        assert_eq!(
            CommandScm::new(ScmKind::Bzr)
                .unwrap()
                .clone_args("lp:goyaml", destination),
            vec!["branch", "lp:goyaml", "/vendor/src/launchpad.net/goyaml"]
        );
        assert_eq!(
            CommandScm::new(ScmKind::Svn)
                .unwrap()
                .clone_args("svn://host/repo", destination)[0],
            "checkout"
        );
    }

    #[test]
    fn hg_ignore_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".hgignore"), "*.orig\n").unwrap();
        let workspace = Workspace::new(dir.path());
        CommandScm::new(ScmKind::Hg)
            .unwrap()
            .write_ignore_patterns(&workspace)
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".hgignore")).unwrap(),
            "*.orig\n\nsyntax: glob\n.pinpack/vendor/bin\n.pinpack/vendor/pkg\n"
        );
    }

    #[test]
    fn missing_tool_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let scm = CommandScm { tool: Tool::Bzr };
        let err = scm
            .run(&["--definitely-not-an-option".to_string()], &dir.path().join("absent"))
            .unwrap_err();
        assert!(matches!(err, ScmError::Spawn { .. }));
    }
}
