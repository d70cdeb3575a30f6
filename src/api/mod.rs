use std::{ffi::OsString, sync::Arc};

use tokio::runtime::Runtime;

use crate::{
    cli::command_handlers::{
        do_dependency_tree, do_install, do_resolve, do_run_tool, do_stats, do_vendor, Resolution,
    },
    scan::SourceScanner,
    scm::ScmProvider,
    workspace::Workspace,
};

mod builder;

pub use builder::PinpackBuilder;

pub struct Pinpack {
    workspace: Workspace,
    tool_command: String,
    tool_env: String,
    scm: Arc<dyn ScmProvider>,
    scanner: Arc<dyn SourceScanner>,
    runtime: Runtime,
}

impl Pinpack {
    pub fn builder() -> PinpackBuilder {
        PinpackBuilder::default()
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Loads the project and resolves its dependencies, holding the workspace lock.
    pub fn resolve(&self) -> anyhow::Result<Resolution> {
        let _lock = self.workspace.lock()?;
        self.resolve_locked()
    }

    /// Prints the import graph of the resolved project
    pub fn dependency_tree(&self) -> anyhow::Result<()> {
        let _lock = self.workspace.lock()?;
        do_dependency_tree(&self.resolve_locked()?)
    }

    /// Prints which imports the project uses and where
    pub fn stats(&self) -> anyhow::Result<()> {
        let _lock = self.workspace.lock()?;
        do_stats(&self.resolve_locked()?)
    }

    /// Resolves, fetches and pins every declared dependency
    pub fn install(&self) -> anyhow::Result<()> {
        let _lock = self.workspace.lock()?;
        do_install(&self.resolve_locked()?)
    }

    /// Freezes the resolved sources into the project
    pub fn vendor(&self) -> anyhow::Result<()> {
        let _lock = self.workspace.lock()?;
        let resolution = self.resolve_locked()?;
        do_vendor(
            &self.runtime,
            &self.workspace,
            &resolution,
            &self.scm,
            &self.scanner,
        )
    }

    /// Resolves the project, then runs the configured tool with `args`.
    /// Returns the exit code of the tool.
    pub fn run_tool(&self, args: &[OsString]) -> anyhow::Result<i32> {
        {
            let _lock = self.workspace.lock()?;
            self.resolve_locked()?;
        }
        do_run_tool(&self.workspace, &self.tool_command, &self.tool_env, args)
    }

    fn resolve_locked(&self) -> anyhow::Result<Resolution> {
        do_resolve(&self.runtime, &self.workspace, &self.scm, &self.scanner)
    }
}
