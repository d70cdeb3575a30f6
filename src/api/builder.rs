use std::{env, path::PathBuf, sync::Arc};

use crate::{
    config::PinpackConfig,
    scan::{ImportScanner, SourceScanner, DEFAULT_EXTENSION},
    scm::{ScmProvider, SystemScm},
    workspace::{Workspace, DECLARATION_FILE},
    Pinpack,
};

const DEFAULT_TOOL_COMMAND: &str = "go";
const DEFAULT_TOOL_ENV: &str = "GOPATH";

#[derive(Default)]
pub struct PinpackBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    declaration_file_name: Option<PathBuf>,
    tool_command: Option<String>,
    tool_env: Option<String>,
    scan_extension: Option<String>,
    scm: Option<Arc<dyn ScmProvider>>,
    scanner: Option<Arc<dyn SourceScanner>>,
}

impl PinpackBuilder {
    /// Project root directory.
    ///
    /// Defaults to `PINPACK_PROJECT_ROOT`, then the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the declaration file.
    ///
    /// Defaults to `pinpack.toml`.
    pub fn declaration_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.declaration_file_name = Some(path.into());
        self
    }

    /// Tool unknown subcommands are forwarded to.
    ///
    /// Defaults to `PINPACK_TOOL_COMMAND`, then `go`.
    pub fn tool_command(mut self, command: impl Into<String>) -> Self {
        self.tool_command = Some(command.into());
        self
    }

    /// Environment variable the vendor directory is exported in for the forwarded tool.
    ///
    /// Defaults to `PINPACK_TOOL_ENV`, then `GOPATH`.
    pub fn tool_env(mut self, variable: impl Into<String>) -> Self {
        self.tool_env = Some(variable.into());
        self
    }

    /// Extension of the source files scanned for imports.
    ///
    /// Defaults to `PINPACK_SCAN_EXTENSION`, then `go`.
    pub fn scan_extension(mut self, extension: impl Into<String>) -> Self {
        self.scan_extension = Some(extension.into());
        self
    }

    /// Repository backends. Defaults to git through libgit2 and the command line tools of the
    /// other systems.
    pub fn scm_provider(mut self, provider: impl ScmProvider + 'static) -> Self {
        self.scm = Some(Arc::new(provider));
        self
    }

    /// Replaces the import scanner, ignoring the scan extension.
    pub fn source_scanner(mut self, scanner: impl SourceScanner + 'static) -> Self {
        self.scanner = Some(Arc::new(scanner));
        self
    }

    pub fn try_build(self) -> anyhow::Result<Pinpack> {
        self.build_with(PinpackConfig::load()?)
    }

    fn build_with(self, config: PinpackConfig) -> anyhow::Result<Pinpack> {
        let Self {
            root,
            declaration_file_name,
            tool_command,
            tool_env,
            scan_extension,
            scm,
            scanner,
        } = self;
        let root = match root.or(config.project_root) {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let declaration_file_name =
            declaration_file_name.unwrap_or_else(|| PathBuf::from(DECLARATION_FILE));
        let workspace = Workspace::new(root).with_declaration(declaration_file_name);

        let tool_command = tool_command
            .or(config.tool_command)
            .unwrap_or_else(|| DEFAULT_TOOL_COMMAND.to_owned());
        let tool_env = tool_env
            .or(config.tool_env)
            .unwrap_or_else(|| DEFAULT_TOOL_ENV.to_owned());

        let scanner = scanner.unwrap_or_else(|| {
            let extension = scan_extension
                .or(config.scan_extension)
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_owned());
            Arc::new(ImportScanner::new(extension))
        });
        let scm = scm.unwrap_or_else(|| Arc::new(SystemScm::default()));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        Ok(Pinpack {
            workspace,
            tool_command,
            tool_env,
            scm,
            scanner,
            runtime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;

    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let pinpack = PinpackBuilder::default()
            .root("/work/app")
            .build_with(PinpackConfig::default())
            .unwrap();
        assert_eq!(
            pinpack.workspace.declaration(),
            Path::new("/work/app/pinpack.toml")
        );
        assert_eq!(pinpack.tool_command, "go");
        assert_eq!(pinpack.tool_env, "GOPATH");
    }

    #[test]
    fn explicit_settings_beat_environment() {
        let config = PinpackConfig {
            project_root: Some("/env/app".into()),
            tool_command: Some("tinygo".into()),
            tool_env: None,
            scan_extension: None,
        };
        let pinpack = PinpackBuilder::default()
            .root("/work/app")
            .tool_env("TINYGOPATH")
            .build_with(config)
            .unwrap();
        assert_eq!(pinpack.workspace.root(), Path::new("/work/app"));
        assert_eq!(pinpack.tool_command, "tinygo");
        assert_eq!(pinpack.tool_env, "TINYGOPATH");
    }

    #[test]
    fn environment_root() {
        let config = PinpackConfig {
            project_root: Some("/env/app".into()),
            ..Default::default()
        };
        let pinpack = PinpackBuilder::default()
            .declaration_file_name("deps.toml")
            .build_with(config)
            .unwrap();
        assert_eq!(
            pinpack.workspace.declaration(),
            Path::new("/env/app/deps.toml")
        );
    }
}
