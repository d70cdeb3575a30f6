use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Settings read from `PINPACK_*` environment variables.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PinpackConfig {
    pub project_root: Option<PathBuf>,
    pub tool_command: Option<String>,
    pub tool_env: Option<String>,
    pub scan_extension: Option<String>,
}

impl PinpackConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(None)?;

        Ok(Self {
            project_root: raw_config.project.root,
            tool_command: raw_config.tool.command,
            tool_env: raw_config.tool.env,
            scan_extension: raw_config.scan.extension,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    project: ProjectConfig,
    #[serde(default)]
    tool: ToolConfig,
    #[serde(default)]
    scan: ScanConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ProjectConfig {
    root: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ToolConfig {
    command: Option<String>,
    env: Option<String>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ScanConfig {
    extension: Option<String>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("PINPACK")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
