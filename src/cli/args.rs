use std::{ffi::OsString, path::PathBuf};

use clap::{Parser, Subcommand};

/// Dependency pinning and vendoring for source trees whose imports name their repositories.
///
/// Unknown subcommands are forwarded to the configured tool with the vendor area on its path.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Project root. Defaults to the current directory
    #[clap(short, long, env = "PINPACK_PROJECT_ROOT")]
    pub root: Option<PathBuf>,
    /// Name of the declaration file in the project root
    #[clap(short, long, default_value = "pinpack.toml")]
    pub declaration: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    ///Prints the resolved import graph
    #[clap(name = "dependencytree")]
    DependencyTree,
    ///Prints the imports used by the project and where
    Stats,
    ///Resolves, fetches and pins the declared dependencies
    #[clap(name = "installdeps")]
    InstallDeps,
    ///Freezes the resolved sources into the project
    Vendor,
    #[clap(external_subcommand)]
    Tool(Vec<OsString>),
}
