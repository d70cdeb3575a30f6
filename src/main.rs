use std::process::ExitCode;

use clap::Parser;
use log::error;

use pinpack::{
    cli::args::{CliArgs, Command},
    dependencies::ValidationFailed,
    Pinpack,
};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            exit_code(&e)
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
}

fn run() -> anyhow::Result<i32> {
    let cli_args: CliArgs = CliArgs::parse();

    let mut builder = Pinpack::builder().declaration_file_name(&cli_args.declaration);
    if let Some(root) = &cli_args.root {
        builder = builder.root(root);
    }
    let pinpack = builder.try_build()?;

    match cli_args.cmd {
        Command::DependencyTree => pinpack.dependency_tree()?,
        Command::Stats => pinpack.stats()?,
        Command::InstallDeps => pinpack.install()?,
        Command::Vendor => pinpack.vendor()?,
        Command::Tool(args) => return pinpack.run_tool(&args),
    }
    Ok(0)
}

fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<ValidationFailed>() {
        Some(failed) => failed.0.len().try_into().unwrap_or(i32::MAX),
        None => 1,
    }
}
