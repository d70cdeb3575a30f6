use std::{ffi::OsString, fmt::Write, process::Command, sync::Arc};

use anyhow::Context;
use log::{debug, info};
use tokio::runtime::Runtime;

use crate::{
    checksum::ChecksumGate,
    dependencies::{Dependencies, ValidationFailed},
    fetch::Fetcher,
    graph::ImportGraph,
    model::{declaration::Declaration, dep::Dep},
    scan::{ProjectStats, SourceScanner},
    scm::ScmProvider,
    vendor,
    workspace::Workspace,
};

/// Outcome of loading and resolving a project.
pub struct Resolution {
    pub declaration: Declaration,
    pub dependencies: Dependencies,
    pub stats: ProjectStats,
}

/// Scans the project, loads its declaration and, unless the project is vendored, validates
/// the imports against it and fetches everything that needs fetching.
pub fn do_resolve(
    runtime: &Runtime,
    workspace: &Workspace,
    scm: &Arc<dyn ScmProvider>,
    scanner: &Arc<dyn SourceScanner>,
) -> anyhow::Result<Resolution> {
    let stats = scanner
        .analyze(workspace.root())
        .with_context(|| format!("Could not scan {}", workspace.root().display()))?;
    debug!("Scanned {} source files", stats.files.len());

    let declaration = Declaration::from_file(workspace.declaration())?;

    let graph = ImportGraph::new();
    if let Some(repo) = &declaration.repo {
        graph.insert(Dep::new(repo.as_str()));
    }

    if declaration.vendor {
        debug!("Project is vendored, skipping the fetch");
        let dependencies = Dependencies::from_declaration(&declaration, graph, false)?;
        return Ok(Resolution {
            declaration,
            dependencies,
            stats,
        });
    }

    let gate = ChecksumGate::new(workspace.declaration(), workspace.checksum());
    let modified = gate.is_modified()?;
    if modified {
        info!("{} changed since the last run", workspace.declaration().display());
    }
    let dependencies = Dependencies::from_declaration(&declaration, graph, modified)?;

    let errors = dependencies.validate(&stats);
    if !errors.is_empty() {
        return Err(ValidationFailed(errors).into());
    }

    let fetcher = Fetcher::new(workspace.clone(), scm.clone(), scanner.clone());
    runtime.block_on(fetcher.fetch(dependencies.clone()))?;

    gate.write()?;

    Ok(Resolution {
        declaration,
        dependencies,
        stats,
    })
}

/// Handler to dependencytree command
pub fn do_dependency_tree(resolution: &Resolution) -> anyhow::Result<()> {
    print!("{}", render_tree(resolution.dependencies.graph()));
    Ok(())
}

/// Handler to stats command
pub fn do_stats(resolution: &Resolution) -> anyhow::Result<()> {
    print!("{}", resolution.stats.summary());
    Ok(())
}

/// Handler to installdeps command
pub fn do_install(resolution: &Resolution) -> anyhow::Result<()> {
    let installed = resolution.dependencies.graph().dependencies();
    for dep in &installed {
        debug!("Installed {}", dep);
    }
    info!("{} dependencies installed", installed.len());
    Ok(())
}

/// Handler to vendor command
pub fn do_vendor(
    runtime: &Runtime,
    workspace: &Workspace,
    resolution: &Resolution,
    scm: &Arc<dyn ScmProvider>,
    scanner: &Arc<dyn SourceScanner>,
) -> anyhow::Result<()> {
    runtime.block_on(vendor::vendor(
        workspace,
        &resolution.dependencies,
        resolution.declaration.vendor,
        scm.clone(),
        scanner.clone(),
    ))?;
    Ok(())
}

/// Runs `command` with `args` in the project root, exporting the vendor area in `env_var`.
/// Returns the exit code of the tool.
pub fn do_run_tool(
    workspace: &Workspace,
    command: &str,
    env_var: &str,
    args: &[OsString],
) -> anyhow::Result<i32> {
    debug!("Running {} {:?}", command, args);
    let status = Command::new(command)
        .args(args)
        .env(env_var, workspace.vendor())
        .current_dir(workspace.root())
        .status()
        .with_context(|| format!("Could not run {}", command))?;
    // Killed by a signal
    Ok(status.code().unwrap_or(1))
}

/// One line per graph node, indented by depth. Resolved nodes carry their pin.
pub fn render_tree(graph: &ImportGraph) -> String {
    let mut out = String::new();
    graph.visit(|segment, depth, dependency| {
        let indent = "  ".repeat(depth);
        let _ = match dependency.map(|d| &d.checkout).filter(|c| c.is_set()) {
            Some(checkout) => writeln!(out, "{indent}{segment} ({checkout})"),
            None => writeln!(out, "{indent}{segment}"),
        };
    });
    out
}
