//! `kiln apply`: run every module of a genome against the project root.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use kiln_adapters::{LocalFilesystem, ProcessRunner};
use kiln_core::{
    application::services::ChangeKind,
    prelude::{Module, Orchestrator, ResolutionIssue, RunReport, VfsScope},
};

use crate::{
    cli::{ApplyArgs, GlobalArgs},
    commands::{Workspace, confirm, load_workspace, run_options},
    config::AppConfig,
    error::{CliError, CliResult},
    output::OutputManager,
};

/// Execute `kiln apply`.
///
/// 1. Load the genome, catalog and selected modules
/// 2. Resolve and print the execution order
/// 3. Confirm unless `--yes`, `--dry-run`, `--quiet` or JSON output
/// 4. Run the orchestrator and render the report
/// 5. Map failed modules to the partial-failure exit code
#[instrument(skip_all, fields(genome = %args.genome.genome.display(), dry_run = args.dry_run))]
pub fn execute(
    args: ApplyArgs,
    global: GlobalArgs,
    config: AppConfig,
    output: OutputManager,
) -> CliResult<()> {
    let workspace = load_workspace(&args.genome, &config, &output)?;

    let mut options = run_options(&args.genome, &config);
    options.dry_run = args.dry_run;
    options.halt_on_failure |= args.halt_on_failure;
    if args.shared_vfs {
        options.vfs_scope = VfsScope::Shared;
    }
    if let Some(secs) = args.timeout {
        if secs == 0 {
            return Err(CliError::InvalidInput {
                message: "--timeout must be at least 1 second".into(),
            });
        }
        options.module_timeout = Some(Duration::from_secs(secs));
    }

    let orchestrator = Orchestrator::new(
        Arc::new(LocalFilesystem::new()),
        workspace.catalog.clone(),
        Arc::new(ProcessRunner::new()),
    )
    .with_options(options);

    let (order, _) = orchestrator.plan(&workspace.modules)?;
    let interactive = !args.yes && !args.dry_run && !global.quiet && !output.is_json();
    if !output.is_json() {
        show_plan(&workspace, &order, &output)?;
    }
    if interactive && !confirm("Apply these modules?")? {
        return Err(CliError::Cancelled);
    }

    info!(
        project = %workspace.project.name,
        root = %workspace.project.root,
        modules = order.len(),
        "Apply started"
    );
    let spinner = output.spinner(format!("Applying {} module(s)", order.len()));
    let report = orchestrator.run(&workspace.modules, &workspace.project);
    spinner.finish_and_clear();
    let report = report?;

    if output.is_json() {
        output.json(&report)?;
    } else {
        render_report(&report, &workspace, &output)?;
    }

    if report.success {
        return Ok(());
    }
    let failed: Vec<String> = report
        .failed_modules()
        .map(|m| m.module_id.to_string())
        .collect();
    Err(CliError::PartialFailure {
        failed,
        total: report.execution_order.len(),
    })
}

fn show_plan(
    workspace: &Workspace,
    order: &[Module],
    output: &OutputManager,
) -> CliResult<()> {
    output.header(&format!(
        "Project '{}' at {}",
        workspace.project.name, workspace.project.root
    ))?;
    let names: Vec<&str> = order.iter().map(|m| m.id.as_str()).collect();
    output.info(&format!("Execution order: {}", names.join(" → ")))?;
    Ok(())
}

fn render_report(
    report: &RunReport,
    workspace: &Workspace,
    output: &OutputManager,
) -> CliResult<()> {
    render_resolution_warnings(&report.resolution_warnings, output)?;

    for module in &report.modules {
        let summary = format!(
            "{} ({} file(s), {} ms)",
            module.module_id,
            module.files.len(),
            module.duration_ms
        );
        if module.success {
            output.success(&summary)?;
        } else {
            output.error(&summary)?;
        }
        for file in &module.files {
            let verb = match file.change {
                ChangeKind::Created => "created",
                ChangeKind::Modified => "modified",
            };
            output.detail(&format!("{verb:<8} {}", file.path))?;
        }
        for warning in &module.warnings {
            output.warning(&format!("{}: {warning}", module.module_id))?;
        }
        for error in &module.errors {
            output.error(&format!("{} [{}] {}", module.module_id, error.code, error.message))?;
        }
    }

    let skipped = report.skipped();
    if !skipped.is_empty() {
        let names: Vec<&str> = skipped.iter().map(|id| id.as_str()).collect();
        output.warning(&format!("Not run: {}", names.join(", ")))?;
    }

    output.print("")?;
    let files = report.files().count();
    if report.dry_run {
        output.info(&format!(
            "Dry run: {files} file(s) would change under {}; nothing was written",
            workspace.project.root
        ))?;
    } else if report.success {
        output.success(&format!(
            "Applied {} module(s) from {}: {files} file(s) changed",
            report.modules.len(),
            workspace.genome.path.display()
        ))?;
    }
    Ok(())
}

pub(crate) fn render_resolution_warnings(
    warnings: &[ResolutionIssue],
    output: &OutputManager,
) -> CliResult<()> {
    for issue in warnings {
        output.warning(&issue.to_string())?;
    }
    Ok(())
}
