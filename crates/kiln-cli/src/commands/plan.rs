//! `kiln plan`: resolve a genome and show what `apply` would run, in order.

use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use kiln_adapters::{LocalFilesystem, RecordingRunner};
use kiln_core::prelude::{ModuleId, Orchestrator, ResolutionIssue};

use crate::{
    cli::PlanArgs,
    commands::{apply::render_resolution_warnings, load_workspace, run_options},
    config::AppConfig,
    error::CliResult,
    output::OutputManager,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Plan {
    project: String,
    root: String,
    steps: Vec<PlanStep>,
    warnings: Vec<ResolutionIssue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanStep {
    module: ModuleId,
    provides: Vec<String>,
    requires: Vec<String>,
    actions: Vec<&'static str>,
}

#[instrument(skip_all, fields(genome = %args.genome.genome.display()))]
pub fn execute(args: PlanArgs, config: AppConfig, output: OutputManager) -> CliResult<()> {
    let workspace = load_workspace(&args.genome, &config, &output)?;

    // Planning never executes a blueprint; the runner only satisfies the
    // orchestrator's constructor.
    let orchestrator = Orchestrator::new(
        Arc::new(LocalFilesystem::new()),
        workspace.catalog.clone(),
        Arc::new(RecordingRunner::new()),
    )
    .with_options(run_options(&args.genome, &config));
    let (order, warnings) = orchestrator.plan(&workspace.modules)?;

    let steps = order
        .iter()
        .map(|module| PlanStep {
            module: module.id.clone(),
            provides: module.provides.iter().map(ToString::to_string).collect(),
            requires: module.requires.iter().map(ToString::to_string).collect(),
            actions: workspace
                .catalog
                .get(&module.id)
                .map(|entry| entry.blueprint.actions.iter().map(|a| a.kind.name()).collect())
                .unwrap_or_default(),
        })
        .collect();
    let plan = Plan {
        project: workspace.project.name.clone(),
        root: workspace.project.root.clone(),
        steps,
        warnings,
    };

    if output.is_json() {
        output.json(&plan)?;
        return Ok(());
    }

    output.header(&format!("Plan for '{}' at {}", plan.project, plan.root))?;
    render_resolution_warnings(&plan.warnings, &output)?;
    for (index, step) in plan.steps.iter().enumerate() {
        output.print(&format!(
            "{:>3}. {} ({} action(s))",
            index + 1,
            step.module,
            step.actions.len()
        ))?;
        if !step.provides.is_empty() {
            output.detail(&format!("provides: {}", step.provides.join(", ")))?;
        }
        if !step.requires.is_empty() {
            output.detail(&format!("requires: {}", step.requires.join(", ")))?;
        }
        if !step.actions.is_empty() {
            output.detail(&format!("actions:  {}", step.actions.join(", ")))?;
        }
    }
    Ok(())
}
