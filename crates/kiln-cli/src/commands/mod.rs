//! Command handlers.  Each handler translates parsed arguments into calls on
//! `kiln-core` services and renders the result; no engine logic lives here.

pub mod apply;
pub mod completions;
pub mod config;
pub mod init;
pub mod modifiers;
pub mod plan;

use std::io::{self, Write as _};
use std::sync::Arc;

use tracing::{debug, instrument};

use kiln_adapters::{Genome, LoadedGenome, ModuleCatalog};
use kiln_core::prelude::{Module, ProjectSettings, RunOptions};

use crate::{
    cli::GenomeArgs,
    config::AppConfig,
    error::{CliError, CliResult, IntoCli},
    output::OutputManager,
};

/// A genome with its catalog and the modules it selects.
pub struct Workspace {
    pub genome: LoadedGenome,
    pub catalog: Arc<ModuleCatalog>,
    pub modules: Vec<Module>,
    pub project: ProjectSettings,
}

/// Load the genome, open the catalog and select the genome's modules.
#[instrument(skip_all, fields(genome = %args.genome.display()))]
pub fn load_workspace(
    args: &GenomeArgs,
    config: &AppConfig,
    output: &OutputManager,
) -> CliResult<Workspace> {
    if !args.genome.is_file() {
        return Err(CliError::GenomeNotFound {
            path: args.genome.clone(),
        });
    }
    let genome = Genome::load(&args.genome)?;

    let modules_dir = config.modules_dir(args.modules.as_deref(), &args.genome);
    let catalog = ModuleCatalog::open(&modules_dir)?;
    for (path, reason) in catalog.skipped() {
        output.warning(&format!("Skipped module at {}: {reason}", path.display()))?;
    }
    debug!(
        catalog = %modules_dir.display(),
        available = catalog.len(),
        "Catalog opened"
    );

    let modules = genome.genome.select(&catalog)?;
    let project = genome.project(args.root.as_deref());

    Ok(Workspace {
        genome,
        catalog: Arc::new(catalog),
        modules,
        project,
    })
}

/// Engine options from config with the shared genome flags applied.
pub fn run_options(args: &GenomeArgs, config: &AppConfig) -> RunOptions {
    let mut options = config.run_options();
    options.resolver.allow_conflicts |= args.allow_conflicts;
    options
}

/// Ask a yes/no question; an empty answer means yes.
pub fn confirm(prompt: &str) -> CliResult<bool> {
    #[cfg(feature = "interactive")]
    if io::IsTerminal::is_terminal(&io::stdin()) {
        return dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()
            .map_err(|e| CliError::IoError {
                message: "failed to read confirmation input".into(),
                source: io::Error::other(e),
            });
    }

    print!("{prompt} [Y/n] ");
    io::stdout()
        .flush()
        .with_cli_context(|| "failed to flush stdout")?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .with_cli_context(|| "failed to read confirmation input")?;

    let input = input.trim().to_ascii_lowercase();
    Ok(input.is_empty() || input == "y" || input == "yes")
}
