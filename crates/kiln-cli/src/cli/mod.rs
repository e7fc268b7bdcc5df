//! CLI argument definitions using the clap derive API.
//!
//! This module is the *only* place that knows about argument names, aliases,
//! help text, and value enums.  No business logic lives here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

pub mod global;
pub use global::{GlobalArgs, OutputFormat};

// ── Top-level CLI ─────────────────────────────────────────────────────────────

/// Main CLI entry-point.
#[derive(Debug, Parser)]
#[command(
    name    = "kiln",
    bin_name = "kiln",
    version  = env!("CARGO_PKG_VERSION"),
    author   = env!("CARGO_PKG_AUTHORS"),
    about    = "Compose projects from capability-aware module blueprints",
    long_about = "Kiln reads a genome (the list of modules a project is built from), \
                  orders the modules by the capabilities they provide and require, \
                  and applies each module's blueprint to the project directory.",
    after_help = "EXAMPLES:\n\
        \x20 kiln plan  kiln.toml\n\
        \x20 kiln apply kiln.toml --dry-run\n\
        \x20 kiln apply kiln.toml --modules ./modules --yes\n\
        \x20 kiln completions bash > /usr/share/bash-completion/completions/kiln",
    arg_required_else_help = true,
    subcommand_required    = true,
)]
pub struct Cli {
    /// Flags available on every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

// ── Subcommands ───────────────────────────────────────────────────────────────

/// All available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply every module of a genome to the project.
    #[command(
        visible_alias = "a",
        about = "Apply a genome to a project",
        after_help = "EXAMPLES:\n\
            \x20 kiln apply kiln.toml\n\
            \x20 kiln apply kiln.toml --root ../my-app --dry-run\n\
            \x20 kiln apply kiln.toml --shared-vfs --halt-on-failure --yes"
    )]
    Apply(ApplyArgs),

    /// Resolve a genome and show the execution order without running anything.
    #[command(
        visible_alias = "p",
        about = "Show the execution plan for a genome",
        after_help = "EXAMPLES:\n\
            \x20 kiln plan kiln.toml\n\
            \x20 kiln plan kiln.toml --output-format json"
    )]
    Plan(PlanArgs),

    /// List the registered file modifiers.
    #[command(
        visible_alias = "mods",
        about = "List available modifiers",
        after_help = "EXAMPLES:\n\
            \x20 kiln modifiers\n\
            \x20 kiln modifiers --format json"
    )]
    Modifiers(ModifiersArgs),

    /// Initialise a Kiln configuration file.
    #[command(
        about = "Initialise configuration",
        after_help = "EXAMPLES:\n\
            \x20 kiln init           # platform config location\n\
            \x20 kiln init --local   # .kiln.toml in the current directory"
    )]
    Init(InitArgs),

    /// Generate shell completion scripts.
    #[command(
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n\
            \x20 kiln completions bash > ~/.local/share/bash-completion/completions/kiln\n\
            \x20 kiln completions zsh  > ~/.zfunc/_kiln\n\
            \x20 kiln completions fish > ~/.config/fish/completions/kiln.fish"
    )]
    Completions(CompletionsArgs),

    /// Inspect the Kiln configuration.
    #[command(
        about = "Configuration management",
        subcommand,
        after_help = "EXAMPLES:\n\
            \x20 kiln config get engine.halt_on_failure\n\
            \x20 kiln config list\n\
            \x20 kiln config path"
    )]
    Config(ConfigCommands),
}

// ── apply / plan ──────────────────────────────────────────────────────────────

/// Where to find the genome and its modules.
#[derive(Debug, Clone, Args)]
pub struct GenomeArgs {
    /// Genome file (TOML, or JSON when the name ends in `.json`).
    #[arg(value_name = "GENOME", help = "Genome file to apply")]
    pub genome: PathBuf,

    /// Module catalog directory.
    #[arg(
        short = 'm',
        long = "modules",
        value_name = "DIR",
        help = "Module catalog directory [default: <genome dir>/modules]"
    )]
    pub modules: Option<PathBuf>,

    /// Project root, overriding the genome's `project.root`.
    #[arg(
        short = 'r',
        long = "root",
        value_name = "DIR",
        help = "Project root directory"
    )]
    pub root: Option<PathBuf>,

    /// Downgrade conflicting capability providers to warnings.
    #[arg(long = "allow-conflicts", help = "Allow several providers of one capability")]
    pub allow_conflicts: bool,
}

/// Arguments for `kiln apply`.
#[derive(Debug, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub genome: GenomeArgs,

    /// Run every blueprint but write nothing and run no commands.
    #[arg(long = "dry-run", help = "Show what would change without writing")]
    pub dry_run: bool,

    /// Skip the confirmation prompt.
    #[arg(short = 'y', long = "yes", help = "Apply without asking for confirmation")]
    pub yes: bool,

    /// Stop at the first module that fails.
    #[arg(long = "halt-on-failure", help = "Stop at the first failing module")]
    pub halt_on_failure: bool,

    /// Stage every module in one VFS and write it once after the last module.
    #[arg(
        long = "shared-vfs",
        help = "Stage all modules together and write once at the end of the run"
    )]
    pub shared_vfs: bool,

    /// Per-module time limit in seconds.
    #[arg(long = "timeout", value_name = "SECS", help = "Per-module timeout in seconds")]
    pub timeout: Option<u64>,
}

/// Arguments for `kiln plan`.
#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub genome: GenomeArgs,
}

// ── modifiers ─────────────────────────────────────────────────────────────────

/// Arguments for `kiln modifiers`.
#[derive(Debug, Args)]
pub struct ModifiersArgs {
    /// Output format.
    #[arg(
        long = "format",
        value_enum,
        default_value = "table",
        help = "Output format"
    )]
    pub format: ListFormat,
}

/// Output format for the `modifiers` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    /// Human-readable table.
    Table,
    /// One name per line.
    List,
    /// JSON array.
    Json,
}

// ── init ──────────────────────────────────────────────────────────────────────

/// Arguments for `kiln init`.
#[derive(Debug, Args)]
pub struct InitArgs {
    /// Write to `.kiln.toml` in the current directory.
    #[arg(
        long = "local",
        help = "Create local configuration in current directory"
    )]
    pub local: bool,

    /// Overwrite an existing config file.
    #[arg(short = 'f', long = "force", help = "Overwrite existing configuration")]
    pub force: bool,
}

// ── completions ───────────────────────────────────────────────────────────────

/// Arguments for `kiln completions`.
#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum, help = "Shell to generate completions for")]
    pub shell: Shell,
}

/// Supported shells for completion generation.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ── config subcommands ────────────────────────────────────────────────────────

/// Subcommands for `kiln config`.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the value of a configuration key.
    Get {
        /// Dotted key path, e.g. `engine.vfs_scope`.
        key: String,
    },
    /// Print all configuration values.
    List,
    /// Print the path to the active configuration file.
    Path,
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_apply_command() {
        let cli = Cli::parse_from([
            "kiln",
            "apply",
            "kiln.toml",
            "--modules",
            "mods",
            "--dry-run",
            "--timeout",
            "30",
        ]);
        let Commands::Apply(args) = cli.command else {
            panic!("expected Apply command");
        };
        assert_eq!(args.genome.genome, PathBuf::from("kiln.toml"));
        assert_eq!(args.genome.modules, Some(PathBuf::from("mods")));
        assert!(args.dry_run);
        assert_eq!(args.timeout, Some(30));
        assert!(!args.shared_vfs);
    }

    #[test]
    fn apply_alias() {
        let cli = Cli::parse_from(["kiln", "a", "g.toml", "-y"]);
        assert!(matches!(cli.command, Commands::Apply(ApplyArgs { yes: true, .. })));
    }

    #[test]
    fn plan_takes_genome_flags() {
        let cli = Cli::parse_from(["kiln", "plan", "g.toml", "--allow-conflicts", "-r", "out"]);
        let Commands::Plan(args) = cli.command else {
            panic!("expected Plan command");
        };
        assert!(args.genome.allow_conflicts);
        assert_eq!(args.genome.root, Some(PathBuf::from("out")));
    }

    #[test]
    fn modifiers_default_format_is_table() {
        let cli = Cli::parse_from(["kiln", "modifiers"]);
        assert!(matches!(
            cli.command,
            Commands::Modifiers(ModifiersArgs {
                format: ListFormat::Table
            })
        ));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["kiln", "plan", "g.toml", "-vv", "--log-file", "run.log"]);
        assert_eq!(cli.global.verbose, 2);
        assert_eq!(cli.global.log_file, Some(PathBuf::from("run.log")));
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        let result = Cli::try_parse_from(["kiln", "--quiet", "--verbose", "modifiers"]);
        assert!(result.is_err());
    }

    #[test]
    fn apply_requires_genome() {
        assert!(Cli::try_parse_from(["kiln", "apply"]).is_err());
    }
}
