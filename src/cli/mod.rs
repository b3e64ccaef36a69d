//! Command-line interface implementation
//!
//! Parses the target and global options and dispatches to [`build`] to run it.

mod build;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::orchestrator::TargetName;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// frontkit - Build static front-end sites from a source tree
#[derive(Parser)]
#[command(name = "frontkit")]
#[command(about = "frontkit - Build a static site (pages, styles, scripts, fonts, images) from src/ into dist/")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub options: GlobalOptions,
}

/// Options shared by every target
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Path to frontkit.toml (default: searched upward from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Source directory (overrides config)
    #[arg(long, global = true)]
    pub src: Option<PathBuf>,

    /// Distribution directory (overrides config)
    #[arg(long, global = true)]
    pub dist: Option<PathBuf>,

    /// Dev server port (overrides config)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Show what would be built without writing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Clear dist/ and run every stage
    Build,
    /// Build, then watch sources and serve dist/ with live reload
    Dev,
    /// Convert fonts/*.ttf to woff2
    Fonts,
    /// Copy third-party libraries
    Libs,
    /// Copy raster and vector images
    Images,
}

impl Commands {
    /// The orchestrator target this command runs.
    pub fn target(&self) -> TargetName {
        match self {
            Commands::Build => TargetName::Build,
            Commands::Dev => TargetName::Dev,
            Commands::Fonts => TargetName::Fonts,
            Commands::Libs => TargetName::Libs,
            Commands::Images => TargetName::Images,
        }
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "frontkit=debug" } else { "frontkit=info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse arguments and run the chosen target.
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(EXIT_INVALID_ARGS) } else { ExitCode::from(EXIT_SUCCESS) };
        }
    };

    init_tracing(cli.options.verbose);
    build::run_target(cli.command.target(), &cli.options)
}
