//! Target execution for the CLI

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use super::{GlobalOptions, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::build::progress::{ConsoleProgress, DesktopNotifier, FanoutProgress, ProgressReporter};
use crate::build::BuildContext;
use crate::config::loader::{find_config, load_config, merge_cli_overrides, project_root, CliOverrides, ConfigError};
use crate::config::SiteConfig;
use crate::orchestrator::{Orchestrator, TargetName};

/// Locate and load the configuration, returning it with the project root.
pub(crate) fn load_project(options: &GlobalOptions) -> Result<(SiteConfig, PathBuf), ConfigError> {
    let cwd = std::env::current_dir()?;
    let config_path = match &options.config {
        Some(path) => Some(path.clone()),
        None => find_config(),
    };

    let (mut config, root) = match config_path {
        Some(path) => {
            tracing::debug!(config = %path.display(), "using config");
            let config = load_config(Some(&path))?;
            let root = project_root(&path).filter(|p| !p.as_os_str().is_empty()).map(Path::to_path_buf).unwrap_or(cwd);
            (config, root)
        }
        None => {
            tracing::debug!("no frontkit.toml found, using defaults");
            (crate::config::default_config(), cwd)
        }
    };

    let overrides = CliOverrides { src: options.src.clone(), dist: options.dist.clone(), port: options.port };
    merge_cli_overrides(&mut config, &overrides);

    // Overrides can break rules the file on its own satisfied (`--dist src`).
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }
    Ok((config, root))
}

/// Console output, plus desktop notifications when enabled.
pub(crate) fn reporter_for(config: &SiteConfig, verbose: bool) -> Arc<dyn ProgressReporter> {
    let console = ConsoleProgress::new().with_verbose(verbose);
    if config.notify.desktop {
        Arc::new(FanoutProgress::new().with(console).with(DesktopNotifier::new()))
    } else {
        Arc::new(console)
    }
}

/// Run a target and map the outcome to an exit code.
pub fn run_target(target: TargetName, options: &GlobalOptions) -> ExitCode {
    let (config, project_root) = match load_project(options) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    let reporter = reporter_for(&config, options.verbose);
    let context = BuildContext::new(config, project_root)
        .with_verbose(options.verbose)
        .with_dry_run(options.dry_run);

    let src_dir = context.src_dir();
    if !src_dir.exists() {
        eprintln!("Error: Source directory not found: {}", src_dir.display());
        eprintln!("Create the directory or specify a different path with --src");
        return ExitCode::from(EXIT_ERROR);
    }

    let orchestrator = Orchestrator::new(context).with_reporter(reporter);
    match orchestrator.run(target) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
