//! Build context containing configuration and paths for a run.

use crate::config::{loader, SiteConfig};
use std::path::{Path, PathBuf};

/// Build context containing configuration and paths for a build operation.
///
/// The configuration is immutable once the context exists; every stage and
/// the dev server read from the same context.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: SiteConfig,
    /// Project root directory (where frontkit.toml is located)
    project_root: PathBuf,
    /// Whether to run in verbose mode
    verbose: bool,
    /// Resolve the plan without running any stage
    dry_run: bool,
}

impl BuildContext {
    /// Create a new build context.
    pub fn new(config: SiteConfig, project_root: PathBuf) -> Self {
        Self { config, project_root, verbose: false, dry_run: false }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Source tree (absolute).
    pub fn src_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.src)
    }

    /// Distribution tree (absolute).
    pub fn dist_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.dist)
    }

    /// A path inside the source tree.
    pub fn src_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.src_dir().join(relative)
    }

    /// Whether verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Whether this is a dry run.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Resolve a path relative to the project root.
    ///
    /// If the path is absolute, returns it unchanged.
    /// If relative, joins it with the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        loader::resolve_path(&self.project_root, path)
    }
}
