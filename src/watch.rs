//! Watch mode for incremental rebuilds on file changes
//!
//! Maps changed source files to the stages that must re-run, using
//! [`WatchRule`]s built from the configured entries and directories. Each debounced batch of changes is reduced to a
//! set of stages which run one after another on the watcher thread, so two
//! runs of the same stage never overlap.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::build::discovery::matches_any;
use crate::build::stage::names;
use crate::build::{Pipeline, StagePlan, StageResult};
use crate::config::schema::{SiteConfig, WatchConfig};

/// How often the watch loop checks for a stop request.
const STOP_POLL: Duration = Duration::from_millis(250);

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("failed to watch path: {0}")]
    WatchPath(#[source] notify::Error),
    /// The event channel closed
    #[error("watch channel error: {0}")]
    Channel(String),
    /// Source directory not found
    #[error("source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
}

/// Maps a source pattern to the stages it triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRule {
    /// Glob relative to the source tree
    pub pattern: String,
    /// Stages to re-run when a matching file changes
    pub stages: Vec<String>,
}

impl WatchRule {
    pub fn new(pattern: impl Into<String>, stages: &[&str]) -> Self {
        Self { pattern: pattern.into(), stages: stages.iter().map(|s| s.to_string()).collect() }
    }

    /// Whether a source-relative path falls under this rule.
    pub fn matches(&self, relative: &Path) -> bool {
        matches_any(std::slice::from_ref(&self.pattern), relative)
    }
}

/// Rules used by `dev`, derived from where the configuration puts things.
///
/// Data and markup re-render pages. Anything next to or below the style and
/// script entries rebuilds that bundle.
pub fn rules_for(config: &SiteConfig) -> Vec<WatchRule> {
    let mut rules = vec![WatchRule::new("json/**/*.json", &[names::MARKUP])];

    for dir in [&config.markup.pages, &config.markup.components] {
        let pattern = under(&dir.to_string_lossy(), "**/*.html");
        if !rules.iter().any(|r| r.pattern == pattern) {
            rules.push(WatchRule::new(pattern, &[names::MARKUP]));
        }
    }

    let styles_dir = entry_dir(&config.styles.entry);
    for ext in ["scss", "sass", "css"] {
        rules.push(WatchRule::new(under(&styles_dir, &format!("**/*.{}", ext)), &[names::STYLES]));
    }

    let scripts_ext = Path::new(&config.scripts.entry)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "js".to_string());
    rules.push(WatchRule::new(
        under(&entry_dir(&config.scripts.entry), &format!("**/*.{}", scripts_ext)),
        &[names::SCRIPTS],
    ));

    rules
}

fn entry_dir(entry: &str) -> String {
    Path::new(entry).parent().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default()
}

fn under(dir: &str, glob: &str) -> String {
    let dir = dir.replace('\\', "/");
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        glob.to_string()
    } else {
        format!("{}/{}", dir, glob)
    }
}

/// Reduce a batch of changed paths to the stages they trigger.
///
/// Stages come out once each, in the order their rules first matched.
/// Paths outside `src_root` are ignored.
pub fn stages_for_changes(rules: &[WatchRule], src_root: &Path, changed: &[PathBuf]) -> Vec<String> {
    let canonical_root = src_root.canonicalize().ok();
    let mut stages: Vec<String> = Vec::new();

    for path in changed {
        let relative = path
            .strip_prefix(src_root)
            .ok()
            .or_else(|| canonical_root.as_deref().and_then(|root| path.strip_prefix(root).ok()));
        let Some(relative) = relative else {
            continue;
        };

        for rule in rules.iter().filter(|r| r.matches(relative)) {
            for stage in &rule.stages {
                if !stages.contains(stage) {
                    stages.push(stage.clone());
                }
            }
        }
    }

    stages
}

/// Tracks failing stages across watcher runs for recovery detection
#[derive(Debug, Default)]
pub struct ErrorTracker {
    failing: HashSet<String>,
}

impl ErrorTracker {
    /// Create a new error tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch of stage results, returning the stages that recovered
    pub fn update(&mut self, results: &[StageResult]) -> Vec<String> {
        let mut recovered = Vec::new();
        for result in results {
            if result.status.is_failure() {
                self.failing.insert(result.stage.clone());
            } else if self.failing.remove(&result.stage) {
                recovered.push(result.stage.clone());
            }
        }
        recovered
    }

    /// Check if there are any tracked errors
    pub fn has_errors(&self) -> bool {
        !self.failing.is_empty()
    }

    /// Get the number of failing stages
    pub fn error_count(&self) -> usize {
        self.failing.len()
    }
}

/// Re-runs stages when their sources change.
pub struct Watcher {
    pipeline: Pipeline,
    plan: StagePlan,
    rules: Vec<WatchRule>,
    config: WatchConfig,
    errors: ErrorTracker,
}

impl Watcher {
    /// Create a watcher running stages from `plan` through `pipeline`.
    pub fn new(pipeline: Pipeline, plan: StagePlan, rules: Vec<WatchRule>) -> Self {
        let config = pipeline.context().config().watch.clone();
        Self { pipeline, plan, rules, config, errors: ErrorTracker::new() }
    }

    pub fn rules(&self) -> &[WatchRule] {
        &self.rules
    }

    /// Run the stages triggered by one batch of changed paths.
    ///
    /// A failing stage is reported and does not stop the remaining stages.
    pub fn handle_changes(&mut self, changed: &[PathBuf]) -> Vec<StageResult> {
        let src_root = self.pipeline.context().src_dir();
        let stages = stages_for_changes(&self.rules, &src_root, changed);
        if stages.is_empty() {
            return vec![];
        }

        if self.config.clear_screen {
            print!("\x1B[2J\x1B[1;1H");
        }
        for path in changed {
            tracing::info!(path = %path.display(), "changed");
        }

        let mut results = Vec::with_capacity(stages.len());
        for name in &stages {
            match self.plan.get(name) {
                Some(stage) => results.push(self.pipeline.run_stage(stage)),
                None => tracing::warn!(stage = %name, "watch rule names a stage that is not registered"),
            }
        }

        for stage in self.errors.update(&results) {
            tracing::info!(stage = %stage, "fixed");
        }
        results
    }

    /// Watch the source tree until `stop` is set.
    pub fn watch(mut self, stop: Arc<AtomicBool>) -> Result<(), WatchError> {
        let src_dir = self.pipeline.context().src_dir();
        if !src_dir.exists() {
            return Err(WatchError::SourceNotFound(src_dir));
        }

        let (tx, rx) = channel();
        let debounce = Duration::from_millis(u64::from(self.config.debounce_ms));
        let mut debouncer = new_debouncer(debounce, tx).map_err(WatchError::WatcherInit)?;
        debouncer.watcher().watch(&src_dir, RecursiveMode::Recursive).map_err(WatchError::WatchPath)?;

        tracing::info!(src = %src_dir.display(), "watching for changes");

        while !stop.load(Ordering::SeqCst) {
            match rx.recv_timeout(STOP_POLL) {
                Ok(Ok(events)) => {
                    let changed: Vec<PathBuf> = events
                        .into_iter()
                        .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                        .map(|e| e.path)
                        .collect();
                    self.handle_changes(&changed);
                }
                Ok(Err(error)) => {
                    tracing::warn!(error = ?error, "watch error, continuing");
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(WatchError::Channel("event channel disconnected".to_string()));
                }
            }
        }

        tracing::debug!("watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{BuildContext, Stage, StageStatus};
    use crate::config::default_config;
    use crate::transform::{FnTransform, TransformContext, TransformError};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn paths(root: &Path, rel: &[&str]) -> Vec<PathBuf> {
        rel.iter().map(|r| root.join(r)).collect()
    }

    fn default_rules() -> Vec<WatchRule> {
        rules_for(&default_config())
    }

    #[test]
    fn test_default_rules() {
        let rules = default_rules();
        let patterns: Vec<&str> = rules.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(
            patterns,
            vec![
                "json/**/*.json",
                "html/pages/**/*.html",
                "html/components/**/*.html",
                "scss/**/*.scss",
                "scss/**/*.sass",
                "scss/**/*.css",
                "js/**/*.js",
            ]
        );
        assert!(rules[0].matches(Path::new("json/team.json")));
        assert!(rules[2].matches(Path::new("html/components/header.html")));
        assert!(rules[3].matches(Path::new("scss/blocks/_header.scss")));
        assert!(rules[6].matches(Path::new("js/modules/menu.js")));
        assert!(!rules[6].matches(Path::new("libs/jquery.js")));
    }

    #[test]
    fn test_rules_follow_configured_entries() {
        let mut config = default_config();
        config.styles.entry = "styles/main.scss".to_string();
        config.scripts.entry = "app/index.ts".to_string();
        config.markup.pages = PathBuf::from("templates/pages");
        config.markup.components = PathBuf::from("templates/partials/");

        let rules = rules_for(&config);
        let root = Path::new("/site/src");
        let changed = paths(root, &["styles/blocks/_card.scss"]);
        assert_eq!(stages_for_changes(&rules, root, &changed), vec!["styles"]);
        let changed = paths(root, &["app/lib/util.ts"]);
        assert_eq!(stages_for_changes(&rules, root, &changed), vec!["scripts"]);
        let changed = paths(root, &["templates/partials/nav.html"]);
        assert_eq!(stages_for_changes(&rules, root, &changed), vec!["markup"]);
        let changed = paths(root, &["scss/_old.scss", "html/pages/index.html"]);
        assert!(stages_for_changes(&rules, root, &changed).is_empty());
    }

    #[test]
    fn test_entry_at_source_root_watches_whole_tree() {
        let mut config = default_config();
        config.styles.entry = "style.scss".to_string();
        let rules = rules_for(&config);
        let root = Path::new("/site/src");
        assert_eq!(stages_for_changes(&rules, root, &paths(root, &["blocks/_a.scss"])), vec!["styles"]);
    }

    #[test]
    fn test_markup_change_triggers_only_markup() {
        let root = Path::new("/site/src");
        let stages = stages_for_changes(&default_rules(), root, &paths(root, &["html/pages/index.html"]));
        assert_eq!(stages, vec!["markup"]);
    }

    #[test]
    fn test_batch_is_reduced_to_a_stage_set() {
        let root = Path::new("/site/src");
        let changed = paths(root, &["scss/_a.scss", "scss/_b.scss", "json/data.json", "html/pages/x.html"]);
        assert_eq!(stages_for_changes(&default_rules(), root, &changed), vec!["styles", "markup"]);
    }

    #[test]
    fn test_unwatched_paths_trigger_nothing() {
        let root = Path::new("/site/src");
        let changed = paths(root, &["img/pictures/a.png", "fonts/a.ttf"]);
        assert!(stages_for_changes(&default_rules(), root, &changed).is_empty());
        assert!(stages_for_changes(&default_rules(), root, &[PathBuf::from("/elsewhere/scss/a.scss")]).is_empty());
    }

    #[test]
    fn test_error_tracker_detects_recovery() {
        let mut tracker = ErrorTracker::new();
        let failed = StageResult::failed("styles", "bad", Duration::ZERO);
        let ok = StageResult::success("styles", vec![], Duration::ZERO);

        assert!(tracker.update(&[failed]).is_empty());
        assert!(tracker.has_errors());
        assert_eq!(tracker.error_count(), 1);

        assert_eq!(tracker.update(&[ok]), vec!["styles"]);
        assert!(!tracker.has_errors());
    }

    #[test]
    fn test_handle_changes_runs_each_stage_once() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join("scss")).unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let styles = Stage::new(
            "styles",
            FnTransform::new("count", move |_: &TransformContext<'_>| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TransformError>(vec![])
            }),
        );

        let context = BuildContext::new(default_config(), temp.path().to_path_buf());
        let mut watcher = Watcher::new(Pipeline::new(context), StagePlan::new().with_stage(styles), default_rules());

        let results = watcher.handle_changes(&paths(&src, &["scss/_a.scss", "scss/_b.scss"]));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, StageStatus::Success);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_watch_source_not_found() {
        let temp = TempDir::new().unwrap();
        let context = BuildContext::new(default_config(), temp.path().join("missing"));
        let watcher = Watcher::new(Pipeline::new(context), StagePlan::new(), default_rules());

        let result = watcher.watch(Arc::new(AtomicBool::new(true)));
        assert!(matches!(result, Err(WatchError::SourceNotFound(_))));
    }
}
