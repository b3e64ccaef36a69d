//! Build pipeline orchestration.
//!
//! The pipeline runs the stages of a [`StagePlan`] one after another in
//! dependency order. Each stage is fully drained before the next starts.
//! Stage failures are caught at the stage boundary, reported through the
//! progress reporter and recorded in the [`BuildResult`]; only plan errors
//! abort a run before it starts.

use crate::build::discovery::{discover_sources, DiscoveryError};
use crate::build::progress::{NullProgress, ProgressEvent, ProgressReporter};
use crate::build::stage::{ErrorPolicy, PlanError, Stage, StagePlan};
use crate::build::{BuildContext, BuildResult, BuildRun, StageResult, StageStatus};
use crate::events::{DevEvent, EventBus};
use crate::transform::{TransformContext, TransformError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Failure of a single stage, tagged with the stage name.
#[derive(Debug, Error)]
pub enum StageError {
    /// Matching the stage's source patterns failed
    #[error("{stage}: {source}")]
    Discovery {
        stage: String,
        #[source]
        source: DiscoveryError,
    },
    /// The transform failed
    #[error("{stage}: {source}")]
    Transform {
        stage: String,
        #[source]
        source: TransformError,
    },
}

/// Error that prevents a run from starting.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The plan could not be ordered
    #[error("invalid stage plan: {0}")]
    Plan(#[from] PlanError),
}

/// Runs stages.
pub struct Pipeline {
    context: BuildContext,
    reporter: Arc<dyn ProgressReporter>,
    events: Option<EventBus>,
}

impl Pipeline {
    /// Create a pipeline that reports nothing.
    pub fn new(context: BuildContext) -> Self {
        Self { context, reporter: Arc::new(NullProgress::new()), events: None }
    }

    /// Set the progress reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Publish a [`DevEvent`] after every stage run.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// Run every stage of `plan` in dependency order.
    pub fn run(&self, plan: &StagePlan) -> Result<BuildResult, BuildError> {
        let start = Instant::now();
        let ordered = plan.build_order()?;
        let mut result = BuildResult::new(BuildRun::start());

        tracing::debug!(
            run = %result.run.id(),
            stages = ?ordered.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "resolved build order"
        );
        self.reporter.report(ProgressEvent::BuildStarted { total_stages: ordered.len() });

        for stage in ordered {
            let stage_result = self.run_stage(stage);
            let stop = stage_result.status.is_failure() && stage.on_error == ErrorPolicy::Fatal;
            result.add_result(stage_result);
            if stop {
                break;
            }
        }

        let result = result.with_duration(start.elapsed());
        self.reporter.report(ProgressEvent::BuildCompleted {
            success: result.is_success(),
            duration_ms: result.total_duration.as_millis() as u64,
            succeeded: result.success_count(),
            skipped: result.skipped_count(),
            failed: result.failed_count(),
        });

        Ok(result)
    }

    /// Run a single stage, reporting its outcome.
    pub fn run_stage(&self, stage: &Stage) -> StageResult {
        self.reporter.report(ProgressEvent::StageStarted { stage: stage.name.clone() });

        if self.context.is_dry_run() {
            let result = StageResult::skipped(stage.name.clone());
            self.report_completed(&result);
            return result;
        }

        let start = Instant::now();
        let result = match self.execute(stage) {
            Ok((outputs, warnings)) => {
                for warning in &warnings {
                    tracing::warn!(stage = %stage.name, "{}", warning);
                    self.reporter
                        .report(ProgressEvent::Warning { stage: Some(stage.name.clone()), message: warning.clone() });
                }
                StageResult::success(stage.name.clone(), outputs, start.elapsed()).with_warnings(warnings)
            }
            Err(e) => {
                tracing::error!(stage = %stage.name, error = %e, "stage failed");
                StageResult::failed(stage.name.clone(), e.to_string(), start.elapsed())
            }
        };

        self.report_completed(&result);
        if let Some(events) = &self.events {
            let event = match &result.status {
                StageStatus::Failed(error) => {
                    DevEvent::BuildFailed { stage: stage.name.clone(), error: error.clone() }
                }
                _ => DevEvent::Rebuilt { stage: stage.name.clone() },
            };
            events.publish(event);
        }

        result
    }

    fn report_completed(&self, result: &StageResult) {
        self.reporter.report(ProgressEvent::StageCompleted {
            stage: result.stage.clone(),
            status: result.status.clone(),
            outputs: result.outputs.len(),
            duration_ms: result.duration.as_millis() as u64,
        });
    }

    /// Run the transform, returning the files written and any warnings.
    fn execute(&self, stage: &Stage) -> Result<(Vec<PathBuf>, Vec<String>), StageError> {
        let src_root = self.context.src_dir();
        let dist_root = self.context.dist_dir();

        let files = discover_sources(&src_root, &stage.patterns)
            .map_err(|source| StageError::Discovery { stage: stage.name.clone(), source })?;

        let mut warnings = Vec::new();
        if !stage.patterns.is_empty() && files.is_empty() {
            tracing::debug!(stage = %stage.name, patterns = ?stage.patterns, "no files matched");
            // A glob may legitimately match nothing; a named entry file may not.
            warnings.extend(
                stage
                    .patterns
                    .iter()
                    .filter(|p| !p.contains(['*', '?', '[']))
                    .map(|p| format!("entry '{}' not found in {}", p, src_root.display())),
            );
        }

        let dest = dist_root.join(&stage.destination);
        let ctx = TransformContext {
            stage: &stage.name,
            src_root: &src_root,
            dist_root: &dist_root,
            dest: &dest,
            files: &files,
        };

        tracing::debug!(stage = %stage.name, transform = %stage.transform.describe(), files = files.len(), "running stage");
        let outputs = stage
            .transform
            .apply(&ctx)
            .map_err(|source| StageError::Transform { stage: stage.name.clone(), source })?;
        Ok((outputs, warnings))
    }
}
