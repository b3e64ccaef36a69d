//! Build result types.
//!
//! Contains types for representing the outcome of a pipeline run.

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::time::Duration;

/// Status of a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    /// Stage ran to completion
    Success,
    /// Stage was not run (dry run)
    Skipped,
    /// Stage failed with error
    Failed(String),
}

impl StageStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, StageStatus::Success | StageStatus::Skipped)
    }

    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, StageStatus::Failed(_))
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Success => write!(f, "success"),
            StageStatus::Skipped => write!(f, "skipped"),
            StageStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Result of running a single stage.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Stage that ran
    pub stage: String,
    /// Outcome
    pub status: StageStatus,
    /// Files written
    pub outputs: Vec<PathBuf>,
    /// Time spent in the stage
    pub duration: Duration,
    /// Warning messages (if any)
    pub warnings: Vec<String>,
}

impl StageResult {
    /// Create a successful result.
    pub fn success(stage: impl Into<String>, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self { stage: stage.into(), status: StageStatus::Success, outputs, duration, warnings: vec![] }
    }

    /// Create a skipped result.
    pub fn skipped(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Skipped,
            outputs: vec![],
            duration: Duration::ZERO,
            warnings: vec![],
        }
    }

    /// Create a failed result.
    pub fn failed(stage: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Failed(error.into()),
            outputs: vec![],
            duration,
            warnings: vec![],
        }
    }

    /// Add warnings to the result.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// One execution of the pipeline or of a single stage.
///
/// Runs carry no state beyond their start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildRun {
    pub started_at: DateTime<Local>,
}

impl BuildRun {
    /// Start a run now.
    pub fn start() -> Self {
        Self { started_at: Local::now() }
    }

    /// Short identifier, e.g. `14:03:07.251`.
    pub fn id(&self) -> String {
        self.started_at.format("%H:%M:%S%.3f").to_string()
    }
}

impl Default for BuildRun {
    fn default() -> Self {
        Self::start()
    }
}

/// Result of a complete pipeline run.
#[derive(Debug, Default)]
pub struct BuildResult {
    /// Run this result belongs to
    pub run: BuildRun,
    /// Results for each stage, in execution order
    pub stages: Vec<StageResult>,
    /// Total build duration
    pub total_duration: Duration,
}

impl BuildResult {
    /// Create a new empty build result for `run`.
    pub fn new(run: BuildRun) -> Self {
        Self { run, stages: vec![], total_duration: Duration::ZERO }
    }

    /// Add a stage result.
    pub fn add_result(&mut self, result: StageResult) {
        self.stages.push(result);
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    /// Get the number of successful stages.
    pub fn success_count(&self) -> usize {
        self.stages.iter().filter(|r| matches!(r.status, StageStatus::Success)).count()
    }

    /// Get the number of skipped stages.
    pub fn skipped_count(&self) -> usize {
        self.stages.iter().filter(|r| matches!(r.status, StageStatus::Skipped)).count()
    }

    /// Get the number of failed stages.
    pub fn failed_count(&self) -> usize {
        self.stages.iter().filter(|r| r.status.is_failure()).count()
    }

    /// Check if the overall build succeeded (no failures).
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Get all outputs produced.
    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.stages.iter().flat_map(|r| r.outputs.iter()).collect()
    }

    /// Get all warnings.
    pub fn all_warnings(&self) -> Vec<&String> {
        self.stages.iter().flat_map(|r| r.warnings.iter()).collect()
    }

    /// Get failed stage results.
    pub fn failures(&self) -> Vec<&StageResult> {
        self.stages.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// Format a summary of the build result.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let success = self.success_count();
        let skipped = self.skipped_count();
        let failed = self.failed_count();
        let total = self.stages.len();

        if failed > 0 {
            lines.push(format!(
                "Build failed: {} succeeded, {} skipped, {} failed ({} total)",
                success, skipped, failed, total
            ));
            for stage in self.failures() {
                lines.push(format!("  - {}: {}", stage.stage, stage.status));
            }
        } else {
            lines.push(format!(
                "Build succeeded: {} stages, {} files, {} skipped in {:?}",
                success,
                self.all_outputs().len(),
                skipped,
                self.total_duration
            ));
        }

        let warnings = self.all_warnings();
        if !warnings.is_empty() {
            lines.push(format!("Warnings ({}): ", warnings.len()));
            for warning in warnings.iter().take(5) {
                lines.push(format!("  - {}", warning));
            }
            if warnings.len() > 5 {
                lines.push(format!("  ... and {} more", warnings.len() - 5));
            }
        }

        lines.join("\n")
    }
}
