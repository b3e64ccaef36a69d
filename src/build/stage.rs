//! Stage definitions and ordering.
//!
//! A stage is one named source-to-destination step: the files matched by its
//! patterns go through its transform and land under its destination. A
//! [`StagePlan`] holds the registered stages and orders them by their
//! declared `requires` lists.

use crate::transform::Transform;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Names of the built-in stages.
pub mod names {
    pub const RESET: &str = "reset";
    pub const FONTS: &str = "fonts";
    pub const MARKUP: &str = "markup";
    pub const STYLES: &str = "styles";
    pub const SCRIPTS: &str = "scripts";
    pub const PICTURES: &str = "pictures";
    pub const SVG: &str = "svg";
    pub const LIBS: &str = "libs";
    pub const OPTIMIZE: &str = "optimize";
}

/// What happens to the rest of the run when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Report the failure and stop the run
    #[default]
    Fatal,
    /// Report the failure and continue with the next stage
    Continue,
}

/// A named unit of work.
#[derive(Clone)]
pub struct Stage {
    /// Unique identifier
    pub name: String,
    /// Glob patterns selecting the stage's inputs
    pub patterns: Vec<String>,
    /// Transformation applied to the matched files
    pub transform: Arc<dyn Transform>,
    /// Output directory, relative to the distribution tree
    pub destination: PathBuf,
    /// Stages that must complete before this one
    pub requires: Vec<String>,
    /// Failure handling
    pub on_error: ErrorPolicy,
}

impl Stage {
    /// Create a stage with no inputs writing to the distribution root.
    pub fn new(name: impl Into<String>, transform: impl Transform + 'static) -> Self {
        Self {
            name: name.into(),
            patterns: vec![],
            transform: Arc::new(transform),
            destination: PathBuf::new(),
            requires: vec![],
            on_error: ErrorPolicy::Fatal,
        }
    }

    /// Add a source pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Add several source patterns.
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Set the destination directory.
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Add a dependency on another stage.
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.requires.push(dep.into());
        self
    }

    /// Set the error policy.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("patterns", &self.patterns)
            .field("transform", &self.transform.describe())
            .field("destination", &self.destination)
            .field("requires", &self.requires)
            .field("on_error", &self.on_error)
            .finish()
    }
}

/// Error while ordering a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Circular dependency detected
    #[error("circular dependency detected involving stage '{0}'")]
    Cycle(String),
    /// A stage requires a stage that was never registered
    #[error("stage '{stage}' requires unknown stage '{dependency}'")]
    UnknownDependency { stage: String, dependency: String },
    /// Two stages share a name
    #[error("stage '{0}' is registered twice")]
    Duplicate(String),
    /// A selection named a stage that was never registered
    #[error("unknown stage '{0}'")]
    UnknownStage(String),
}

/// A set of stages with dependency information.
///
/// The plan remembers every stage name ever registered, so a selection can
/// drop a dependency (running `fonts` without `reset`) without the missing
/// name being reported as unknown.
#[derive(Debug, Clone, Default)]
pub struct StagePlan {
    stages: Vec<Stage>,
    known: HashSet<String>,
}

impl StagePlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage to the plan.
    pub fn add_stage(&mut self, stage: Stage) {
        self.known.insert(stage.name.clone());
        self.stages.push(stage);
    }

    /// Builder form of [`add_stage`](Self::add_stage).
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.add_stage(stage);
        self
    }

    /// Stages in declaration order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Look up a stage by name.
    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Keep only the named stages, remembering the rest as known.
    pub fn select(&self, names: &[&str]) -> Result<StagePlan, PlanError> {
        if let Some(missing) = names.iter().find(|n| self.get(n).is_none()) {
            return Err(PlanError::UnknownStage(missing.to_string()));
        }
        Ok(StagePlan {
            stages: self.stages.iter().filter(|s| names.contains(&s.name.as_str())).cloned().collect(),
            known: self.known.clone(),
        })
    }

    /// Stages in execution order.
    ///
    /// Dependencies come before dependents; otherwise declaration order is
    /// kept. Dependencies that are known but not part of this plan are
    /// ignored.
    pub fn build_order(&self) -> Result<Vec<&Stage>, PlanError> {
        let mut index: HashMap<&str, &Stage> = HashMap::with_capacity(self.stages.len());
        for stage in &self.stages {
            if index.insert(stage.name.as_str(), stage).is_some() {
                return Err(PlanError::Duplicate(stage.name.clone()));
            }
        }

        for stage in &self.stages {
            if let Some(dep) = stage.requires.iter().find(|d| !self.known.contains(*d)) {
                return Err(PlanError::UnknownDependency { stage: stage.name.clone(), dependency: dep.clone() });
            }
        }

        let mut result = Vec::with_capacity(self.stages.len());
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();

        for stage in &self.stages {
            visit(stage, &index, &mut visited, &mut visiting, &mut result)?;
        }

        Ok(result)
    }
}

fn visit<'a>(
    stage: &'a Stage,
    index: &HashMap<&str, &'a Stage>,
    visited: &mut HashSet<&'a str>,
    visiting: &mut HashSet<&'a str>,
    result: &mut Vec<&'a Stage>,
) -> Result<(), PlanError> {
    let name = stage.name.as_str();
    if visited.contains(name) {
        return Ok(());
    }
    if !visiting.insert(name) {
        return Err(PlanError::Cycle(stage.name.clone()));
    }

    for dep in &stage.requires {
        if let Some(dep_stage) = index.get(dep.as_str()) {
            visit(dep_stage, index, visited, visiting, result)?;
        }
    }

    visiting.remove(name);
    visited.insert(name);
    result.push(stage);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{FnTransform, TransformContext, TransformError};

    fn noop(name: &str) -> Stage {
        Stage::new(name, FnTransform::new("noop", |_: &TransformContext<'_>| Ok::<_, TransformError>(vec![])))
    }

    fn order(plan: &StagePlan) -> Vec<&str> {
        plan.build_order().unwrap().iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_stage_builder() {
        let stage = noop("pictures")
            .with_pattern("img/pictures/**/*.png")
            .with_patterns(["img/pictures/**/*.jpg"])
            .with_destination("assets/img/pictures")
            .with_dependency("reset");

        assert_eq!(stage.patterns.len(), 2);
        assert_eq!(stage.destination, PathBuf::from("assets/img/pictures"));
        assert_eq!(stage.requires, vec!["reset"]);
        assert_eq!(stage.on_error, ErrorPolicy::Fatal);
    }

    #[test]
    fn test_build_order_keeps_declaration_order() {
        let plan = StagePlan::new().with_stage(noop("a")).with_stage(noop("b")).with_stage(noop("c"));
        assert_eq!(order(&plan), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_build_order_dependencies_first() {
        let plan = StagePlan::new()
            .with_stage(noop("optimize").with_dependency("pictures"))
            .with_stage(noop("fonts").with_dependency("reset"))
            .with_stage(noop("reset"))
            .with_stage(noop("pictures").with_dependency("reset"));

        assert_eq!(order(&plan), vec!["reset", "pictures", "optimize", "fonts"]);
    }

    #[test]
    fn test_build_order_cycle() {
        let plan = StagePlan::new()
            .with_stage(noop("a").with_dependency("b"))
            .with_stage(noop("b").with_dependency("a"));

        assert!(matches!(plan.build_order(), Err(PlanError::Cycle(_))));
    }

    #[test]
    fn test_build_order_unknown_dependency() {
        let plan = StagePlan::new().with_stage(noop("fonts").with_dependency("nope"));
        assert_eq!(
            plan.build_order().unwrap_err(),
            PlanError::UnknownDependency { stage: "fonts".to_string(), dependency: "nope".to_string() }
        );
    }

    #[test]
    fn test_build_order_duplicate() {
        let plan = StagePlan::new().with_stage(noop("a")).with_stage(noop("a"));
        assert_eq!(plan.build_order().unwrap_err(), PlanError::Duplicate("a".to_string()));
    }

    #[test]
    fn test_select_skips_absent_known_dependency() {
        let plan = StagePlan::new()
            .with_stage(noop("reset"))
            .with_stage(noop("fonts").with_dependency("reset"))
            .with_stage(noop("libs").with_dependency("reset"));

        let fonts = plan.select(&["fonts"]).unwrap();
        assert_eq!(fonts.len(), 1);
        assert_eq!(order(&fonts), vec!["fonts"]);
    }

    #[test]
    fn test_select_unknown_stage() {
        let plan = StagePlan::new().with_stage(noop("reset"));
        assert_eq!(plan.select(&["fonts"]).unwrap_err(), PlanError::UnknownStage("fonts".to_string()));
    }

    #[test]
    fn test_plan_error_display() {
        assert_eq!(
            PlanError::Cycle("styles".to_string()).to_string(),
            "circular dependency detected involving stage 'styles'"
        );
    }
}
