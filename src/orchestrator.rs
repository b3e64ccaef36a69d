//! Named build targets.
//!
//! The orchestrator owns the stage plan and the watch rules and exposes the
//! targets the CLI can invoke:
//!
//! | target   | stages                                                        |
//! |----------|---------------------------------------------------------------|
//! | `build`  | reset, fonts, markup, styles, scripts, pictures, svg, libs     |
//! | `dev`    | `build`, then watcher and dev server until interrupted         |
//! | `fonts`  | fonts                                                          |
//! | `libs`   | libs                                                           |
//! | `images` | pictures, svg                                                  |
//!
//! With `images.optimize` enabled, `optimize` runs after `pictures` in
//! `build` and `images`.
//!
//! `dev` keeps serving and watching when its initial build fails, so the
//! broken file can be fixed without restarting.

use crate::build::progress::{NullProgress, ProgressEvent, ProgressReporter};
use crate::build::stage::names;
use crate::build::{BuildContext, BuildError, BuildResult, PlanError, Pipeline, Stage, StagePlan};
use crate::events::EventBus;
use crate::server::{DevServer, ServerError};
use crate::transform::{Command, CopyFiles, Markup, Optimize, Reset, Style};
use crate::watch::{rules_for, WatchError, WatchRule, Watcher};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Raster formats copied by the `pictures` stage.
const PICTURE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Raster formats re-encoded by the `optimize` stage.
const OPTIMIZE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// An invocable target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetName {
    Build,
    Dev,
    Fonts,
    Libs,
    Images,
}

impl TargetName {
    /// Every target, in help order.
    pub const ALL: [TargetName; 5] =
        [TargetName::Build, TargetName::Dev, TargetName::Fonts, TargetName::Libs, TargetName::Images];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetName::Build => "build",
            TargetName::Dev => "dev",
            TargetName::Fonts => "fonts",
            TargetName::Libs => "libs",
            TargetName::Images => "images",
        }
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetName {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| OrchestratorError::UnknownTarget(s.to_string()))
    }
}

/// Lifecycle of a target.
///
/// `dev` stays `Running` until the process is interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Error from running a target.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unknown target '{0}' (expected one of: build, dev, fonts, libs, images)")]
    UnknownTarget(String),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Build(#[from] BuildError),
    /// One or more stages failed
    #[error("target '{target}' failed\n{summary}")]
    Failed { target: TargetName, summary: String },
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error(transparent)]
    Server(#[from] ServerError),
    /// The async runtime could not start
    #[error("cannot start runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

fn patterns_for(dir: &str, extensions: &[&str]) -> Vec<String> {
    extensions.iter().map(|ext| format!("{}/**/*.{}", dir, ext)).collect()
}

/// Register every stage the configuration enables.
pub fn default_plan(context: &BuildContext) -> StagePlan {
    let config = context.config();
    let markup = Markup::new(context.src_path(&config.markup.pages), context.src_path(&config.markup.components));

    let pages = config.markup.pages.to_string_lossy().replace('\\', "/");
    let pages = pages.trim_end_matches('/');

    // Targets were checked when the config was validated.
    let mut style = Style::new()
        .with_compiler(config.styles.compiler)
        .with_targets(config.styles.browser_targets().unwrap_or_default())
        .with_source_maps(config.styles.source_maps);
    if let Some(command) = &config.styles.command {
        style = style.with_command(command.clone());
    }

    let mut plan = StagePlan::new()
        .with_stage(Stage::new(names::RESET, Reset::new(vec![context.project_root().to_path_buf()])))
        .with_stage(
            Stage::new(names::FONTS, Command::font(config.fonts.command.clone()))
                .with_pattern("fonts/*.ttf")
                .with_destination("fonts")
                .with_dependency(names::RESET),
        )
        .with_stage(
            Stage::new(names::MARKUP, markup)
                .with_pattern(format!("{}/**/*.html", pages))
                .with_dependency(names::RESET),
        )
        .with_stage(
            Stage::new(names::STYLES, style)
                .with_pattern(config.styles.entry.clone())
                .with_destination("assets/css")
                .with_dependency(names::RESET),
        )
        .with_stage(
            Stage::new(
                names::SCRIPTS,
                Command::script(config.scripts.command.clone(), config.scripts.minify_command.clone()),
            )
            .with_pattern(config.scripts.entry.clone())
            .with_destination("assets/js")
            .with_dependency(names::RESET),
        )
        .with_stage(
            Stage::new(names::PICTURES, CopyFiles::new())
                .with_patterns(patterns_for("img/pictures", &PICTURE_EXTENSIONS))
                .with_destination("assets/img/pictures")
                .with_dependency(names::RESET),
        );

    if config.images.optimize {
        plan.add_stage(
            Stage::new(names::OPTIMIZE, Optimize::new(config.images.jpeg_quality))
                .with_patterns(patterns_for("img/pictures", &OPTIMIZE_EXTENSIONS))
                .with_destination("assets/img/pictures")
                .with_dependency(names::PICTURES),
        );
    }

    plan.with_stage(
        Stage::new(names::SVG, CopyFiles::new())
            .with_pattern("img/svg/**/*.svg")
            .with_destination("assets/img/svg")
            .with_dependency(names::RESET),
    )
    .with_stage(
        Stage::new(names::LIBS, CopyFiles::new())
            .with_pattern("libs/**/*.*")
            .with_destination("assets/libs")
            .with_dependency(names::RESET),
    )
}

/// Owns the stage plan and watch rules and runs targets.
pub struct Orchestrator {
    context: BuildContext,
    plan: StagePlan,
    rules: Vec<WatchRule>,
    reporter: Arc<dyn ProgressReporter>,
    events: EventBus,
    states: Mutex<HashMap<TargetName, TargetState>>,
}

impl Orchestrator {
    /// Orchestrator with the default stages and watch rules.
    pub fn new(context: BuildContext) -> Self {
        let plan = default_plan(&context);
        Self::with_plan(context, plan)
    }

    /// Orchestrator over a custom plan.
    pub fn with_plan(context: BuildContext, plan: StagePlan) -> Self {
        let rules = rules_for(context.config());
        Self {
            context,
            plan,
            rules,
            reporter: Arc::new(NullProgress::new()),
            events: EventBus::new(),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Set the progress reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replace the watch rules.
    pub fn with_rules(mut self, rules: Vec<WatchRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn rules(&self) -> &[WatchRule] {
        &self.rules
    }

    /// Bus carrying stage events to the dev server.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Current state of a target.
    pub fn state(&self, target: TargetName) -> TargetState {
        self.states.lock().ok().and_then(|s| s.get(&target).copied()).unwrap_or_default()
    }

    fn set_state(&self, target: TargetName, state: TargetState) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(target, state);
        }
    }

    /// Stages a target runs, in declaration order.
    pub fn stages_for(&self, target: TargetName) -> Vec<&str> {
        let wanted: &[&str] = match target {
            TargetName::Build | TargetName::Dev => return self.plan.stages().iter().map(|s| s.name.as_str()).collect(),
            TargetName::Fonts => &[names::FONTS],
            TargetName::Libs => &[names::LIBS],
            TargetName::Images => &[names::PICTURES, names::OPTIMIZE, names::SVG],
        };
        self.plan.stages().iter().map(|s| s.name.as_str()).filter(|name| wanted.contains(name)).collect()
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.context.clone()).with_reporter(Arc::clone(&self.reporter)).with_events(self.events.clone())
    }

    /// Run a one-shot target. `dev` runs its initial build only.
    pub fn run_target(&self, target: TargetName) -> Result<BuildResult, OrchestratorError> {
        self.set_state(target, TargetState::Running);
        let outcome = self.execute(target);
        let state = match &outcome {
            Ok(_) if target == TargetName::Dev => TargetState::Running,
            Ok(_) => TargetState::Succeeded,
            Err(_) => TargetState::Failed,
        };
        self.set_state(target, state);
        outcome
    }

    fn execute(&self, target: TargetName) -> Result<BuildResult, OrchestratorError> {
        let selected = self.plan.select(&self.stages_for(target))?;
        tracing::info!(target = %target, stages = selected.len(), "running target");

        let result = self.pipeline().run(&selected)?;
        if result.is_success() {
            Ok(result)
        } else {
            Err(OrchestratorError::Failed { target, summary: result.summary() })
        }
    }

    /// Start the watcher and the dev server and run them until `shutdown` resolves.
    pub async fn serve_and_watch<F>(&self, shutdown: F) -> Result<(), OrchestratorError>
    where
        F: Future<Output = ()>,
    {
        let server_config = &self.context.config().server;
        let server = DevServer::bind(
            self.context.dist_dir(),
            &server_config.host,
            server_config.port,
            self.events.clone(),
        )
        .await?;

        let stop = Arc::new(AtomicBool::new(false));
        let watcher = Watcher::new(self.pipeline(), self.plan.clone(), self.rules.clone());
        let watcher_stop = Arc::clone(&stop);
        let watch_task = tokio::task::spawn_blocking(move || watcher.watch(watcher_stop));

        let (stop_server, server_stopped) = tokio::sync::oneshot::channel::<()>();
        let server_task = tokio::spawn(server.run(async move {
            let _ = server_stopped.await;
        }));

        shutdown.await;
        tracing::info!("stopping dev mode");
        stop.store(true, Ordering::SeqCst);
        let _ = stop_server.send(());

        let watched = watch_task.await.map_err(|e| OrchestratorError::Runtime(std::io::Error::other(e)))?;
        let served = server_task.await.map_err(|e| OrchestratorError::Runtime(std::io::Error::other(e)))?;
        watched?;
        served?;
        Ok(())
    }

    /// Initial build of `dev`. Stage failures are reported and leave `dev` running.
    fn dev_build(&self) -> Result<(), OrchestratorError> {
        match self.run_target(TargetName::Dev) {
            Ok(_) => Ok(()),
            Err(OrchestratorError::Failed { summary, .. }) => {
                tracing::warn!("initial build failed, watching for fixes");
                self.reporter.report(ProgressEvent::Error {
                    stage: None,
                    message: format!("initial build failed, watching for fixes\n{}", summary),
                });
                self.set_state(TargetName::Dev, TargetState::Running);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// `dev` until `shutdown` resolves: build, then watch and serve.
    ///
    /// The build runs before any task is spawned, so blocking here stalls nothing.
    pub async fn dev_until<F>(&self, shutdown: F) -> Result<(), OrchestratorError>
    where
        F: Future<Output = ()>,
    {
        self.dev_build()?;
        let outcome = self.serve_and_watch(shutdown).await;
        self.set_state(TargetName::Dev, if outcome.is_ok() { TargetState::Succeeded } else { TargetState::Failed });
        outcome
    }

    /// `dev`: build, then watch and serve until Ctrl+C.
    pub fn dev(&self) -> Result<(), OrchestratorError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(OrchestratorError::Runtime)?;

        runtime.block_on(self.dev_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }))
    }

    /// Run any target, including the long-running `dev`.
    pub fn run(&self, target: TargetName) -> Result<(), OrchestratorError> {
        match target {
            TargetName::Dev => self.dev(),
            other => self.run_target(other).map(|_| ()),
        }
    }
}
