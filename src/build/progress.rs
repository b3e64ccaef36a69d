//! Build progress reporting.
//!
//! Every stage start, completion and failure goes through a
//! [`ProgressReporter`]. The console reporter prints progress lines, the
//! desktop notifier pops a notification for failures, and the collecting
//! reporter keeps events in memory.
//!
//! # Example
//!
//! ```ignore
//! use frontkit::build::progress::{ConsoleProgress, ProgressEvent, ProgressReporter};
//!
//! let reporter = ConsoleProgress::new();
//! reporter.report(ProgressEvent::BuildStarted { total_stages: 8 });
//! reporter.report(ProgressEvent::StageStarted { stage: "styles".to_string() });
//! ```

use super::result::StageStatus;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Events that can be reported during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Pipeline run started
    BuildStarted {
        /// Number of stages to run
        total_stages: usize,
    },
    /// A stage started
    StageStarted {
        /// Stage name
        stage: String,
    },
    /// A stage finished
    StageCompleted {
        /// Stage name
        stage: String,
        /// Outcome
        status: StageStatus,
        /// Files written
        outputs: usize,
        /// Duration in milliseconds
        duration_ms: u64,
    },
    /// Pipeline run finished
    BuildCompleted {
        /// Whether the overall build succeeded
        success: bool,
        /// Total duration in milliseconds
        duration_ms: u64,
        /// Number of successful stages
        succeeded: usize,
        /// Number of skipped stages
        skipped: usize,
        /// Number of failed stages
        failed: usize,
    },
    /// A warning was generated
    Warning {
        /// Stage that generated the warning (if applicable)
        stage: Option<String>,
        /// Warning message
        message: String,
    },
    /// An error outside of a stage run
    Error {
        /// Stage involved (if applicable)
        stage: Option<String>,
        /// Error message
        message: String,
    },
}

/// Trait for progress reporters.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: ProgressEvent);

    /// Check if this reporter wants verbose output.
    fn is_verbose(&self) -> bool {
        false
    }
}

/// A progress reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullProgress;

impl NullProgress {
    /// Create a new null progress reporter.
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NullProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Console progress reporter with optional colors.
pub struct ConsoleProgress {
    use_colors: bool,
    verbose: bool,
    current: AtomicUsize,
    total: AtomicUsize,
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProgress")
            .field("use_colors", &self.use_colors)
            .field("verbose", &self.verbose)
            .field("current", &self.current)
            .field("total", &self.total)
            .finish()
    }
}

impl ConsoleProgress {
    /// Create a console reporter writing to stderr, colored when stderr is a terminal.
    pub fn new() -> Self {
        Self {
            use_colors: atty::is(atty::Stream::Stderr),
            verbose: false,
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            output: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Create a console progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self {
            use_colors: false,
            verbose: false,
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            output: Mutex::new(Box::new(output)),
        }
    }

    /// Set whether to use colors.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn red(&self, text: &str) -> String {
        self.color(text, "\x1b[31m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn bold(&self, text: &str) -> String {
        self.color(text, "\x1b[1m")
    }

    fn writeln(&self, line: &str) {
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", line);
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::BuildStarted { total_stages } => {
                self.total.store(total_stages, Ordering::SeqCst);
                self.current.store(0, Ordering::SeqCst);
                if total_stages > 0 {
                    self.writeln(&format!(
                        "{} Running {} stage{}...",
                        self.cyan("[build]"),
                        total_stages,
                        if total_stages == 1 { "" } else { "s" }
                    ));
                }
            }
            ProgressEvent::StageStarted { stage } => {
                if self.verbose {
                    let current = self.current.load(Ordering::SeqCst) + 1;
                    let total = self.total.load(Ordering::SeqCst);
                    self.writeln(&format!("{} [{}/{}] {}...", self.cyan("[build]"), current, total, stage));
                }
            }
            ProgressEvent::StageCompleted { stage, status, outputs, duration_ms } => {
                let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                let total = self.total.load(Ordering::SeqCst).max(current);

                let status_str = match &status {
                    StageStatus::Success => self.green("ok"),
                    StageStatus::Skipped => self.yellow("skipped"),
                    StageStatus::Failed(_) => self.red("FAILED"),
                };

                self.writeln(&format!(
                    "{} [{}/{}] {} {} ({} file{}, {})",
                    self.cyan("[build]"),
                    current,
                    total,
                    status_str,
                    stage,
                    outputs,
                    if outputs == 1 { "" } else { "s" },
                    format_duration(duration_ms)
                ));

                if let StageStatus::Failed(err) = status {
                    self.writeln(&format!("        {}", self.red(&err)));
                }
            }
            ProgressEvent::BuildCompleted { success, duration_ms, succeeded, skipped, failed } => {
                let duration_str = format_duration(duration_ms);

                if success {
                    self.writeln(&format!(
                        "{} {} {} finished, {} skipped in {}",
                        self.green("[done]"),
                        self.bold(&succeeded.to_string()),
                        if succeeded == 1 { "stage" } else { "stages" },
                        skipped,
                        duration_str
                    ));
                } else {
                    self.writeln(&format!(
                        "{} Build failed: {} succeeded, {} skipped, {} {} in {}",
                        self.red("[error]"),
                        succeeded,
                        skipped,
                        failed,
                        if failed == 1 { "failure" } else { "failures" },
                        duration_str
                    ));
                }
            }
            ProgressEvent::Warning { stage, message } => {
                let prefix = stage.map(|s| format!("{}: ", s)).unwrap_or_default();
                self.writeln(&format!("{} {}{}", self.yellow("[warn]"), prefix, message));
            }
            ProgressEvent::Error { stage, message } => {
                let prefix = stage.map(|s| format!("{}: ", s)).unwrap_or_default();
                self.writeln(&format!("{} {}{}", self.red("[error]"), prefix, message));
            }
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Pops a desktop notification for every stage failure.
///
/// Uses `notify-send` by default and `osascript` on macOS. A failure to
/// notify is logged and otherwise ignored.
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier {
    program: Option<Vec<String>>,
}

impl DesktopNotifier {
    /// Notifier using the platform's default program.
    pub fn new() -> Self {
        Self { program: None }
    }

    /// Notifier running `program` with the title and message appended as arguments.
    pub fn with_program(program: Vec<String>) -> Self {
        Self { program: Some(program) }
    }

    fn command(&self, title: &str, message: &str) -> Option<Command> {
        if let Some(program) = &self.program {
            let (first, rest) = program.split_first()?;
            let mut cmd = Command::new(first);
            cmd.args(rest).arg(title).arg(message);
            return Some(cmd);
        }

        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                message.replace('"', "\\\""),
                title.replace('"', "\\\"")
            );
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(script);
            Some(cmd)
        } else {
            let mut cmd = Command::new("notify-send");
            cmd.arg(title).arg(message);
            Some(cmd)
        }
    }

    /// Show a notification.
    pub fn notify(&self, title: &str, message: &str) {
        let Some(mut cmd) = self.command(title, message) else {
            return;
        };
        let status = cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null()).status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::warn!(%status, "desktop notification failed"),
            Err(e) => tracing::warn!(error = %e, "desktop notification unavailable"),
        }
    }
}

impl ProgressReporter for DesktopNotifier {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::StageCompleted { stage, status: StageStatus::Failed(err), .. } => {
                self.notify(&stage, &format!("Error: {}", err));
            }
            ProgressEvent::Error { stage, message } => {
                self.notify(stage.as_deref().unwrap_or("frontkit"), &format!("Error: {}", message));
            }
            _ => {}
        }
    }
}

/// Forwards each event to several reporters.
#[derive(Default)]
pub struct FanoutProgress {
    reporters: Vec<Box<dyn ProgressReporter>>,
}

impl FanoutProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reporter.
    pub fn with<R: ProgressReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }
}

impl ProgressReporter for FanoutProgress {
    fn report(&self, event: ProgressEvent) {
        for reporter in &self.reporters {
            reporter.report(event.clone());
        }
    }

    fn is_verbose(&self) -> bool {
        self.reporters.iter().any(|r| r.is_verbose())
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events reported so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Names of the stages that completed, in order.
    pub fn completed_stages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::StageCompleted { stage, .. } => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl ProgressReporter for CollectingProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Format a duration in milliseconds to a human-readable string.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        format!("{}m {}s", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn console() -> (ConsoleProgress, Arc<Mutex<Vec<u8>>>) {
        let output = Arc::new(Mutex::new(Vec::new()));
        let reporter = ConsoleProgress::with_output(TestWriter(Arc::clone(&output))).with_colors(false);
        (reporter, output)
    }

    fn text(output: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&output.lock().unwrap()).into_owned()
    }

    #[test]
    fn test_null_progress() {
        let reporter = NullProgress::new();
        reporter.report(ProgressEvent::BuildStarted { total_stages: 10 });
        assert!(!reporter.is_verbose());
    }

    #[test]
    fn test_console_progress_build_started() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::BuildStarted { total_stages: 5 });
        assert!(text(&output).contains("Running 5 stages"));
    }

    #[test]
    fn test_console_progress_stage_completed_success() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::BuildStarted { total_stages: 1 });
        reporter.report(ProgressEvent::StageCompleted {
            stage: "markup".to_string(),
            status: StageStatus::Success,
            outputs: 3,
            duration_ms: 150,
        });

        let text = text(&output);
        assert!(text.contains("[1/1] ok markup (3 files, 150ms)"));
    }

    #[test]
    fn test_console_progress_stage_completed_failed() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::StageCompleted {
            stage: "styles".to_string(),
            status: StageStatus::Failed("cannot find import 'header'".to_string()),
            outputs: 0,
            duration_ms: 50,
        });

        let text = text(&output);
        assert!(text.contains("FAILED styles"));
        assert!(text.contains("cannot find import 'header'"));
    }

    #[test]
    fn test_console_progress_verbose_stage_started() {
        let (reporter, output) = console();
        let reporter = reporter.with_verbose(true);
        reporter.report(ProgressEvent::BuildStarted { total_stages: 2 });
        reporter.report(ProgressEvent::StageStarted { stage: "fonts".to_string() });
        assert!(text(&output).contains("[1/2] fonts..."));
    }

    #[test]
    fn test_console_progress_build_completed() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::BuildCompleted {
            success: true,
            duration_ms: 1500,
            succeeded: 8,
            skipped: 0,
            failed: 0,
        });
        reporter.report(ProgressEvent::BuildCompleted {
            success: false,
            duration_ms: 500,
            succeeded: 3,
            skipped: 1,
            failed: 2,
        });

        let text = text(&output);
        assert!(text.contains("[done] 8 stages finished, 0 skipped in 1.5s"));
        assert!(text.contains("2 failures"));
    }

    #[test]
    fn test_console_progress_warning() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::Warning {
            stage: Some("pictures".to_string()),
            message: "no files matched".to_string(),
        });
        assert!(text(&output).contains("[warn] pictures: no files matched"));
    }

    #[test]
    fn test_collecting_progress() {
        let reporter = CollectingProgress::new();
        reporter.report(ProgressEvent::StageStarted { stage: "libs".to_string() });
        reporter.report(ProgressEvent::StageCompleted {
            stage: "libs".to_string(),
            status: StageStatus::Success,
            outputs: 0,
            duration_ms: 1,
        });

        assert_eq!(reporter.events().len(), 2);
        assert_eq!(reporter.completed_stages(), vec!["libs"]);
    }

    #[test]
    fn test_fanout_progress() {
        let (console, output) = console();
        let fanout = FanoutProgress::new().with(console).with(NullProgress::new());
        fanout.report(ProgressEvent::Error { stage: None, message: "boom".to_string() });
        assert!(text(&output).contains("[error] boom"));
    }

    #[cfg(unix)]
    #[test]
    fn test_desktop_notifier_runs_program_on_failure() {
        let temp = tempfile::TempDir::new().unwrap();
        let log = temp.path().join("notifications");
        let script = format!("echo \"$0|$1\" >> {}", log.display());
        let notifier = DesktopNotifier::with_program(vec!["sh".to_string(), "-c".to_string(), script]);

        notifier.report(ProgressEvent::StageCompleted {
            stage: "styles".to_string(),
            status: StageStatus::Success,
            outputs: 2,
            duration_ms: 1,
        });
        notifier.report(ProgressEvent::StageCompleted {
            stage: "styles".to_string(),
            status: StageStatus::Failed("bad".to_string()),
            outputs: 0,
            duration_ms: 1,
        });

        let logged = std::fs::read_to_string(log).unwrap();
        assert_eq!(logged, "styles|Error: bad\n");
    }

    #[test]
    fn test_desktop_notifier_missing_program_is_not_fatal() {
        let notifier = DesktopNotifier::with_program(vec!["frontkit-no-such-notifier".to_string()]);
        notifier.notify("title", "message");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0ms");
        assert_eq!(format_duration(999), "999ms");
        assert_eq!(format_duration(1500), "1.5s");
        assert_eq!(format_duration(90000), "1m 30s");
    }

    struct TestWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
