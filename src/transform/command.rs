//! External program transform.
//!
//! Argument templates may contain `{input}` and `{output}`. When `{input}` is
//! absent the source file is piped to the program's stdin; when `{output}` is
//! absent the program's stdout becomes the output file.

use super::{minified_name, write_output, Transform, TransformContext, TransformError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command as Process, Stdio};

const INPUT: &str = "{input}";
const OUTPUT: &str = "{output}";

/// One file produced per input by a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Program and argument template
    pub args: Vec<String>,
    /// Replacement extension for the output file (`woff2` for fonts)
    pub extension: Option<String>,
    /// Insert `.min` before the extension
    pub minified: bool,
}

impl CommandOutput {
    /// Output with the same name as the input.
    pub fn new(args: Vec<String>) -> Self {
        Self { args, extension: None, minified: false }
    }

    /// Change the output extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Mark the output as the minified variant.
    pub fn minified(mut self) -> Self {
        self.minified = true;
        self
    }

    fn path_for(&self, base: PathBuf) -> PathBuf {
        let path = match &self.extension {
            Some(ext) => base.with_extension(ext),
            None => base,
        };
        if self.minified {
            minified_name(&path)
        } else {
            path
        }
    }
}

/// Runs one or more external programs per matched file.
#[derive(Debug, Clone)]
pub struct Command {
    outputs: Vec<CommandOutput>,
}

impl Command {
    /// Create a command transform writing the given outputs.
    pub fn new(outputs: Vec<CommandOutput>) -> Self {
        Self { outputs }
    }

    /// Font conversion: one `.woff2` per input.
    pub fn font(args: Vec<String>) -> Self {
        Self::new(vec![CommandOutput::new(args).with_extension("woff2")])
    }

    /// Script bundling: `<stem>.js` and `<stem>.min.js`.
    pub fn script(bundle: Vec<String>, minify: Vec<String>) -> Self {
        Self::new(vec![
            CommandOutput::new(bundle).with_extension("js"),
            CommandOutput::new(minify).with_extension("js").minified(),
        ])
    }
}

impl Transform for Command {
    fn describe(&self) -> String {
        self.outputs.iter().map(|o| o.args.join(" ")).collect::<Vec<_>>().join(" && ")
    }

    fn apply(&self, ctx: &TransformContext<'_>) -> Result<Vec<PathBuf>, TransformError> {
        let mut written = Vec::with_capacity(ctx.files.len() * self.outputs.len());

        for file in ctx.files {
            for output in &self.outputs {
                let target = output.path_for(ctx.output_for(file));
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| TransformError::io(parent, e))?;
                }
                if let Some(stdout) = invoke(&output.args, &file.path, Some(&target))? {
                    write_output(&target, stdout)?;
                }
                written.push(target);
            }
        }

        Ok(written)
    }
}

/// Run an argument template against one input.
///
/// Returns the captured stdout, or `None` when the template names `{output}`
/// and the program wrote the file itself.
pub fn invoke(args: &[String], input: &Path, output: Option<&Path>) -> Result<Option<Vec<u8>>, TransformError> {
    let (program, rest) =
        args.split_first().ok_or_else(|| TransformError::Config("empty command".to_string()))?;

    let uses_input = args.iter().any(|a| a.contains(INPUT));
    let writes_output = output.is_some() && args.iter().any(|a| a.contains(OUTPUT));

    let input_str = input.to_string_lossy();
    let output_str = output.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
    let expanded: Vec<String> =
        rest.iter().map(|a| a.replace(INPUT, &input_str).replace(OUTPUT, &output_str)).collect();

    tracing::debug!(program = %program, args = ?expanded, "running external command");

    let mut child = Process::new(program)
        .args(&expanded)
        .stdin(if uses_input { Stdio::null() } else { Stdio::piped() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| TransformError::Config(format!("cannot run '{}': {}", program, e)))?;

    let feeder = if uses_input {
        None
    } else {
        let bytes = std::fs::read(input).map_err(|e| TransformError::io(input, e))?;
        child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || {
                // A program that exits early closes the pipe; its exit status decides the outcome.
                let _ = stdin.write_all(&bytes);
            })
        })
    };

    let result = child.wait_with_output().map_err(|e| TransformError::io(input, e))?;
    if let Some(feeder) = feeder {
        let _ = feeder.join();
    }

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let detail = stderr.trim();
        let message = if detail.is_empty() {
            format!("'{}' failed with {}", program, result.status)
        } else {
            format!("'{}' failed with {}: {}", program, result.status, detail)
        };
        return Err(TransformError::rejected(input, message));
    }

    if writes_output {
        Ok(None)
    } else {
        Ok(Some(result.stdout))
    }
}
