//! Stage transforms.
//!
//! A transform is the opaque part of a stage: it receives the files matched by
//! the stage's source patterns and writes its outputs under the stage's
//! destination directory. Transforms hold no state between invocations.
//!
//! Built-in transforms:
//! - [`Reset`] - recursive delete of the distribution tree
//! - [`Markup`] - page templates rendered with minijinja
//! - [`Style`] - stylesheet with inlined partials, expanded and minified
//! - [`Command`] - external program per input file (fonts, scripts)
//! - [`CopyFiles`] - byte copy (images, static libraries)
//! - [`Optimize`] - optional re-encoding of raster images

pub mod command;
pub mod copy;
pub mod markup;
pub mod optimize;
pub mod reset;
pub mod style;

pub use command::{Command, CommandOutput};
pub use copy::CopyFiles;
pub use markup::Markup;
pub use optimize::Optimize;
pub use reset::Reset;
pub use style::Style;

use crate::build::discovery::SourceFile;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure inside a transform.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The transformation rejected its input
    #[error("{}: {message}", path.display())]
    Rejected {
        /// Input that was rejected
        path: PathBuf,
        /// What was wrong with it
        message: String,
    },
    /// Reading a source or writing a destination failed
    #[error("{}: {source}", path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// The transform cannot run with the current configuration
    #[error("{0}")]
    Config(String),
}

impl TransformError {
    /// Create a rejection for an input file.
    pub fn rejected(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        TransformError::Rejected { path: path.into(), message: message.to_string() }
    }

    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransformError::Io { path: path.into(), source }
    }
}

/// Everything a transform gets to see for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// Name of the stage running the transform
    pub stage: &'a str,
    /// Source tree root
    pub src_root: &'a Path,
    /// Distribution tree root
    pub dist_root: &'a Path,
    /// Destination directory of the stage (inside the distribution tree)
    pub dest: &'a Path,
    /// Files matched by the stage's patterns at invocation time
    pub files: &'a [SourceFile],
}

impl TransformContext<'_> {
    /// Destination path for a matched file, keeping its glob-relative layout.
    pub fn output_for(&self, file: &SourceFile) -> PathBuf {
        self.dest.join(&file.relative)
    }
}

/// A source-to-destination transformation.
pub trait Transform: Send + Sync + fmt::Debug {
    /// Short description used in logs
    fn describe(&self) -> String;

    /// Run the transformation, returning every file written.
    fn apply(&self, ctx: &TransformContext<'_>) -> Result<Vec<PathBuf>, TransformError>;
}

/// Adapter turning a closure into a [`Transform`].
pub struct FnTransform<F> {
    label: String,
    func: F,
}

impl<F> FnTransform<F>
where
    F: Fn(&TransformContext<'_>) -> Result<Vec<PathBuf>, TransformError> + Send + Sync,
{
    /// Wrap `func` under the given label.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self { label: label.into(), func }
    }
}

impl<F> fmt::Debug for FnTransform<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransform").field("label", &self.label).finish()
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(&TransformContext<'_>) -> Result<Vec<PathBuf>, TransformError> + Send + Sync,
{
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn apply(&self, ctx: &TransformContext<'_>) -> Result<Vec<PathBuf>, TransformError> {
        (self.func)(ctx)
    }
}

/// Write `contents` to `path`, creating parent directories and overwriting
/// any existing file.
pub fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), TransformError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TransformError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| TransformError::io(path, e))
}

/// Read a source file as UTF-8 text.
pub fn read_text(path: &Path) -> Result<String, TransformError> {
    fs::read_to_string(path).map_err(|e| TransformError::io(path, e))
}

/// Insert `.min` before the extension: `style.css` -> `style.min.css`.
pub fn minified_name(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.min.{}", stem, ext.to_string_lossy()),
        None => format!("{}.min", stem),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minified_name() {
        assert_eq!(minified_name(Path::new("dist/assets/css/style.css")), PathBuf::from("dist/assets/css/style.min.css"));
        assert_eq!(minified_name(Path::new("script.js")), PathBuf::from("script.min.js"));
        assert_eq!(minified_name(Path::new("LICENSE")), PathBuf::from("LICENSE.min"));
    }

    #[test]
    fn test_transform_error_display() {
        let err = TransformError::rejected("scss/style.scss", "unexpected token");
        assert_eq!(err.to_string(), "scss/style.scss: unexpected token");

        let err = TransformError::Config("no program".to_string());
        assert_eq!(err.to_string(), "no program");
    }

    #[test]
    fn test_fn_transform() {
        let transform = FnTransform::new("noop", |ctx: &TransformContext<'_>| {
            Ok(ctx.files.iter().map(|f| ctx.output_for(f)).collect())
        });
        let files = vec![SourceFile { path: PathBuf::from("/src/a.txt"), relative: PathBuf::from("a.txt") }];
        let ctx = TransformContext {
            stage: "test",
            src_root: Path::new("/src"),
            dist_root: Path::new("/dist"),
            dest: Path::new("/dist/out"),
            files: &files,
        };

        assert_eq!(transform.describe(), "noop");
        assert_eq!(transform.apply(&ctx).unwrap(), vec![PathBuf::from("/dist/out/a.txt")]);
    }
}
