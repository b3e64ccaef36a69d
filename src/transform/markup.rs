//! Page templates rendered with minijinja.
//!
//! Pages are rendered one by one to the same relative path under the
//! destination. `{% include %}` and `{% extends %}` resolve against the
//! components directory. A `json` filter loads data files relative to the
//! pages directory:
//!
//! ```jinja
//! {% set team = "../../json/team.json" | json %}
//! ```

use super::{read_text, write_output, Transform, TransformContext, TransformError};
use minijinja::{context, path_loader, Environment, Error, ErrorKind, Value};
use std::path::{Path, PathBuf};

/// Markup transform.
#[derive(Debug, Clone)]
pub struct Markup {
    /// Directory page paths and `json` filter paths are relative to
    pages_dir: PathBuf,
    /// Template search path
    components_dir: PathBuf,
}

impl Markup {
    /// Create a markup transform from absolute directories.
    pub fn new(pages_dir: impl Into<PathBuf>, components_dir: impl Into<PathBuf>) -> Self {
        Self { pages_dir: pages_dir.into(), components_dir: components_dir.into() }
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_loader(path_loader(self.components_dir.clone()));

        let pages_dir = self.pages_dir.clone();
        env.add_filter("json", move |path: String| load_json(&pages_dir, &path));
        env
    }
}

fn load_json(pages_dir: &Path, path: &str) -> Result<Value, Error> {
    let full = pages_dir.join(path);
    let text = std::fs::read_to_string(&full).map_err(|e| {
        Error::new(ErrorKind::InvalidOperation, format!("cannot read {}: {}", full.display(), e))
    })?;
    let data: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
        Error::new(ErrorKind::InvalidOperation, format!("invalid JSON in {}: {}", full.display(), e))
    })?;
    Ok(Value::from_serialize(&data))
}

impl Transform for Markup {
    fn describe(&self) -> String {
        format!("minijinja (components: {})", self.components_dir.display())
    }

    fn apply(&self, ctx: &TransformContext<'_>) -> Result<Vec<PathBuf>, TransformError> {
        let env = self.environment();
        let mut outputs = Vec::with_capacity(ctx.files.len());

        for file in ctx.files {
            let source = read_text(&file.path)?;
            // The name decides auto-escaping, so keep the page's own extension.
            let name = file.relative.to_string_lossy().replace('\\', "/");

            let rendered = env
                .render_named_str(&name, &source, context! { page => name.clone() })
                .map_err(|e| TransformError::rejected(&file.path, e))?;

            let output = ctx.output_for(file);
            write_output(&output, rendered)?;
            outputs.push(output);
        }

        Ok(outputs)
    }
}
