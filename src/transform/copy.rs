//! Pass-through transform for images and static libraries.

use super::{Transform, TransformContext, TransformError};
use std::fs;
use std::path::PathBuf;

/// Copies every matched file to the destination, preserving its relative path.
#[derive(Debug, Clone, Default)]
pub struct CopyFiles;

impl CopyFiles {
    /// Create a copy transform.
    pub fn new() -> Self {
        Self
    }
}

impl Transform for CopyFiles {
    fn describe(&self) -> String {
        "copy".to_string()
    }

    fn apply(&self, ctx: &TransformContext<'_>) -> Result<Vec<PathBuf>, TransformError> {
        let mut outputs = Vec::with_capacity(ctx.files.len());

        for file in ctx.files {
            let output = ctx.output_for(file);
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent).map_err(|e| TransformError::io(parent, e))?;
            }
            fs::copy(&file.path, &output).map_err(|e| TransformError::io(&file.path, e))?;
            outputs.push(output);
        }

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::discovery::discover_sources;
    use tempfile::TempDir;

    #[test]
    fn test_copy_preserves_layout() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dist = temp.path().join("dist");
        fs::create_dir_all(src.join("img/svg/icons")).unwrap();
        fs::write(src.join("img/svg/logo.svg"), "<svg/>").unwrap();
        fs::write(src.join("img/svg/icons/menu.svg"), "<svg id=\"menu\"/>").unwrap();

        let files = discover_sources(&src, &["img/svg/**/*.svg".to_string()]).unwrap();
        let dest = dist.join("assets/img/svg");
        let ctx = TransformContext { stage: "svg", src_root: &src, dist_root: &dist, dest: &dest, files: &files };

        let outputs = CopyFiles::new().apply(&ctx).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(fs::read_to_string(dest.join("logo.svg")).unwrap(), "<svg/>");
        assert_eq!(fs::read_to_string(dest.join("icons/menu.svg")).unwrap(), "<svg id=\"menu\"/>");
    }

    #[test]
    fn test_copy_overwrites_existing_output() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dist = temp.path().join("dist");
        fs::create_dir_all(src.join("libs")).unwrap();
        fs::create_dir_all(dist.join("assets/libs")).unwrap();
        fs::write(src.join("libs/a.js"), "new").unwrap();
        fs::write(dist.join("assets/libs/a.js"), "old").unwrap();

        let files = discover_sources(&src, &["libs/**/*.*".to_string()]).unwrap();
        let dest = dist.join("assets/libs");
        let ctx = TransformContext { stage: "libs", src_root: &src, dist_root: &dist, dest: &dest, files: &files };

        CopyFiles::new().apply(&ctx).unwrap();
        assert_eq!(fs::read_to_string(dest.join("a.js")).unwrap(), "new");
    }
}
