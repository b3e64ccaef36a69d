//! Distribution tree reset.

use super::{Transform, TransformContext, TransformError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Recursively deletes the distribution tree.
///
/// Refuses to run when the distribution tree equals or contains one of the
/// protected paths (the source tree and project root).
#[derive(Debug, Clone, Default)]
pub struct Reset {
    protected: Vec<PathBuf>,
}

impl Reset {
    /// Create a reset transform protecting the given paths.
    pub fn new(protected: Vec<PathBuf>) -> Self {
        Self { protected }
    }

    fn check_protected(&self, dist: &Path, src: &Path) -> Result<(), TransformError> {
        let dist = normalize(dist);
        for guarded in self.protected.iter().map(PathBuf::as_path).chain(std::iter::once(src)) {
            let guarded = normalize(guarded);
            if guarded.starts_with(&dist) {
                return Err(TransformError::Config(format!(
                    "refusing to delete {}: it contains {}",
                    dist.display(),
                    guarded.display()
                )));
            }
        }
        Ok(())
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

impl Transform for Reset {
    fn describe(&self) -> String {
        "reset".to_string()
    }

    fn apply(&self, ctx: &TransformContext<'_>) -> Result<Vec<PathBuf>, TransformError> {
        self.check_protected(ctx.dist_root, ctx.src_root)?;

        match fs::remove_dir_all(ctx.dist_root) {
            Ok(()) => {
                tracing::debug!(dist = %ctx.dist_root.display(), "removed distribution tree");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(TransformError::io(ctx.dist_root, e)),
        }

        Ok(vec![])
    }
}
