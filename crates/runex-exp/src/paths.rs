use std::path::{Path, PathBuf};

use runex_core::errors::{ErrorInfo, RunexError};

/// Resolves a path (which may not exist yet) against the current working
/// directory without touching the filesystem.
pub(crate) fn absolute_path(path: &Path) -> Result<PathBuf, RunexError> {
    std::path::absolute(path).map_err(|err| {
        RunexError::Store(
            ErrorInfo::new("store-io", "failed to resolve path")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })
}

/// Absolutizes a string when it names an existing filesystem entry.
///
/// Run working directories differ from the caller's cwd, so relative
/// script paths and path-valued parameters would dangle; anything else is
/// returned unchanged.
pub(crate) fn abs_if_existing(token: &str) -> String {
    let path = Path::new(token);
    if path.exists() {
        match std::path::absolute(path) {
            Ok(abs) => abs.display().to_string(),
            Err(_) => token.to_string(),
        }
    } else {
        token.to_string()
    }
}
