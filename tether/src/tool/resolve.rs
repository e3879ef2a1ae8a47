//! Executable lookup: explicit search directories first, then `PATH`.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unable to find binary: {binary}")]
pub struct ToolNotFound {
    pub binary: String,
}

/// Locate `binary`, checking each of `search_dirs` in order before `PATH`.
///
/// The directories win over `PATH` so that e.g. `/usr/sbin/lsof` is found even
/// when an unrelated `lsof` shadows it, and when `PATH` omits sbin entirely.
pub fn find_executable<P: AsRef<Path>>(
    binary: &str,
    search_dirs: &[P],
) -> Result<PathBuf, ToolNotFound> {
    for dir in search_dirs {
        let candidate = dir.as_ref().join(binary);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "found binary in search directory");
            return Ok(candidate);
        }
    }

    which::which(binary).map_err(|_| ToolNotFound {
        binary: binary.to_string(),
    })
}
