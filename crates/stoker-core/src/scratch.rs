use std::{env, path::PathBuf};

/// Resolves the scratch directory holding channel sockets and lock files.
///
/// Honors the `STOKER_SCRATCH_DIR` override first, then the platform
/// temp directory. Returns `None` when neither yields a usable path;
/// callers treat that as a rejection condition, not a fault.
pub fn default_scratch_dir() -> Option<PathBuf> {
    if let Some(override_dir) = env::var_os("STOKER_SCRATCH_DIR") {
        if override_dir.is_empty() {
            return None;
        }
        return Some(PathBuf::from(override_dir));
    }

    let tmp = env::temp_dir();
    if tmp.as_os_str().is_empty() {
        None
    } else {
        Some(tmp)
    }
}
