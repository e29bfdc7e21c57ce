//! Executable discovery on the host `PATH`

use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Default executable name
pub const PDFTK: &str = "pdftk";

/// Find an executable by name on the `PATH` environment variable
pub fn find_executable(name: &str) -> Result<PathBuf> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    find_in_dirs(name, std::env::split_paths(&path_var))
}

/// Find an executable by name in the given directories, first match wins
pub fn find_in_dirs<I>(name: &str, dirs: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    for dir in dirs {
        if dir.as_os_str().is_empty() {
            continue;
        }
        for candidate in candidates(&dir, name) {
            if is_executable(&candidate) {
                tracing::debug!(path = %candidate.display(), "found executable");
                return Ok(candidate);
            }
        }
    }

    Err(Error::ExecutableNotFound {
        name: name.to_string(),
    })
}

#[cfg(windows)]
fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    let pathext = std::env::var_os("PATHEXT").unwrap_or_else(|| ".EXE;.BAT;.CMD".into());
    let mut out = vec![dir.join(name)];
    for ext in pathext.to_string_lossy().split(';').filter(|e| !e.is_empty()) {
        out.push(dir.join(format!("{}{}", name, ext.to_ascii_lowercase())));
    }
    out
}

#[cfg(not(windows))]
fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    vec![dir.join(name)]
}

/// Whether `path` is a regular file the current user may execute
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        path.extension()
            .and_then(OsStr::to_str)
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "exe" | "bat" | "cmd"))
            .unwrap_or(false)
    }
}

/// Resolve an explicitly configured executable path
pub fn check_configured(path: &Path) -> Result<PathBuf> {
    if is_executable(path) {
        Ok(path.to_path_buf())
    } else {
        Err(Error::ExecutableNotFound {
            name: path
                .file_name()
                .unwrap_or(OsStr::new(PDFTK))
                .to_string_lossy()
                .to_string(),
        })
    }
}
