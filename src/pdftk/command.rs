//! Synchronous subprocess invocation

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run `program` with `args`, wait for it, and return its standard output.
///
/// A non-zero exit status becomes [`Error::ProcessFailed`] carrying the
/// captured standard error; stdout is discarded in that case.
pub fn run(program: &Path, args: &[OsString]) -> Result<Vec<u8>> {
    tracing::debug!(
        program = %program.display(),
        args = ?args,
        "running pdftk"
    );

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        tracing::debug!(
            exit_code = ?output.status.code(),
            stderr = %stderr.trim(),
            "pdftk exited with failure"
        );
        return Err(Error::ProcessFailed {
            exit_code: output.status.code(),
            stderr,
        });
    }

    tracing::debug!(bytes = output.stdout.len(), "pdftk finished");
    Ok(output.stdout)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<OsString> {
        vec!["-c".into(), script.into()]
    }

    #[test]
    fn test_captures_stdout() {
        let out = run(Path::new("/bin/sh"), &sh("printf 'NumberOfPages: 2'")).unwrap();
        assert_eq!(out, b"NumberOfPages: 2");
    }

    #[test]
    fn test_non_zero_exit_carries_stderr() {
        let result = run(
            Path::new("/bin/sh"),
            &sh("echo partial; echo 'Error: Unable to find file.' >&2; exit 3"),
        );
        match result {
            Err(Error::ProcessFailed { exit_code, stderr }) => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr.trim(), "Error: Unable to find file.");
            }
            other => panic!("expected ProcessFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_spawn_failure_is_io() {
        let result = run(Path::new("/nonexistent/pdftk"), &[]);
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
