//! Error types for the pdftk bindings and MCP server

use thiserror::Error;

/// Result type alias for pdftk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for pdftk operations
#[derive(Error, Debug)]
pub enum Error {
    /// The pdftk executable could not be located
    #[error("Executable not found: {name}")]
    ExecutableNotFound { name: String },

    /// pdftk exited with a non-zero status
    #[error("pdftk failed (exit code {}): {}", display_exit_code(*exit_code), stderr.trim())]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Report line without a key/value separator
    #[error("Malformed report line: {line:?}")]
    MalformedLine { line: String },

    /// Required key absent from a report record
    #[error("Missing key {key} in {record} record")]
    MissingKey { key: String, record: String },

    /// Numeric report value that does not parse
    #[error("Invalid number for {key}: {value:?}")]
    InvalidNumber { key: String, value: String },

    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Invalid PDF file
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// Cache key not found
    #[error("Cache key not found: {key}")]
    CacheKeyNotFound { key: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// Internal failure (task join, invalid glob pattern)
    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

fn display_exit_code(code: Option<i32>) -> String {
    code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

impl Error {
    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, stderr, library errors) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::ExecutableNotFound { .. } => "pdftk is not available".to_string(),
            Error::ProcessFailed { exit_code, .. } => {
                format!("pdftk failed (exit code {})", display_exit_code(*exit_code))
            }
            Error::MalformedLine { .. }
            | Error::MissingKey { .. }
            | Error::InvalidNumber { .. } => "Unexpected pdftk report format".to_string(),
            Error::PdfNotFound { .. } => "PDF not found".to_string(),
            Error::InvalidPdf { .. } => "Invalid PDF file".to_string(),
            Error::CacheKeyNotFound { .. } => "Cache key not found".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::Internal { .. } => "Internal error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_failed_display() {
        let err = Error::ProcessFailed {
            exit_code: Some(3),
            stderr: "Error: Unable to find file.\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "pdftk failed (exit code 3): Error: Unable to find file."
        );

        let err = Error::ProcessFailed {
            exit_code: None,
            stderr: String::new(),
        };
        assert_eq!(err.client_message(), "pdftk failed (exit code unknown)");
    }

    #[test]
    fn test_client_message_hides_details() {
        let err = Error::PdfNotFound {
            path: "/secret/location.pdf".to_string(),
        };
        assert!(!err.client_message().contains("secret"));

        let err = Error::MalformedLine {
            line: "garbage".to_string(),
        };
        assert_eq!(err.client_message(), "Unexpected pdftk report format");
    }
}
