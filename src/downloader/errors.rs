// Error types for request validation and extraction

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use super::extractors::diagnostics::{diagnose_error, error_summary, BlockingReason};

/// Problems with client input. Always user-correctable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing url")]
    MissingUrl,

    #[error("Invalid url: {0}")]
    InvalidUrl(String),

    #[error("Unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid rendition id: {0}")]
    InvalidSelector(String),

    #[error("Invalid request body: {0}")]
    MalformedBody(String),
}

/// Failures of the external extractor (yt-dlp binary, python module or helper service).
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// Tool missing, not executable, or helper service unreachable
    #[error("Extractor unavailable: {0}")]
    ExtractorUnavailable(String),

    /// Non-zero exit or error response
    #[error("Extraction failed: {message}")]
    ExtractionFailed {
        message: String,
        diagnostic: String,
        reason: Option<BlockingReason>,
    },

    #[error("Extraction timed out after {}s", .0.as_secs_f32())]
    ExtractionTimeout(Duration),

    /// Output did not match the expected metadata schema
    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),
}

impl ExtractionError {
    /// Plain failure without extractor diagnostics.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            message: message.into(),
            diagnostic: String::new(),
            reason: None,
        }
    }

    /// Classify the stderr of a failed yt-dlp run.
    pub fn from_stderr(stderr: &str) -> Self {
        let stderr = stderr.trim();

        // The interpreter started but the module is not installed
        if stderr.contains("No module named yt_dlp") || stderr.contains("command not found") {
            return Self::ExtractorUnavailable(
                error_summary(stderr).unwrap_or_else(|| "yt_dlp module not installed".to_string()),
            );
        }

        Self::ExtractionFailed {
            message: error_summary(stderr)
                .unwrap_or_else(|| "yt-dlp exited with an error".to_string()),
            diagnostic: stderr.to_string(),
            reason: diagnose_error(stderr),
        }
    }

    /// Non-zero exit status with whatever the process wrote to stderr.
    pub fn from_exit(program: &str, status: ExitStatus, stderr: &str) -> Self {
        if stderr.trim().is_empty() {
            return Self::failed(format!("{} exited with {}", program, status));
        }
        Self::from_stderr(stderr)
    }

    /// Map a spawn failure: a missing or non-executable binary means the tool is unavailable.
    pub fn from_spawn(program: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                Self::ExtractorUnavailable(format!("{}: {}", program, err))
            }
            _ => Self::failed(format!("Failed to start {}: {}", program, err)),
        }
    }

    /// Stable machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ExtractorUnavailable(_) => "extractor_unavailable",
            Self::ExtractionFailed { .. } => "extraction_failed",
            Self::ExtractionTimeout(_) => "extraction_timeout",
            Self::MalformedMetadata(_) => "malformed_metadata",
        }
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::ExtractionFailed { diagnostic, .. } if !diagnostic.is_empty() => {
                Some(diagnostic.as_str())
            }
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<BlockingReason> {
        match self {
            Self::ExtractionFailed { reason, .. } => *reason,
            _ => None,
        }
    }
}
