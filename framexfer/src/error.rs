//! Error types for framexfer
//!
//! Every variant is terminal for a benchmark run: nothing is retried and no
//! partial statistics are produced once an error surfaces.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Main error type for the framexfer library
#[derive(Error, Debug)]
pub enum Error {
    /// Setup-time configuration that the pipeline cannot realize
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Bulk hand-off or end-of-stream signalling refused by the pipeline
    #[error("Push error: {0}")]
    Push(String),

    /// Buffer storage could not be obtained
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// Asynchronous fault reported by a pipeline stage
    #[error("Pipeline runtime error: {0}")]
    PipelineRuntime(String),

    /// Buffer accounting does not add up (sink count mismatch, pull after EOS)
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Operation invoked in a state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Errors from the common crate (config loading, I/O)
    #[error(transparent)]
    Common(#[from] framexfer_common::Error),
}

/// Error classification used in diagnostics and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Configuration,
    Push,
    Allocation,
    PipelineRuntime,
    Consistency,
    InvalidState,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Push => "PushError",
            ErrorKind::Allocation => "AllocationError",
            ErrorKind::PipelineRuntime => "PipelineRuntimeError",
            ErrorKind::Consistency => "ConsistencyError",
            ErrorKind::InvalidState => "InvalidState",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) | Error::Common(_) => ErrorKind::Configuration,
            Error::Push(_) => ErrorKind::Push,
            Error::Allocation(_) => ErrorKind::Allocation,
            Error::PipelineRuntime(_) => ErrorKind::PipelineRuntime,
            Error::Consistency(_) => ErrorKind::Consistency,
            Error::InvalidState(_) => ErrorKind::InvalidState,
        }
    }
}

/// Convenience Result type using framexfer Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_errors_classify_as_configuration() {
        let err: Error = framexfer_common::Error::Config("bad".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "Configuration error: bad");
    }

    #[test]
    fn test_kind_display_names() {
        assert_eq!(Error::Push("x".into()).kind().to_string(), "PushError");
        assert_eq!(
            Error::Consistency("x".into()).kind().to_string(),
            "ConsistencyError"
        );
    }
}
