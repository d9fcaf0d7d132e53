//! Error handling for the frame post-processing crate
//!
//! This module defines the crate-level error type and a Result alias. The
//! per-frame taxonomy used inside the processing graph lives in
//! [`crate::pipeline::error`] and is wrapped here.

use crate::pipeline::error::PipelineError;
use thiserror::Error;

/// Main error type for configuration, setup and tooling operations
#[derive(Error, Debug)]
pub enum Error {
    /// Errors raised by the processing graph or its units
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to frame sources
    #[error("Frame source error: {0}")]
    Source(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias for crate-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Error::from(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("missing stream list".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing stream list");
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::Source("device gone".to_string());
        let with_ctx = err.with_context("Failed to fetch frame");
        assert!(with_ctx.to_string().contains("Failed to fetch frame"));
        assert!(with_ctx.to_string().contains("device gone"));
    }

    #[test]
    fn test_pipeline_error_context() {
        let res: std::result::Result<(), PipelineError> =
            Err(PipelineError::Pool("exhausted".to_string()));
        let err = res.context("configure").unwrap_err();
        assert!(err.to_string().starts_with("configure: "));
        assert!(err.to_string().contains("exhausted"));
    }
}
