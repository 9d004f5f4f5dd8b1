//! Error handling for camflow
//!
//! This module defines the crate-level error type and a Result alias. Graph
//! and runtime failures keep their own types in [`crate::pipeline::error`]
//! and convert into [`CamflowError`] at the crate boundary.

use crate::pipeline::error::{BuildError, NegotiationError, PipelineError, RuntimeError};
use thiserror::Error;

/// Main error type for camflow operations
#[derive(Error, Debug)]
pub enum CamflowError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Graph build, negotiation or runtime errors
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CamflowError>,
    },
}

impl CamflowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CamflowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The underlying pipeline error, looking through added context.
    pub fn pipeline_error(&self) -> Option<&PipelineError> {
        match self {
            CamflowError::Pipeline(e) => Some(e),
            CamflowError::WithContext { source, .. } => source.pipeline_error(),
            _ => None,
        }
    }
}

impl From<BuildError> for CamflowError {
    fn from(e: BuildError) -> Self {
        CamflowError::Pipeline(e.into())
    }
}

impl From<NegotiationError> for CamflowError {
    fn from(e: NegotiationError) -> Self {
        CamflowError::Pipeline(e.into())
    }
}

impl From<RuntimeError> for CamflowError {
    fn from(e: RuntimeError) -> Self {
        CamflowError::Pipeline(e.into())
    }
}

/// Result type alias for camflow operations
pub type Result<T> = std::result::Result<T, CamflowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<CamflowError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
