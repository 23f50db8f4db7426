//! Error handling for the build-event aggregation engine
//!
//! This module defines custom error types and a Result alias for use
//! throughout the engine.

use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum BuildVisError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// The engine worker has already been shut down
    #[error("Engine disposed")]
    Disposed,

    /// A malformed or inconsistent event stream was observed
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BuildVisError>,
    },
}

impl BuildVisError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BuildVisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, BuildVisError>;

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
