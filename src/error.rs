//! Error types for plot-feed
//!
//! Structured error handling using thiserror. Fetch errors are cloneable so
//! they can travel through shared in-flight fetches to every waiting caller.

use thiserror::Error;

/// Failure reported by a period data provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Provider rejected or failed the request
    #[error("Fetch failed for period '{period}': {message}")]
    Provider { period: String, message: String },

    /// Provider has no data for the requested period
    #[error("Period '{period}' not found")]
    PeriodNotFound { period: String },

    /// Provider data could not be projected into raw records
    #[error("Invalid data in period '{period}': {message}")]
    Data { period: String, message: String },
}

impl FetchError {
    /// Period the failed fetch was issued for
    pub fn period(&self) -> &str {
        match self {
            FetchError::Provider { period, .. }
            | FetchError::PeriodNotFound { period }
            | FetchError::Data { period, .. } => period,
        }
    }
}

/// Failure raised by a sampling engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplingError {
    /// Target point count too small for the chosen method
    #[error("{method} needs a target of at least {minimum} points, got {target}")]
    TargetTooSmall {
        method: &'static str,
        minimum: usize,
        target: usize,
    },

    /// Engine-specific failure
    #[error("Sampling failed: {0}")]
    Engine(String),
}

/// Main error type for plot-feed operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Period data could not be fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Sampling engine failed
    #[error(transparent)]
    Sampling(#[from] SamplingError),

    /// Polars data processing error
    #[error("Data processing error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// File I/O error
    #[error("Failed to access file: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for plot-feed operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// UI-friendly error message formatting
impl PipelineError {
    /// Get a user-friendly error message suitable for displaying in UI
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Fetch(FetchError::PeriodNotFound { period }) => {
                format!("No data available for '{}'", period)
            }
            PipelineError::Fetch(FetchError::Provider { period, message })
            | PipelineError::Fetch(FetchError::Data { period, message }) => {
                format!("Could not load '{}': {}", period, message)
            }
            PipelineError::Sampling(e) => format!("Downsampling error: {}", e),
            PipelineError::Polars(e) => format!("Data error: {}", e),
            PipelineError::Io(e) => format!("File error: {}", e),
            PipelineError::Json(e) => format!("JSON error: {}", e),
            PipelineError::Config(msg) => format!("Config error: {}", msg),
        }
    }

    /// Get a short title for the error (for toast notifications)
    pub fn title(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "Fetch Error",
            PipelineError::Sampling(_) => "Sampling Error",
            PipelineError::Polars(_) => "Data Error",
            PipelineError::Io(_) => "File Error",
            PipelineError::Json(_) => "JSON Error",
            PipelineError::Config(_) => "Configuration Error",
        }
    }
}
