//! Error types for recency assay simulation and estimation.
//!
//! Every error is fatal for the operation that raised it. Nothing is clamped
//! or retried; the message names the parameter or quantity and the bound that
//! was violated so the caller can adjust the configuration.

use thiserror::Error;

use crate::exit_codes::ExitCode;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the core crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Mutually exclusive or required parameters violated.
    #[error("configuration error in {parameter}: {message}")]
    Configuration { parameter: String, message: String },

    /// A numeric routine left its valid range or exhausted its budget.
    #[error("numerical range error in {quantity}: {message}")]
    NumericalRange { quantity: String, message: String },

    /// A model evaluated outside its domain (e.g. a negative incidence rate).
    #[error("domain error: {quantity} = {value}: {message}")]
    Domain {
        quantity: String,
        value: f64,
        message: String,
    },

    #[error(transparent)]
    Config(#[from] ra_config::ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn configuration(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Configuration {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    pub fn numerical_range(quantity: impl Into<String>, message: impl Into<String>) -> Self {
        Error::NumericalRange {
            quantity: quantity.into(),
            message: message.into(),
        }
    }

    pub fn domain(quantity: impl Into<String>, value: f64, message: impl Into<String>) -> Self {
        Error::Domain {
            quantity: quantity.into(),
            value,
            message: message.into(),
        }
    }

    /// Returns the error code for this error type.
    ///
    /// - 10-19: configuration errors
    /// - 30-39: numerical errors
    /// - 60-69: I/O errors (validation errors keep their own 60-range code)
    pub fn code(&self) -> u32 {
        match self {
            Error::Configuration { .. } => 10,
            Error::Config(e) => e.code(),
            Error::NumericalRange { .. } => 30,
            Error::Domain { .. } => 31,
            Error::Io(_) => 66,
            Error::Json(_) => 67,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::Configuration { .. } | Error::Config(_) => ExitCode::ConfigError,
            Error::NumericalRange { .. } | Error::Domain { .. } => ExitCode::NumericalError,
            Error::Io(_) | Error::Json(_) => ExitCode::IoError,
        }
    }
}
