//! Error types for dardar-atm.
//!
//! A single error enum covers every failure the collocation pipeline can
//! surface. Errors are never swallowed inside the library: a pass either
//! produces a complete atmospheric state or fails with one of these.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for dardar-atm operations.
#[derive(Error, Debug)]
pub enum AtmError {
    /// NetCDF library errors
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An input file could not be parsed as the expected grid dataset
    #[error("Malformed input file {path}: {message}")]
    FileFormat { path: PathBuf, message: String },

    /// A variable was requested that the file does not advertise
    #[error("Unknown variable '{name}', expected one of: {}", available.join(", "))]
    UnknownVariable {
        name: String,
        available: Vec<String>,
    },

    /// A filename does not follow the expected timestamp pattern
    #[error("Format error: {message}")]
    Format { message: String },

    /// Requested coordinates or times fall outside the reanalysis domain
    #[error("Coverage error: {message}")]
    Coverage { message: String },

    /// No satellite samples remain for the requested orbit segment
    #[error("No data for {node} pass: {message}")]
    MissingPass { node: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid parameter errors
    #[error("Invalid parameter: {param} - {message}")]
    InvalidParameter { param: String, message: String },

    /// Interpolation errors
    #[error("Interpolation error: {message}")]
    Interpolation { message: String },

    /// Array shape mismatches
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive packaging errors
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Convenience type alias for Results with AtmError
pub type Result<T> = std::result::Result<T, AtmError>;
