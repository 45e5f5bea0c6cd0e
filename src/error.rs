//! Error Handling Module
//!
//! Defines the error type shared by the library crates.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for visionlab operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing key, unknown target type, invalid value)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Requested split sizes do not cover the dataset exactly
    #[error("Split sizes sum to {actual} but the dataset has {expected} examples")]
    Split { expected: usize, actual: usize },

    /// Error with model construction or weights
    #[error("Model error: {0}")]
    Model(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Error saving or restoring a checkpoint
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error during dataset download
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Image decoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Convenience Result type for visionlab operations
pub type Result<T> = std::result::Result<T, Error>;
