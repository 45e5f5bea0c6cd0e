//! # visionlab
//!
//! A project template for supervised image-classification research using the
//! Burn framework. The template wires together a configuration system, an
//! MNIST data module, a small convolutional network, a training/evaluation
//! loop, experiment logging, and an inference demo.
//!
//! ## Modules
//!
//! - `config`: layered JSON configuration and component instantiation
//! - `dataset`: dataset acquisition, deterministic splits, batch iteration
//! - `model`: convolutional network built with Burn
//! - `training`: classification module, trainer loop, checkpoint callbacks
//! - `logger`: scalar loggers, including a best-effort tracking adapter
//! - `inference`: checkpoint-backed single-input inference
//! - `demo`: interactive web demo around the inference function
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use visionlab::config::ExperimentConfig;
//! use visionlab::experiment::run_experiment;
//!
//! let config = ExperimentConfig::load("configs/default.json")?;
//! let score = run_experiment(config)?;
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod demo;
pub mod error;
pub mod experiment;
pub mod inference;
pub mod logger;
pub mod metrics;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::ExperimentConfig;
pub use dataset::datamodule::MnistDataModule;
pub use dataset::split::{random_split, SplitIndices, SplitLengths};
pub use error::{Error, Result};
pub use inference::api::MnistInference;
pub use model::conv_net::{ConvNet, ConvNetConfig};
pub use training::module::ClassificationModule;
pub use training::trainer::Trainer;

/// Number of digit classes in MNIST
pub const NUM_CLASSES: usize = 10;

/// Side length of an MNIST image (images are square)
pub const IMAGE_SIDE: usize = 28;

/// Per-channel mean used for input normalization
pub const MNIST_MEAN: f32 = 0.1307;

/// Per-channel standard deviation used for input normalization
pub const MNIST_STD: f32 = 0.3081;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
