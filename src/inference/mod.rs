//! Inference utilities

pub mod api;

pub use api::MnistInference;
