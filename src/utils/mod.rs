//! Utilities: logging setup and progress reporting

pub mod logging;
