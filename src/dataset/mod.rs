//! Dataset acquisition, splitting, and batch iteration
//!
//! The flow mirrors the lifecycle of an experiment: `fetch` acquires the raw
//! idx files, `split` derives deterministic index partitions, `mnist` exposes
//! the data through Burn's dataset traits, and `datamodule` ties the three
//! together behind prepare/setup/accessor operations.

pub mod datamodule;
pub mod fetch;
pub mod mnist;
pub mod split;

pub use datamodule::{DataModuleParams, DvcSpec, MnistDataModule};
pub use mnist::{BatchIter, ConcatDataset, DigitBatch, DigitBatcher, DigitItem, MnistDataset, SubsetDataset};
pub use split::{random_split, SplitIndices, SplitLengths};
