//! MNIST data module
//!
//! The data module owns dataset acquisition and splitting, and hands out
//! batch iterators for the three training phases:
//!
//! - `prepare` downloads the dataset if it is not already present
//! - `setup` concatenates the raw partitions and builds the seeded split
//! - `train_batches` / `val_batches` / `test_batches` produce batches

use std::path::PathBuf;
use std::sync::Arc;

use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::fetch::{download_mnist, fetch_with_dvc, MNIST_MIRROR};
use crate::dataset::mnist::{BatchIter, ConcatDataset, MnistDataset, SubsetDataset};
use crate::dataset::split::{random_split, SplitLengths};
use crate::error::{Error, Result};

/// Location of a dvc-managed copy of the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DvcSpec {
    /// Git repository URL with the dvc-managed dataset
    pub repo: String,
    /// File or directory to download from the repository
    pub dir: String,
    /// Revision to fetch, defaults to the default branch head
    #[serde(default)]
    pub rev: Option<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_dataset_dirname() -> String {
    "MNIST".to_string()
}

fn default_split() -> [usize; 3] {
    [55_000, 5_000, 10_000]
}

fn default_batch_size() -> usize {
    64
}

fn default_seed() -> u64 {
    42
}

fn default_mirror_url() -> String {
    MNIST_MIRROR.to_string()
}

/// Configuration fragment for [`MnistDataModule`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataModuleParams {
    /// Root directory for downloaded datasets
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Subdirectory holding this dataset
    #[serde(default = "default_dataset_dirname")]
    pub dataset_dirname: String,
    /// Exact train/validation/test sizes over the concatenated dataset
    #[serde(default = "default_split")]
    pub train_val_test_split: [usize; 3],
    /// Batch size for every phase
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Loader worker count, reserved for backends that shard loading
    #[serde(default)]
    pub num_workers: usize,
    /// Seed for the split and for epoch shuffling
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Optional dvc source tried before the mirror download
    #[serde(default)]
    pub dvc: Option<DvcSpec>,
    /// HTTP mirror used as the fallback download path
    #[serde(default = "default_mirror_url")]
    pub mirror_url: String,
}

struct SplitDatasets {
    train: SubsetDataset,
    val: SubsetDataset,
    test: SubsetDataset,
}

/// Data module for MNIST digit classification
pub struct MnistDataModule {
    params: DataModuleParams,
    splits: Option<SplitDatasets>,
}

impl MnistDataModule {
    pub fn new(params: DataModuleParams) -> Self {
        Self {
            params,
            splits: None,
        }
    }

    /// Directory the raw idx files live in
    pub fn dataset_path(&self) -> PathBuf {
        self.params.data_dir.join(&self.params.dataset_dirname)
    }

    /// Download the dataset if needed.
    ///
    /// Idempotent: when the dataset directory already exists no network or
    /// subprocess activity happens. Otherwise a dvc fetch is attempted first
    /// and the mirror download is used as the fallback.
    pub fn prepare(&self) -> Result<()> {
        let path = self.dataset_path();
        if path.exists() {
            info!("{} dataset already exists.", self.params.dataset_dirname);
            return Ok(());
        }

        info!(
            "{} dataset does not exist in {:?}: trying to download.",
            self.params.dataset_dirname, path
        );

        let mut dvc_success = false;
        if let Some(dvc) = &self.params.dvc {
            dvc_success = fetch_with_dvc(&path, &dvc.repo, &dvc.dir, dvc.rev.as_deref());
            if dvc_success {
                info!("Dataset fetched from dvc repository {}.", dvc.repo);
            }
        }

        if !dvc_success {
            info!("Preparing data from mirror {}.", self.params.mirror_url);
            download_mnist(&path, &self.params.mirror_url)?;
        }

        Ok(())
    }

    /// Load the raw partitions, concatenate them, and build the split.
    ///
    /// Idempotent: calling setup twice never re-splits.
    pub fn setup(&mut self) -> Result<()> {
        if self.splits.is_some() {
            return Ok(());
        }

        let path = self.dataset_path();
        let trainset = MnistDataset::from_dir(&path, "train")?;
        let testset = MnistDataset::from_dir(&path, "t10k")?;
        let dataset = Arc::new(ConcatDataset::new(trainset, testset));

        let lengths = SplitLengths::from(self.params.train_val_test_split);
        let indices = random_split(dataset.len(), lengths, self.params.seed)?;

        info!(
            "Split {} examples into {}/{}/{} (seed {})",
            dataset.len(),
            lengths.train,
            lengths.val,
            lengths.test,
            self.params.seed
        );

        self.splits = Some(SplitDatasets {
            train: SubsetDataset::new(dataset.clone(), indices.train),
            val: SubsetDataset::new(dataset.clone(), indices.val),
            test: SubsetDataset::new(dataset, indices.test),
        });

        Ok(())
    }

    fn splits(&self) -> Result<&SplitDatasets> {
        self.splits
            .as_ref()
            .ok_or_else(|| Error::Dataset("data module used before setup".to_string()))
    }

    /// Number of classes in the dataset
    pub fn num_classes(&self) -> usize {
        crate::NUM_CLASSES
    }

    /// Shuffled training batches for one epoch.
    ///
    /// The shuffle order is derived from the configured seed and the epoch
    /// index so that runs are reproducible but epochs differ.
    pub fn train_batches<B: Backend>(
        &self,
        device: &B::Device,
        epoch: usize,
    ) -> Result<BatchIter<'_, B>> {
        let splits = self.splits()?;
        Ok(BatchIter::shuffled(
            &splits.train,
            self.params.batch_size,
            self.params.seed.wrapping_add(epoch as u64),
            device,
        ))
    }

    /// Validation batches in stored order
    pub fn val_batches<B: Backend>(&self, device: &B::Device) -> Result<BatchIter<'_, B>> {
        let splits = self.splits()?;
        Ok(BatchIter::ordered(
            &splits.val,
            self.params.batch_size,
            device,
        ))
    }

    /// Test batches in stored order
    pub fn test_batches<B: Backend>(&self, device: &B::Device) -> Result<BatchIter<'_, B>> {
        let splits = self.splits()?;
        Ok(BatchIter::ordered(
            &splits.test,
            self.params.batch_size,
            device,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;

    use super::*;
    use crate::backend::DefaultBackend;

    fn params(data_dir: &Path, split: [usize; 3]) -> DataModuleParams {
        DataModuleParams {
            data_dir: data_dir.to_path_buf(),
            dataset_dirname: "MNIST".to_string(),
            train_val_test_split: split,
            batch_size: 2,
            num_workers: 0,
            seed: 42,
            dvc: None,
            // Unroutable on purpose: any network attempt fails the test.
            mirror_url: "http://127.0.0.1:1/mnist".to_string(),
        }
    }

    fn write_partition(dir: &Path, prefix: &str, count: u32) {
        let side = crate::IMAGE_SIDE as u32;
        let mut images = Vec::new();
        images.extend_from_slice(&2051u32.to_be_bytes());
        images.extend_from_slice(&count.to_be_bytes());
        images.extend_from_slice(&side.to_be_bytes());
        images.extend_from_slice(&side.to_be_bytes());
        for i in 0..count * side * side {
            images.push((i % 251) as u8);
        }

        let mut labels = Vec::new();
        labels.extend_from_slice(&2049u32.to_be_bytes());
        labels.extend_from_slice(&count.to_be_bytes());
        for i in 0..count {
            labels.push((i % 10) as u8);
        }

        let mut f = File::create(dir.join(format!("{}-images-idx3-ubyte", prefix))).unwrap();
        f.write_all(&images).unwrap();
        let mut f = File::create(dir.join(format!("{}-labels-idx1-ubyte", prefix))).unwrap();
        f.write_all(&labels).unwrap();
    }

    fn write_dataset(data_dir: &Path) {
        let dataset_dir = data_dir.join("MNIST");
        std::fs::create_dir_all(&dataset_dir).unwrap();
        write_partition(&dataset_dir, "train", 12);
        write_partition(&dataset_dir, "t10k", 4);
    }

    #[test]
    fn test_prepare_is_idempotent_without_network() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());

        let dm = MnistDataModule::new(params(dir.path(), [10, 3, 3]));
        // Dataset present: both calls return without touching the network
        // (the configured mirror is unroutable and would error otherwise).
        dm.prepare().unwrap();
        dm.prepare().unwrap();
    }

    #[test]
    fn test_setup_builds_exact_splits() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());

        let mut dm = MnistDataModule::new(params(dir.path(), [10, 3, 3]));
        dm.setup().unwrap();

        let device = Default::default();
        let val: Vec<_> = dm.val_batches::<DefaultBackend>(&device).unwrap().collect();
        let total: usize = val.iter().map(|b| b.targets.dims()[0]).sum();
        assert_eq!(total, 3);

        let test: Vec<_> = dm
            .test_batches::<DefaultBackend>(&device)
            .unwrap()
            .collect();
        let total: usize = test.iter().map(|b| b.targets.dims()[0]).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_setup_rejects_mismatched_split() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());

        let mut dm = MnistDataModule::new(params(dir.path(), [1, 1, 1]));
        assert!(matches!(dm.setup(), Err(Error::Split { .. })));
    }

    #[test]
    fn test_batches_before_setup_fail() {
        let dir = tempfile::tempdir().unwrap();
        let dm = MnistDataModule::new(params(dir.path(), [10, 3, 3]));

        let device = Default::default();
        assert!(dm.train_batches::<DefaultBackend>(&device, 0).is_err());
    }
}
