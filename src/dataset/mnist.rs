//! MNIST dataset integration for Burn
//!
//! Reads the raw idx files produced by the classic MNIST distribution,
//! exposes them through Burn's `Dataset` trait, and provides the batcher
//! that turns items into normalized training tensors.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};
use crate::{IMAGE_SIDE, MNIST_MEAN, MNIST_STD};

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

/// A single digit image ready for batching
///
/// Pixel values are stored in CHW order, scaled to `[0, 1]`. Normalization
/// happens in the batcher so that items stay cheap to cache and inspect.
#[derive(Clone, Debug)]
pub struct DigitItem {
    /// Flattened grayscale pixels, `IMAGE_SIDE * IMAGE_SIDE` values in `[0, 1]`
    pub image: Vec<f32>,
    /// Digit label (0-9)
    pub label: usize,
}

fn read_u32_be(reader: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Parse an idx3 image file into `(count, rows, cols, pixels)`
pub fn read_idx_images(path: &Path) -> Result<(usize, usize, usize, Vec<u8>)> {
    let mut file = File::open(path).map_err(|e| {
        Error::Dataset(format!("failed to open image file {:?}: {}", path, e))
    })?;

    let magic = read_u32_be(&mut file)?;
    if magic != IMAGES_MAGIC {
        return Err(Error::Dataset(format!(
            "unexpected magic number {} in {:?} (want {})",
            magic, path, IMAGES_MAGIC
        )));
    }

    let count = read_u32_be(&mut file)? as usize;
    let rows = read_u32_be(&mut file)? as usize;
    let cols = read_u32_be(&mut file)? as usize;

    let mut pixels = Vec::with_capacity(count * rows * cols);
    file.read_to_end(&mut pixels)?;

    if pixels.len() != count * rows * cols {
        return Err(Error::Dataset(format!(
            "image file {:?} is truncated: expected {} pixels, found {}",
            path,
            count * rows * cols,
            pixels.len()
        )));
    }

    Ok((count, rows, cols, pixels))
}

/// Parse an idx1 label file
pub fn read_idx_labels(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| {
        Error::Dataset(format!("failed to open label file {:?}: {}", path, e))
    })?;

    let magic = read_u32_be(&mut file)?;
    if magic != LABELS_MAGIC {
        return Err(Error::Dataset(format!(
            "unexpected magic number {} in {:?} (want {})",
            magic, path, LABELS_MAGIC
        )));
    }

    let count = read_u32_be(&mut file)? as usize;
    let mut labels = Vec::with_capacity(count);
    file.read_to_end(&mut labels)?;

    if labels.len() != count {
        return Err(Error::Dataset(format!(
            "label file {:?} is truncated: expected {} labels, found {}",
            path,
            count,
            labels.len()
        )));
    }

    Ok(labels)
}

/// One MNIST partition (the raw `train` or `t10k` files) loaded into memory
#[derive(Debug, Clone)]
pub struct MnistDataset {
    pixels: Vec<u8>,
    labels: Vec<u8>,
    rows: usize,
    cols: usize,
}

impl MnistDataset {
    /// Load `{prefix}-images-idx3-ubyte` and `{prefix}-labels-idx1-ubyte`
    /// from a directory. The standard prefixes are `train` and `t10k`.
    pub fn from_dir(dir: &Path, prefix: &str) -> Result<Self> {
        let images_path = dir.join(format!("{}-images-idx3-ubyte", prefix));
        let labels_path = dir.join(format!("{}-labels-idx1-ubyte", prefix));

        let (count, rows, cols, pixels) = read_idx_images(&images_path)?;
        let labels = read_idx_labels(&labels_path)?;

        if labels.len() != count {
            return Err(Error::Dataset(format!(
                "{} images but {} labels under {:?}",
                count,
                labels.len(),
                dir
            )));
        }

        Ok(Self {
            pixels,
            labels,
            rows,
            cols,
        })
    }

    /// Build a partition directly from raw buffers (used by tests)
    pub fn from_raw(pixels: Vec<u8>, labels: Vec<u8>, rows: usize, cols: usize) -> Self {
        Self {
            pixels,
            labels,
            rows,
            cols,
        }
    }
}

impl Dataset<DigitItem> for MnistDataset {
    fn get(&self, index: usize) -> Option<DigitItem> {
        if index >= self.labels.len() {
            return None;
        }

        let stride = self.rows * self.cols;
        let start = index * stride;
        let image = self.pixels[start..start + stride]
            .iter()
            .map(|&p| p as f32 / 255.0)
            .collect();

        Some(DigitItem {
            image,
            label: self.labels[index] as usize,
        })
    }

    fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Two partitions viewed as one contiguous dataset
///
/// Indices below `first.len()` resolve into the first partition, the rest
/// into the second.
#[derive(Debug, Clone)]
pub struct ConcatDataset {
    first: MnistDataset,
    second: MnistDataset,
}

impl ConcatDataset {
    pub fn new(first: MnistDataset, second: MnistDataset) -> Self {
        Self { first, second }
    }
}

impl Dataset<DigitItem> for ConcatDataset {
    fn get(&self, index: usize) -> Option<DigitItem> {
        if index < self.first.len() {
            self.first.get(index)
        } else {
            self.second.get(index - self.first.len())
        }
    }

    fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }
}

/// A fixed index selection over a shared base dataset
#[derive(Debug, Clone)]
pub struct SubsetDataset {
    base: Arc<ConcatDataset>,
    indices: Vec<usize>,
}

impl SubsetDataset {
    pub fn new(base: Arc<ConcatDataset>, indices: Vec<usize>) -> Self {
        Self { base, indices }
    }
}

impl Dataset<DigitItem> for SubsetDataset {
    fn get(&self, index: usize) -> Option<DigitItem> {
        self.indices.get(index).and_then(|&i| self.base.get(i))
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

/// A batch of digit images for training or evaluation
#[derive(Clone, Debug)]
pub struct DigitBatch<B: Backend> {
    /// Images with shape `[batch_size, 1, IMAGE_SIDE, IMAGE_SIDE]`
    pub images: Tensor<B, 4>,
    /// Labels with shape `[batch_size]`
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher producing normalized digit batches
#[derive(Clone, Debug, Default)]
pub struct DigitBatcher;

impl DigitBatcher {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Batcher<B, DigitItem, DigitBatch<B>> for DigitBatcher {
    fn batch(&self, items: Vec<DigitItem>, device: &B::Device) -> DigitBatch<B> {
        let batch_size = items.len();
        let side = IMAGE_SIDE;

        let images_data: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.iter().map(|&v| (v - MNIST_MEAN) / MNIST_STD))
            .collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 1, side, side]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        DigitBatch { images, targets }
    }
}

/// Iterator over batches of a subset, in either shuffled or stored order
pub struct BatchIter<'a, B: Backend> {
    dataset: &'a SubsetDataset,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    batcher: DigitBatcher,
    device: B::Device,
}

impl<'a, B: Backend> BatchIter<'a, B> {
    /// Iterate in stored order (validation and test phases)
    pub fn ordered(dataset: &'a SubsetDataset, batch_size: usize, device: &B::Device) -> Self {
        Self {
            dataset,
            order: (0..dataset.len()).collect(),
            batch_size,
            cursor: 0,
            batcher: DigitBatcher::new(),
            device: device.clone(),
        }
    }

    /// Iterate in a seeded shuffled order (training phase)
    pub fn shuffled(
        dataset: &'a SubsetDataset,
        batch_size: usize,
        seed: u64,
        device: &B::Device,
    ) -> Self {
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        order.shuffle(&mut rng);

        Self {
            dataset,
            order,
            batch_size,
            cursor: 0,
            batcher: DigitBatcher::new(),
            device: device.clone(),
        }
    }

    /// Total number of batches this iterator yields
    pub fn num_batches(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }
}

impl<B: Backend> Iterator for BatchIter<'_, B> {
    type Item = DigitBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let items: Vec<DigitItem> = self.order[self.cursor..end]
            .iter()
            .filter_map(|&i| self.dataset.get(i))
            .collect();
        self.cursor = end;

        if items.is_empty() {
            return None;
        }

        Some(self.batcher.batch(items, &self.device))
    }
}
