//! Deterministic dataset splitting
//!
//! Partitions a dataset into train/validation/test index sets of exact,
//! caller-specified sizes. The shuffle is driven by a seeded ChaCha RNG so
//! the same seed and sizes always reproduce the same partitions.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Exact sizes of the train/validation/test partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitLengths {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl SplitLengths {
    pub fn new(train: usize, val: usize, test: usize) -> Self {
        Self { train, val, test }
    }

    /// Total number of examples the three partitions cover
    pub fn sum(&self) -> usize {
        self.train + self.val + self.test
    }
}

impl From<[usize; 3]> for SplitLengths {
    fn from(lengths: [usize; 3]) -> Self {
        Self::new(lengths[0], lengths[1], lengths[2])
    }
}

/// Disjoint index partitions produced by [`random_split`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split `total` example indices into three disjoint partitions.
///
/// The partition sizes must sum exactly to `total`; a mismatch is a fatal
/// configuration error.
pub fn random_split(total: usize, lengths: SplitLengths, seed: u64) -> Result<SplitIndices> {
    if lengths.sum() != total {
        return Err(Error::Split {
            expected: total,
            actual: lengths.sum(),
        });
    }

    let mut indices: Vec<usize> = (0..total).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let val_start = lengths.train;
    let test_start = lengths.train + lengths.val;

    Ok(SplitIndices {
        train: indices[..val_start].to_vec(),
        val: indices[val_start..test_start].to_vec(),
        test: indices[test_start..].to_vec(),
    })
}
