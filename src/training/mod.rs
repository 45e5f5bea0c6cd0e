//! Training loop and supporting pieces
//!
//! The [`module::ClassificationModule`] defines what happens for one batch in
//! each phase; the [`trainer::Trainer`] drives epochs, phase transitions,
//! logging and callbacks around it.

pub mod checkpoint;
pub mod early_stopping;
pub mod module;
pub mod trainer;

use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};

pub use checkpoint::ModelCheckpoint;
pub use early_stopping::EarlyStopping;
pub use module::ClassificationModule;
pub use trainer::Trainer;

/// Phase of the training state machine.
///
/// Transitions are driven by the trainer; the module only reacts to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Validate,
    Test,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Train => write!(f, "train"),
            Phase::Validate => write!(f, "val"),
            Phase::Test => write!(f, "test"),
        }
    }
}

/// Count correct predictions in a batch of logits.
///
/// Returns `(correct, batch_size)`.
pub fn correct_count<B: Backend>(
    logits: &Tensor<B, 2>,
    targets: &Tensor<B, 1, Int>,
) -> (usize, usize) {
    let predictions = logits.clone().argmax(1).squeeze::<1>(1);
    let correct: i64 = predictions
        .equal(targets.clone())
        .int()
        .sum()
        .into_scalar()
        .elem();

    (correct as usize, targets.dims()[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use burn::tensor::TensorData;

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Train.to_string(), "train");
        assert_eq!(Phase::Validate.to_string(), "val");
        assert_eq!(Phase::Test.to_string(), "test");
    }

    #[test]
    fn test_correct_count() {
        let device = Default::default();

        // Argmax of rows: 1, 0, 2. Targets: 1, 2, 2.
        let logits = Tensor::<DefaultBackend, 2>::from_floats(
            TensorData::new(
                vec![0.1f32, 0.8, 0.1, 0.9, 0.05, 0.05, 0.2, 0.2, 0.6],
                [3, 3],
            ),
            &device,
        );
        let targets = Tensor::<DefaultBackend, 1, Int>::from_data(
            TensorData::new(vec![1i64, 2, 2], [3]),
            &device,
        );

        assert_eq!(correct_count(&logits, &targets), (2, 3));
    }
}
