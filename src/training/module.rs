//! Classification training module
//!
//! Binds the model, the loss, and per-phase metric accumulators. For every
//! phase the module computes the forward pass, the cross-entropy loss, and
//! predicted labels from a batch, then updates that phase's accumulators.
//! Metrics aggregate at epoch level only; the trainer reads them once per
//! epoch and the module resets them at the epoch boundary.

use burn::{
    nn::loss::CrossEntropyLossConfig,
    tensor::{backend::AutodiffBackend, ElementConversion, Tensor},
};

use crate::dataset::mnist::DigitBatch;
use crate::metrics::{Accuracy, Max, Mean};
use crate::model::conv_net::ConvNet;
use crate::training::{correct_count, Phase};

/// Training module for image classification
pub struct ClassificationModule<B: AutodiffBackend> {
    /// The network being trained
    pub model: ConvNet<B>,

    // Separate metric instances per phase so each epoch-level reduction only
    // sees samples from its own phase.
    metric_train: Accuracy,
    metric_val: Accuracy,
    metric_test: Accuracy,
    loss_train: Mean,
    loss_val: Mean,
    loss_test: Mean,

    // Best validation accuracy across the whole run.
    metric_val_best: Max,
}

impl<B: AutodiffBackend> ClassificationModule<B> {
    pub fn new(model: ConvNet<B>) -> Self {
        Self {
            model,
            metric_train: Accuracy::new(),
            metric_val: Accuracy::new(),
            metric_test: Accuracy::new(),
            loss_train: Mean::new(),
            loss_val: Mean::new(),
            loss_test: Mean::new(),
            metric_val_best: Max::new(),
        }
    }

    /// Training step: forward, loss, metric update.
    ///
    /// Returns the loss tensor so the trainer can run the backward pass and
    /// the optimizer step.
    pub fn training_step(&mut self, batch: &DigitBatch<B>) -> Tensor<B, 1> {
        let logits = self.model.forward(batch.images.clone());
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), batch.targets.clone());

        let loss_value: f64 = loss.clone().into_scalar().elem();
        self.loss_train.update(loss_value);

        let (correct, total) = correct_count(&logits, &batch.targets);
        self.metric_train.update(correct, total);

        loss
    }

    /// Evaluation step for the validation and test phases.
    ///
    /// Runs on the inner (non-autodiff) backend; the caller passes the
    /// validation view of the model so it is derived once per epoch.
    pub fn eval_step(
        &mut self,
        model: &ConvNet<B::InnerBackend>,
        batch: &DigitBatch<B::InnerBackend>,
        phase: Phase,
    ) {
        let logits = model.forward(batch.images.clone());
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), batch.targets.clone());

        let loss_value: f64 = loss.into_scalar().elem();
        let (correct, total) = correct_count(&logits, &batch.targets);

        match phase {
            Phase::Validate => {
                self.loss_val.update(loss_value);
                self.metric_val.update(correct, total);
            }
            Phase::Test => {
                self.loss_test.update(loss_value);
                self.metric_test.update(correct, total);
            }
            Phase::Train => unreachable!("training batches go through training_step"),
        }
    }

    /// Epoch-level records for one phase
    pub fn epoch_metrics(&self, phase: Phase) -> Vec<(String, f64)> {
        let (loss, accuracy) = match phase {
            Phase::Train => (&self.loss_train, &self.metric_train),
            Phase::Validate => (&self.loss_val, &self.metric_val),
            Phase::Test => (&self.loss_test, &self.metric_test),
        };

        vec![
            (format!("Loss//{}", phase), loss.compute()),
            (format!("Accuracy//{}", phase), accuracy.compute()),
        ]
    }

    /// Update the best-so-far tracker from the current validation accuracy
    /// and return the best value.
    pub fn on_validation_epoch_end(&mut self) -> f64 {
        let accuracy = self.metric_val.compute();
        self.metric_val_best.update(accuracy);
        self.metric_val_best.compute()
    }

    /// Reset every phase accumulator at the epoch boundary.
    ///
    /// All three phases are reset unconditionally, even when only one of
    /// them ran this epoch.
    pub fn on_epoch_end(&mut self) {
        self.metric_train.reset();
        self.metric_val.reset();
        self.metric_test.reset();
        self.loss_train.reset();
        self.loss_val.reset();
        self.loss_test.reset();
    }

    /// Current validation accuracy for this epoch
    pub fn val_accuracy(&self) -> f64 {
        self.metric_val.compute()
    }

    /// Mean training loss for this epoch
    pub fn train_loss(&self) -> f64 {
        self.loss_train.compute()
    }
}
