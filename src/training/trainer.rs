//! Trainer orchestrator
//!
//! Drives the epoch/step loop over the training module: forward and backward
//! passes with the optimizer during the train phase, evaluation on the inner
//! backend during validation and test, epoch-level metric logging, and the
//! checkpoint and early-stopping callbacks.

use std::collections::HashMap;

use burn::{
    module::{AutodiffModule, Module},
    optim::{GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::backend::{AutodiffBackend, Backend},
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::TrainerSpec;
use crate::dataset::datamodule::MnistDataModule;
use crate::error::{Error, Result};
use crate::logger::{MetricValue, ScalarLogger};
use crate::model::conv_net::ConvNet;
use crate::training::{EarlyStopping, ModelCheckpoint, Phase};
use crate::training::module::ClassificationModule;
use crate::utils::logging::TrainingLogger;

/// Epoch-driving orchestrator around a [`ClassificationModule`]
pub struct Trainer<B: AutodiffBackend> {
    spec: TrainerSpec,
    checkpoint: Option<ModelCheckpoint>,
    early_stopping: Option<EarlyStopping>,
    loggers: Vec<Box<dyn ScalarLogger>>,
    device: B::Device,

    /// Metrics of the most recent logged epoch, by key
    pub callback_metrics: HashMap<String, f64>,
    last_epoch: usize,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(
        spec: TrainerSpec,
        checkpoint: Option<ModelCheckpoint>,
        early_stopping: Option<EarlyStopping>,
        loggers: Vec<Box<dyn ScalarLogger>>,
        device: B::Device,
    ) -> Self {
        Self {
            spec,
            checkpoint,
            early_stopping,
            loggers,
            device,
            callback_metrics: HashMap::new(),
            last_epoch: 0,
        }
    }

    /// Whether this run is a single-batch smoke test
    pub fn fast_dev_run(&self) -> bool {
        self.spec.fast_dev_run
    }

    /// Path of the best checkpoint recorded so far
    pub fn best_checkpoint(&self) -> Option<&std::path::Path> {
        self.checkpoint.as_ref().and_then(|cp| cp.best_path())
    }

    /// Forward the configuration to every logger
    pub fn log_hyperparams(&mut self, params: &Value) {
        for logger in &mut self.loggers {
            logger.log_hyperparams(params);
        }
    }

    /// Flush every logger
    pub fn finalize(&mut self, status: &str) {
        for logger in &mut self.loggers {
            logger.finalize(status);
        }
    }

    fn log_epoch(&mut self, records: &[(String, f64)], step: usize) {
        for (key, value) in records {
            self.callback_metrics.insert(key.clone(), *value);
        }

        let metrics: Vec<(String, MetricValue)> = records
            .iter()
            .map(|(key, value)| (key.clone(), MetricValue::Scalar(*value)))
            .collect();
        for logger in &mut self.loggers {
            logger.log_metrics(&metrics, Some(step));
        }
    }

    /// Run the fit loop: train and validate for up to `max_epochs` epochs.
    pub fn fit<O>(
        &mut self,
        module: &mut ClassificationModule<B>,
        mut optimizer: O,
        learning_rate: f64,
        datamodule: &MnistDataModule,
    ) -> Result<()>
    where
        O: Optimizer<ConvNet<B>, B>,
    {
        let max_epochs = if self.spec.fast_dev_run {
            info!("fast_dev_run: running a single batch per phase for one epoch");
            1
        } else {
            self.spec.max_epochs
        };

        let inner_device = <B::InnerBackend as Backend>::Device::default();
        let mut progress = TrainingLogger::new(max_epochs);

        for epoch in 0..max_epochs {
            progress.start_epoch(epoch);
            self.last_epoch = epoch;

            // Train phase
            let batches = datamodule.train_batches::<B>(&self.device, epoch)?;
            let num_batches = batches.num_batches();
            for (batch_idx, batch) in batches.enumerate() {
                let loss = module.training_step(&batch);

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &module.model);
                module.model = optimizer.step(learning_rate, module.model.clone(), grads);

                if (batch_idx + 1) % self.spec.log_every_n_batches == 0
                    || batch_idx + 1 == num_batches
                {
                    debug!(
                        "  Batch {:>4}/{}: loss = {:.4}, acc = {:.2}%",
                        batch_idx + 1,
                        num_batches,
                        module.train_loss(),
                        module.epoch_metrics(Phase::Train)[1].1 * 100.0
                    );
                }

                if self.spec.fast_dev_run {
                    break;
                }
            }

            // Validation phase
            let eval_model = module.model.valid();
            for batch in datamodule.val_batches::<B::InnerBackend>(&inner_device)? {
                module.eval_step(&eval_model, &batch, Phase::Validate);

                if self.spec.fast_dev_run {
                    break;
                }
            }

            let mut records = module.epoch_metrics(Phase::Train);
            records.extend(module.epoch_metrics(Phase::Validate));

            let best = module.on_validation_epoch_end();
            records.push(("Accuracy//val_best".to_string(), best));

            let train_loss = module.train_loss();
            let val_accuracy = module.val_accuracy();
            self.log_epoch(&records, epoch);
            progress.end_epoch(train_loss, val_accuracy, learning_rate);

            if (val_accuracy - best).abs() < f64::EPSILON && val_accuracy > 0.0 {
                progress.log_new_best(best);
            }

            if let Some(checkpoint) = &mut self.checkpoint {
                checkpoint.on_validation_end(&module.model, &self.callback_metrics, epoch)?;
            }

            let stop = match &mut self.early_stopping {
                Some(early_stopping) => early_stopping.should_stop(&self.callback_metrics),
                None => false,
            };

            module.on_epoch_end();

            if stop {
                break;
            }
        }

        progress.log_complete(self.callback_metrics.get("Accuracy//val_best").copied());
        Ok(())
    }

    /// Run the test phase, optionally restoring the best checkpoint first.
    pub fn test(
        &mut self,
        module: &mut ClassificationModule<B>,
        datamodule: &MnistDataModule,
        restore_best: bool,
    ) -> Result<()> {
        if restore_best {
            match self.best_checkpoint().map(|p| p.to_path_buf()) {
                Some(path) => {
                    info!("Restoring best checkpoint from {:?}", path);
                    let recorder = CompactRecorder::new();
                    module.model = module
                        .model
                        .clone()
                        .load_file(&path, &recorder, &self.device)
                        .map_err(|e| {
                            Error::Checkpoint(format!(
                                "failed to restore checkpoint {:?}: {:?}",
                                path, e
                            ))
                        })?;
                }
                None => warn!("No best checkpoint recorded; testing current weights."),
            }
        }

        let inner_device = <B::InnerBackend as Backend>::Device::default();
        let eval_model = module.model.valid();
        for batch in datamodule.test_batches::<B::InnerBackend>(&inner_device)? {
            module.eval_step(&eval_model, &batch, Phase::Test);

            if self.spec.fast_dev_run {
                break;
            }
        }

        let records = module.epoch_metrics(Phase::Test);
        for (key, value) in &records {
            info!("{} = {:.4}", key, value);
        }
        self.log_epoch(&records, self.last_epoch);

        module.on_epoch_end();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;

    use burn::optim::AdamConfig;

    use super::*;
    use crate::backend::TrainingBackend;
    use crate::config::MonitorMode;
    use crate::dataset::datamodule::{DataModuleParams, MnistDataModule};
    use crate::model::conv_net::ConvNetConfig;

    fn write_partition(dir: &Path, prefix: &str, count: u32) {
        let side = 28u32;
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

    fn datamodule(root: &Path) -> MnistDataModule {
        let dataset_dir = root.join("MNIST");
        std::fs::create_dir_all(&dataset_dir).unwrap();
        write_partition(&dataset_dir, "train", 8);
        write_partition(&dataset_dir, "t10k", 4);

        let mut dm = MnistDataModule::new(DataModuleParams {
            data_dir: root.to_path_buf(),
            dataset_dirname: "MNIST".to_string(),
            train_val_test_split: [8, 2, 2],
            batch_size: 4,
            num_workers: 0,
            seed: 42,
            dvc: None,
            mirror_url: "http://127.0.0.1:1/mnist".to_string(),
        });
        dm.setup().unwrap();
        dm
    }

    fn trainer(checkpoint_dir: Option<&Path>) -> Trainer<TrainingBackend> {
        let checkpoint = checkpoint_dir.map(|dir| {
            ModelCheckpoint::new(
                dir.to_path_buf(),
                "Accuracy//val".to_string(),
                MonitorMode::Max,
                true,
            )
        });

        Trainer::new(
            TrainerSpec {
                max_epochs: 2,
                fast_dev_run: false,
                log_every_n_batches: 10,
            },
            checkpoint,
            None,
            Vec::new(),
            Default::default(),
        )
    }

    #[test]
    fn test_fit_populates_callback_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let dm = datamodule(dir.path());

        let device = Default::default();
        let model = ConvNetConfig::default()
            .init::<TrainingBackend>(&device)
            .unwrap();
        let mut module = ClassificationModule::new(model);
        let mut trainer = trainer(None);

        let optimizer = AdamConfig::new().init();
        trainer.fit(&mut module, optimizer, 1e-3, &dm).unwrap();

        for key in [
            "Loss//train",
            "Accuracy//train",
            "Loss//val",
            "Accuracy//val",
            "Accuracy//val_best",
        ] {
            assert!(
                trainer.callback_metrics.contains_key(key),
                "missing metric {}",
                key
            );
        }
    }

    #[test]
    fn test_fit_then_test_records_checkpoint_and_test_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt_dir = dir.path().join("checkpoints");
        let dm = datamodule(dir.path());

        let device = Default::default();
        let model = ConvNetConfig::default()
            .init::<TrainingBackend>(&device)
            .unwrap();
        let mut module = ClassificationModule::new(model);
        let mut trainer = trainer(Some(&ckpt_dir));

        let optimizer = AdamConfig::new().init();
        trainer.fit(&mut module, optimizer, 1e-3, &dm).unwrap();

        assert!(trainer.best_checkpoint().is_some());
        assert!(ckpt_dir.join("last.mpk").exists());

        trainer.test(&mut module, &dm, true).unwrap();
        assert!(trainer.callback_metrics.contains_key("Accuracy//test"));
        assert!(trainer.callback_metrics.contains_key("Loss//test"));
    }
}
