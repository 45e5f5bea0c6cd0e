//! Experiment pipeline
//!
//! Turns a composed [`ExperimentConfig`] into live components and runs the
//! training and testing phases. This is the only place that wires model,
//! datamodule, trainer, loggers and callbacks together; everything else is
//! driven by configuration.

use burn::optim::{momentum::MomentumConfig, decay::WeightDecayConfig, AdamConfig, SgdConfig};
use burn::tensor::backend::Backend;
use tracing::info;

use crate::backend::{default_device, TrainingBackend};
use crate::config::{CallbackSpec, ExperimentConfig, LoggerSpec, OptimizerSpec};
use crate::dataset::datamodule::MnistDataModule;
use crate::error::{Error, Result};
use crate::logger::{ConsoleLogger, ScalarLogger, TrackingLogger};
use crate::training::module::ClassificationModule;
use crate::training::{EarlyStopping, ModelCheckpoint, Trainer};

/// Seed every random number generator involved in a run.
pub fn seed_everything(seed: u64) {
    info!("Seeding random number generators with {}", seed);
    TrainingBackend::seed(seed);
}

fn build_loggers(specs: &[LoggerSpec]) -> Vec<Box<dyn ScalarLogger>> {
    specs
        .iter()
        .map(|spec| {
            info!("Instantiating logger <{}>", spec.target());
            match spec {
                LoggerSpec::Console {} => Box::new(ConsoleLogger::new()) as Box<dyn ScalarLogger>,
                LoggerSpec::Tracking { config } => Box::new(TrackingLogger::new(config.clone())),
            }
        })
        .collect()
}

fn build_callbacks(specs: &[CallbackSpec]) -> (Option<ModelCheckpoint>, Option<EarlyStopping>) {
    let mut checkpoint = None;
    let mut early_stopping = None;

    for spec in specs {
        match spec {
            CallbackSpec::ModelCheckpoint {
                dirpath,
                monitor,
                mode,
                save_last,
            } => {
                info!("Instantiating callback <model_checkpoint>");
                checkpoint = Some(ModelCheckpoint::new(
                    dirpath.clone(),
                    monitor.clone(),
                    *mode,
                    *save_last,
                ));
            }
            CallbackSpec::EarlyStopping {
                monitor,
                mode,
                patience,
                min_delta,
            } => {
                info!("Instantiating callback <early_stopping>");
                early_stopping = Some(EarlyStopping::new(
                    monitor.clone(),
                    *mode,
                    *patience,
                    *min_delta,
                ));
            }
        }
    }

    (checkpoint, early_stopping)
}

/// General training and testing pipeline.
///
/// Returns the value of `optimization_metric` when one is configured, for
/// hyperparameter-search drivers built on top of this function.
pub fn run_experiment(config: ExperimentConfig) -> Result<Option<f64>> {
    if let Some(seed) = config.seed {
        seed_everything(seed);
    }

    let device = default_device();

    // Init model
    info!("Instantiating model <{}>", config.model.target());
    info!("Instantiating network <{}>", config.model.net().target());
    let model = config
        .model
        .net()
        .conv_net_config()
        .init::<TrainingBackend>(&device)?;
    let mut module = ClassificationModule::new(model);

    // Init datamodule
    info!("Instantiating datamodule <{}>", config.datamodule.target());
    let mut datamodule = MnistDataModule::new(config.datamodule.params().clone());

    // Init trainer with its loggers and callbacks
    let loggers = build_loggers(&config.logger);
    let (checkpoint, early_stopping) = build_callbacks(&config.callbacks);
    let mut trainer = Trainer::<TrainingBackend>::new(
        config.trainer.clone(),
        checkpoint,
        early_stopping,
        loggers,
        device,
    );

    // Send the configuration to every logger
    info!("Logging hyperparameters.");
    let params = serde_json::to_value(&config)?;
    trainer.log_hyperparams(&params);

    // Train the model
    if config.train {
        info!("Starting training.");
        datamodule.prepare()?;
        datamodule.setup()?;

        let optimizer_spec = config.model.optimizer();
        info!("Instantiating optimizer <{}>", optimizer_spec.target());
        let lr = optimizer_spec.learning_rate();
        match optimizer_spec {
            OptimizerSpec::Adam { weight_decay, .. } => {
                let optimizer = AdamConfig::new()
                    .with_weight_decay(Some(WeightDecayConfig::new(*weight_decay)))
                    .init();
                trainer.fit(&mut module, optimizer, lr, &datamodule)?;
            }
            OptimizerSpec::Sgd { momentum, .. } => {
                let momentum_config = (*momentum > 0.0)
                    .then(|| MomentumConfig::new().with_momentum(*momentum));
                let optimizer = SgdConfig::new().with_momentum(momentum_config).init();
                trainer.fit(&mut module, optimizer, lr, &datamodule)?;
            }
        }
    }

    // Get metric score for hyperparameter optimization
    let score = match &config.optimization_metric {
        Some(metric) => match trainer.callback_metrics.get(metric) {
            Some(score) => Some(*score),
            None => {
                return Err(Error::Config(format!(
                    "Metric for hyperparameter optimization not found. \
                     Make sure the `optimization_metric` `{}` is correct.",
                    metric
                )))
            }
        },
        None => None,
    };

    // Test the model
    if config.test {
        info!("Starting testing.");
        datamodule.prepare()?;
        datamodule.setup()?;

        let restore_best = config.train && !trainer.fast_dev_run();
        trainer.test(&mut module, &datamodule, restore_best)?;
    }

    // Print path to best checkpoint
    if let Some(path) = trainer.best_checkpoint() {
        info!("Best model checkpoint at {:?}", path);
    }

    trainer.finalize("success");
    Ok(score)
}
