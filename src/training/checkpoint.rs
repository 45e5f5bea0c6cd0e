//! Model checkpointing
//!
//! Persists model weights with Burn's `CompactRecorder`. The callback keeps
//! the best checkpoint according to a monitored metric plus a rolling `last`
//! checkpoint, and writes a JSON sidecar describing the best entry so other
//! tools can find it without deserializing the record.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::CompactRecorder,
    tensor::backend::{AutodiffBackend, Backend},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MonitorMode;
use crate::error::{Error, Result};
use crate::model::conv_net::{ConvNet, ConvNetConfig};

/// Sidecar metadata describing the best checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub monitor: String,
    pub score: f64,
    pub file: String,
    pub saved_at: String,
}

/// Callback saving model checkpoints during training
pub struct ModelCheckpoint {
    dirpath: PathBuf,
    monitor: String,
    mode: MonitorMode,
    save_last: bool,
    best_score: Option<f64>,
    best_path: Option<PathBuf>,
}

impl ModelCheckpoint {
    pub fn new(dirpath: PathBuf, monitor: String, mode: MonitorMode, save_last: bool) -> Self {
        Self {
            dirpath,
            monitor,
            mode,
            save_last,
            best_score: None,
            best_path: None,
        }
    }

    /// Path of the best checkpoint so far, without the recorder extension
    pub fn best_path(&self) -> Option<&Path> {
        self.best_path.as_deref()
    }

    /// Best monitored score so far
    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    /// Invoked by the trainer after every validation phase.
    pub fn on_validation_end<B: AutodiffBackend>(
        &mut self,
        model: &ConvNet<B>,
        metrics: &HashMap<String, f64>,
        epoch: usize,
    ) -> Result<()> {
        fs::create_dir_all(&self.dirpath)?;

        let score = match metrics.get(&self.monitor) {
            Some(score) => *score,
            None => {
                warn!(
                    "Monitored metric `{}` not found; checkpoint skipped this epoch.",
                    self.monitor
                );
                return Ok(());
            }
        };

        let improved = match self.best_score {
            Some(best) => self.mode.improves(score, best),
            None => true,
        };

        if improved {
            let path = self.dirpath.join(format!("epoch{:03}", epoch + 1));
            save_model(model, &path)?;

            info!(
                "Checkpoint saved to {:?} ({} = {:.4})",
                path, self.monitor, score
            );

            self.best_score = Some(score);
            self.best_path = Some(path.clone());

            let meta = CheckpointMeta {
                epoch: epoch + 1,
                monitor: self.monitor.clone(),
                score,
                file: format!("{}.mpk", path.display()),
                saved_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            };
            fs::write(
                self.dirpath.join("best.json"),
                serde_json::to_string_pretty(&meta)?,
            )?;
        }

        if self.save_last {
            save_model(model, &self.dirpath.join("last"))?;
        }

        Ok(())
    }
}

/// Save a model record next to its metadata.
pub fn save_model<B: Backend>(model: &ConvNet<B>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let recorder = CompactRecorder::new();
    model
        .clone()
        .save_file(path, &recorder)
        .map_err(|e| Error::Checkpoint(format!("failed to save model to {:?}: {:?}", path, e)))
}

/// Load model weights from a checkpoint into a freshly initialized network.
pub fn load_model<B: Backend>(
    config: &ConvNetConfig,
    path: &Path,
    device: &B::Device,
) -> Result<ConvNet<B>> {
    let recorder = CompactRecorder::new();
    config
        .init::<B>(device)?
        .load_file(path, &recorder, device)
        .map_err(|e| Error::Checkpoint(format!("failed to load model from {:?}: {:?}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DefaultBackend, TrainingBackend};

    fn model() -> ConvNet<TrainingBackend> {
        let device = Default::default();
        ConvNetConfig::default()
            .init::<TrainingBackend>(&device)
            .unwrap()
    }

    fn metrics(value: f64) -> HashMap<String, f64> {
        HashMap::from([("Accuracy//val".to_string(), value)])
    }

    #[test]
    fn test_keeps_best_under_max_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = ModelCheckpoint::new(
            dir.path().to_path_buf(),
            "Accuracy//val".to_string(),
            MonitorMode::Max,
            false,
        );
        let model = model();

        cp.on_validation_end(&model, &metrics(0.5), 0).unwrap();
        cp.on_validation_end(&model, &metrics(0.4), 1).unwrap();
        cp.on_validation_end(&model, &metrics(0.7), 2).unwrap();

        assert_eq!(cp.best_score(), Some(0.7));
        assert!(cp.best_path().unwrap().ends_with("epoch003"));
        assert!(dir.path().join("epoch003.mpk").exists());
        assert!(dir.path().join("best.json").exists());
    }

    #[test]
    fn test_keeps_best_under_min_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = ModelCheckpoint::new(
            dir.path().to_path_buf(),
            "Loss//val".to_string(),
            MonitorMode::Min,
            false,
        );
        let model = model();
        let loss = |v: f64| HashMap::from([("Loss//val".to_string(), v)]);

        cp.on_validation_end(&model, &loss(0.9), 0).unwrap();
        cp.on_validation_end(&model, &loss(0.3), 1).unwrap();
        cp.on_validation_end(&model, &loss(0.5), 2).unwrap();

        assert_eq!(cp.best_score(), Some(0.3));
        assert!(cp.best_path().unwrap().ends_with("epoch002"));
    }

    #[test]
    fn test_missing_monitor_skips_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = ModelCheckpoint::new(
            dir.path().to_path_buf(),
            "Accuracy//val".to_string(),
            MonitorMode::Max,
            false,
        );

        cp.on_validation_end(&model(), &HashMap::new(), 0).unwrap();
        assert!(cp.best_path().is_none());
    }

    #[test]
    fn test_save_last_writes_rolling_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = ModelCheckpoint::new(
            dir.path().to_path_buf(),
            "Accuracy//val".to_string(),
            MonitorMode::Max,
            true,
        );

        cp.on_validation_end(&model(), &metrics(0.5), 0).unwrap();
        assert!(dir.path().join("last.mpk").exists());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let path = dir.path().join("model");

        let model = model();
        save_model(&model, &path).unwrap();

        let restored =
            load_model::<DefaultBackend>(&ConvNetConfig::default(), &path, &device).unwrap();

        // Same weights produce the same logits.
        use burn::module::AutodiffModule;
        use burn::tensor::Tensor;
        let input = Tensor::<DefaultBackend, 4>::ones([1, 1, 28, 28], &device);
        let a: Vec<f32> = model
            .valid()
            .forward(input.clone())
            .into_data()
            .to_vec()
            .unwrap();
        let b: Vec<f32> = restored.forward(input).into_data().to_vec().unwrap();

        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}
