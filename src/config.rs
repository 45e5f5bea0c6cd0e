//! Experiment configuration
//!
//! Experiments are described by a JSON tree that is composed at startup and
//! immutable afterwards. Component fragments carry a `type` field naming the
//! concrete implementation to construct; resolution failures (unknown type,
//! missing or unknown arguments) are fatal and surface immediately.
//!
//! Recognized top-level keys: `model`, `datamodule`, `trainer`, `callbacks`,
//! `logger`, `optimization_metric`, `seed`, `train`, `test`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::datamodule::DataModuleParams;
use crate::error::{Error, Result};
use crate::logger::tracking::TrackingConfig;
use crate::model::conv_net::ConvNetConfig;

/// Network fragment, resolved by target type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetSpec {
    ConvNet {
        #[serde(flatten)]
        config: ConvNetConfig,
    },
}

impl NetSpec {
    /// Name of the target type, for instantiation logging
    pub fn target(&self) -> &'static str {
        match self {
            NetSpec::ConvNet { .. } => "conv_net",
        }
    }

    pub fn conv_net_config(&self) -> &ConvNetConfig {
        match self {
            NetSpec::ConvNet { config } => config,
        }
    }
}

/// Optimizer fragment, resolved by target type
///
/// The learning rate is a required argument; leaving it out of the fragment
/// is a fatal configuration error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerSpec {
    Adam {
        lr: f64,
        #[serde(default)]
        weight_decay: f32,
    },
    Sgd {
        lr: f64,
        #[serde(default)]
        momentum: f64,
    },
}

impl OptimizerSpec {
    pub fn target(&self) -> &'static str {
        match self {
            OptimizerSpec::Adam { .. } => "adam",
            OptimizerSpec::Sgd { .. } => "sgd",
        }
    }

    /// Learning rate used with the optimizer
    pub fn learning_rate(&self) -> f64 {
        match self {
            OptimizerSpec::Adam { lr, .. } => *lr,
            OptimizerSpec::Sgd { lr, .. } => *lr,
        }
    }
}

/// Training-module fragment: the network plus its optimizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    ImageClassification {
        net: NetSpec,
        optimizer: OptimizerSpec,
    },
}

impl ModelSpec {
    pub fn target(&self) -> &'static str {
        match self {
            ModelSpec::ImageClassification { .. } => "image_classification",
        }
    }

    pub fn net(&self) -> &NetSpec {
        match self {
            ModelSpec::ImageClassification { net, .. } => net,
        }
    }

    pub fn optimizer(&self) -> &OptimizerSpec {
        match self {
            ModelSpec::ImageClassification { optimizer, .. } => optimizer,
        }
    }
}

/// Datamodule fragment, resolved by target type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataModuleSpec {
    Mnist {
        #[serde(flatten)]
        params: DataModuleParams,
    },
}

impl DataModuleSpec {
    pub fn target(&self) -> &'static str {
        match self {
            DataModuleSpec::Mnist { .. } => "mnist",
        }
    }

    pub fn params(&self) -> &DataModuleParams {
        match self {
            DataModuleSpec::Mnist { params } => params,
        }
    }
}

/// Monitored-metric comparison direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorMode {
    Max,
    Min,
}

impl MonitorMode {
    /// True when `candidate` improves on `best`
    pub fn improves(&self, candidate: f64, best: f64) -> bool {
        match self {
            MonitorMode::Max => candidate > best,
            MonitorMode::Min => candidate < best,
        }
    }
}

fn default_monitor() -> String {
    "Accuracy//val".to_string()
}

fn default_mode() -> MonitorMode {
    MonitorMode::Max
}

fn default_dirpath() -> std::path::PathBuf {
    std::path::PathBuf::from("output/checkpoints")
}

fn default_true() -> bool {
    true
}

fn default_patience() -> usize {
    5
}

/// Callback fragment, resolved by target type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallbackSpec {
    ModelCheckpoint {
        #[serde(default = "default_dirpath")]
        dirpath: std::path::PathBuf,
        #[serde(default = "default_monitor")]
        monitor: String,
        #[serde(default = "default_mode")]
        mode: MonitorMode,
        #[serde(default = "default_true")]
        save_last: bool,
    },
    EarlyStopping {
        #[serde(default = "default_monitor")]
        monitor: String,
        #[serde(default = "default_mode")]
        mode: MonitorMode,
        #[serde(default = "default_patience")]
        patience: usize,
        #[serde(default)]
        min_delta: f64,
    },
}

/// Logger fragment, resolved by target type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoggerSpec {
    Console {},
    Tracking {
        #[serde(flatten)]
        config: TrackingConfig,
    },
}

impl LoggerSpec {
    pub fn target(&self) -> &'static str {
        match self {
            LoggerSpec::Console {} => "console",
            LoggerSpec::Tracking { .. } => "tracking",
        }
    }
}

fn default_max_epochs() -> usize {
    10
}

fn default_log_every_n_batches() -> usize {
    10
}

/// Trainer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainerSpec {
    #[serde(default = "default_max_epochs")]
    pub max_epochs: usize,
    /// Run a single batch per phase for one epoch, as a smoke test
    #[serde(default)]
    pub fast_dev_run: bool,
    #[serde(default = "default_log_every_n_batches")]
    pub log_every_n_batches: usize,
}

impl Default for TrainerSpec {
    fn default() -> Self {
        Self {
            max_epochs: default_max_epochs(),
            fast_dev_run: false,
            log_every_n_batches: default_log_every_n_batches(),
        }
    }
}

/// Full experiment configuration tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub model: ModelSpec,
    pub datamodule: DataModuleSpec,
    #[serde(default)]
    pub trainer: TrainerSpec,
    #[serde(default)]
    pub callbacks: Vec<CallbackSpec>,
    #[serde(default)]
    pub logger: Vec<LoggerSpec>,
    #[serde(default)]
    pub optimization_metric: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_true")]
    pub train: bool,
    #[serde(default)]
    pub test: bool,
}

impl ExperimentConfig {
    /// Load a single configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_layered(&[path.as_ref().to_path_buf()], &[])
    }

    /// Compose a configuration from layered files plus dotted overrides.
    ///
    /// Later files win over earlier ones; objects merge recursively while
    /// scalars and arrays replace. Overrides are `key.path=value` pairs
    /// applied last, with values parsed as JSON when possible and treated as
    /// strings otherwise.
    pub fn load_layered(paths: &[std::path::PathBuf], overrides: &[String]) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::Config("no configuration files given".to_string()));
        }

        let mut merged = Value::Null;
        for path in paths {
            let text = fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("cannot read {:?}: {}", path, e)))?;
            let layer: Value = serde_json::from_str(&text)
                .map_err(|e| Error::Config(format!("invalid JSON in {:?}: {}", path, e)))?;
            merge_values(&mut merged, layer);
        }

        for entry in overrides {
            let (key, raw) = entry.split_once('=').ok_or_else(|| {
                Error::Config(format!("override `{}` is not of the form key=value", entry))
            })?;
            let value = serde_json::from_str(raw).unwrap_or(Value::String(raw.to_string()));
            set_dotted(&mut merged, key, value)?;
        }

        serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))
    }
}

/// Merge `layer` into `base`: objects recurse, everything else replaces.
fn merge_values(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

/// Set a dotted key path, creating intermediate objects as needed.
fn set_dotted(root: &mut Value, dotted: &str, value: Value) -> Result<()> {
    let mut current = root;
    let segments: Vec<&str> = dotted.split('.').collect();

    for (i, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        let map = current.as_object_mut().expect("object just ensured");

        if i == segments.len() - 1 {
            map.insert(segment.to_string(), value);
            return Ok(());
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }

    Err(Error::Config(format!("empty override key `{}`", dotted)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r#"{
        "model": {
            "type": "image_classification",
            "net": {"type": "conv_net"},
            "optimizer": {"type": "adam", "lr": 0.001}
        },
        "datamodule": {"type": "mnist"}
    }"#;

    fn write_config(text: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_minimal_config_loads_with_defaults() {
        let (_dir, path) = write_config(MINIMAL);
        let config = ExperimentConfig::load(&path).unwrap();

        assert_eq!(config.model.target(), "image_classification");
        assert_eq!(config.model.net().target(), "conv_net");
        assert_eq!(config.datamodule.params().batch_size, 64);
        assert_eq!(config.trainer.max_epochs, 10);
        assert!(config.train);
        assert!(!config.test);
    }

    #[test]
    fn test_unknown_target_type_is_fatal() {
        let (_dir, path) = write_config(
            r#"{
                "model": {
                    "type": "image_classification",
                    "net": {"type": "transformer"},
                    "optimizer": {"type": "adam"}
                },
                "datamodule": {"type": "mnist"}
            }"#,
        );
        assert!(matches!(
            ExperimentConfig::load(&path),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_required_argument_is_fatal() {
        let (_dir, path) = write_config(
            r#"{
                "model": {
                    "type": "image_classification",
                    "net": {"type": "conv_net"},
                    "optimizer": {"type": "adam"}
                },
                "datamodule": {"type": "mnist"}
            }"#,
        );
        assert!(matches!(
            ExperimentConfig::load(&path),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_layered_merge_later_layer_wins() {
        let (_dir_a, base) = write_config(MINIMAL);
        let (_dir_b, overlay) = write_config(
            r#"{
                "trainer": {"max_epochs": 3},
                "datamodule": {"type": "mnist", "batch_size": 8}
            }"#,
        );

        let config =
            ExperimentConfig::load_layered(&[base, overlay], &[]).unwrap();

        assert_eq!(config.trainer.max_epochs, 3);
        assert_eq!(config.datamodule.params().batch_size, 8);
        // Untouched nested values survive the merge.
        assert_eq!(config.model.optimizer().learning_rate(), 0.001);
    }

    #[test]
    fn test_dotted_overrides_reach_nested_fragments() {
        let (_dir, path) = write_config(MINIMAL);
        let config = ExperimentConfig::load_layered(
            &[path],
            &[
                "model.optimizer.lr=0.01".to_string(),
                "seed=7".to_string(),
                "datamodule.dataset_dirname=FashionMNIST".to_string(),
            ],
        )
        .unwrap();

        assert!((config.model.optimizer().learning_rate() - 0.01).abs() < 1e-12);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.datamodule.params().dataset_dirname, "FashionMNIST");
    }

    #[test]
    fn test_monitor_mode() {
        assert!(MonitorMode::Max.improves(0.9, 0.8));
        assert!(!MonitorMode::Max.improves(0.7, 0.8));
        assert!(MonitorMode::Min.improves(0.1, 0.2));
    }

    #[test]
    fn test_config_round_trips_to_json() {
        let (_dir, path) = write_config(MINIMAL);
        let config = ExperimentConfig::load(&path).unwrap();

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["model"]["type"], "image_classification");
        assert_eq!(value["datamodule"]["type"], "mnist");
    }
}
