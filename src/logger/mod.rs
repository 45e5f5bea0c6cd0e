//! Experiment logging
//!
//! Scalar records flow from the trainer to any number of logging backends
//! through the [`ScalarLogger`] trait. Backends never share state; each one
//! receives the same `(key, value, step)` records and decides how to render
//! or forward them.
//!
//! Metric keys use the `"Group//series"` convention: the part before the
//! first `//` groups related series for display.

pub mod tracking;

use serde_json::Value;
use tracing::info;

pub use tracking::TrackingLogger;

/// A metric value as produced by the trainer
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Scalar(f64),
    Text(String),
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Scalar(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

/// Sink for hyperparameters and scalar metric records
pub trait ScalarLogger {
    /// Forward the full experiment configuration
    fn log_hyperparams(&mut self, params: &Value);

    /// Forward epoch-level metric records
    fn log_metrics(&mut self, metrics: &[(String, MetricValue)], step: Option<usize>);

    /// Flush and close the backend
    fn finalize(&mut self, status: &str);
}

/// Strip characters a tracking backend cannot display.
///
/// Keeps ASCII alphanumerics plus `_`, `/`, `.`, space and `-`. Applying the
/// function twice yields the same result as applying it once.
pub fn sanitize_metric_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '.' | ' ' | '-'))
        .collect()
}

/// Split a `"group//name"` key into a (title, series) pair.
///
/// Keys without a `//` separator map to an empty title; additional segments
/// are folded into the series with single slashes.
pub fn split_title_series(key: &str) -> (String, String) {
    let parts: Vec<&str> = key.split("//").collect();
    if parts.len() >= 2 {
        (parts[0].to_string(), parts[1..].join("/"))
    } else {
        (String::new(), key.to_string())
    }
}

/// Logger that renders records through the process log
#[derive(Debug, Default)]
pub struct ConsoleLogger;

impl ConsoleLogger {
    pub fn new() -> Self {
        Self
    }
}

impl ScalarLogger for ConsoleLogger {
    fn log_hyperparams(&mut self, params: &Value) {
        let keys = params
            .as_object()
            .map(|map| map.keys().cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        info!("Hyperparameters recorded ({})", keys);
    }

    fn log_metrics(&mut self, metrics: &[(String, MetricValue)], step: Option<usize>) {
        for (key, value) in metrics {
            match value {
                MetricValue::Scalar(v) => match step {
                    Some(step) => info!("{} = {:.4} (step {})", key, v, step),
                    None => info!("{} = {:.4}", key, v),
                },
                MetricValue::Text(v) => info!("{} = {}", key, v),
            }
        }
    }

    fn finalize(&mut self, status: &str) {
        info!("Run finished with status: {}", status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_allowed_characters() {
        assert_eq!(sanitize_metric_key("Accuracy//val_best"), "Accuracy//val_best");
        assert_eq!(sanitize_metric_key("loss mean-0.5"), "loss mean-0.5");
    }

    #[test]
    fn test_sanitize_strips_special_characters() {
        assert_eq!(sanitize_metric_key("acc@top5 (%)"), "acctop5 ");
        assert_eq!(sanitize_metric_key("λ/loss"), "/loss");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let keys = ["Accuracy//val", "acc@top5 (%)", "λ→μ", "plain_key"];
        for key in keys {
            let once = sanitize_metric_key(key);
            let twice = sanitize_metric_key(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_split_title_series() {
        assert_eq!(
            split_title_series("Loss//train"),
            ("Loss".to_string(), "train".to_string())
        );
        assert_eq!(
            split_title_series("plain"),
            (String::new(), "plain".to_string())
        );
        assert_eq!(
            split_title_series("a//b//c"),
            ("a".to_string(), "b/c".to_string())
        );
    }

    #[test]
    fn test_metric_value_from() {
        assert_eq!(MetricValue::from(0.5), MetricValue::Scalar(0.5));
        assert_eq!(
            MetricValue::from("done"),
            MetricValue::Text("done".to_string())
        );
    }
}
