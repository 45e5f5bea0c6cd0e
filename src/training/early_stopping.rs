//! Early stopping callback
//!
//! Stops the fit loop after a monitored metric fails to improve for a
//! configured number of epochs.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::MonitorMode;

/// Early-stopping state over a monitored metric
pub struct EarlyStopping {
    monitor: String,
    mode: MonitorMode,
    patience: usize,
    min_delta: f64,
    best: Option<f64>,
    epochs_without_improvement: usize,
}

impl EarlyStopping {
    pub fn new(monitor: String, mode: MonitorMode, patience: usize, min_delta: f64) -> Self {
        Self {
            monitor,
            mode,
            patience,
            min_delta,
            best: None,
            epochs_without_improvement: 0,
        }
    }

    /// Record this epoch's metrics and decide whether training should stop.
    pub fn should_stop(&mut self, metrics: &HashMap<String, f64>) -> bool {
        let Some(&score) = metrics.get(&self.monitor) else {
            warn!(
                "Monitored metric `{}` not found; early stopping check skipped.",
                self.monitor
            );
            return false;
        };

        let improved = match self.best {
            None => true,
            Some(best) => match self.mode {
                MonitorMode::Max => score > best + self.min_delta,
                MonitorMode::Min => score < best - self.min_delta,
            },
        };

        if improved {
            self.best = Some(score);
            self.epochs_without_improvement = 0;
            return false;
        }

        self.epochs_without_improvement += 1;
        debug!(
            "No improvement in `{}` for {} epochs (best: {:.4})",
            self.monitor, self.epochs_without_improvement, self.best.unwrap_or(0.0)
        );

        if self.epochs_without_improvement >= self.patience {
            warn!(
                "Early stopping triggered after {} epochs without improvement",
                self.patience
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(value: f64) -> HashMap<String, f64> {
        HashMap::from([("Accuracy//val".to_string(), value)])
    }

    #[test]
    fn test_stops_after_patience_exhausted() {
        let mut es = EarlyStopping::new("Accuracy//val".to_string(), MonitorMode::Max, 2, 0.0);

        assert!(!es.should_stop(&metrics(0.8)));
        assert!(!es.should_stop(&metrics(0.7)));
        assert!(es.should_stop(&metrics(0.75)));
    }

    #[test]
    fn test_improvement_resets_patience() {
        let mut es = EarlyStopping::new("Accuracy//val".to_string(), MonitorMode::Max, 2, 0.0);

        assert!(!es.should_stop(&metrics(0.8)));
        assert!(!es.should_stop(&metrics(0.7)));
        assert!(!es.should_stop(&metrics(0.9)));
        assert!(!es.should_stop(&metrics(0.85)));
        assert!(es.should_stop(&metrics(0.85)));
    }

    #[test]
    fn test_min_delta_requires_meaningful_improvement() {
        let mut es = EarlyStopping::new("Accuracy//val".to_string(), MonitorMode::Max, 1, 0.05);

        assert!(!es.should_stop(&metrics(0.8)));
        // 0.82 is within min_delta of 0.8 and does not count as improvement.
        assert!(es.should_stop(&metrics(0.82)));
    }

    #[test]
    fn test_missing_monitor_never_stops() {
        let mut es = EarlyStopping::new("Accuracy//val".to_string(), MonitorMode::Max, 1, 0.0);
        assert!(!es.should_stop(&HashMap::new()));
        assert!(!es.should_stop(&HashMap::new()));
    }
}
