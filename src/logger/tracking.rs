//! Experiment-tracking adapter
//!
//! Bridges the trainer's metric and hyperparameter events to an external
//! tracking server over HTTP, best-effort. The first call attempts a session
//! handshake with a fixed short timeout; when the server does not respond in
//! time the logger degrades to a no-op for the remainder of the run instead
//! of failing the process.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::logger::{sanitize_metric_key, split_title_series, MetricValue, ScalarLogger};

const JOIN_CHAR: char = '-';

fn default_timeout_secs() -> u64 {
    4
}

fn default_project_name() -> String {
    "visionlab".to_string()
}

fn default_task_name() -> String {
    "untitled_task".to_string()
}

/// Connection settings for the tracking server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Base URL of the tracking server
    pub endpoint: String,
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_task_name")]
    pub task_name: String,
    /// Handshake timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Optional string prepended to every metric key
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    id: String,
}

enum Session {
    Untried,
    Disabled,
    Connected {
        client: reqwest::blocking::Client,
        task_id: String,
    },
}

/// Best-effort logger against an HTTP tracking server
pub struct TrackingLogger {
    config: TrackingConfig,
    session: Session,
}

impl TrackingLogger {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            session: Session::Untried,
        }
    }

    /// Establish the session on first use.
    ///
    /// The handshake request runs on a helper thread so the wait is bounded
    /// by `timeout_secs` even when the connection hangs. Returns true when a
    /// live session exists.
    fn ensure_session(&mut self) -> bool {
        match self.session {
            Session::Connected { .. } => return true,
            Session::Disabled => return false,
            Session::Untried => {}
        }

        let endpoint = self.config.endpoint.trim_end_matches('/').to_string();
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let body = json!({
            "project": self.config.project_name,
            "task": self.config.task_name,
        });

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .and_then(|client| {
                    client
                        .post(format!("{}/api/tasks", endpoint))
                        .json(&body)
                        .send()
                        .and_then(|response| response.error_for_status())
                        .and_then(|response| response.json::<InitResponse>())
                        .map(|init| (client, init.id))
                });
            let _ = tx.send(result);
        });

        self.session = match rx.recv_timeout(timeout) {
            Ok(Ok((client, task_id))) => {
                info!(
                    "Tracking session `{}/{}` started (task {}).",
                    self.config.project_name, self.config.task_name, task_id
                );
                Session::Connected { client, task_id }
            }
            Ok(Err(e)) => {
                warn!("Tracking server rejected the handshake ({}). Proceeding without experiment tracking.", e);
                Session::Disabled
            }
            Err(_) => {
                warn!("Tracking server is not responding. Proceeding without experiment tracking.");
                Session::Disabled
            }
        };

        matches!(self.session, Session::Connected { .. })
    }

    fn post(&self, path: &str, body: &Value) {
        let Session::Connected { client, task_id } = &self.session else {
            return;
        };

        let url = format!(
            "{}/api/tasks/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            task_id,
            path
        );
        if let Err(e) = client.post(url).json(body).send() {
            debug!("Tracking request failed: {}", e);
        }
    }

    fn apply_prefix(&self, key: &str) -> String {
        match &self.config.prefix {
            Some(prefix) if !prefix.is_empty() => format!("{}{}{}", prefix, JOIN_CHAR, key),
            _ => key.to_string(),
        }
    }
}

impl ScalarLogger for TrackingLogger {
    fn log_hyperparams(&mut self, params: &Value) {
        if !self.ensure_session() {
            return;
        }
        self.post("config", params);
    }

    fn log_metrics(&mut self, metrics: &[(String, MetricValue)], step: Option<usize>) {
        if !self.ensure_session() {
            return;
        }

        for (key, value) in metrics {
            let MetricValue::Scalar(v) = value else {
                warn!("Discarding metric with non-numeric value for key `{}`.", key);
                continue;
            };

            let key = self.apply_prefix(key);
            let clean = sanitize_metric_key(&key);
            if clean != key {
                warn!(
                    "Special characters except for ('_', '/', '.', ' ' and '-') in metric key: replacing {} with {}.",
                    key, clean
                );
            }

            let (title, series) = split_title_series(&clean);
            self.post(
                "scalars",
                &json!({
                    "title": title,
                    "series": series,
                    "value": v,
                    "iteration": step,
                }),
            );
        }
    }

    fn finalize(&mut self, status: &str) {
        if let Session::Connected { .. } = self.session {
            self.post("status", &json!({ "status": status }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> TrackingConfig {
        TrackingConfig {
            // Port 1 is closed; the handshake fails fast.
            endpoint: "http://127.0.0.1:1".to_string(),
            project_name: "test".to_string(),
            task_name: "task".to_string(),
            timeout_secs: 1,
            prefix: None,
        }
    }

    #[test]
    fn test_unreachable_server_degrades_to_noop() {
        let mut logger = TrackingLogger::new(unreachable_config());

        logger.log_metrics(
            &[("Loss//train".to_string(), MetricValue::Scalar(0.5))],
            Some(0),
        );
        assert!(matches!(logger.session, Session::Disabled));

        // Subsequent calls stay no-ops without retrying the handshake.
        logger.log_hyperparams(&json!({"seed": 42}));
        logger.log_metrics(&[("Loss//val".to_string(), MetricValue::Scalar(0.4))], None);
        logger.finalize("success");
    }

    #[test]
    fn test_prefix_join() {
        let mut config = unreachable_config();
        config.prefix = Some("run1".to_string());
        let logger = TrackingLogger::new(config);

        assert_eq!(logger.apply_prefix("Loss//train"), "run1-Loss//train");
    }

    #[test]
    fn test_empty_prefix_is_ignored() {
        let mut config = unreachable_config();
        config.prefix = Some(String::new());
        let logger = TrackingLogger::new(config);

        assert_eq!(logger.apply_prefix("Loss//train"), "Loss//train");
    }
}
