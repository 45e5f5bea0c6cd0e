//! Interactive inference demo
//!
//! A small HTTP server around the inference function: a static page with an
//! image-upload widget, a prediction endpoint taking raw image bytes, and a
//! health endpoint. The server holds one loaded model for its lifetime.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::backend::{default_device, DefaultBackend};
use crate::error::Result;
use crate::inference::api::MnistInference;
use crate::model::conv_net::ConvNetConfig;

/// Demo configuration, loaded from its own JSON document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Checkpoint to load, without the recorder extension
    pub checkpoint: PathBuf,
    /// Network configuration matching the checkpoint
    #[serde(default)]
    pub model: ConvNetConfig,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7860
}

impl DemoConfig {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }
}

struct DemoState {
    api: MnistInference<DefaultBackend>,
    started: Instant,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    version: String,
}

#[derive(Serialize)]
struct PredictResponse {
    predicted: Option<usize>,
    probabilities: std::collections::BTreeMap<usize, f32>,
}

async fn index() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

async fn health(State(state): State<Arc<DemoState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        version: crate::VERSION.to_string(),
    })
}

/// POST /api/predict - classify one image sent as raw bytes.
///
/// An empty body is treated as an absent input and returns the all-zero
/// distribution; undecodable bytes are a client error.
async fn predict(
    State(state): State<Arc<DemoState>>,
    body: Bytes,
) -> std::result::Result<Json<PredictResponse>, (StatusCode, String)> {
    if body.is_empty() {
        return Ok(Json(PredictResponse {
            predicted: None,
            probabilities: state.api.predict(None),
        }));
    }

    let image = image::load_from_memory(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("cannot decode image: {}", e)))?;

    let probabilities = state.api.predict(Some(&image));
    let predicted = state.api.predict_class(Some(&image));

    Ok(Json(PredictResponse {
        predicted,
        probabilities,
    }))
}

/// Serve the demo until the process is terminated.
pub async fn serve(config: DemoConfig) -> anyhow::Result<()> {
    let device = default_device();
    let api = MnistInference::<DefaultBackend>::from_checkpoint(
        &config.model,
        &config.checkpoint,
        device,
    )?;

    let state = Arc::new(DemoState {
        api,
        started: Instant::now(),
    });

    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/predict", post(predict))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting demo server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_config_defaults() {
        let config: DemoConfig =
            serde_json::from_str(r#"{"checkpoint": "output/checkpoints/last"}"#).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7860);
        assert_eq!(config.model, ConvNetConfig::default());
    }
}
