use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use diffpack_core::{git, DiffConfig, DiffError, Envelope};

pub const API_VERSION: &str = "v1";

const SUPPORTED_FEATURES: &[&str] = &[
    "deterministic_output",
    "capacity_management",
    "rename_detection",
    "binary_detection",
    "submodule_detection",
];

pub fn create_router() -> Router {
    Router::new()
        .route("/diff", post(create_diff))
        .route("/health", get(health_check))
        .route("/version", get(version_info))
}

/// Runs the pipeline for the posted configuration and returns the
/// envelope unchanged; failures are in-band (`ok:false`), not HTTP
/// status codes.
async fn create_diff(Json(config): Json<DiffConfig>) -> Json<Value> {
    info!(
        repo_url = %config.repo_url,
        good = %config.commit_good,
        candidate = %config.commit_candidate,
        "diff requested"
    );
    // The pipeline blocks on subprocess I/O, so it runs off the executor.
    let envelope = tokio::task::spawn_blocking(move || diffpack_core::run(&config))
        .await
        .unwrap_or_else(|e| {
            Envelope::failure(&DiffError::Internal(format!("worker task failed: {e}")))
        });
    Json(envelope_value(&envelope))
}

/// Converts the envelope through `Value` so the response body carries
/// the same canonical key order as the CLI output.
fn envelope_value(envelope: &Envelope) -> Value {
    serde_json::to_value(envelope).unwrap_or_else(|e| {
        serde_json::json!({
            "ok": false,
            "error": {
                "code": "INTERNAL_ERROR",
                "message": format!("envelope serialization failed: {e}"),
                "details": {},
            },
        })
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    git_available: bool,
    git_version: Option<String>,
}

async fn health_check() -> Json<HealthResponse> {
    let git_version = git::detect_version().ok();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        git_available: git_version.is_some(),
        git_version,
    })
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
    api_version: &'static str,
    git_version: Option<String>,
    supported_features: Vec<&'static str>,
}

async fn version_info() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        api_version: API_VERSION,
        git_version: git::detect_version().ok(),
        supported_features: SUPPORTED_FEATURES.to_vec(),
    })
}
