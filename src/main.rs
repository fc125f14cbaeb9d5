use std::sync::Arc;

use anyhow::{Context, Result};
use face_mesh_overlay::config::AppConfig;
use face_mesh_overlay::web::{router, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    let options = config.pipeline_options()?;
    let provider = config.detector_provider();
    if !config.model_path.is_file() {
        warn!("face mesh model {} not found, uploads will fail until it is in place", config.model_path.display());
    }
    match &config.face_detector_path {
        Some(path) if !path.is_file() => warn!("face detector model {} not found", path.display()),
        Some(path) => info!("face boxes from {}", path.display()),
        None => info!("no face detector, the landmark model sees the whole image"),
    }
    info!("drawing {}, at most {} face(s)", options.mesh.describe(), options.detector.max_num_faces);

    let addr = config.bind_addr;
    let state = Arc::new(AppState::new(config, provider, options));
    let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
