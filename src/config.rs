use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::face_mesh::onnx_face_mesh::{DEFAULT_INPUT_SIZE, DEFAULT_INTRA_THREADS};
use crate::face_mesh::{ConnectionGraph, DetectorConfig, MeshGraph, OnnxFaceMeshProvider, TensorLayout};
use crate::overlay::DrawingSpec;
use crate::pipeline::PipelineOptions;

/// Process-wide settings, read once at start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model_path: PathBuf,
    pub face_detector_path: Option<PathBuf>,
    pub mesh_graph: MeshGraph,
    pub connections_path: Option<PathBuf>,
    pub input_size: usize,
    pub layout: TensorLayout,
    pub intra_threads: usize,
    pub max_num_faces: usize,
    pub min_detection_confidence: f32,
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
    pub page_title: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/face_landmark.onnx"),
            face_detector_path: None,
            mesh_graph: MeshGraph::default(),
            connections_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            layout: TensorLayout::Nhwc,
            intra_threads: DEFAULT_INTRA_THREADS,
            max_num_faces: 1,
            min_detection_confidence: 0.5,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8501)),
            max_upload_bytes: 200 * 1024 * 1024,
            page_title: "Facial Landmark Detection".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<AppConfig> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<AppConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let config = AppConfig {
            model_path: value(&lookup, "FACE_MESH_MODEL").map(PathBuf::from).unwrap_or(defaults.model_path),
            face_detector_path: value(&lookup, "FACE_DETECTOR_MODEL").map(PathBuf::from),
            mesh_graph: parsed(&lookup, "FACE_MESH_GRAPH", defaults.mesh_graph)?,
            connections_path: value(&lookup, "FACE_MESH_CONNECTIONS").map(PathBuf::from),
            input_size: parsed(&lookup, "FACE_MESH_INPUT_SIZE", defaults.input_size)?,
            layout: parsed(&lookup, "FACE_MESH_LAYOUT", defaults.layout)?,
            intra_threads: parsed(&lookup, "ORT_INTRA_THREADS", defaults.intra_threads)?,
            max_num_faces: parsed(&lookup, "MAX_NUM_FACES", defaults.max_num_faces)?,
            min_detection_confidence: parsed(&lookup, "MIN_DETECTION_CONFIDENCE", defaults.min_detection_confidence)?,
            bind_addr: parsed(&lookup, "BIND_ADDR", defaults.bind_addr)?,
            max_upload_bytes: parsed(&lookup, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            page_title: value(&lookup, "PAGE_TITLE").unwrap_or(defaults.page_title),
        };
        if config.input_size == 0 {
            return Err(anyhow!("FACE_MESH_INPUT_SIZE must be positive"));
        }
        if config.intra_threads == 0 {
            return Err(anyhow!("ORT_INTRA_THREADS must be positive"));
        }
        if config.max_num_faces == 0 {
            return Err(anyhow!("MAX_NUM_FACES must be at least 1"));
        }
        if !(0.0..=1.0).contains(&config.min_detection_confidence) {
            return Err(anyhow!("MIN_DETECTION_CONFIDENCE must lie in [0, 1]"));
        }
        Ok(config)
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            max_num_faces: self.max_num_faces,
            min_detection_confidence: self.min_detection_confidence,
            static_image_mode: true,
        }
    }

    pub fn pipeline_options(&self) -> Result<PipelineOptions> {
        // a connections file wins over FACE_MESH_GRAPH
        let mesh = match &self.connections_path {
            Some(path) => MeshGraph::Fixed(
                ConnectionGraph::from_json_file(path)
                    .with_context(|| format!("loading connections from {}", path.display()))?,
            ),
            None => self.mesh_graph.clone(),
        };
        Ok(PipelineOptions {
            detector: self.detector_config(),
            mesh,
            drawing: DrawingSpec::default(),
        })
    }

    pub fn detector_provider(&self) -> OnnxFaceMeshProvider {
        OnnxFaceMeshProvider::new(self.model_path.clone())
            .with_input_size(self.input_size)
            .with_layout(self.layout)
            .with_intra_threads(self.intra_threads)
            .with_face_detector(self.face_detector_path.clone())
    }
}

fn value<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match value(lookup, key) {
        Some(value) => value
            .parse()
            .map_err(|err| anyhow!("{key}={value:?} is invalid: {err}")),
        None => Ok(default),
    }
}
