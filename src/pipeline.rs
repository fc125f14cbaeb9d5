use std::time::Instant;

use tracing::{debug, info, warn};

use crate::color::{swap_channels, to_order};
use crate::error::Result;
use crate::face_mesh::{detect_faces, with_detector, DetectorConfig, DetectorProvider, MeshGraph};
use crate::loader::load_image;
use crate::overlay::{draw_landmarks, DrawingSpec, OverlayStatus};
use crate::pixel_buffer::{ChannelOrder, PixelBuffer};

pub const PREPROCESSED_MESSAGE: &str = "Image successfully loaded and preprocessed.";

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub detector: DetectorConfig,
    pub mesh: MeshGraph,
    pub drawing: DrawingSpec,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Decoded upload, `Rgb`.
    pub original: PixelBuffer,
    /// Mesh overlay, or the upload unchanged when no face was found. `Rgb`.
    pub rendered: PixelBuffer,
    pub shape: (usize, usize, usize),
    pub channels: usize,
    pub status: OverlayStatus,
    pub messages: Vec<String>,
}

impl PipelineReport {
    pub fn is_unchanged(&self) -> bool {
        self.original == self.rendered
    }
}

/// Decode an upload, run the face mesh on it and draw the connections.
///
/// Decoding failures return before any detector is acquired. A missing face is
/// not an error: the report carries `OverlayStatus::NoFace` and the original
/// image.
pub fn process_upload<P>(bytes: &[u8], provider: &P, options: &PipelineOptions) -> Result<PipelineReport>
where
    P: DetectorProvider + ?Sized,
{
    let now = Instant::now();
    let original = load_image(bytes)?;

    // drawing happens on a BGR working copy, the detector sees the RGB original
    let mut working = swap_channels(&original);
    let shape = working.shape();
    let channels = working.channels();
    let mut messages = vec![
        format!("Image shape: ({}, {}, {})", shape.0, shape.1, shape.2),
        format!("Image channels: {channels}"),
        PREPROCESSED_MESSAGE.to_string(),
    ];
    debug!("preprocessed {:?} in {:?}", shape, now.elapsed());

    let landmarks = with_detector(provider, &options.detector, |detector| {
        detect_faces(detector, &original, &options.detector)
    })?;
    let status = match &landmarks {
        Some(face) => {
            let graph = options.mesh.resolve(face);
            draw_landmarks(&mut working, Some(face), &graph, &options.drawing)
        }
        None => OverlayStatus::NoFace,
    };
    match status {
        OverlayStatus::NoFace => warn!("no landmarks detected"),
        OverlayStatus::FaceFound { segments } => info!("drew {} mesh segments", segments),
    }
    messages.push(status.to_string());

    let rendered = to_order(working, ChannelOrder::Rgb);
    debug!("pipeline finished in {:?}", now.elapsed());
    Ok(PipelineReport {
        original,
        rendered,
        shape,
        channels,
        status,
        messages,
    })
}
