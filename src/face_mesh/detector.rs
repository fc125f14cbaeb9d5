use std::time::Instant;

use tracing::debug;

use super::landmark::LandmarkSet;
use crate::color::to_order;
use crate::error::Result;
use crate::pixel_buffer::{ChannelOrder, PixelBuffer};

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub max_num_faces: usize,
    pub min_detection_confidence: f32,
    pub static_image_mode: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_num_faces: 1,
            min_detection_confidence: 0.5,
            static_image_mode: true,
        }
    }
}

/// A face-mesh model. Receives `Rgb` buffers and returns one landmark set per
/// face it found, best first.
pub trait LandmarkDetector {
    fn detect(&mut self, image: &PixelBuffer) -> Result<Vec<LandmarkSet>>;
}

/// Builds a detector for a single image. The detector is released when the
/// value returned by `acquire` is dropped.
pub trait DetectorProvider {
    type Detector: LandmarkDetector;

    fn acquire(&self, config: &DetectorConfig) -> Result<Self::Detector>;
}

/// Run `f` with a freshly acquired detector and release it afterwards, on the
/// error path as well.
pub fn with_detector<P, T, F>(provider: &P, config: &DetectorConfig, f: F) -> Result<T>
where
    P: DetectorProvider + ?Sized,
    F: FnOnce(&mut P::Detector) -> Result<T>,
{
    let now = Instant::now();
    let mut detector = provider.acquire(config)?;
    debug!("detector acquired in {:?}", now.elapsed());
    let result = f(&mut detector);
    drop(detector);
    debug!("detector released");
    result
}

/// Detect on `image`, keeping at most `config.max_num_faces` faces and
/// returning the first one.
pub fn detect_faces<D>(detector: &mut D, image: &PixelBuffer, config: &DetectorConfig) -> Result<Option<LandmarkSet>>
where
    D: LandmarkDetector + ?Sized,
{
    let now = Instant::now();
    let mut faces = if image.order() == ChannelOrder::Rgb {
        detector.detect(image)?
    } else {
        detector.detect(&to_order(image.clone(), ChannelOrder::Rgb))?
    };
    debug!("detector returned {} face(s) in {:?}", faces.len(), now.elapsed());
    faces.truncate(config.max_num_faces);
    Ok(faces.into_iter().find(|face| !face.is_empty()))
}
