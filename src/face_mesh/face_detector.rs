use std::path::Path;
use std::time::Instant;

use itertools::{iproduct, Itertools};
use ndarray::{arr2, Array2};
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use super::landmark::{Landmark, LandmarkSet};
use super::onnx_face_mesh::{open_session, ort_error, transform, Letterbox, TensorLayout};
use crate::error::{PipelineError, Result};
use crate::pixel_buffer::PixelBuffer;

/// Side of the square RetinaFace input.
pub const DETECTOR_INPUT_SIZE: usize = 640;
/// Extra room around a face box, as a fraction of its longer side, on every side.
pub const CROP_MARGIN: f32 = 0.25;

const MIN_SIZES: [[f32; 2]; 3] = [[16.0, 32.0], [64.0, 128.0], [256.0, 512.0]];
const STEPS: [usize; 3] = [8, 16, 32];
const VARIANCES: [f32; 2] = [0.1, 0.2];
const CONFIDENCE_THRESHOLD: f32 = 0.02;
const NMS_THRESHOLD: f32 = 0.4;
const TOP_K: usize = 5000;

/// A detected face in pixels of the searched image, `[x0, y0, x1, y1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub bbox: [f32; 4],
    pub score: f32,
}

impl FaceBox {
    fn area(&self) -> f32 {
        let [x0, y0, x1, y1] = self.bbox;
        (x1 - x0 + 1.0).max(0.0) * (y1 - y0 + 1.0).max(0.0)
    }

    fn iou(&self, other: &FaceBox) -> f32 {
        let [ax0, ay0, ax1, ay1] = self.bbox;
        let [bx0, by0, bx1, by1] = other.bbox;
        let w = (ax1.min(bx1) - ax0.max(bx0) + 1.0).max(0.0);
        let h = (ay1.min(by1) - ay0.max(by0) + 1.0).max(0.0);
        let inter = w * h;
        inter / (self.area() + other.area() - inter)
    }

    /// Square window centred on the box, widened by `margin` of the longer side
    /// on each side and clipped to the image. `None` when nothing is left.
    pub fn crop_region(&self, width: usize, height: usize, margin: f32) -> Option<Region> {
        let [x0, y0, x1, y1] = self.bbox;
        let side = (x1 - x0).max(y1 - y0) * (1.0 + 2.0 * margin);
        let (cx, cy) = ((x0 + x1) / 2.0, (y0 + y1) / 2.0);
        let clip = |v: f32, limit: usize| v.clamp(0.0, limit as f32) as usize;
        let left = clip((cx - side / 2.0).floor(), width);
        let top = clip((cy - side / 2.0).floor(), height);
        let right = clip((cx + side / 2.0).ceil(), width);
        let bottom = clip((cy + side / 2.0).ceil(), height);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Region { x: left, y: top, width: right - left, height: bottom - top })
    }
}

/// Pixel window of an image that the landmark network is run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Region {
    /// Re-express landmarks normalized to this window as landmarks normalized
    /// to the whole `image_width`×`image_height` image.
    pub fn restore(&self, face: LandmarkSet, image_width: usize, image_height: usize) -> LandmarkSet {
        let image_width = image_width.max(1) as f32;
        let image_height = image_height.max(1) as f32;
        let landmarks = face
            .landmarks
            .iter()
            .map(|point| Landmark {
                x: (self.x as f32 + point.x * self.width as f32) / image_width,
                y: (self.y as f32 + point.y * self.height as f32) / image_height,
                z: point.z * self.width as f32 / image_width,
            })
            .collect();
        LandmarkSet::new(landmarks, face.score)
    }
}

/// Anchor boxes `[cx, cy, w, h]`, normalized to the input side.
pub fn prior_box(size: usize) -> Array2<f32> {
    let mut anchors = vec![];
    for (step, min_sizes) in STEPS.iter().zip(MIN_SIZES) {
        let cells = size.div_ceil(*step);
        for (i, j) in iproduct!(0..cells, 0..cells) {
            let cx = (j as f32 + 0.5) * *step as f32 / size as f32;
            let cy = (i as f32 + 0.5) * *step as f32 / size as f32;
            for min_size in min_sizes {
                anchors.push([cx, cy, min_size / size as f32, min_size / size as f32]);
            }
        }
    }
    arr2(&anchors)
}

fn decode(loc: &[f32], priors: &Array2<f32>) -> Vec<[f32; 4]> {
    priors
        .outer_iter()
        .zip(loc.chunks_exact(4))
        .map(|(prior, loc)| {
            let cx = prior[0] + loc[0] * VARIANCES[0] * prior[2];
            let cy = prior[1] + loc[1] * VARIANCES[0] * prior[3];
            let w = prior[2] * (loc[2] * VARIANCES[1]).exp();
            let h = prior[3] * (loc[3] * VARIANCES[1]).exp();
            [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
        })
        .collect()
}

/// Greedy non-maximum suppression, highest score first.
pub fn nms(boxes: Vec<FaceBox>, threshold: f32) -> Vec<FaceBox> {
    let mut keep: Vec<FaceBox> = vec![];
    for candidate in boxes.into_iter().sorted_by(|a, b| b.score.total_cmp(&a.score)) {
        if keep.iter().all(|kept| kept.iou(&candidate) < threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Decode raw RetinaFace outputs into face boxes in pixels of the original
/// image, best first, keeping those scoring at least `min_score`.
pub fn post_process(confidence: &[f32], loc: &[f32], priors: &Array2<f32>, letterbox: &Letterbox, size: usize, min_score: f32) -> Vec<FaceBox> {
    let post_processing_time = Instant::now();
    let candidates = confidence
        .chunks_exact(2)
        .map(|scores| scores[1])
        .zip(decode(loc, priors))
        .filter(|(score, _)| *score > CONFIDENCE_THRESHOLD)
        .sorted_by(|a, b| b.0.total_cmp(&a.0))
        .take(TOP_K)
        .map(|(score, [x0, y0, x1, y1])| {
            let (x0, y0) = letterbox.to_source(x0 * size as f32, y0 * size as f32);
            let (x1, y1) = letterbox.to_source(x1 * size as f32, y1 * size as f32);
            FaceBox { bbox: [x0, y0, x1, y1], score }
        })
        .collect::<Vec<_>>();
    let faces = nms(candidates, NMS_THRESHOLD)
        .into_iter()
        .filter(|face| face.score >= min_score)
        .collect::<Vec<_>>();
    debug!("Post processed time: {:?}", post_processing_time.elapsed());
    faces
}

/// Pick the class-score and box-offset tensors out of the detector outputs,
/// given as `(name, value count)`, for a model with `priors` anchors.
pub fn select_detector_outputs(outputs: &[(&str, usize)], priors: usize) -> Result<(usize, usize)> {
    let confidence = outputs.iter().position(|&(_, len)| len == priors * 2);
    let bbox = outputs.iter().position(|&(_, len)| len == priors * 4);
    match (confidence, bbox) {
        (Some(confidence), Some(bbox)) => Ok((confidence, bbox)),
        _ => Err(PipelineError::Detector(format!(
            "face detector outputs {:?} do not match {} anchors",
            outputs.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            priors
        ))),
    }
}

/// RetinaFace face detector run through ONNX Runtime.
pub struct RetinaFaceDetector {
    session: Session,
    priors: Array2<f32>,
}

impl RetinaFaceDetector {
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<RetinaFaceDetector> {
        Ok(RetinaFaceDetector {
            session: open_session(model_path, intra_threads)?,
            priors: prior_box(DETECTOR_INPUT_SIZE),
        })
    }

    /// Face boxes in `image` pixels, best first.
    pub fn detect(&mut self, image: &PixelBuffer, min_score: f32) -> Result<Vec<FaceBox>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(vec![]);
        }
        let (input, letterbox) = transform(image, DETECTOR_INPUT_SIZE, TensorLayout::Nchw);
        let output_names = self.session.outputs.iter().map(|output| output.name.clone()).collect::<Vec<_>>();
        let tensor = Tensor::from_array(([1usize, 3, DETECTOR_INPUT_SIZE, DETECTOR_INPUT_SIZE], input)).map_err(ort_error)?;

        let now = Instant::now();
        let outputs = self.session.run(ort::inputs![tensor]).map_err(ort_error)?;
        debug!("Inferred time: {:?}", now.elapsed());

        let mut extracted = Vec::with_capacity(output_names.len());
        for name in &output_names {
            let Some(value) = outputs.get(name.as_str()) else { continue };
            let (_, data) = value.try_extract_tensor::<f32>().map_err(ort_error)?;
            extracted.push((name.as_str(), data.to_vec()));
        }
        let sizes = extracted.iter().map(|(name, data)| (*name, data.len())).collect::<Vec<_>>();
        let (confidence, bbox) = select_detector_outputs(&sizes, self.priors.nrows())?;
        Ok(post_process(&extracted[confidence].1, &extracted[bbox].1, &self.priors, &letterbox, DETECTOR_INPUT_SIZE, min_score))
    }
}
