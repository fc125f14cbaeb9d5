use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use image::imageops::{overlay, resize, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::detector::{DetectorConfig, DetectorProvider, LandmarkDetector};
use super::face_detector::{RetinaFaceDetector, CROP_MARGIN};
use super::landmark::{Landmark, LandmarkSet};
use super::FACE_MESH_LANDMARKS;
use crate::color::to_order;
use crate::error::{PipelineError, Result};
use crate::pixel_buffer::{ChannelOrder, PixelBuffer};

pub const DEFAULT_INPUT_SIZE: usize = 192;
pub const DEFAULT_INTRA_THREADS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    Nhwc,
    Nchw,
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            other => Err(format!("unknown tensor layout {other:?}, expected nhwc or nchw")),
        }
    }
}

pub(crate) fn ort_error(err: impl Display) -> PipelineError {
    PipelineError::Detector(err.to_string())
}

pub(crate) fn open_session(model_path: &Path, intra_threads: usize) -> Result<Session> {
    if !model_path.is_file() {
        return Err(PipelineError::Detector(format!("model not found at {}", model_path.display())));
    }
    Session::builder()
        .map_err(ort_error)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(ort_error)?
        .with_intra_threads(intra_threads)
        .map_err(ort_error)?
        .commit_from_file(model_path)
        .map_err(ort_error)
}

/// Where the original image sits on the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub width: usize,
    pub height: usize,
}

impl Letterbox {
    pub fn fit(width: usize, height: usize, size: usize) -> Letterbox {
        let scale = size as f32 / width.max(height).max(1) as f32;
        let resized_width = ((width as f32 * scale).round() as usize).clamp(1, size);
        let resized_height = ((height as f32 * scale).round() as usize).clamp(1, size);
        Letterbox {
            scale,
            offset_x: ((size - resized_width) / 2) as f32,
            offset_y: ((size - resized_height) / 2) as f32,
            width,
            height,
        }
    }

    /// Map a point given in model-input pixels back to pixels of the original image.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }

    /// Map a point given in model-input pixels back to coordinates normalized
    /// to the original image.
    pub fn restore(&self, x: f32, y: f32, z: f32) -> Landmark {
        let (x, y) = self.to_source(x, y);
        let width = self.width.max(1) as f32;
        Landmark {
            x: x / width,
            y: y / self.height.max(1) as f32,
            z: z / self.scale / width,
        }
    }
}

/// Letterbox an image onto a black `size`×`size` canvas and scale samples to [0,1].
pub fn transform(image: &PixelBuffer, size: usize, layout: TensorLayout) -> (Vec<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height(), size);
    let rgb = to_order(image.clone(), ChannelOrder::Rgb).to_rgb_image();
    let resized = resize(
        &rgb,
        ((image.width() as f32 * letterbox.scale).round() as u32).clamp(1, size as u32),
        ((image.height() as f32 * letterbox.scale).round() as u32).clamp(1, size as u32),
        FilterType::Triangle,
    );
    let mut canvas = RgbImage::from_pixel(size as u32, size as u32, Rgb([0, 0, 0]));
    overlay(&mut canvas, &resized, letterbox.offset_x as i64, letterbox.offset_y as i64);

    let sample = |h: usize, w: usize, c: usize| canvas.get_pixel(w as u32, h as u32)[c] as f32 / 255.0;
    let tensor = match layout {
        TensorLayout::Nhwc => Array4::from_shape_fn((1, size, size, 3), |(_, h, w, c)| sample(h, w, c)),
        TensorLayout::Nchw => Array4::from_shape_fn((1, 3, size, size), |(_, c, h, w)| sample(h, w, c)),
    };
    (tensor.iter().copied().collect(), letterbox)
}

fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

/// Turn raw model outputs into a landmark set, or `None` when the landmark
/// output is short or the face presence score is under `min_confidence`.
pub fn post_process(raw_landmarks: &[f32], presence_logit: f32, letterbox: &Letterbox, min_confidence: f32) -> Option<LandmarkSet> {
    let score = sigmoid(presence_logit);
    if raw_landmarks.len() < FACE_MESH_LANDMARKS * 3 {
        debug!("landmark output holds {} values, expected {}", raw_landmarks.len(), FACE_MESH_LANDMARKS * 3);
        return None;
    }
    if score < min_confidence {
        debug!("face presence {:.3} below {:.3}", score, min_confidence);
        return None;
    }
    let landmarks = raw_landmarks
        .chunks_exact(3)
        .take(FACE_MESH_LANDMARKS)
        .map(|point| letterbox.restore(point[0], point[1], point[2]))
        .collect::<Vec<_>>();
    Some(LandmarkSet::new(landmarks, score))
}

/// Pick the landmark tensor and the presence score out of the model outputs,
/// given as `(name, value count)`. Matching goes by size because converted
/// models name their outputs differently.
pub fn select_landmark_outputs(outputs: &[(&str, usize)]) -> Result<(usize, usize)> {
    let landmarks = outputs.iter().position(|&(_, len)| len == FACE_MESH_LANDMARKS * 3);
    let presence = outputs.iter().position(|&(_, len)| len == 1);
    for (name, len) in outputs {
        if *len != FACE_MESH_LANDMARKS * 3 && *len != 1 {
            debug!("ignoring output {} with {} values", name, len);
        }
    }
    match (landmarks, presence) {
        (Some(landmarks), Some(presence)) => Ok((landmarks, presence)),
        _ => Err(PipelineError::Detector(format!(
            "model outputs {:?} do not include {} landmark values and a presence score",
            outputs.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            FACE_MESH_LANDMARKS * 3
        ))),
    }
}

/// Face-landmark network executed through ONNX Runtime, optionally preceded by
/// a face detector that narrows each run to one face.
pub struct OnnxFaceMesh {
    session: Session,
    input_size: usize,
    layout: TensorLayout,
    min_detection_confidence: f32,
    max_num_faces: usize,
    face_detector: Option<RetinaFaceDetector>,
}

impl OnnxFaceMesh {
    pub fn new(model_path: &Path, input_size: usize, layout: TensorLayout, intra_threads: usize, config: &DetectorConfig) -> Result<OnnxFaceMesh> {
        Ok(OnnxFaceMesh {
            session: open_session(model_path, intra_threads)?,
            input_size,
            layout,
            min_detection_confidence: config.min_detection_confidence,
            max_num_faces: config.max_num_faces,
            face_detector: None,
        })
    }

    pub fn with_face_detector(mut self, face_detector: RetinaFaceDetector) -> Self {
        self.face_detector = Some(face_detector);
        self
    }

    fn landmarks(&mut self, image: &PixelBuffer) -> Result<Option<LandmarkSet>> {
        let (input, letterbox) = transform(image, self.input_size, self.layout);
        let (raw_landmarks, presence) = self.infer(input)?;
        Ok(post_process(&raw_landmarks, presence, &letterbox, self.min_detection_confidence))
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<(Vec<f32>, f32)> {
        let size = self.input_size;
        let shape = match self.layout {
            TensorLayout::Nhwc => [1, size, size, 3],
            TensorLayout::Nchw => [1, 3, size, size],
        };
        let output_names = self.session.outputs.iter().map(|output| output.name.clone()).collect::<Vec<_>>();
        let tensor = Tensor::from_array((shape, input)).map_err(ort_error)?;

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
        let (landmarks, presence) = select_landmark_outputs(&sizes)?;
        let presence = extracted[presence].1[0];
        Ok((extracted.swap_remove(landmarks).1, presence))
    }
}

impl LandmarkDetector for OnnxFaceMesh {
    fn detect(&mut self, image: &PixelBuffer) -> Result<Vec<LandmarkSet>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(vec![]);
        }
        let mut boxes = match self.face_detector.as_mut() {
            Some(face_detector) => face_detector.detect(image, self.min_detection_confidence)?,
            None => return Ok(self.landmarks(image)?.into_iter().collect()),
        };
        boxes.truncate(self.max_num_faces);

        let mut faces = Vec::with_capacity(boxes.len());
        for face_box in &boxes {
            let Some(region) = face_box.crop_region(image.width(), image.height(), CROP_MARGIN) else { continue };
            let crop = image.crop(region.x, region.y, region.width, region.height);
            if let Some(face) = self.landmarks(&crop)? {
                faces.push(region.restore(face, image.width(), image.height()));
            }
        }
        debug!("{} face box(es), {} landmark set(s)", boxes.len(), faces.len());
        Ok(faces)
    }
}

/// Opens new ONNX Runtime sessions for every image.
#[derive(Debug, Clone)]
pub struct OnnxFaceMeshProvider {
    pub model_path: PathBuf,
    pub face_detector_path: Option<PathBuf>,
    pub input_size: usize,
    pub layout: TensorLayout,
    pub intra_threads: usize,
}

impl OnnxFaceMeshProvider {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            face_detector_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            layout: TensorLayout::Nhwc,
            intra_threads: DEFAULT_INTRA_THREADS,
        }
    }

    pub fn with_face_detector(mut self, face_detector_path: Option<PathBuf>) -> Self {
        self.face_detector_path = face_detector_path;
        self
    }

    pub fn with_intra_threads(mut self, intra_threads: usize) -> Self {
        self.intra_threads = intra_threads.max(1);
        self
    }

    pub fn with_input_size(mut self, input_size: usize) -> Self {
        self.input_size = input_size;
        self
    }

    pub fn with_layout(mut self, layout: TensorLayout) -> Self {
        self.layout = layout;
        self
    }
}

impl DetectorProvider for OnnxFaceMeshProvider {
    type Detector = OnnxFaceMesh;

    fn acquire(&self, config: &DetectorConfig) -> Result<OnnxFaceMesh> {
        info!("loading face mesh model {}", self.model_path.display());
        let mesh = OnnxFaceMesh::new(&self.model_path, self.input_size, self.layout, self.intra_threads, config)?;
        match &self.face_detector_path {
            Some(path) => {
                info!("loading face detector model {}", path.display());
                Ok(mesh.with_face_detector(RetinaFaceDetector::new(path, self.intra_threads)?))
            }
            None => Ok(mesh),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_centres_wide_images() {
        let letterbox = Letterbox::fit(400, 200, 192);
        assert_eq!(letterbox.scale, 192.0 / 400.0);
        assert_eq!(letterbox.offset_x, 0.0);
        assert_eq!(letterbox.offset_y, 48.0);

        let centre = letterbox.restore(96.0, 96.0, 0.0);
        assert!((centre.x - 0.5).abs() < 1e-3);
        assert!((centre.y - 0.5).abs() < 1e-3);
    }

    #[test]
    fn transform_pads_and_normalizes() {
        let image = PixelBuffer::filled(10, 20, [255, 0, 0], ChannelOrder::Rgb);
        let (nhwc, _) = transform(&image, 8, TensorLayout::Nhwc);
        assert_eq!(nhwc.len(), 8 * 8 * 3);
        // top row is padding, middle row is red
        assert_eq!(&nhwc[0..3], &[0.0, 0.0, 0.0]);
        let middle = (4 * 8 + 4) * 3;
        assert_eq!(&nhwc[middle..middle + 3], &[1.0, 0.0, 0.0]);

        let (nchw, _) = transform(&image, 8, TensorLayout::Nchw);
        assert_eq!(nchw[4 * 8 + 4], 1.0);
        assert_eq!(nchw[64 + 4 * 8 + 4], 0.0);
    }

    #[test]
    fn bgr_buffers_are_fed_as_rgb() {
        let image = PixelBuffer::filled(8, 8, [0, 0, 255], ChannelOrder::Bgr);
        let (nhwc, _) = transform(&image, 8, TensorLayout::Nhwc);
        assert_eq!(&nhwc[0..3], &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn low_presence_is_no_face() {
        let letterbox = Letterbox::fit(192, 192, 192);
        let raw = vec![96.0; FACE_MESH_LANDMARKS * 3];
        assert!(post_process(&raw, -4.0, &letterbox, 0.5).is_none());

        let face = post_process(&raw, 4.0, &letterbox, 0.5).unwrap();
        assert_eq!(face.len(), FACE_MESH_LANDMARKS);
        assert!(face.score > 0.9);
        assert!((face.landmarks[0].x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn short_landmark_output_is_no_face() {
        let letterbox = Letterbox::fit(192, 192, 192);
        let raw = vec![96.0; FACE_MESH_LANDMARKS * 3 - 3];
        assert!(post_process(&raw, 8.0, &letterbox, 0.5).is_none());
        assert!(post_process(&[], 8.0, &letterbox, 0.0).is_none());
    }

    #[test]
    fn outputs_are_matched_by_size() {
        let outputs = [("conv2d_21", 1), ("Identity_2", 1), ("conv2d_20", FACE_MESH_LANDMARKS * 3)];
        assert_eq!(select_landmark_outputs(&outputs).unwrap(), (2, 0));

        let with_extra = [("landmarks", FACE_MESH_LANDMARKS * 3), ("tongue", 32), ("presence", 1)];
        assert_eq!(select_landmark_outputs(&with_extra).unwrap(), (0, 2));
    }

    #[test]
    fn missing_outputs_are_named_in_the_error() {
        let err = select_landmark_outputs(&[("landmarks", FACE_MESH_LANDMARKS * 3), ("tongue", 32)]).unwrap_err();
        assert!(matches!(&err, PipelineError::Detector(message) if message.contains("tongue")));
        assert!(select_landmark_outputs(&[("presence", 1)]).is_err());
        assert!(select_landmark_outputs(&[]).is_err());
    }

    #[test]
    fn letterbox_maps_back_to_source_pixels() {
        let letterbox = Letterbox::fit(100, 50, 200);
        assert_eq!(letterbox.offset_y, 50.0);
        assert_eq!(letterbox.to_source(100.0, 100.0), (50.0, 25.0));
    }

    #[test]
    fn thread_count_is_at_least_one() {
        let provider = OnnxFaceMeshProvider::new("mesh.onnx");
        assert_eq!(provider.intra_threads, DEFAULT_INTRA_THREADS);
        assert_eq!(provider.clone().with_intra_threads(4).intra_threads, 4);
        assert_eq!(provider.with_intra_threads(0).intra_threads, 1);
    }

    #[test]
    fn layout_parses() {
        assert_eq!("NCHW".parse::<TensorLayout>(), Ok(TensorLayout::Nchw));
        assert!("hwc".parse::<TensorLayout>().is_err());
    }

    #[test]
    fn missing_model_is_a_detector_error() {
        let provider = OnnxFaceMeshProvider::new("does/not/exist.onnx");
        let err = provider.acquire(&DetectorConfig::default()).err().unwrap();
        assert!(matches!(err, PipelineError::Detector(_)));

        let with_detector = OnnxFaceMeshProvider::new("does/not/exist.onnx").with_face_detector(Some("no/detector.onnx".into()));
        assert!(with_detector.acquire(&DetectorConfig::default()).is_err());
    }
}
