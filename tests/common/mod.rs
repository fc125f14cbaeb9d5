#![allow(dead_code)]

use std::f32::consts::TAU;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use face_mesh_overlay::face_mesh::{DetectorConfig, DetectorProvider, Landmark, LandmarkDetector, LandmarkSet, FACE_MESH_LANDMARKS};
use face_mesh_overlay::{PipelineError, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

#[derive(Default)]
pub struct Counters {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub detections: AtomicUsize,
}

impl Counters {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn detections(&self) -> usize {
        self.detections.load(Ordering::SeqCst)
    }
}

/// Detector that answers every image with a fixed list of faces.
pub struct ScriptedDetector {
    faces: Option<Vec<LandmarkSet>>,
    counters: Arc<Counters>,
}

impl LandmarkDetector for ScriptedDetector {
    fn detect(&mut self, _image: &face_mesh_overlay::PixelBuffer) -> Result<Vec<LandmarkSet>> {
        self.counters.detections.fetch_add(1, Ordering::SeqCst);
        self.faces
            .clone()
            .ok_or_else(|| PipelineError::Detector("scripted failure".to_string()))
    }
}

impl Drop for ScriptedDetector {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedProvider {
    faces: Option<Vec<LandmarkSet>>,
    pub counters: Arc<Counters>,
}

impl ScriptedProvider {
    pub fn returning(faces: Vec<LandmarkSet>) -> Self {
        Self { faces: Some(faces), counters: Arc::default() }
    }

    pub fn no_face() -> Self {
        Self::returning(vec![])
    }

    pub fn failing() -> Self {
        Self { faces: None, counters: Arc::default() }
    }
}

impl DetectorProvider for ScriptedProvider {
    type Detector = ScriptedDetector;

    fn acquire(&self, _config: &DetectorConfig) -> Result<ScriptedDetector> {
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedDetector {
            faces: self.faces.clone(),
            counters: self.counters.clone(),
        })
    }
}

/// 468 landmarks spread over an ellipse centred in the frame.
pub fn ring_face(score: f32) -> LandmarkSet {
    let landmarks = (0..FACE_MESH_LANDMARKS)
        .map(|i| {
            let angle = TAU * i as f32 / FACE_MESH_LANDMARKS as f32;
            Landmark::new(0.5 + 0.3 * angle.cos(), 0.5 + 0.35 * angle.sin(), 0.0)
        })
        .collect();
    LandmarkSet::new(landmarks, score)
}

pub fn encode(image: RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

pub fn gray_png(width: u32, height: u32) -> Vec<u8> {
    encode(RgbImage::from_pixel(width, height, Rgb([128, 128, 128])), ImageFormat::Png)
}

pub fn portrait_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(40 + x % 60) as u8, (60 + y % 50) as u8, 90])
    });
    encode(image, ImageFormat::Jpeg)
}
