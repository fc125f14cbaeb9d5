use std::fmt;

use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut, Canvas};
use imageproc::point::Point;
use tracing::debug;

use crate::face_mesh::{ConnectionGraph, LandmarkSet};
use crate::pixel_buffer::PixelBuffer;

/// Line style for mesh edges. `color` is given as RGB whatever the buffer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawingSpec {
    pub color: [u8; 3],
    pub thickness: u32,
}

impl DrawingSpec {
    pub const TESSELATION: DrawingSpec = DrawingSpec { color: [192, 192, 192], thickness: 1 };
}

impl Default for DrawingSpec {
    fn default() -> Self {
        Self::TESSELATION
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayStatus {
    NoFace,
    FaceFound { segments: usize },
}

impl OverlayStatus {
    pub fn face_found(&self) -> bool {
        matches!(self, OverlayStatus::FaceFound { .. })
    }
}

impl fmt::Display for OverlayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayStatus::NoFace => write!(f, "No landmarks detected"),
            OverlayStatus::FaceFound { .. } => write!(f, "Facial landmarks detected"),
        }
    }
}

/// Draw every edge of `graph` whose endpoints are both present and in frame.
/// Individual landmark points are not marked. Without landmarks the buffer is
/// left untouched.
pub fn draw_landmarks(buffer: &mut PixelBuffer, landmarks: Option<&LandmarkSet>, graph: &ConnectionGraph, spec: &DrawingSpec) -> OverlayStatus {
    let Some(landmarks) = landmarks.filter(|set| !set.is_empty()) else {
        return OverlayStatus::NoFace;
    };
    let (height, width, _) = buffer.shape();
    let color = Rgb(buffer.order().arrange(spec.color));

    let segments = graph
        .iter()
        .filter_map(|&(start, end)| {
            Some((landmarks.to_pixel(start, width, height)?, landmarks.to_pixel(end, width, height)?))
        })
        .collect::<Vec<_>>();
    if segments.len() < graph.len() {
        debug!("skipped {} connection(s) with missing or out-of-frame landmarks", graph.len() - segments.len());
    }

    let mut canvas = ImageBuffer::<Rgb<u8>, &mut [u8]>::from_raw(width as u32, height as u32, buffer.as_mut_slice())
        .expect("a (height, width, 3) buffer holds exactly width * height * 3 samples");
    for &(start, end) in &segments {
        draw_segment(&mut canvas, start, end, color, spec.thickness);
    }
    OverlayStatus::FaceFound { segments: segments.len() }
}

fn draw_segment<C>(canvas: &mut C, start: (f32, f32), end: (f32, f32), color: Rgb<u8>, thickness: u32)
where
    C: Canvas<Pixel = Rgb<u8>>,
{
    if thickness <= 1 {
        draw_line_segment_mut(canvas, start, end, color);
        return;
    }
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let length = dx.hypot(dy);
    let half = thickness as f32 / 2.0;
    if length < f32::EPSILON {
        draw_filled_circle_mut(canvas, (start.0 as i32, start.1 as i32), half as i32, color);
        return;
    }
    let (nx, ny) = (-dy / length * half, dx / length * half);
    let band = [
        (start.0 + nx, start.1 + ny),
        (end.0 + nx, end.1 + ny),
        (end.0 - nx, end.1 - ny),
        (start.0 - nx, start.1 - ny),
    ]
    .map(|(x, y)| Point::new(x.round() as i32, y.round() as i32));
    if band[0] == band[3] {
        draw_line_segment_mut(canvas, start, end, color);
    } else {
        draw_polygon_mut(canvas, &band, color);
    }
}
