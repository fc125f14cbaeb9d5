
/// One facial keypoint. `x` and `y` are normalized to the image width and height,
/// `z` is depth on roughly the same scale as `x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkSet {
    pub landmarks: Vec<Landmark>,
    pub score: f32,
}

impl LandmarkSet {
    pub fn new(landmarks: Vec<Landmark>, score: f32) -> Self {
        Self { landmarks, score }
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index)
    }

    /// Pixel position of landmark `index`, or `None` when it is missing or
    /// lies outside the frame.
    pub fn to_pixel(&self, index: usize, width: usize, height: usize) -> Option<(f32, f32)> {
        let landmark = self.get(index)?;
        normalized_to_pixel(landmark.x, landmark.y, width, height)
    }
}

fn in_unit_interval(value: f32) -> bool {
    const TOLERANCE: f32 = 1e-6;
    (value > 0.0 || value.abs() < TOLERANCE) && (value < 1.0 || (value - 1.0).abs() < TOLERANCE)
}

/// Scale a normalized coordinate by (width, height), flooring and clamping to
/// the last pixel.
pub fn normalized_to_pixel(x: f32, y: f32, width: usize, height: usize) -> Option<(f32, f32)> {
    if width == 0 || height == 0 || !in_unit_interval(x) || !in_unit_interval(y) {
        return None;
    }
    let px = (x * width as f32).floor().clamp(0.0, (width - 1) as f32);
    let py = (y * height as f32).floor().clamp(0.0, (height - 1) as f32);
    Some((px, py))
}
