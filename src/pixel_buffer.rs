use image::RgbImage;
use ndarray::{s, Array3};

/// Order in which the three color samples of a pixel are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl ChannelOrder {
    pub fn swapped(self) -> ChannelOrder {
        match self {
            ChannelOrder::Rgb => ChannelOrder::Bgr,
            ChannelOrder::Bgr => ChannelOrder::Rgb,
        }
    }

    /// Lay out an RGB color the way a buffer of this order stores it.
    pub fn arrange(self, rgb: [u8; 3]) -> [u8; 3] {
        match self {
            ChannelOrder::Rgb => rgb,
            ChannelOrder::Bgr => [rgb[2], rgb[1], rgb[0]],
        }
    }
}

/// (height, width, 3) array of 8-bit samples tagged with its channel order.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pixels: Array3<u8>,
    order: ChannelOrder,
}

impl PixelBuffer {
    pub const CHANNELS: usize = 3;

    pub fn new(pixels: Array3<u8>, order: ChannelOrder) -> PixelBuffer {
        assert_eq!(pixels.dim().2, Self::CHANNELS, "pixel buffers hold exactly 3 channels");
        // drawing goes through a flat slice, so keep the data in row-major order
        let pixels = if pixels.is_standard_layout() {
            pixels
        } else {
            pixels.as_standard_layout().into_owned()
        };
        PixelBuffer { pixels, order }
    }

    pub fn filled(height: usize, width: usize, value: [u8; 3], order: ChannelOrder) -> PixelBuffer {
        let pixels = Array3::from_shape_fn((height, width, Self::CHANNELS), |(_, _, c)| value[c]);
        PixelBuffer { pixels, order }
    }

    pub fn from_rgb_image(image: &RgbImage) -> PixelBuffer {
        let (width, height) = image.dimensions();
        let pixels = Array3::from_shape_fn((height as usize, width as usize, Self::CHANNELS), |(y, x, c)| {
            image.get_pixel(x as u32, y as u32)[c]
        });
        PixelBuffer { pixels, order: ChannelOrder::Rgb }
    }

    /// Copy into an `image` crate buffer. Samples are copied as stored, so a `Bgr`
    /// buffer should be converted to `Rgb` first when the result is meant for display.
    pub fn to_rgb_image(&self) -> RgbImage {
        let (height, width, _) = self.shape();
        let raw = self.pixels.iter().copied().collect::<Vec<_>>();
        RgbImage::from_raw(width as u32, height as u32, raw)
            .expect("a (height, width, 3) buffer holds exactly width * height * 3 samples")
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.pixels.dim()
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn channels(&self) -> usize {
        self.pixels.dim().2
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn pixels(&self) -> &Array3<u8> {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        [self.pixels[[y, x, 0]], self.pixels[[y, x, 1]], self.pixels[[y, x, 2]]]
    }

    /// Copy out the `width`×`height` window whose top-left corner is `(x, y)`,
    /// cut short at the buffer edges.
    pub fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> PixelBuffer {
        let (x, y) = (x.min(self.width()), y.min(self.height()));
        let right = x.saturating_add(width).min(self.width());
        let bottom = y.saturating_add(height).min(self.height());
        PixelBuffer::new(self.pixels.slice(s![y..bottom, x..right, ..]).to_owned(), self.order)
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut Array3<u8> {
        &mut self.pixels
    }

    pub(crate) fn set_order(&mut self, order: ChannelOrder) {
        self.order = order;
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        self.pixels
            .as_slice_mut()
            .expect("pixel buffers are kept in standard layout")
    }

    pub fn into_pixels(self) -> Array3<u8> {
        self.pixels
    }
}
