use ndarray::s;

use crate::pixel_buffer::{ChannelOrder, PixelBuffer};

/// Exchange channel 0 and channel 2 of every pixel (RGB <-> BGR).
pub fn swap_channels(buffer: &PixelBuffer) -> PixelBuffer {
    let reversed = buffer.pixels().slice(s![.., .., ..;-1]);
    PixelBuffer::new(reversed.as_standard_layout().into_owned(), buffer.order().swapped())
}

pub fn swap_channels_in_place(buffer: &mut PixelBuffer) {
    let order = buffer.order().swapped();
    for mut pixel in buffer.pixels_mut().rows_mut() {
        pixel.swap(0, 2);
    }
    buffer.set_order(order);
}

/// Return `buffer` in `target` order, copying only when a swap is needed.
pub fn to_order(buffer: PixelBuffer, target: ChannelOrder) -> PixelBuffer {
    if buffer.order() == target {
        buffer
    } else {
        swap_channels(&buffer)
    }
}
