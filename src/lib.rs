//! Upload a portrait, get the face mesh drawn back over it.
//!
//! The pipeline decodes a JPEG/PNG into an RGB [`PixelBuffer`], keeps a BGR working
//! copy for drawing, asks a [`face_mesh::LandmarkDetector`] for at most one face and
//! draws the connection graph between its landmarks. [`web`] serves the upload page.

pub mod color;
pub mod config;
pub mod display;
mod error;
pub mod face_mesh;
pub mod loader;
pub mod overlay;
pub mod pipeline;
pub mod pixel_buffer;
pub mod web;

pub use error::{PipelineError, Result};
pub use pipeline::{process_upload, PipelineOptions, PipelineReport};
pub use pixel_buffer::{ChannelOrder, PixelBuffer};
