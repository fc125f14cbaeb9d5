use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("uploaded file is empty")]
    EmptyUpload,

    #[error("unsupported image format: {0} (expected JPEG or PNG)")]
    UnsupportedFormat(String),

    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("could not encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("landmark detector failed: {0}")]
    Detector(String),

    #[error("invalid connection graph: {0}")]
    Connections(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Errors caused by the uploaded bytes rather than by the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::EmptyUpload | PipelineError::UnsupportedFormat(_) | PipelineError::Decode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
