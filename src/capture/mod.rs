mod image_dir;
mod v4l_capture;

pub use image_dir::ImageDirSource;
pub use v4l_capture::WebcamCapture;

use anyhow::Result;

use crate::transport::ImageMessage;

/// Trait for frame sources feeding the pipeline
pub trait CaptureSource {
    /// Capture the next frame, or `None` once the source is exhausted
    fn capture_frame(&mut self) -> Result<Option<ImageMessage>>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
