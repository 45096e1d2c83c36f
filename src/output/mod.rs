mod loopback;
mod png_dir;

pub use loopback::V4L2Output;
pub use png_dir::PngDirSink;

use anyhow::Result;

use crate::transport::ImageMessage;

/// Trait for mask destinations
pub trait OutputSink {
    /// Publish one encoded mask
    fn write_frame(&mut self, frame: &ImageMessage) -> Result<()>;

    /// Get the expected output resolution, if the sink fixes one
    fn resolution(&self) -> Option<(u32, u32)>;
}

/// View a `mono8` message as a grayscale image
fn to_gray(frame: &ImageMessage) -> Result<image::GrayImage> {
    if frame.encoding != "mono8" {
        anyhow::bail!("Expected a mono8 frame, got {:?}", frame.encoding);
    }
    let row = frame.width as usize;
    let data = frame
        .data
        .chunks(frame.step.max(1) as usize)
        .take(frame.height as usize)
        .flat_map(|line| &line[..row.min(line.len())])
        .copied()
        .collect();
    image::GrayImage::from_raw(frame.width, frame.height, data)
        .ok_or_else(|| anyhow::anyhow!("Frame {} is shorter than {}x{}", frame.seq, frame.width, frame.height))
}
