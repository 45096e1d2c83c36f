use super::CaptureSource;
use crate::transport::ImageMessage;
use anyhow::{Context, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::time::Instant;

pub struct WebcamCapture {
    camera: Camera,
    seq: u64,
}

impl WebcamCapture {
    pub fn new(device_index: u32) -> Result<Self> {
        tracing::info!("Initializing webcam {}", device_index);

        let index = CameraIndex::Index(device_index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let mut camera = Camera::new(index, requested).context("Failed to open camera")?;

        camera
            .open_stream()
            .context("Failed to open camera stream")?;

        let format = camera.camera_format();
        tracing::info!(
            "Webcam streaming {}x{} @ {} fps",
            format.width(),
            format.height(),
            format.frame_rate()
        );

        Ok(Self { camera, seq: 0 })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<Option<ImageMessage>> {
        let frame = self.camera.frame().context("Failed to capture frame")?;
        let captured_at = Instant::now();
        self.seq += 1;

        let msg = match frame.decode_image::<RgbFormat>() {
            Ok(decoded) => {
                let (width, height) = decoded.dimensions();
                ImageMessage {
                    seq: self.seq,
                    width,
                    height,
                    encoding: "rgb8".to_string(),
                    step: width * 3,
                    data: decoded.into_raw(),
                    captured_at,
                }
            }
            Err(err) => {
                tracing::warn!("Camera frame {} did not decode: {}", self.seq, err);
                let resolution = frame.resolution();
                undecoded_message(
                    self.seq,
                    captured_at,
                    (resolution.width(), resolution.height()),
                    &format!("{:?}", frame.source_frame_format()),
                    frame.buffer(),
                )
            }
        };
        Ok(Some(msg))
    }

    fn resolution(&self) -> (u32, u32) {
        let format = self.camera.camera_format();
        (format.width(), format.height())
    }
}

/// Pass a frame on in its source encoding (`mjpeg`, `yuyv`, ...), which the
/// segmentation stage rejects as a single bad frame
fn undecoded_message(
    seq: u64,
    captured_at: Instant,
    (width, height): (u32, u32),
    source_format: &str,
    raw: &[u8],
) -> ImageMessage {
    ImageMessage {
        seq,
        width,
        height,
        encoding: source_format.to_ascii_lowercase(),
        step: width,
        data: raw.to_vec(),
        captured_at,
    }
}
