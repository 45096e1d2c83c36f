use super::{to_gray, OutputSink};
use crate::transport::ImageMessage;
use anyhow::{Context, Result};
use image::GrayImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC};

/// Chroma for a colourless YUYV pixel
const NEUTRAL_CHROMA: u8 = 128;

pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // Announce the frame format so readers of the loopback device agree
        // with what we write
        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let mut format = Output::format(&device).context("Failed to query output format")?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(b"YUYV");
        let applied = Output::set_format(&device, &format).context("Failed to set output format")?;
        if applied.width != width || applied.height != height {
            tracing::warn!(
                "Loopback device negotiated {}x{} instead of {}x{}",
                applied.width,
                applied.height,
                width,
                height
            );
        }

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
        })
    }

    /// Convert a grayscale mask to YUV422 (YUYV) with neutral chroma
    fn gray_to_yuyv(mask: &GrayImage) -> Vec<u8> {
        let (width, height) = mask.dimensions();
        let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

        for row in mask.rows() {
            let luma: Vec<u8> = row.map(|p| p[0]).collect();
            for pair in luma.chunks(2) {
                let y1 = pair[0];
                let y2 = pair.get(1).copied().unwrap_or(y1);

                // YUYV format: Y0 U Y1 V
                yuyv.extend_from_slice(&[y1, NEUTRAL_CHROMA, y2, NEUTRAL_CHROMA]);
            }
        }

        yuyv
    }
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &ImageMessage) -> Result<()> {
        let mask = to_gray(frame)?;

        // Nearest keeps the mask binary
        let mask = if mask.dimensions() != (self.width, self.height) {
            image::imageops::resize(
                &mask,
                self.width,
                self.height,
                image::imageops::FilterType::Nearest,
            )
        } else {
            mask
        };

        let yuyv_data = Self::gray_to_yuyv(&mask);

        // Write directly to the device file
        self.file
            .write_all(&yuyv_data)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }
}
