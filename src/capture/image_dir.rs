use super::CaptureSource;
use crate::transport::ImageMessage;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Replays the images in a directory, in file-name order, as a frame stream
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
    frame_duration: Duration,
    last_frame: Option<Instant>,
    seq: u64,
    resolution: (u32, u32),
}

impl ImageDirSource {
    pub fn new<P: AsRef<Path>>(dir: P, fps: u32, looping: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read image directory {}", dir.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if is_image {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            anyhow::bail!("No images found in {}", dir.display());
        }

        let resolution = image::image_dimensions(&files[0])
            .with_context(|| format!("Failed to read {}", files[0].display()))?;

        tracing::info!(
            "Replaying {} images from {} at {} fps (loop={})",
            files.len(),
            dir.display(),
            fps,
            looping
        );

        Ok(Self {
            files,
            next: 0,
            looping,
            frame_duration: Duration::from_secs_f32(1.0 / fps.max(1) as f32),
            last_frame: None,
            seq: 0,
            resolution,
        })
    }

    fn next_path(&mut self) -> Option<PathBuf> {
        if self.next == self.files.len() {
            if !self.looping {
                return None;
            }
            self.next = 0;
        }
        let path = self.files[self.next].clone();
        self.next += 1;
        Some(path)
    }

    /// Frame rate limiting
    fn pace(&mut self) {
        if let Some(last) = self.last_frame {
            let elapsed = last.elapsed();
            if elapsed < self.frame_duration {
                std::thread::sleep(self.frame_duration - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl CaptureSource for ImageDirSource {
    fn capture_frame(&mut self) -> Result<Option<ImageMessage>> {
        // Bounded so a directory of unreadable files cannot spin forever
        for _ in 0..self.files.len() {
            let Some(path) = self.next_path() else {
                return Ok(None);
            };

            let image = match image::open(&path) {
                Ok(image) => image.to_rgb8(),
                Err(err) => {
                    tracing::warn!("Skipping {}: {}", path.display(), err);
                    continue;
                }
            };

            self.pace();
            self.seq += 1;
            let (width, height) = image.dimensions();
            return Ok(Some(ImageMessage {
                seq: self.seq,
                width,
                height,
                encoding: "rgb8".to_string(),
                step: width * 3,
                data: image.into_raw(),
                captured_at: Instant::now(),
            }));
        }
        anyhow::bail!("No readable images left to replay")
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}
