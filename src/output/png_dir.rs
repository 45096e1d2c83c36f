use super::{to_gray, OutputSink};
use crate::transport::ImageMessage;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Writes every mask as `mask_{seq}.png` into a directory
pub struct PngDirSink {
    dir: PathBuf,
}

impl PngDirSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        tracing::info!("Writing masks to {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("mask_{seq:06}.png"))
    }
}

impl OutputSink for PngDirSink {
    fn write_frame(&mut self, frame: &ImageMessage) -> Result<()> {
        let mask = to_gray(frame)?;
        let path = self.path_for(frame.seq);
        mask.save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        None
    }
}
