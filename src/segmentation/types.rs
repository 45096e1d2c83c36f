use std::str::FromStr;

use image::GrayImage;
use thiserror::Error;

use crate::transport::ImageMessage;

/// Binary segmentation mask: 255 = foreground, 0 = background.
/// Dimensions match the input frame dimensions
pub type Mask = GrayImage;

/// Pixel encodings the decoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Bgr8,
    Rgb8,
    Bgra8,
    Rgba8,
    Mono8,
}

impl Encoding {
    pub fn channels(self) -> usize {
        match self {
            Encoding::Bgr8 | Encoding::Rgb8 => 3,
            Encoding::Bgra8 | Encoding::Rgba8 => 4,
            Encoding::Mono8 => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Bgr8 => "bgr8",
            Encoding::Rgb8 => "rgb8",
            Encoding::Bgra8 => "bgra8",
            Encoding::Rgba8 => "rgba8",
            Encoding::Mono8 => "mono8",
        }
    }
}

impl FromStr for Encoding {
    type Err = DecodeFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bgr8" => Ok(Encoding::Bgr8),
            "rgb8" => Ok(Encoding::Rgb8),
            "bgra8" => Ok(Encoding::Bgra8),
            "rgba8" => Ok(Encoding::Rgba8),
            "mono8" => Ok(Encoding::Mono8),
            other => Err(DecodeFailure::UnsupportedEncoding(other.to_string())),
        }
    }
}

/// Why a message could not be turned into a BGR frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("unsupported encoding {0:?}")]
    UnsupportedEncoding(String),

    #[error("row stride {step} is smaller than {width} pixels x {channels} channels")]
    StrideTooSmall {
        step: u32,
        width: u32,
        channels: usize,
    },

    #[error("expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// An incoming frame that could not be decoded. The frame is skipped;
/// the pipeline keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode frame {seq}")]
pub struct DecodeError {
    pub seq: u64,
    #[source]
    pub reason: DecodeFailure,
}

/// A decoded frame: interleaved 8-bit samples in blue, green, red order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap tightly packed BGR samples.
    ///
    /// Panics if `data` is not `width * height * 3` bytes long.
    #[cfg(test)]
    pub(crate) fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), width as usize * height as usize * 3);
        Self {
            width,
            height,
            data,
        }
    }

    /// Decode a transport message into BGR order.
    ///
    /// Tightly packed `bgr8` payloads are taken over without copying.
    pub fn decode(msg: ImageMessage) -> Result<Self, DecodeError> {
        let seq = msg.seq;
        Self::decode_inner(msg).map_err(|reason| DecodeError { seq, reason })
    }

    fn decode_inner(msg: ImageMessage) -> Result<Self, DecodeFailure> {
        let encoding: Encoding = msg.encoding.parse()?;
        let channels = encoding.channels();
        let width = msg.width as usize;
        let height = msg.height as usize;
        let row_bytes = width * channels;

        if (msg.step as usize) < row_bytes {
            return Err(DecodeFailure::StrideTooSmall {
                step: msg.step,
                width: msg.width,
                channels,
            });
        }

        let step = msg.step as usize;
        // The last row need not be padded out to the full stride
        let expected = if height == 0 {
            0
        } else {
            step * (height - 1) + row_bytes
        };
        if msg.data.len() < expected {
            return Err(DecodeFailure::Truncated {
                expected,
                actual: msg.data.len(),
            });
        }

        if encoding == Encoding::Bgr8 && step == row_bytes {
            let mut data = msg.data;
            data.truncate(width * height * 3);
            return Ok(Self {
                width: msg.width,
                height: msg.height,
                data,
            });
        }

        let mut data = Vec::with_capacity(width * height * 3);
        for row in 0..height {
            let start = row * step;
            let pixels = msg.data[start..start + row_bytes].chunks_exact(channels);
            match encoding {
                Encoding::Bgr8 | Encoding::Bgra8 => {
                    pixels.for_each(|px| data.extend_from_slice(&px[..3]))
                }
                Encoding::Rgb8 | Encoding::Rgba8 => {
                    pixels.for_each(|px| data.extend_from_slice(&[px[2], px[1], px[0]]))
                }
                Encoding::Mono8 => pixels.for_each(|px| data.extend_from_slice(&[px[0]; 3])),
            }
        }

        Ok(Self {
            width: msg.width,
            height: msg.height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Per-pixel `(hue, saturation, value)` in the 8-bit convention.
/// Only lives for the duration of one processing step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HsvFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl HsvFrame {
    pub(crate) fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 3);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|px| [px[0], px[1], px[2]])
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }
}
