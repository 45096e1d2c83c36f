use image::Luma;

use super::threshold::ThresholdBounds;
use super::types::{HsvFrame, Mask};

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Mark every pixel whose HSV triple lies inside `bounds`
pub fn in_range(hsv: &HsvFrame, bounds: &ThresholdBounds) -> Mask {
    let _span = tracing::debug_span!("in_range").entered();

    let mut mask = Mask::new(hsv.width(), hsv.height());
    for (out, px) in mask.pixels_mut().zip(hsv.pixels()) {
        if bounds.contains(px) {
            *out = Luma([FOREGROUND]);
        }
    }
    mask
}

/// Fixed alignment ring drawn on every mask, independent of detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub center: (i32, i32),
    pub radius: i32,
    pub value: u8,
}

impl Marker {
    pub const DIAGNOSTIC: Marker = Marker {
        center: (100, 100),
        radius: 5,
        value: FOREGROUND,
    };

    /// Ring offsets from the center, one pixel thick and 8-connected
    /// (midpoint circle). May contain duplicates on the diagonals/axes.
    pub fn offsets(&self) -> Vec<(i32, i32)> {
        let mut points = Vec::new();
        let mut dx = self.radius;
        let mut dy = 0;
        let mut err = 0;
        let mut plus = 1;
        let mut minus = 2 * self.radius - 1;

        while dx >= dy {
            for (x, y) in [(dx, dy), (dy, dx)] {
                points.extend_from_slice(&[(-x, -y), (x, -y), (-x, y), (x, y)]);
            }

            dy += 1;
            err += plus;
            plus += 2;
            if err > 0 {
                err -= minus;
                dx -= 1;
                minus -= 2;
            }
        }
        points
    }

    /// Absolute ring pixels that fall inside a `width` x `height` image
    pub fn pixels(&self, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        let (cx, cy) = self.center;
        self.offsets().into_iter().filter_map(move |(ox, oy)| {
            let x = u32::try_from(cx + ox).ok()?;
            let y = u32::try_from(cy + oy).ok()?;
            (x < width && y < height).then_some((x, y))
        })
    }

    pub fn draw(&self, mask: &mut Mask) {
        let (width, height) = mask.dimensions();
        for (x, y) in self.pixels(width, height) {
            mask.put_pixel(x, y, Luma([self.value]));
        }
    }
}
