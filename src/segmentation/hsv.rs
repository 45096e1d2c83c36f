use std::sync::OnceLock;

use super::types::{Frame, HsvFrame};

const HSV_SHIFT: u32 = 12;
const ROUND: i32 = 1 << (HSV_SHIFT - 1);
/// Hue spans half-degrees, so a full turn is 180
const HUE_RANGE: i32 = 180;

struct DivTables {
    /// `(255 << 12) / v`, rounded
    sat: [i32; 256],
    /// `(180 << 12) / (6 * diff)`, rounded
    hue: [i32; 256],
}

fn tables() -> &'static DivTables {
    static TABLES: OnceLock<DivTables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut sat = [0; 256];
        let mut hue = [0; 256];
        for i in 1..256 {
            sat[i] = ((255 << HSV_SHIFT) as f64 / i as f64).round() as i32;
            hue[i] = ((HUE_RANGE << HSV_SHIFT) as f64 / (6.0 * i as f64)).round() as i32;
        }
        DivTables { sat, hue }
    })
}

/// Convert one BGR pixel to 8-bit HSV.
///
/// Hue lands in `[0, 180)`, saturation and value in `[0, 255]`. Fixed-point
/// with 12 fractional bits, so results are bit-exact across platforms.
#[inline]
pub fn bgr_to_hsv([b, g, r]: [u8; 3]) -> [u8; 3] {
    let tables = tables();
    let (b, g, r) = (i32::from(b), i32::from(g), i32::from(r));

    let v = b.max(g).max(r);
    let diff = v - b.min(g).min(r);

    let s = (diff * tables.sat[v as usize] + ROUND) >> HSV_SHIFT;

    let h = if v == r {
        g - b
    } else if v == g {
        b - r + 2 * diff
    } else {
        r - g + 4 * diff
    };
    let mut h = (h * tables.hue[diff as usize] + ROUND) >> HSV_SHIFT;
    if h < 0 {
        h += HUE_RANGE;
    }

    [h as u8, s as u8, v as u8]
}

/// Convert a whole frame
pub fn convert(frame: &Frame) -> HsvFrame {
    let _span = tracing::debug_span!("bgr_to_hsv").entered();

    let data = frame
        .data()
        .chunks_exact(3)
        .flat_map(|px| bgr_to_hsv([px[0], px[1], px[2]]))
        .collect();
    HsvFrame::from_raw(frame.width(), frame.height(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn primaries() {
        assert_eq!(bgr_to_hsv([0, 0, 255]), [0, 255, 255]);
        assert_eq!(bgr_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(bgr_to_hsv([255, 0, 0]), [120, 255, 255]);
        assert_eq!(bgr_to_hsv([255, 0, 255]), [150, 255, 255]);
    }

    #[test]
    fn greys_have_no_hue_or_saturation() {
        assert_eq!(bgr_to_hsv([0, 0, 0]), [0, 0, 0]);
        assert_eq!(bgr_to_hsv([128, 128, 128]), [0, 0, 128]);
        assert_eq!(bgr_to_hsv([255, 255, 255]), [0, 0, 255]);
    }

    #[test]
    fn orange_blue_reference_pixel() {
        assert_eq!(bgr_to_hsv([200, 100, 50]), [110, 191, 200]);
    }

    #[test]
    fn convert_keeps_dimensions_and_order() {
        let frame = Frame::from_raw(2, 1, vec![0, 0, 255, 255, 0, 0]);
        let hsv = convert(&frame);
        assert_eq!((hsv.width(), hsv.height()), (2, 1));
        assert_eq!(hsv.pixel(0, 0), [0, 255, 255]);
        assert_eq!(hsv.pixel(1, 0), [120, 255, 255]);
    }

    proptest! {
        #[test]
        fn output_stays_in_8bit_convention(b in any::<u8>(), g in any::<u8>(), r in any::<u8>()) {
            let [h, _s, v] = bgr_to_hsv([b, g, r]);
            prop_assert!(h < 180);
            prop_assert_eq!(v, b.max(g).max(r));
        }

        #[test]
        fn greys_carry_value_only(x in any::<u8>()) {
            prop_assert_eq!(bgr_to_hsv([x, x, x]), [0, 0, x]);
        }
    }
}
