use std::sync::Arc;

use super::hsv;
use super::mask::{self, Marker};
use super::threshold::ThresholdState;
use super::types::{DecodeError, Frame, Mask};
use crate::transport::ImageMessage;

/// HSV colour segmentation driven by live thresholds.
///
/// Stateless between frames: the only thing that carries over is whatever
/// the tuning surface has written into the shared [`ThresholdState`].
pub struct SegmentationPipeline {
    thresholds: Arc<ThresholdState>,
    marker: Marker,
}

impl SegmentationPipeline {
    pub fn new(thresholds: Arc<ThresholdState>) -> Self {
        Self {
            thresholds,
            marker: Marker::DIAGNOSTIC,
        }
    }

    #[cfg(test)]
    pub fn thresholds(&self) -> &Arc<ThresholdState> {
        &self.thresholds
    }

    /// Turn one incoming frame into a binary mask
    ///
    /// Steps:
    /// 1. Decode the message into BGR
    /// 2. Convert to HSV
    /// 3. Keep pixels inside the current bounds (inclusive, per channel)
    /// 4. Draw the diagnostic ring
    pub fn process(&self, frame: ImageMessage) -> Result<Mask, DecodeError> {
        let _span = tracing::debug_span!("segment", seq = frame.seq).entered();

        let frame = Frame::decode(frame)?;
        let hsv = hsv::convert(&frame);
        drop(frame);

        let bounds = self.thresholds.read();
        let mut mask = mask::in_range(&hsv, &bounds);
        self.marker.draw(&mut mask);

        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::hsv::bgr_to_hsv;
    use crate::segmentation::mask::{BACKGROUND, FOREGROUND};
    use crate::segmentation::threshold::{Bound, Channel, ThresholdBounds};
    use crate::segmentation::types::DecodeFailure;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::time::Instant;

    const W: u32 = 120;
    const H: u32 = 110;

    fn bgr_message(seq: u64, width: u32, height: u32, data: Vec<u8>) -> ImageMessage {
        ImageMessage {
            seq,
            width,
            height,
            encoding: "bgr8".to_string(),
            step: width * 3,
            data,
            captured_at: Instant::now(),
        }
    }

    fn solid(bgr: [u8; 3]) -> ImageMessage {
        bgr_message(0, W, H, bgr.repeat((W * H) as usize))
    }

    fn pipeline(bounds: ThresholdBounds) -> SegmentationPipeline {
        SegmentationPipeline::new(Arc::new(ThresholdState::new(bounds)))
    }

    fn marker_set(width: u32, height: u32) -> HashSet<(u32, u32)> {
        Marker::DIAGNOSTIC.pixels(width, height).collect()
    }

    fn assert_only_marker(mask: &Mask) {
        let ring = marker_set(mask.width(), mask.height());
        for (x, y, p) in mask.enumerate_pixels() {
            let expected = if ring.contains(&(x, y)) { FOREGROUND } else { BACKGROUND };
            assert_eq!(p[0], expected, "pixel ({x}, {y})");
        }
    }

    fn arb_frame() -> impl Strategy<Value = ImageMessage> {
        (1u32..130, 1u32..130).prop_flat_map(|(w, h)| {
            prop::collection::vec(any::<u8>(), (w * h * 3) as usize)
                .prop_map(move |data| bgr_message(1, w, h, data))
        })
    }

    #[test]
    fn reference_pixel_exact_match() {
        let [h0, s0, v0] = bgr_to_hsv([200, 100, 50]);
        assert_eq!([h0, s0, v0], [110, 191, 200]);

        let exact = ThresholdBounds {
            low: [h0.into(), s0.into(), v0.into()],
            high: [h0.into(), s0.into(), v0.into()],
        };
        let mask = pipeline(exact).process(solid([200, 100, 50])).unwrap();
        assert_eq!(mask.dimensions(), (W, H));
        assert!(mask.pixels().all(|p| p[0] == FOREGROUND));
    }

    #[test]
    fn reference_pixel_hue_just_above() {
        let [h0, s0, v0] = bgr_to_hsv([200, 100, 50]);
        let bounds = ThresholdBounds {
            low: [u16::from(h0) + 1, s0.into(), v0.into()],
            high: [180, 256, 256],
        };
        let mask = pipeline(bounds).process(solid([200, 100, 50])).unwrap();
        assert_only_marker(&mask);
    }

    #[test]
    fn default_band_rejects_bright_pixels() {
        // V = 255 is above the default upper value of 170
        let mask = pipeline(ThresholdBounds::default())
            .process(solid([255, 255, 255]))
            .unwrap();
        assert_only_marker(&mask);
    }

    #[test]
    fn decode_error_skips_frame_and_recovers() {
        let p = pipeline(ThresholdBounds::FULL_RANGE);

        let mut bad = solid([1, 2, 3]);
        bad.seq = 41;
        bad.encoding = "yuv422".to_string();
        let err = p.process(bad).unwrap_err();
        assert_eq!(err.seq, 41);
        assert!(matches!(err.reason, DecodeFailure::UnsupportedEncoding(_)));

        let mut short = solid([1, 2, 3]);
        short.seq = 42;
        short.data.truncate(10);
        assert_eq!(p.process(short).unwrap_err().seq, 42);

        let mask = p.process(solid([1, 2, 3])).unwrap();
        assert!(mask.pixels().all(|px| px[0] == FOREGROUND));
    }

    #[test]
    fn rgb_input_matches_bgr_input() {
        let p = pipeline(ThresholdBounds::FULL_RANGE.with(Channel::Hue, Bound::Lower, 100));

        let bgr = p.process(solid([200, 100, 50])).unwrap();
        let mut rgb = solid([50, 100, 200]);
        rgb.encoding = "rgb8".to_string();
        let rgb = p.process(rgb).unwrap();

        assert_eq!(bgr, rgb);
    }

    #[test]
    fn threshold_changes_apply_to_next_frame() {
        let p = pipeline(ThresholdBounds::FULL_RANGE);
        let first = p.process(solid([200, 100, 50])).unwrap();
        assert!(first.pixels().all(|px| px[0] == FOREGROUND));

        p.thresholds().set(Channel::Saturation, Bound::Upper, 10);
        let second = p.process(solid([200, 100, 50])).unwrap();
        assert_only_marker(&second);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn full_range_is_all_foreground(frame in arb_frame()) {
            let mask = pipeline(ThresholdBounds::FULL_RANGE).process(frame).unwrap();
            prop_assert!(mask.pixels().all(|p| p[0] == FOREGROUND));
        }

        #[test]
        fn exact_triple_selects_equal_pixels(frame in arb_frame(), pick in any::<prop::sample::Index>()) {
            let pixels: Vec<[u8; 3]> = frame
                .data
                .chunks_exact(3)
                .map(|px| bgr_to_hsv([px[0], px[1], px[2]]))
                .collect();
            let target = pixels[pick.index(pixels.len())];
            let triple = target.map(u16::from);
            let bounds = ThresholdBounds { low: triple, high: triple };

            let (width, height) = (frame.width, frame.height);
            let mask = pipeline(bounds).process(frame).unwrap();
            let ring = marker_set(width, height);

            for (x, y, p) in mask.enumerate_pixels() {
                let hsv = pixels[(y * width + x) as usize];
                let expected = hsv == target || ring.contains(&(x, y));
                prop_assert_eq!(p[0] == FOREGROUND, expected);
            }
        }

        #[test]
        fn inverted_channel_is_all_background(
            frame in arb_frame(),
            channel in prop::sample::select(Channel::ALL.to_vec()),
            low in 1i32..=180,
        ) {
            let bounds = ThresholdBounds::FULL_RANGE
                .with(channel, Bound::Lower, low)
                .with(channel, Bound::Upper, low - 1);
            let mask = pipeline(bounds).process(frame).unwrap();
            assert_only_marker(&mask);
        }

        #[test]
        fn repeated_processing_is_identical(frame in arb_frame()) {
            let p = pipeline(ThresholdBounds::default());
            let a = p.process(frame.clone()).unwrap();
            let b = p.process(frame).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn marker_is_always_foreground(
            frame in arb_frame(),
            low in prop::array::uniform3(0i32..=256),
            high in prop::array::uniform3(0i32..=256),
        ) {
            let mut bounds = ThresholdBounds::FULL_RANGE;
            for (i, channel) in Channel::ALL.into_iter().enumerate() {
                bounds = bounds
                    .with(channel, Bound::Lower, low[i])
                    .with(channel, Bound::Upper, high[i]);
            }
            let (width, height) = (frame.width, frame.height);
            let mask = pipeline(bounds).process(frame).unwrap();
            for (x, y) in Marker::DIAGNOSTIC.pixels(width, height) {
                prop_assert_eq!(mask.get_pixel(x, y)[0], FOREGROUND);
            }
        }
    }
}
