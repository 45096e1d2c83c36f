use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};

/// One of the three HSV channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Hue,
    Saturation,
    Value,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Hue, Channel::Saturation, Channel::Value];

    /// Largest legal bound for this channel (8-bit HSV convention)
    pub const fn max(self) -> u16 {
        match self {
            Channel::Hue => 180,
            Channel::Saturation | Channel::Value => 256,
        }
    }

    const fn index(self) -> usize {
        match self {
            Channel::Hue => 0,
            Channel::Saturation => 1,
            Channel::Value => 2,
        }
    }
}

/// Which side of the inclusive range a bound sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Lower,
    Upper,
}

/// Inclusive HSV acceptance region, indexed by channel.
///
/// `low <= high` is not enforced: an inverted channel accepts nothing,
/// which is what a user sees while dragging one bound past the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdBounds {
    pub low: [u16; 3],
    pub high: [u16; 3],
}

impl ThresholdBounds {
    /// Accepts every HSV triple
    pub const FULL_RANGE: ThresholdBounds = ThresholdBounds {
        low: [0, 0, 0],
        high: [180, 256, 256],
    };

    pub fn get(&self, channel: Channel, bound: Bound) -> u16 {
        match bound {
            Bound::Lower => self.low[channel.index()],
            Bound::Upper => self.high[channel.index()],
        }
    }

    /// Builder-style setter, clamped like [`ThresholdState::set`]
    #[cfg(test)]
    pub fn with(mut self, channel: Channel, bound: Bound, value: i32) -> Self {
        let value = clamp(channel, value);
        match bound {
            Bound::Lower => self.low[channel.index()] = value,
            Bound::Upper => self.high[channel.index()] = value,
        }
        self
    }

    /// True when every channel of `hsv` lies in `[low, high]`
    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| {
            let v = u16::from(hsv[c]);
            self.low[c] <= v && v <= self.high[c]
        })
    }
}

impl Default for ThresholdBounds {
    /// Pre-tuned detection band rather than the full range
    fn default() -> Self {
        Self {
            low: [0, 0, 0],
            high: [180, 196, 170],
        }
    }
}

impl fmt::Display for ThresholdBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "H[{}..={}] S[{}..={}] V[{}..={}]",
            self.low[0], self.high[0], self.low[1], self.high[1], self.low[2], self.high[2]
        )
    }
}

fn clamp(channel: Channel, value: i32) -> u16 {
    value.clamp(0, i32::from(channel.max())) as u16
}

/// Live threshold parameters shared between the tuning surface and the
/// processing loop.
///
/// Each of the six fields is an independent atomic. A read racing a write
/// may observe a mix of old and new fields; a one-frame stale or mixed
/// threshold is harmless while tuning.
#[derive(Debug)]
pub struct ThresholdState {
    low: [AtomicU16; 3],
    high: [AtomicU16; 3],
}

impl ThresholdState {
    pub fn new(bounds: ThresholdBounds) -> Self {
        Self {
            low: bounds.low.map(AtomicU16::new),
            high: bounds.high.map(AtomicU16::new),
        }
    }

    /// Snapshot of the six bounds
    pub fn read(&self) -> ThresholdBounds {
        ThresholdBounds {
            low: [0, 1, 2].map(|c| self.low[c].load(Ordering::Relaxed)),
            high: [0, 1, 2].map(|c| self.high[c].load(Ordering::Relaxed)),
        }
    }

    /// Write one bound, clamping to the channel range.
    ///
    /// Returns the value actually stored.
    pub fn set(&self, channel: Channel, bound: Bound, value: i32) -> u16 {
        let clamped = clamp(channel, value);
        let slot = match bound {
            Bound::Lower => &self.low[channel.index()],
            Bound::Upper => &self.high[channel.index()],
        };
        slot.store(clamped, Ordering::Relaxed);
        clamped
    }

    /// Replace all six bounds field by field
    pub fn store(&self, bounds: ThresholdBounds) {
        for channel in Channel::ALL {
            self.set(channel, Bound::Lower, i32::from(bounds.get(channel, Bound::Lower)));
            self.set(channel, Bound::Upper, i32::from(bounds.get(channel, Bound::Upper)));
        }
    }
}

impl Default for ThresholdState {
    fn default() -> Self {
        Self::new(ThresholdBounds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn default_is_pre_tuned_band() {
        let bounds = ThresholdState::default().read();
        assert_eq!(bounds.low, [0, 0, 0]);
        assert_eq!(bounds.high, [180, 196, 170]);
    }

    #[test]
    fn set_writes_a_single_field() {
        let state = ThresholdState::default();
        assert_eq!(state.set(Channel::Saturation, Bound::Lower, 42), 42);

        let bounds = state.read();
        assert_eq!(bounds.low, [0, 42, 0]);
        assert_eq!(bounds.high, [180, 196, 170]);
    }

    #[test]
    fn out_of_range_writes_are_clamped() {
        let state = ThresholdState::default();
        assert_eq!(state.set(Channel::Hue, Bound::Upper, 500), 180);
        assert_eq!(state.set(Channel::Hue, Bound::Lower, -3), 0);
        assert_eq!(state.set(Channel::Value, Bound::Upper, 257), 256);
        assert_eq!(state.set(Channel::Saturation, Bound::Upper, i32::MAX), 256);

        let bounds = state.read();
        assert_eq!(bounds.low[0], 0);
        assert_eq!(bounds.high, [180, 256, 256]);
    }

    #[test]
    fn inverted_bounds_are_accepted() {
        let state = ThresholdState::default();
        state.set(Channel::Hue, Bound::Lower, 120);
        state.set(Channel::Hue, Bound::Upper, 30);

        let bounds = state.read();
        assert_eq!(bounds.get(Channel::Hue, Bound::Lower), 120);
        assert_eq!(bounds.get(Channel::Hue, Bound::Upper), 30);
        assert!(!bounds.contains([60, 0, 0]));
    }

    #[test]
    fn contains_is_inclusive() {
        let bounds = ThresholdBounds {
            low: [10, 20, 30],
            high: [10, 20, 30],
        };
        assert!(bounds.contains([10, 20, 30]));
        assert!(!bounds.contains([11, 20, 30]));
        assert!(!bounds.contains([10, 19, 30]));
        assert!(ThresholdBounds::FULL_RANGE.contains([179, 255, 255]));
    }

    #[test]
    fn store_replaces_every_field() {
        let state = ThresholdState::default();
        state.store(ThresholdBounds::FULL_RANGE);
        assert_eq!(state.read(), ThresholdBounds::FULL_RANGE);
    }

    #[test]
    fn concurrent_writers_never_leave_range() {
        let state = Arc::new(ThresholdState::default());
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for v in -50..400 {
                        state.set(Channel::ALL[i % 3], Bound::Upper, v * (i as i32 + 1));
                    }
                })
            })
            .collect();

        for _ in 0..1000 {
            let bounds = state.read();
            for channel in Channel::ALL {
                assert!(bounds.get(channel, Bound::Upper) <= channel.max());
            }
        }
        for writer in writers {
            writer.join().unwrap();
        }
    }
}
