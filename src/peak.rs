//! Peak levels and the lock-free meter shared between the audio and UI threads.

use core::sync::atomic::{AtomicU32, Ordering};

/// Peak sample magnitudes for the left and right channels.
///
/// Mono signals report the same value on both sides.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct AudioPeak {
    pub left: f32,
    pub right: f32,
}

impl AudioPeak {
    pub fn new(left: f32, right: f32) -> Self {
        Self {
            left: left.abs(),
            right: right.abs(),
        }
    }

    pub fn mono(peak: f32) -> Self {
        Self::new(peak, peak)
    }

    /// The louder of the two channels.
    #[inline]
    pub fn max(&self) -> f32 {
        self.left.max(self.right)
    }

    #[inline]
    pub fn is_silent(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }

    /// Keep the per-channel maximum of `self` and `other`.
    pub fn update(&mut self, other: AudioPeak) {
        self.left = self.left.max(other.left);
        self.right = self.right.max(other.right);
    }

    pub fn zero(&mut self) {
        *self = AudioPeak::default();
    }
}

/// An `f32` stored in an `AtomicU32`.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn swap(&self, value: f32) -> f32 {
        f32::from_bits(self.0.swap(value.to_bits(), Ordering::Relaxed))
    }

    /// Raise the stored value to `value` if larger.
    ///
    /// Only valid for non-negative finite values, whose bit patterns order
    /// the same way as the numbers they encode.
    #[inline]
    fn fetch_max_non_negative(&self, value: f32) {
        self.0.fetch_max(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Peak meter written by the audio thread and read-and-cleared by the UI.
///
/// Reads are eventually consistent: a reader may see a value that is one
/// block stale, which is fine for metering.
#[derive(Debug, Default)]
pub struct PeakMeter {
    left: AtomicF32,
    right: AtomicF32,
}

impl PeakMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the held peak to `peak` per channel. Never blocks.
    pub fn update(&self, peak: AudioPeak) {
        if peak.left.is_finite() {
            self.left.fetch_max_non_negative(peak.left.abs());
        }
        if peak.right.is_finite() {
            self.right.fetch_max_non_negative(peak.right.abs());
        }
    }

    /// Current peak; when `reset` is set the meter is cleared in the same step.
    pub fn read(&self, reset: bool) -> AudioPeak {
        if reset {
            AudioPeak {
                left: self.left.swap(0.0),
                right: self.right.swap(0.0),
            }
        } else {
            AudioPeak {
                left: self.left.load(),
                right: self.right.load(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_update_keeps_maximum() {
        let mut peak = AudioPeak::new(0.2, 0.4);
        peak.update(AudioPeak::new(0.5, 0.1));
        assert_eq!(peak, AudioPeak::new(0.5, 0.4));
        assert_eq!(peak.max(), 0.5);

        peak.zero();
        assert!(peak.is_silent());
    }

    #[test]
    fn test_meter_is_monotonic_until_reset() {
        let meter = PeakMeter::new();
        meter.update(AudioPeak::new(0.3, 0.6));
        meter.update(AudioPeak::new(0.1, 0.2));
        assert_eq!(meter.read(false), AudioPeak::new(0.3, 0.6));

        assert_eq!(meter.read(true), AudioPeak::new(0.3, 0.6));
        assert!(meter.read(false).is_silent());
    }

    #[test]
    fn test_meter_ignores_non_finite_values() {
        let meter = PeakMeter::new();
        meter.update(AudioPeak { left: f32::NAN, right: 0.25 });
        let peak = meter.read(false);
        assert_eq!(peak.left, 0.0);
        assert_eq!(peak.right, 0.25);
    }
}
