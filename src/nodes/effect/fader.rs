//! Linear fade in/out processor

use crate::buffer::SamplesBuffer;
use crate::midi::MidiBuffer;
use crate::processor::AudioNodeProcessor;

/// Ramps gain linearly from a start to an end value over a fixed number of
/// frames, then holds the end value.
///
/// Every channel of a frame gets the same gain. Call [`reset`](Self::reset)
/// to run the same fade again.
#[derive(Clone, Debug)]
pub struct FaderProcessor {
    start_gain: f32,
    end_gain: f32,
    gain_step: f32,
    current_gain: f32,
    total_samples: usize,
    processed_samples: usize,
}

impl FaderProcessor {
    /// A fade from `start_gain` to `end_gain` over `samples_to_fade` frames.
    /// A zero-length fade is finished from the start and applies `end_gain`.
    pub fn new(start_gain: f32, end_gain: f32, samples_to_fade: usize) -> Self {
        let gain_step = if samples_to_fade == 0 {
            0.0
        } else {
            (end_gain - start_gain) / samples_to_fade as f32
        };
        Self {
            start_gain,
            end_gain,
            gain_step,
            current_gain: start_gain,
            total_samples: samples_to_fade,
            processed_samples: 0,
        }
    }

    pub fn fade_in(samples_to_fade: usize) -> Self {
        Self::new(0.0, 1.0, samples_to_fade)
    }

    pub fn fade_out(samples_to_fade: usize) -> Self {
        Self::new(1.0, 0.0, samples_to_fade)
    }

    #[inline]
    pub fn finished(&self) -> bool {
        self.processed_samples >= self.total_samples
    }

    pub fn reset(&mut self) {
        self.current_gain = self.start_gain;
        self.processed_samples = 0;
    }

    /// Gain that will be applied to the next frame.
    #[inline]
    pub fn current_gain(&self) -> f32 {
        if self.finished() {
            self.end_gain
        } else {
            self.current_gain
        }
    }

    #[inline]
    pub fn processed_samples(&self) -> usize {
        self.processed_samples
    }
}

impl AudioNodeProcessor for FaderProcessor {
    fn process(&mut self, buffer: &mut SamplesBuffer, _midi: &MidiBuffer) {
        // every lane replays the same ramp from the block's starting point
        let start = (self.current_gain, self.processed_samples);
        let mut end = start;
        for ch in 0..buffer.channels() {
            let (mut gain, mut processed) = start;
            for sample in buffer.channel_mut(ch) {
                if processed < self.total_samples {
                    *sample *= gain;
                    gain += self.gain_step;
                    processed += 1;
                } else {
                    *sample *= self.end_gain;
                }
            }
            end = (gain, processed);
        }
        (self.current_gain, self.processed_samples) = end;
    }
}
