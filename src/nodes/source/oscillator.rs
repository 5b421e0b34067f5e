//! Sine oscillator source

use core::any::Any;
use core::f32::consts::TAU;

use crate::buffer::SamplesBuffer;
use crate::midi::MidiBuffer;
use crate::node::{AudioNode, ProcessContext, SignalPath};

/// A sine wave at a fixed frequency and sample rate.
///
/// The phase carries over from block to block, so consecutive blocks form
/// one continuous tone. Every output channel gets the same signal. The node
/// bypasses mixing, pan, metering and processors: its block is the tone
/// scaled by node gain.
#[derive(Clone, Debug)]
pub struct OscillatorAudioNode {
    frequency: f32,
    sample_rate: u32,
    phase: f32,
    phase_increment: f32,
}

impl OscillatorAudioNode {
    pub fn new(frequency: f32, sample_rate: u32) -> Self {
        Self {
            frequency,
            sample_rate,
            phase: 0.0,
            phase_increment: TAU * frequency / sample_rate as f32,
        }
    }

    #[inline]
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current phase in radians, in `[0, 2π)`.
    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Write the next `output.frames()` samples of the tone.
    pub(crate) fn fill(&mut self, output: &mut SamplesBuffer) {
        let frames = output.frames();
        let first = output.channel_mut(0);
        for sample in first.iter_mut() {
            *sample = self.phase.sin();
            self.phase = (self.phase + self.phase_increment) % TAU;
        }
        for ch in 1..output.channels() {
            for frame in 0..frames {
                let sample = output.get(0, frame);
                output.set(ch, frame, sample);
            }
        }
    }
}

impl AudioNode for OscillatorAudioNode {
    fn render(
        &mut self,
        _ctx: &ProcessContext,
        _input: &SamplesBuffer,
        output: &mut SamplesBuffer,
        _midi: &MidiBuffer,
    ) {
        self.fill(output);
    }

    fn signal_path(&self) -> SignalPath {
        SignalPath::Direct
    }

    fn native_sample_rate(&self) -> Option<u32> {
        Some(self.sample_rate)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_phase_continuous() {
        let mut split = OscillatorAudioNode::new(440.0, 48000);
        let mut whole = split.clone();

        let mut a = SamplesBuffer::mono(64);
        let mut b = SamplesBuffer::mono(64);
        split.fill(&mut a);
        split.fill(&mut b);

        let mut c = SamplesBuffer::mono(128);
        whole.fill(&mut c);

        assert_eq!(a.channel(0), &c.channel(0)[..64]);
        assert_eq!(b.channel(0), &c.channel(0)[64..]);
        assert_eq!(split.phase(), whole.phase());
    }

    #[test]
    fn test_phase_stays_wrapped() {
        let mut osc = OscillatorAudioNode::new(1000.0, 8000);
        let mut buffer = SamplesBuffer::stereo(1024);
        osc.fill(&mut buffer);
        assert!((0.0..TAU).contains(&osc.phase()));
        assert_eq!(buffer.channel(0), buffer.channel(1));
        assert!(buffer.peak().max() <= 1.0);
    }
}
