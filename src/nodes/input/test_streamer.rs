//! Loopback test input

use core::any::Any;

use delegate::delegate;

use crate::buffer::SamplesBuffer;
use crate::midi::MidiBuffer;
use crate::node::{AudioNode, ProcessContext, SignalPath};
use crate::nodes::input::{InputControls, InputSelection, InputTrackState, LocalInputAudioNode};
use crate::nodes::source::OscillatorAudioNode;

/// Level of the substituted tone.
pub const TEST_TONE_GAIN: f32 = 0.5;

/// An input track that ignores the driver and streams a sine tone instead,
/// for checking the graph without hardware.
///
/// Its input selection can still be changed and queried like any other
/// input track; it just never affects the signal.
#[derive(Debug)]
pub struct LocalInputTestStreamer {
    input: LocalInputAudioNode,
    oscillator: OscillatorAudioNode,
}

impl LocalInputTestStreamer {
    pub fn new(frequency: f32, sample_rate: u32) -> Self {
        Self {
            input: LocalInputAudioNode::new(0),
            oscillator: OscillatorAudioNode::new(frequency, sample_rate),
        }
    }

    #[inline]
    pub fn oscillator(&self) -> &OscillatorAudioNode {
        &self.oscillator
    }

    pub fn with_selection(mut self, selection: InputSelection) -> Self {
        self.input = self.input.with_selection(selection);
        self
    }

    delegate! {
        to self.input {
            pub fn controls(&self) -> &InputControls;
            pub fn state(&self) -> InputTrackState;
        }
    }
}

impl AudioNode for LocalInputTestStreamer {
    fn render(
        &mut self,
        _ctx: &ProcessContext,
        _input: &SamplesBuffer,
        output: &mut SamplesBuffer,
        _midi: &MidiBuffer,
    ) {
        self.oscillator.fill(output);
        output.apply_gain(TEST_TONE_GAIN);
    }

    fn signal_path(&self) -> SignalPath {
        SignalPath::Direct
    }

    fn native_sample_rate(&self) -> Option<u32> {
        Some(self.oscillator.sample_rate())
    }

    fn input_controls(&self) -> Option<InputControls> {
        Some(self.input.controls().clone())
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
    fn test_streams_tone_regardless_of_driver_input() {
        let mut streamer = LocalInputTestStreamer::new(440.0, 48000);
        streamer.controls().update(|state| state.set_audio_input_selection(0, 2));
        let mut reference = streamer.oscillator().clone();

        let loud_input = SamplesBuffer::from_channels(vec![vec![1.0; 32], vec![1.0; 32]]);
        let mut out = SamplesBuffer::stereo(32);
        streamer.render(&ProcessContext::new(48000, 32), &loud_input, &mut out, &MidiBuffer::new());

        let mut expected = SamplesBuffer::stereo(32);
        reference.fill(&mut expected);
        expected.apply_gain(TEST_TONE_GAIN);
        assert_eq!(out.channel(0), expected.channel(0));
        assert!(out.peak().max() <= TEST_TONE_GAIN);
        assert!(streamer.state().is_stereo());
    }
}
