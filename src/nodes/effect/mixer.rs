//! Mixer node - sums the nodes it is connected to

use core::any::Any;

use crate::buffer::SamplesBuffer;
use crate::midi::MidiBuffer;
use crate::node::{AudioNode, ProcessContext};

/// A node with no signal of its own: its block is the sum of its connections,
/// conditioned by the node's gain, pan, solo and mute.
///
/// Inputs with fewer channels are upmixed (mono copies to every channel);
/// extra input channels are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mixer;

impl Mixer {
    pub fn new() -> Self {
        Self
    }
}

impl AudioNode for Mixer {
    fn render(
        &mut self,
        _ctx: &ProcessContext,
        _input: &SamplesBuffer,
        _output: &mut SamplesBuffer,
        _midi: &MidiBuffer,
    ) {
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
