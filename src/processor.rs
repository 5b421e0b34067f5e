//! Processor chain extension point.
//!
//! Processors mutate a node's mixed buffer in place, after gain, pan and
//! metering and before the mute gate. A node holds its processors weakly:
//! whoever created a processor owns it, and dropping the last strong handle
//! takes it out of every chain.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::buffer::SamplesBuffer;
use crate::midi::MidiBuffer;

/// A unit that transforms a buffer in place, given the block's MIDI events.
///
/// `process` runs on the audio thread: it must not block, allocate or log.
pub trait AudioNodeProcessor: Send {
    fn process(&mut self, buffer: &mut SamplesBuffer, midi: &MidiBuffer);
}

/// A processor shared between its owner and the chains it is part of.
pub type SharedProcessor = Arc<Mutex<dyn AudioNodeProcessor>>;

pub(crate) type WeakProcessor = Weak<Mutex<dyn AudioNodeProcessor>>;

/// Wrap a processor so it can be added to a node's chain.
pub fn shared<P: AudioNodeProcessor + 'static>(processor: P) -> Arc<Mutex<P>> {
    Arc::new(Mutex::new(processor))
}

/// Identity comparison; the vtable half of the pointer is ignored.
#[inline]
pub(crate) fn same_processor(a: &WeakProcessor, b: &WeakProcessor) -> bool {
    a.as_ptr() as *const () == b.as_ptr() as *const ()
}
