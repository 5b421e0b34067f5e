//! Built-in node kinds.
//!
//! ## Sources ([`source`])
//!
//! - [`OscillatorAudioNode`] - Sine tone at a fixed frequency and rate
//!
//! ## Inputs ([`input`])
//!
//! - [`LocalInputAudioNode`] - One input track of the local user (audio channels, MIDI device or nothing)
//! - [`LocalInputTestStreamer`] - Input track that streams a test tone instead of the driver input
//!
//! ## Effects ([`effect`])
//!
//! - [`Mixer`] - Sums its connections
//! - [`FaderProcessor`] - Linear fade in/out, for any node's processor chain

pub mod effect;
pub mod input;
pub mod source;

pub use effect::{FaderProcessor, Mixer};
pub use input::{
    InputControls, InputMode, InputSelection, InputTrackState, LocalInputAudioNode,
    LocalInputTestStreamer, TEST_TONE_GAIN,
};
pub use source::OscillatorAudioNode;
