//! jamgraph - real-time audio node graph for jam sessions
//!
//! Design principles:
//! - Nodes live in an arena ([`AudioGraph`]) and refer to each other by [`NodeId`]
//! - The audio callback pulls blocks from a root node; each node pulls from
//!   its connections at call time and resamples foreign-rate contributions
//! - Gain, pan, mute, solo and peak are atomics, so the control thread never
//!   waits on the audio thread to change them
//! - Locks on the audio thread only guard short snapshots of connection and
//!   processor sets; the graph is kept acyclic
//! - Removed nodes are dropped only after every block that could see them
//!   has finished
//!
//! # Example
//!
//! ```
//! use jamgraph::{AudioGraph, FaderProcessor, MidiBuffer, Mixer, OscillatorAudioNode, SamplesBuffer};
//! use jamgraph::processor::shared;
//!
//! let graph = AudioGraph::new();
//! let master = graph.add(Mixer::new());
//! let tone = graph.add(OscillatorAudioNode::new(440.0, 44100));
//! assert!(graph.connect(master, tone));
//!
//! let fade_in = shared(FaderProcessor::fade_in(4800));
//! graph.node(master).unwrap().add_processor(fade_in.clone());
//!
//! let mut block = SamplesBuffer::stereo(256);
//! graph.process_replacing(master, &SamplesBuffer::stereo(256), &mut block, 48000, &MidiBuffer::new());
//! assert!(!fade_in.lock().finished());
//! ```

pub mod buffer;
pub mod driver;
pub mod error;
pub mod graph;
pub mod midi;
pub mod node;
pub mod nodes;
pub mod peak;
pub mod processor;
pub mod range;
pub mod resample;
pub mod tracks;

pub use buffer::SamplesBuffer;
pub use error::{DriverError, GraphError};
pub use graph::AudioGraph;
pub use midi::{midi_queue, MidiBuffer, MidiMessage, MidiReceiver, MidiSender};
pub use node::{pan_gains, AudioNode, Node, NodeId, ProcessContext, SignalPath};
pub use nodes::{
    FaderProcessor, InputControls, InputMode, InputSelection, InputTrackState, LocalInputAudioNode,
    LocalInputTestStreamer, Mixer, OscillatorAudioNode, TEST_TONE_GAIN,
};
pub use peak::{AudioPeak, PeakMeter};
pub use processor::{AudioNodeProcessor, SharedProcessor};
pub use range::ChannelRange;
pub use resample::{get_input_resampling_length, LinearResampler};
pub use tracks::{InputTracks, TrackId};
