//! Input track controller.
//!
//! [`InputTracks`] is the one place the control thread changes what a local
//! input track listens to. It owns the master [`Mixer`] every input track
//! feeds into and keeps the driver's global input offset in sync.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use jamgraph::{AudioGraph, InputTracks, LocalInputAudioNode, MidiBuffer, SamplesBuffer};
//! use jamgraph::tracks::TrackId;
//!
//! let graph = Arc::new(AudioGraph::new());
//! let mut tracks = InputTracks::new(graph);
//!
//! let guitar = TrackId(1);
//! tracks.add_input_track_node(guitar, LocalInputAudioNode::new(0)).unwrap();
//! tracks.set_input_track_to_mono(guitar, 0).unwrap();
//!
//! let input = SamplesBuffer::from_channels(vec![vec![0.5; 64]]);
//! let mut output = SamplesBuffer::stereo(64);
//! tracks.process(&input, &mut output, 48000, &MidiBuffer::new());
//! assert!(!output.is_silent());
//! ```

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, info};

use crate::buffer::SamplesBuffer;
use crate::driver::{AudioDriver, MidiDriver};
use crate::error::GraphError;
use crate::graph::AudioGraph;
use crate::midi::MidiBuffer;
use crate::node::{AudioNode, Node, NodeId};
use crate::nodes::effect::Mixer;
use crate::nodes::input::{InputSelection, InputTrackState};

/// Caller-chosen identifier of an input track.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TrackId(pub u32);

/// Kind of input selection, standing in for the icon next to its name.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InputKind {
    Stereo,
    Mono,
    Midi,
    NoInput,
}

/// Display name of an input track's selection.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct InputLabel {
    pub kind: InputKind,
    pub text: String,
}

/// Name `input`'s current selection the way the track header shows it.
///
/// - stereo: `"(3+4) <name of channel 3 without its last word>"`
/// - mono: `"3 - <channel name, or the device name if the channel has none>"`
/// - MIDI: the device name, or an empty text if the device is gone or
///   globally disabled
/// - nothing selected: `"No input"`
pub fn describe_input(
    input: &InputTrackState,
    audio: &dyn AudioDriver,
    midi: &dyn MidiDriver,
) -> InputLabel {
    match input.selection() {
        InputSelection::Audio(range) if range.is_stereo() => {
            let first = range.first_channel();
            InputLabel {
                kind: InputKind::Stereo,
                text: format!("({}+{}) {}", first + 1, first + 2, channel_name_only(audio, first)),
            }
        }
        InputSelection::Audio(range) if range.is_mono() => {
            let index = range.first_channel();
            let name = channel_name(audio, index).unwrap_or_else(|| audio.input_device_name());
            InputLabel {
                kind: InputKind::Mono,
                text: format!("{} - {}", index + 1, name),
            }
        }
        InputSelection::Midi { device, .. } => {
            let text = if device < midi.max_input_devices() && midi.device_is_globally_enabled(device) {
                midi.input_device_name(device).unwrap_or_default().to_owned()
            } else {
                String::new()
            };
            InputLabel {
                kind: InputKind::Midi,
                text,
            }
        }
        _ => InputLabel {
            kind: InputKind::NoInput,
            text: "No input".to_owned(),
        },
    }
}

/// Non-empty name of device channel `index`.
fn channel_name(audio: &dyn AudioDriver, index: usize) -> Option<&str> {
    audio.input_channel_name(index).filter(|name| !name.trim().is_empty())
}

/// Channel name with its last word ("Input 3" -> "Input"), falling back to
/// the device name.
fn channel_name_only(audio: &dyn AudioDriver, index: usize) -> String {
    let full = channel_name(audio, index).unwrap_or_else(|| audio.input_device_name());
    match full.rfind(' ') {
        Some(space) if space > 0 => full[..space].to_owned(),
        _ => full.to_owned(),
    }
}

/// Registry of the local user's input tracks.
pub struct InputTracks {
    graph: Arc<AudioGraph>,
    master: NodeId,
    tracks: HashMap<TrackId, NodeId>,
    global_first_input: usize,
}

impl InputTracks {
    /// Creates the master mixer in `graph`.
    pub fn new(graph: Arc<AudioGraph>) -> Self {
        let master = graph.add(Mixer::new());
        Self {
            graph,
            master,
            tracks: HashMap::new(),
            global_first_input: 0,
        }
    }

    pub fn with_global_first_input(mut self, first_input: usize) -> Self {
        self.set_global_first_input(first_input);
        self
    }

    #[inline]
    pub fn graph(&self) -> &Arc<AudioGraph> {
        &self.graph
    }

    /// The mixer every input track feeds into.
    #[inline]
    pub fn master(&self) -> NodeId {
        self.master
    }

    #[inline]
    pub fn global_first_input(&self) -> usize {
        self.global_first_input
    }

    /// Apply the driver's first globally enabled input to every track.
    pub fn set_global_first_input(&mut self, first_input: usize) {
        self.global_first_input = first_input;
        for node in self.tracks.values() {
            if let Some(node) = self.graph.node(*node) {
                node.update_input_state(|input| input.set_global_first_input_index(first_input));
            }
        }
        debug!(first_input, "global first input changed");
    }

    /// Pick up the driver's input offset and input rate.
    pub fn sync_with_driver(&mut self, audio: &dyn AudioDriver) {
        self.set_global_first_input(audio.selected_inputs().first_channel());
        self.graph.set_input_sample_rate(Some(audio.sample_rate()));
    }

    /// Add `kernel` to the graph as input track `track`, feeding the master
    /// mixer. A previous node registered under `track` is removed.
    pub fn add_input_track_node<N: AudioNode>(
        &mut self,
        track: TrackId,
        kernel: N,
    ) -> Result<NodeId, GraphError> {
        let node = self.graph.add(kernel);
        if let Err(err) = self.adopt_input_track(track, node) {
            self.graph.remove(node).ok();
            return Err(err);
        }
        Ok(node)
    }

    /// Register a node already in the graph as input track `track`.
    pub fn adopt_input_track(&mut self, track: TrackId, node: NodeId) -> Result<(), GraphError> {
        let shared = self.graph.node(node).ok_or(GraphError::UnknownNode(node))?;
        let first_input = self.global_first_input;
        shared
            .update_input_state(|input| input.set_global_first_input_index(first_input))
            .ok_or(GraphError::NotAnInputTrack(node))?;

        match self.graph.try_connect(self.master, node) {
            Ok(()) | Err(GraphError::AlreadyConnected) => {}
            Err(err) => return Err(err),
        }

        if let Some(previous) = self.tracks.insert(track, node) {
            if previous != node {
                self.graph.remove(previous).ok();
            }
        }
        info!(?track, ?node, "input track added");
        Ok(())
    }

    pub fn remove_input_track_node(&mut self, track: TrackId) -> Result<(), GraphError> {
        let node = self
            .tracks
            .remove(&track)
            .ok_or(GraphError::UnknownTrack(track))?;
        self.graph.remove(node)?;
        info!(?track, ?node, "input track removed");
        Ok(())
    }

    pub fn input_track_node(&self, track: TrackId) -> Option<NodeId> {
        self.tracks.get(&track).copied()
    }

    pub fn track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.tracks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Run `f` on a copy of `track`'s input state.
    pub fn with_input_track<R>(
        &self,
        track: TrackId,
        f: impl FnOnce(&InputTrackState) -> R,
    ) -> Result<R, GraphError> {
        let (node, shared) = self.track_node(track)?;
        let state = shared
            .input_state()
            .ok_or(GraphError::NotAnInputTrack(node))?;
        Ok(f(&state))
    }

    fn with_input_track_mut<R>(
        &self,
        track: TrackId,
        f: impl FnOnce(&mut InputTrackState) -> R,
    ) -> Result<R, GraphError> {
        let (node, shared) = self.track_node(track)?;
        shared
            .update_input_state(f)
            .ok_or(GraphError::NotAnInputTrack(node))
    }

    fn track_node(&self, track: TrackId) -> Result<(NodeId, Arc<Node>), GraphError> {
        let node = self
            .input_track_node(track)
            .ok_or(GraphError::UnknownTrack(track))?;
        let shared = self.graph.node(node).ok_or(GraphError::UnknownNode(node))?;
        Ok((node, shared))
    }

    /// Listen to device channel `channel` only.
    pub fn set_input_track_to_mono(&self, track: TrackId, channel: usize) -> Result<(), GraphError> {
        self.with_input_track_mut(track, |input| input.set_audio_input_selection(channel, 1))?;
        debug!(?track, channel, "input track set to mono");
        Ok(())
    }

    /// Listen to device channels `first_channel` and `first_channel + 1`.
    pub fn set_input_track_to_stereo(
        &self,
        track: TrackId,
        first_channel: usize,
    ) -> Result<(), GraphError> {
        self.with_input_track_mut(track, |input| input.set_audio_input_selection(first_channel, 2))?;
        debug!(?track, first_channel, "input track set to stereo");
        Ok(())
    }

    /// Listen to MIDI device `device`; `channel` `None` means all channels.
    pub fn set_input_track_to_midi(
        &self,
        track: TrackId,
        device: usize,
        channel: Option<u8>,
    ) -> Result<(), GraphError> {
        self.with_input_track_mut(track, |input| match channel {
            Some(channel) => input.set_midi_input_channel_selection(device, channel),
            None => input.set_midi_input_selection(device),
        })?;
        debug!(?track, device, ?channel, "input track set to MIDI");
        Ok(())
    }

    pub fn set_input_track_to_no_input(&self, track: TrackId) -> Result<(), GraphError> {
        self.with_input_track_mut(track, InputTrackState::set_to_no_input)?;
        debug!(?track, "input track set to no input");
        Ok(())
    }

    /// Label of `track`'s current selection, see [`describe_input`].
    pub fn describe_input_track(
        &self,
        track: TrackId,
        audio: &dyn AudioDriver,
        midi: &dyn MidiDriver,
    ) -> Result<InputLabel, GraphError> {
        self.with_input_track(track, |input| describe_input(input, audio, midi))
    }

    /// Render one block of every input track through the master mixer.
    pub fn process(
        &self,
        input: &SamplesBuffer,
        output: &mut SamplesBuffer,
        sample_rate: u32,
        midi: &MidiBuffer,
    ) {
        self.graph
            .process_replacing(self.master, input, output, sample_rate, midi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{StaticAudioDriver, StaticMidiDriver};
    use crate::nodes::input::{LocalInputAudioNode, LocalInputTestStreamer};
    use crate::range::ChannelRange;

    fn audio() -> StaticAudioDriver {
        StaticAudioDriver::new("Studio Interface", 48000)
            .with_channel_names(["Mic Left", "Mic Right", "", "Line In 4"])
    }

    fn label(tracks: &InputTracks, track: TrackId) -> InputLabel {
        let midi = StaticMidiDriver::new()
            .with_device("Keystation", true)
            .with_device("Pads", false);
        tracks.describe_input_track(track, &audio(), &midi).unwrap()
    }

    #[test]
    fn test_selection_labels() {
        let mut tracks = InputTracks::new(Arc::new(AudioGraph::new()));
        let track = TrackId(7);
        tracks.add_input_track_node(track, LocalInputAudioNode::new(0)).unwrap();

        assert_eq!(label(&tracks, track).text, "No input");

        tracks.set_input_track_to_stereo(track, 0).unwrap();
        assert_eq!(
            label(&tracks, track),
            InputLabel { kind: InputKind::Stereo, text: "(1+2) Mic".into() }
        );

        tracks.set_input_track_to_mono(track, 2).unwrap();
        assert_eq!(label(&tracks, track).text, "3 - Studio Interface");
        tracks.set_input_track_to_mono(track, 3).unwrap();
        assert_eq!(label(&tracks, track).text, "4 - Line In 4");

        tracks.set_input_track_to_midi(track, 0, None).unwrap();
        assert_eq!(label(&tracks, track).text, "Keystation");
        tracks.set_input_track_to_midi(track, 1, Some(3)).unwrap();
        assert_eq!(label(&tracks, track), InputLabel { kind: InputKind::Midi, text: String::new() });

        tracks.set_input_track_to_no_input(track).unwrap();
        assert_eq!(label(&tracks, track).kind, InputKind::NoInput);
    }

    #[test]
    fn test_unknown_tracks_and_non_input_nodes() {
        let mut tracks = InputTracks::new(Arc::new(AudioGraph::new()));
        assert_eq!(
            tracks.set_input_track_to_mono(TrackId(1), 0),
            Err(GraphError::UnknownTrack(TrackId(1)))
        );
        assert_eq!(
            tracks.remove_input_track_node(TrackId(1)),
            Err(GraphError::UnknownTrack(TrackId(1)))
        );

        let before = tracks.graph().len();
        let err = tracks.add_input_track_node(TrackId(2), Mixer::new()).unwrap_err();
        assert!(matches!(err, GraphError::NotAnInputTrack(_)));
        assert_eq!(tracks.graph().len(), before);
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_global_first_input_reaches_every_track() {
        let mut tracks = InputTracks::new(Arc::new(AudioGraph::new()));
        tracks.add_input_track_node(TrackId(1), LocalInputAudioNode::new(0)).unwrap();
        tracks
            .add_input_track_node(TrackId(2), LocalInputTestStreamer::new(440.0, 48000))
            .unwrap();

        tracks.sync_with_driver(&audio().with_selected_inputs(ChannelRange::new(2, 2)));
        for track in [TrackId(1), TrackId(2)] {
            let first = tracks
                .with_input_track(track, InputTrackState::global_first_input_index)
                .unwrap();
            assert_eq!(first, 2);
        }
        assert_eq!(tracks.graph().input_sample_rate(), Some(48000));
    }

    #[test]
    fn test_remove_track_detaches_from_master() {
        let mut tracks = InputTracks::new(Arc::new(AudioGraph::new()));
        let node = tracks
            .add_input_track_node(TrackId(1), LocalInputAudioNode::new(0))
            .unwrap();
        assert_eq!(tracks.graph().connections(tracks.master()), Some(vec![node]));

        tracks.remove_input_track_node(TrackId(1)).unwrap();
        assert_eq!(tracks.graph().connections(tracks.master()), Some(vec![]));
        assert_eq!(tracks.input_track_node(TrackId(1)), None);
    }
}
