//! Local hardware/MIDI input node

use core::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::SamplesBuffer;
use crate::midi::MidiBuffer;
use crate::node::{AudioNode, ProcessContext};
use crate::range::ChannelRange;
use crate::resample::{get_input_resampling_length, LinearResampler};

/// Which of the three input methods is active.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InputMode {
    Audio,
    Midi,
    Disabled,
}

/// What a local input track listens to.
///
/// Each variant carries only the fields its mode needs, so an audio range and
/// a MIDI device can never be selected at the same time.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum InputSelection {
    #[default]
    Disabled,
    /// Device channels, as numbered by the audio driver
    Audio(ChannelRange),
    /// A MIDI input device; `channel` is `None` for all sixteen channels
    Midi { device: usize, channel: Option<u8> },
}

impl InputSelection {
    pub fn mode(&self) -> InputMode {
        match self {
            InputSelection::Disabled => InputMode::Disabled,
            InputSelection::Audio(_) => InputMode::Audio,
            InputSelection::Midi { .. } => InputMode::Midi,
        }
    }
}

/// What one input track of the local user listens to: a mono or stereo pair
/// of hardware inputs, a MIDI device, or nothing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InputTrackState {
    channel_index: usize,
    global_first_input_index: usize,
    selection: InputSelection,
}

impl InputTrackState {
    /// A disabled input belonging to channel group `channel_index`.
    pub fn new(channel_index: usize) -> Self {
        Self {
            channel_index,
            global_first_input_index: 0,
            selection: InputSelection::Disabled,
        }
    }

    pub fn with_selection(mut self, selection: InputSelection) -> Self {
        self.apply_selection(selection);
        self
    }

    /// Index of the channel group this input belongs to.
    #[inline]
    pub fn group_channel_index(&self) -> usize {
        self.channel_index
    }

    #[inline]
    pub fn selection(&self) -> InputSelection {
        self.selection
    }

    #[inline]
    pub fn input_mode(&self) -> InputMode {
        self.selection.mode()
    }

    /// Selected audio channels; empty unless in audio mode.
    pub fn audio_input_range(&self) -> ChannelRange {
        match self.selection {
            InputSelection::Audio(range) => range,
            _ => ChannelRange::empty(),
        }
    }

    /// Number of selected audio channels.
    #[inline]
    pub fn channels(&self) -> usize {
        self.audio_input_range().channels()
    }

    pub fn is_mono(&self) -> bool {
        self.is_audio() && self.audio_input_range().is_mono()
    }

    pub fn is_stereo(&self) -> bool {
        self.is_audio() && self.audio_input_range().is_stereo()
    }

    pub fn is_audio(&self) -> bool {
        self.input_mode() == InputMode::Audio
    }

    pub fn is_midi(&self) -> bool {
        self.input_mode() == InputMode::Midi
    }

    pub fn is_no_input(&self) -> bool {
        self.input_mode() == InputMode::Disabled
    }

    pub fn midi_device_index(&self) -> Option<usize> {
        match self.selection {
            InputSelection::Midi { device, .. } => Some(device),
            _ => None,
        }
    }

    /// Selected MIDI channel (0..=15); `None` when all channels are received
    /// or MIDI isn't selected.
    pub fn midi_channel_index(&self) -> Option<u8> {
        match self.selection {
            InputSelection::Midi { channel, .. } => channel,
            _ => None,
        }
    }

    pub fn is_receiving_all_midi_channels(&self) -> bool {
        matches!(self.selection, InputSelection::Midi { channel: None, .. })
    }

    /// Listen to `channel_count` device channels starting at
    /// `first_channel`. A count of zero selects no input.
    pub fn set_audio_input_selection(&mut self, first_channel: usize, channel_count: usize) {
        let range = ChannelRange::new(first_channel, channel_count);
        if range.is_empty() {
            self.set_to_no_input();
        } else {
            self.selection = InputSelection::Audio(range);
        }
    }

    /// Listen to every channel of MIDI device `device`.
    pub fn set_midi_input_selection(&mut self, device: usize) {
        self.selection = InputSelection::Midi {
            device,
            channel: None,
        };
    }

    /// Listen to one channel (0..=15) of MIDI device `device`.
    pub fn set_midi_input_channel_selection(&mut self, device: usize, channel: u8) {
        self.selection = InputSelection::Midi {
            device,
            channel: Some(channel & 0x0F),
        };
    }

    pub fn set_to_no_input(&mut self) {
        self.selection = InputSelection::Disabled;
    }

    pub fn apply_selection(&mut self, selection: InputSelection) {
        match selection {
            InputSelection::Disabled => self.set_to_no_input(),
            InputSelection::Audio(range) => {
                self.set_audio_input_selection(range.first_channel(), range.channels())
            }
            InputSelection::Midi {
                device,
                channel: None,
            } => self.set_midi_input_selection(device),
            InputSelection::Midi {
                device,
                channel: Some(channel),
            } => self.set_midi_input_channel_selection(device, channel),
        }
    }

    #[inline]
    pub fn global_first_input_index(&self) -> usize {
        self.global_first_input_index
    }

    /// First device channel present in the driver's input buffers. Device
    /// channel `c` is read from buffer channel `c - first_input_index`.
    pub fn set_global_first_input_index(&mut self, first_input_index: usize) {
        self.global_first_input_index = first_input_index;
    }
}

/// Shared handle to an input track's [`InputTrackState`].
///
/// The control thread changes the state through [`update`](Self::update);
/// the audio thread copies it at the start of each block and keeps its last
/// copy while the control thread holds the lock.
#[derive(Clone, Debug)]
pub struct InputControls(Arc<Mutex<InputTrackState>>);

impl InputControls {
    pub fn new(state: InputTrackState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    /// Copy of the current state.
    pub fn get(&self) -> InputTrackState {
        *self.0.lock()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut InputTrackState) -> R) -> R {
        f(&mut self.0.lock())
    }

    fn try_get(&self) -> Option<InputTrackState> {
        self.0.try_lock().map(|state| *state)
    }
}

/// Graph node of a local input track.
///
/// In audio mode the node copies its channels out of the driver's input
/// buffer. When the driver runs at another rate the captured frames are
/// queued and resampled as a continuous stream. MIDI and disabled modes
/// render silence; in MIDI mode the node's processors only see messages from
/// the selected device and channel.
///
/// The capture queue grows to the largest driver block on first use.
#[derive(Debug)]
pub struct LocalInputAudioNode {
    controls: InputControls,
    state: InputTrackState,
    capture: SamplesBuffer,
    backlog: SamplesBuffer,
    resampler: Option<LinearResampler>,
}

impl LocalInputAudioNode {
    /// A disabled input belonging to channel group `channel_index`.
    pub fn new(channel_index: usize) -> Self {
        let state = InputTrackState::new(channel_index);
        Self {
            controls: InputControls::new(state),
            state,
            capture: SamplesBuffer::default(),
            backlog: SamplesBuffer::default(),
            resampler: None,
        }
    }

    pub fn with_selection(mut self, selection: InputSelection) -> Self {
        self.controls.update(|state| state.apply_selection(selection));
        self.state = self.controls.get();
        self
    }

    /// Handle for changing the selection once the node is in a graph.
    #[inline]
    pub fn controls(&self) -> &InputControls {
        &self.controls
    }

    /// Copy of the current selection state.
    pub fn state(&self) -> InputTrackState {
        self.controls.get()
    }

    /// Copy the selected device channels of `input` into `dest`. Mono
    /// selections feed every channel of `dest`; channels missing from
    /// `input` stay silent.
    fn capture_into(
        range: ChannelRange,
        global_first_input_index: usize,
        input: &SamplesBuffer,
        dest: &mut SamplesBuffer,
    ) {
        dest.zero();
        let frames = dest.frames().min(input.frames());
        let last_offset = range.channels().saturating_sub(1);

        for ch in 0..dest.channels() {
            let device_channel = range.first_channel() + ch.min(last_offset);
            let Some(buffer_channel) = device_channel.checked_sub(global_first_input_index) else {
                continue;
            };
            if buffer_channel >= input.channels() {
                continue;
            }
            dest.channel_mut(ch)[..frames].copy_from_slice(&input.channel(buffer_channel)[..frames]);
        }
    }
}

impl AudioNode for LocalInputAudioNode {
    fn render(
        &mut self,
        ctx: &ProcessContext,
        input: &SamplesBuffer,
        output: &mut SamplesBuffer,
        _midi: &MidiBuffer,
    ) {
        if let Some(state) = self.controls.try_get() {
            self.state = state;
        }
        let InputSelection::Audio(range) = self.state.selection else {
            self.resampler = None;
            return;
        };
        let first_input = self.state.global_first_input_index;

        if ctx.input_sample_rate == ctx.sample_rate {
            self.resampler = None;
            Self::capture_into(range, first_input, input, output);
            return;
        }

        let (source_rate, target_rate) = (ctx.input_sample_rate, ctx.sample_rate);
        if !self
            .resampler
            .as_ref()
            .map_or(false, |r| r.converts(source_rate, target_rate))
        {
            self.resampler = Some(LinearResampler::new(source_rate, target_rate));
            self.backlog.resize(output.channels(), 0);
        }
        let Some(resampler) = self.resampler.as_mut() else {
            return;
        };

        self.capture.resize(output.channels(), input.frames());
        Self::capture_into(range, first_input, input, &mut self.capture);
        self.backlog.set_channels(output.channels());
        self.backlog.append(&self.capture);

        // frames the stream lacks read as silence
        let needed = resampler.frames_needed(ctx.frames);
        resampler.process(&self.backlog, output, ctx.frames);
        self.backlog.discard_front(needed);

        // a driver running ahead of its nominal rate drops its oldest frames
        let limit = 2 * get_input_resampling_length(source_rate, target_rate, ctx.frames) + 2;
        let excess = self.backlog.frames().saturating_sub(limit);
        self.backlog.discard_front(excess);
    }

    fn route_midi(&self, incoming: &MidiBuffer, routed: &mut MidiBuffer) {
        match self.state.selection {
            InputSelection::Midi { device, channel } => routed.copy_filtered(incoming, |m| {
                m.device_index == device && channel.map_or(true, |c| m.channel() == c)
            }),
            _ => routed.copy_from(incoming),
        }
    }

    fn input_controls(&self) -> Option<InputControls> {
        Some(self.controls.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
