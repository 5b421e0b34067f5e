//! Core node trait, the shared graph vertex and the pull/mix algorithm.

use core::any::Any;
use core::f32::consts::FRAC_PI_4;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::buffer::SamplesBuffer;
use crate::midi::MidiBuffer;
use crate::nodes::input::{InputControls, InputTrackState};
use crate::peak::{AtomicF32, AudioPeak, PeakMeter};
use crate::processor::{same_processor, SharedProcessor, WeakProcessor};
use crate::resample::LinearResampler;

/// Information available while rendering a block.
///
/// Passed to every [`AudioNode::render`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessContext {
    /// Rate the node renders at, in Hz. For a node pulled by a node running at
    /// another rate this is the pulled node's native rate.
    pub sample_rate: u32,
    /// Rate of the driver's input buffer, in Hz
    pub input_sample_rate: u32,
    /// Number of frames to render
    pub frames: usize,
}

impl ProcessContext {
    pub fn new(sample_rate: u32, frames: usize) -> Self {
        Self {
            sample_rate,
            input_sample_rate: sample_rate,
            frames,
        }
    }

    pub fn with_input_sample_rate(mut self, input_sample_rate: u32) -> Self {
        self.input_sample_rate = input_sample_rate;
        self
    }

    /// The same block seen from a node running at `sample_rate`.
    pub fn at_rate(&self, sample_rate: u32, frames: usize) -> Self {
        Self {
            sample_rate,
            frames,
            ..*self
        }
    }
}

/// Unique identifier for a node within a graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// How a node turns its own render output into the block it hands downstream.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SignalPath {
    /// Render, sum upstream nodes, apply gain and pan, meter, run the
    /// processor chain, then gate by mute.
    #[default]
    Mixed,
    /// Render and scale by node gain; nothing else. Used by sources that
    /// stand in for a whole signal chain, such as test tones.
    Direct,
}

/// The per-kind part of a graph node.
///
/// A kernel only produces its own contribution to a block. Mixing upstream
/// nodes, gain, pan, metering, processors and muting are done by the [`Node`]
/// that wraps it, so new node kinds never touch the mixing algorithm.
///
/// ```
/// use std::any::Any;
/// use jamgraph::{AudioNode, MidiBuffer, ProcessContext, SamplesBuffer};
///
/// struct Dc(f32);
///
/// impl AudioNode for Dc {
///     fn render(
///         &mut self,
///         _ctx: &ProcessContext,
///         _input: &SamplesBuffer,
///         output: &mut SamplesBuffer,
///         _midi: &MidiBuffer,
///     ) {
///         for ch in 0..output.channels() {
///             output.channel_mut(ch).fill(self.0);
///         }
///     }
///
///     fn as_any(&self) -> &dyn Any { self }
///     fn as_any_mut(&mut self) -> &mut dyn Any { self }
/// }
/// ```
pub trait AudioNode: Send + 'static {
    /// Write this node's own contribution into `output`, which arrives
    /// zeroed and sized to `ctx.frames`.
    ///
    /// `input` is the driver's input buffer for the block at
    /// `ctx.input_sample_rate`. Runs on the audio thread.
    fn render(
        &mut self,
        ctx: &ProcessContext,
        input: &SamplesBuffer,
        output: &mut SamplesBuffer,
        midi: &MidiBuffer,
    );

    /// Read once, when the node is added to a graph.
    fn signal_path(&self) -> SignalPath {
        SignalPath::Mixed
    }

    /// Native sample rate of this node, if it has one.
    ///
    /// Nodes with a native rate are pulled at that rate and resampled to
    /// the rate of whoever pulls them. Read once, when the node is added.
    fn native_sample_rate(&self) -> Option<u32> {
        None
    }

    /// Select the MIDI messages handed to this node's processor chain.
    fn route_midi(&self, incoming: &MidiBuffer, routed: &mut MidiBuffer) {
        routed.copy_from(incoming);
    }

    /// Shared selection state of nodes that represent an input track.
    /// Read once, when the node is added.
    fn input_controls(&self) -> Option<InputControls> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Constant power pan law: `(left, right)` gains for `pan` in `[-1, 1]`.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

pub(crate) type NodeMap = HashMap<NodeId, Arc<Node>>;

/// Block buffers of one node, owned by whichever thread renders the node.
///
/// Sized for the graph's maximum block length when the node is created.
/// Longer blocks, layouts wider than stereo, upstream rates more than twice
/// the target rate, more than 16 connections or 256 MIDI messages in a block
/// grow them once, on the first block that needs it.
struct MixScratch {
    internal: SamplesBuffer,
    pull: SamplesBuffer,
    resampled: SamplesBuffer,
    upstream: Vec<NodeId>,
    resamplers: Vec<(NodeId, LinearResampler)>,
    chain: Vec<SharedProcessor>,
    midi: MidiBuffer,
}

impl MixScratch {
    fn new(max_block_frames: usize) -> Self {
        let sized = |frames: usize| {
            let mut buffer = SamplesBuffer::stereo(frames);
            buffer.set_frame_length(0);
            buffer
        };
        Self {
            internal: sized(max_block_frames),
            pull: sized(2 * max_block_frames + 2),
            resampled: sized(max_block_frames),
            upstream: Vec::with_capacity(16),
            resamplers: Vec::with_capacity(16),
            chain: Vec::with_capacity(8),
            midi: MidiBuffer::with_capacity(256),
        }
    }
}

/// A vertex of an [`AudioGraph`](crate::AudioGraph).
///
/// Control-side state (gain, pan, mute, solo, activation, peak) is atomic and
/// can be changed from any thread. Connections and processors sit behind
/// their own short-lived locks; the audio thread only holds them long enough
/// to take a snapshot. The kernel lock is held for one `render` call, never
/// while upstream nodes are pulled.
pub struct Node {
    id: NodeId,
    native_sample_rate: Option<u32>,
    signal_path: SignalPath,
    max_block_frames: usize,

    gain: AtomicF32,
    pan: AtomicF32,
    left_gain: AtomicF32,
    right_gain: AtomicF32,
    muted: AtomicBool,
    soloed: AtomicBool,
    activated: AtomicBool,
    peak: PeakMeter,

    connections: Mutex<Vec<NodeId>>,
    processors: Mutex<Vec<WeakProcessor>>,
    input: Option<InputControls>,
    kernel: Mutex<Box<dyn AudioNode>>,
    // taken by the rendering thread for the length of a block
    scratch: Mutex<Option<MixScratch>>,
    monitor: Mutex<SamplesBuffer>,
}

impl Node {
    pub(crate) fn new(id: NodeId, kernel: Box<dyn AudioNode>, max_block_frames: usize) -> Self {
        let (left, right) = pan_gains(0.0);
        let mut monitor = SamplesBuffer::stereo(max_block_frames);
        monitor.set_frame_length(0);
        Self {
            id,
            native_sample_rate: kernel.native_sample_rate(),
            signal_path: kernel.signal_path(),
            max_block_frames,
            gain: AtomicF32::new(1.0),
            pan: AtomicF32::new(0.0),
            left_gain: AtomicF32::new(left),
            right_gain: AtomicF32::new(right),
            muted: AtomicBool::new(false),
            soloed: AtomicBool::new(false),
            activated: AtomicBool::new(true),
            peak: PeakMeter::new(),
            connections: Mutex::new(Vec::new()),
            processors: Mutex::new(Vec::new()),
            input: kernel.input_controls(),
            kernel: Mutex::new(kernel),
            scratch: Mutex::new(Some(MixScratch::new(max_block_frames))),
            monitor: Mutex::new(monitor),
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn native_sample_rate(&self) -> Option<u32> {
        self.native_sample_rate
    }

    #[inline]
    pub fn signal_path(&self) -> SignalPath {
        self.signal_path
    }

    // connections

    /// Snapshot of the nodes this node pulls from, in connection order.
    pub fn connections(&self) -> Vec<NodeId> {
        self.connections.lock().clone()
    }

    pub fn is_connected_to(&self, other: NodeId) -> bool {
        self.connections.lock().contains(&other)
    }

    pub(crate) fn insert_connection(&self, other: NodeId) -> bool {
        let mut connections = self.connections.lock();
        if other == self.id || connections.contains(&other) {
            return false;
        }
        connections.push(other);
        true
    }

    pub(crate) fn remove_connection(&self, other: NodeId) -> bool {
        let mut connections = self.connections.lock();
        match connections.iter().position(|&id| id == other) {
            Some(index) => {
                connections.remove(index);
                true
            }
            None => false,
        }
    }

    // processors

    /// Append `processor` to the chain. Returns false if it is already there.
    ///
    /// The node keeps only a weak reference: the processor leaves the chain
    /// once its last strong handle is dropped.
    pub fn add_processor(&self, processor: SharedProcessor) -> bool {
        let weak = Arc::downgrade(&processor);
        let mut processors = self.processors.lock();
        processors.retain(|p| p.strong_count() > 0);
        if processors.iter().any(|p| same_processor(p, &weak)) {
            return false;
        }
        processors.push(weak);
        tracing::debug!(node = ?self.id, chain = processors.len(), "processor added");
        true
    }

    /// Remove `processor` from the chain. Returns false if it wasn't there.
    pub fn remove_processor(&self, processor: SharedProcessor) -> bool {
        let weak = Arc::downgrade(&processor);
        let mut processors = self.processors.lock();
        let before = processors.len();
        processors.retain(|p| p.strong_count() > 0 && !same_processor(p, &weak));
        let removed = processors.len() < before;
        if removed {
            tracing::debug!(node = ?self.id, chain = processors.len(), "processor removed");
        }
        removed
    }

    /// Number of live processors in the chain.
    pub fn processor_count(&self) -> usize {
        self.processors
            .lock()
            .iter()
            .filter(|p| p.strong_count() > 0)
            .count()
    }

    // conditioning

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain.load()
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain);
    }

    #[inline]
    pub fn pan(&self) -> f32 {
        self.pan.load()
    }

    /// Set the pan position, clamped to `[-1, 1]`, and recompute the
    /// left/right gains.
    pub fn set_pan(&self, pan: f32) {
        let pan = pan.clamp(-1.0, 1.0);
        let (left, right) = pan_gains(pan);
        self.pan.store(pan);
        self.left_gain.store(left);
        self.right_gain.store(right);
    }

    #[inline]
    pub fn left_gain(&self) -> f32 {
        self.left_gain.load()
    }

    #[inline]
    pub fn right_gain(&self) -> f32 {
        self.right_gain.load()
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_mute(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_soloed(&self) -> bool {
        self.soloed.load(Ordering::Relaxed)
    }

    pub fn set_solo(&self, soloed: bool) {
        self.soloed.store(soloed, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::Acquire)
    }

    /// Exclude this node from graph traversal. Connections are kept; the
    /// owning graph decides when the node is dropped.
    pub fn deactivate(&self) {
        self.activated.store(false, Ordering::Release);
    }

    /// Peak of the most recent blocks; with `reset` the meter is cleared.
    pub fn last_peak(&self, reset: bool) -> AudioPeak {
        self.peak.read(reset)
    }

    // kernel access

    /// Run `f` on a copy of the most recent block this node produced.
    ///
    /// The audio thread skips updating the copy while `f` runs.
    pub fn with_last_buffer<R>(&self, f: impl FnOnce(&SamplesBuffer) -> R) -> R {
        f(&self.monitor.lock())
    }

    /// Run `f` on the kernel if it is a `K`.
    ///
    /// The node's next render waits for `f` to return.
    pub fn with_kernel<K: AudioNode, R>(&self, f: impl FnOnce(&K) -> R) -> Option<R> {
        let kernel = self.kernel.lock();
        kernel.as_any().downcast_ref::<K>().map(f)
    }

    pub fn with_kernel_mut<K: AudioNode, R>(&self, f: impl FnOnce(&mut K) -> R) -> Option<R> {
        let mut kernel = self.kernel.lock();
        kernel.as_any_mut().downcast_mut::<K>().map(f)
    }

    /// Selection state of an input-track node; `None` for other kinds.
    pub fn input_state(&self) -> Option<InputTrackState> {
        self.input.as_ref().map(InputControls::get)
    }

    /// Change the selection state of an input-track node. The audio thread
    /// picks the change up at its next block.
    pub fn update_input_state<R>(&self, f: impl FnOnce(&mut InputTrackState) -> R) -> Option<R> {
        self.input.as_ref().map(|controls| controls.update(f))
    }

    // audio thread

    /// Produce this node's block into `out`, pulling from connected nodes.
    ///
    /// `out` keeps its channel layout; `ctx.frames` frames are written.
    pub(crate) fn pull(
        &self,
        nodes: &NodeMap,
        ctx: &ProcessContext,
        input: &SamplesBuffer,
        out: &mut SamplesBuffer,
        midi: &MidiBuffer,
    ) {
        out.set_frame_length(ctx.frames);
        if !self.is_activated() {
            out.zero();
            return;
        }

        // a second parent rendering this node concurrently gets fresh buffers
        let taken = self.scratch.lock().take();
        let mut scratch = taken.unwrap_or_else(|| MixScratch::new(self.max_block_frames));
        self.render_block(nodes, ctx, input, out, midi, &mut scratch);
        *self.scratch.lock() = Some(scratch);
    }

    fn render_block(
        &self,
        nodes: &NodeMap,
        ctx: &ProcessContext,
        input: &SamplesBuffer,
        out: &mut SamplesBuffer,
        midi: &MidiBuffer,
        scratch: &mut MixScratch,
    ) {
        scratch.internal.resize(out.channels(), ctx.frames);
        scratch.internal.zero();
        self.kernel
            .lock()
            .render(ctx, input, &mut scratch.internal, midi);

        if self.signal_path == SignalPath::Direct {
            scratch.internal.apply_gain(self.gain());
            self.publish(&scratch.internal, out);
            return;
        }

        self.mix_upstream(nodes, ctx, input, scratch, midi);

        let internal = &mut scratch.internal;
        internal.apply_gain(self.gain());
        internal.apply_stereo_gains(self.left_gain.load(), self.right_gain.load());
        self.peak.update(internal.peak());

        self.kernel.lock().route_midi(midi, &mut scratch.midi);
        self.run_processors(scratch);

        if self.is_muted() {
            scratch.internal.zero();
        }
        self.publish(&scratch.internal, out);
    }

    /// Copy the finished block to `out` and, unless the control thread is
    /// reading it, to the monitor copy.
    fn publish(&self, block: &SamplesBuffer, out: &mut SamplesBuffer) {
        out.copy_from(block);
        if let Some(mut monitor) = self.monitor.try_lock() {
            monitor.resize(block.channels(), block.frames());
            monitor.copy_from(block);
        }
    }

    fn mix_upstream(
        &self,
        nodes: &NodeMap,
        ctx: &ProcessContext,
        input: &SamplesBuffer,
        scratch: &mut MixScratch,
        midi: &MidiBuffer,
    ) {
        let MixScratch {
            internal,
            pull,
            resampled,
            upstream,
            resamplers,
            ..
        } = scratch;

        upstream.clear();
        upstream.extend(self.connections.lock().iter().copied());
        resamplers.retain(|(id, _)| upstream.contains(id));
        if upstream.is_empty() {
            return;
        }

        let soloing = upstream
            .iter()
            .filter_map(|id| nodes.get(id))
            .any(|node| node.is_activated() && node.is_soloed());
        let channels = internal.channels();

        for &id in upstream.iter() {
            let Some(node) = nodes.get(&id) else {
                continue;
            };
            if !node.is_activated() || (soloing && !node.is_soloed()) {
                continue;
            }

            let rate = node.native_sample_rate.unwrap_or(ctx.sample_rate);
            if rate == ctx.sample_rate {
                pull.resize(channels, ctx.frames);
                node.pull(nodes, ctx, input, pull, midi);
                internal.add(pull);
                continue;
            }

            let slot = match resamplers.iter().position(|(source, _)| *source == id) {
                Some(slot) => slot,
                None => {
                    resamplers.push((id, LinearResampler::new(rate, ctx.sample_rate)));
                    resamplers.len() - 1
                }
            };
            let resampler = &mut resamplers[slot].1;
            if !resampler.converts(rate, ctx.sample_rate) {
                *resampler = LinearResampler::new(rate, ctx.sample_rate);
            }

            let frames = resampler.frames_needed(ctx.frames);
            pull.resize(channels, frames);
            node.pull(nodes, &ctx.at_rate(rate, frames), input, pull, midi);
            resampler.process(pull, resampled, ctx.frames);
            internal.add(resampled);
        }
    }

    fn run_processors(&self, scratch: &mut MixScratch) {
        let MixScratch {
            internal,
            chain,
            midi,
            ..
        } = scratch;

        chain.clear();
        chain.extend(self.processors.lock().iter().filter_map(Weak::upgrade));
        for processor in chain.drain(..) {
            processor.lock().process(internal, midi);
        }
    }
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("native_sample_rate", &self.native_sample_rate)
            .field("signal_path", &self.signal_path)
            .field("gain", &self.gain())
            .field("pan", &self.pan())
            .field("muted", &self.is_muted())
            .field("soloed", &self.is_soloed())
            .field("activated", &self.is_activated())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::effect::Mixer;
    use crate::nodes::source::OscillatorAudioNode;

    fn node() -> Node {
        Node::new(NodeId(0), Box::new(Mixer::new()), 64)
    }

    #[test]
    fn test_pan_law_is_constant_power() {
        for step in 0..=200 {
            let pan = -1.0 + step as f32 * 0.01;
            let (left, right) = pan_gains(pan);
            assert!((left * left + right * right - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_pan_law_end_points() {
        let (left, right) = pan_gains(0.0);
        let half = core::f32::consts::FRAC_1_SQRT_2;
        assert!((left - half).abs() < 1e-6);
        assert!((right - half).abs() < 1e-6);

        let (_, right) = pan_gains(-1.0);
        assert!(right.abs() < 1e-6);
        let (left, _) = pan_gains(1.0);
        assert!(left.abs() < 1e-6);
    }

    #[test]
    fn test_set_pan_updates_cached_gains() {
        let node = node();
        node.set_pan(2.0);
        assert_eq!(node.pan(), 1.0);
        assert!(node.left_gain().abs() < 1e-6);
        assert!((node.right_gain() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_connection_set_rejects_self_and_duplicates() {
        let node = node();
        assert!(!node.insert_connection(NodeId(0)));
        assert!(node.insert_connection(NodeId(1)));
        assert!(!node.insert_connection(NodeId(1)));
        assert!(node.remove_connection(NodeId(1)));
        assert!(!node.remove_connection(NodeId(1)));
        assert!(node.connections().is_empty());
    }

    #[test]
    fn test_deactivated_node_renders_silence() {
        let node = node();
        node.deactivate();
        let mut out = SamplesBuffer::from_channels(vec![vec![1.0; 4], vec![1.0; 4]]);
        node.pull(
            &NodeMap::new(),
            &ProcessContext::new(48000, 4),
            &SamplesBuffer::default(),
            &mut out,
            &MidiBuffer::new(),
        );
        assert!(out.is_silent());
    }

    #[test]
    fn test_last_buffer_follows_rendered_blocks() {
        let node = Node::new(NodeId(0), Box::new(OscillatorAudioNode::new(1000.0, 48000)), 64);
        let mut out = SamplesBuffer::stereo(32);
        node.pull(
            &NodeMap::new(),
            &ProcessContext::new(48000, 32),
            &SamplesBuffer::default(),
            &mut out,
            &MidiBuffer::new(),
        );
        node.with_last_buffer(|last| {
            assert_eq!(last.frames(), 32);
            assert_eq!(last.channel(0), out.channel(0));
        });
        assert!(node.input_state().is_none());
        assert!(node.update_input_state(|state| state.set_to_no_input()).is_none());
    }

    #[test]
    fn test_kernel_downcast() {
        let node = Node::new(NodeId(0), Box::new(OscillatorAudioNode::new(440.0, 44100)), 64);
        assert_eq!(node.with_kernel(OscillatorAudioNode::frequency), Some(440.0));
        assert_eq!(node.with_kernel(|_: &Mixer| ()), None);
    }
}
