//! Audio graph - owns nodes, their topology and the block barrier

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::buffer::SamplesBuffer;
use crate::error::GraphError;
use crate::midi::MidiBuffer;
use crate::node::{AudioNode, Node, NodeId, NodeMap, ProcessContext};

/// Counts blocks entering and leaving the audio callback so the control
/// thread can tell when a block that might have seen a node has finished.
#[derive(Debug, Default)]
struct BlockBarrier {
    started: AtomicU64,
    finished: AtomicU64,
}

impl BlockBarrier {
    fn enter(&self) -> BlockGuard<'_> {
        self.started.fetch_add(1, Ordering::AcqRel);
        BlockGuard { barrier: self }
    }

    #[inline]
    fn started(&self) -> u64 {
        self.started.load(Ordering::Acquire)
    }

    #[inline]
    fn finished(&self) -> u64 {
        self.finished.load(Ordering::Acquire)
    }
}

struct BlockGuard<'a> {
    barrier: &'a BlockBarrier,
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        self.barrier.finished.fetch_add(1, Ordering::Release);
    }
}

/// Block length buffers are sized for unless configured otherwise.
pub const DEFAULT_MAX_BLOCK_FRAMES: usize = 1024;

/// A removed node waiting until no block can still reference it.
struct Retired {
    node: Arc<Node>,
    stamp: u64,
}

/// An arena of audio nodes keyed by [`NodeId`].
///
/// The control thread adds, connects and removes nodes; the audio thread
/// calls [`process_replacing`](Self::process_replacing) once per block. Edges
/// are kept acyclic: `connect(a, b)` is refused if `a` is already reachable
/// from `b`.
///
/// Removal is two-phase. [`remove`](Self::remove) deactivates the node and
/// unlinks it; [`reclaim`](Self::reclaim) drops it once every block that
/// started before the removal has finished and nobody else holds it.
///
/// A node pulled by two parents (a diamond) renders once per parent and
/// block. Stateful sources such as oscillators advance twice, so give each
/// parent its own source instead of sharing one.
///
/// Each node pre-sizes its block buffers for
/// [`max_block_frames`](Self::max_block_frames) frames. Longer blocks make
/// the audio thread grow them once.
pub struct AudioGraph {
    nodes: RwLock<NodeMap>,
    // lock order: topology before nodes
    topology: Mutex<DiGraphMap<NodeId, ()>>,
    retired: Mutex<Vec<Retired>>,
    barrier: BlockBarrier,
    next_node_id: AtomicU32,
    input_sample_rate: AtomicU32,
    max_block_frames: usize,
}

impl AudioGraph {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            nodes: RwLock::new(NodeMap::with_capacity(nodes)),
            topology: Mutex::new(DiGraphMap::with_capacity(nodes, nodes)),
            retired: Mutex::new(Vec::new()),
            barrier: BlockBarrier::default(),
            next_node_id: AtomicU32::new(0),
            input_sample_rate: AtomicU32::new(0),
            max_block_frames: DEFAULT_MAX_BLOCK_FRAMES,
        }
    }

    /// Size node buffers for blocks of up to `frames` frames. Applies to
    /// nodes added afterwards.
    pub fn with_max_block_frames(mut self, frames: usize) -> Self {
        self.max_block_frames = frames;
        self
    }

    #[inline]
    pub fn max_block_frames(&self) -> usize {
        self.max_block_frames
    }

    /// Rate of the driver's input buffers. `None` means they arrive at the
    /// callback's target rate.
    pub fn set_input_sample_rate(&self, rate: Option<u32>) {
        self.input_sample_rate
            .store(rate.unwrap_or(0), Ordering::Relaxed);
    }

    pub fn input_sample_rate(&self) -> Option<u32> {
        match self.input_sample_rate.load(Ordering::Relaxed) {
            0 => None,
            rate => Some(rate),
        }
    }

    /// Add a node. It starts activated, unconnected, at unity gain and centered.
    pub fn add<N: AudioNode>(&self, kernel: N) -> NodeId {
        let id = NodeId(self.next_node_id.fetch_add(1, Ordering::Relaxed));
        let node = Arc::new(Node::new(id, Box::new(kernel), self.max_block_frames));

        let mut topology = self.topology.lock();
        topology.add_node(id);
        self.nodes.write().insert(id, node);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.read().get(&id).cloned()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make `node` pull from `upstream`. Returns false if the pair is
    /// already connected, is a self-connection, or would close a cycle.
    pub fn connect(&self, node: NodeId, upstream: NodeId) -> bool {
        match self.try_connect(node, upstream) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(?node, ?upstream, %err, "connection rejected");
                false
            }
        }
    }

    pub fn try_connect(&self, node: NodeId, upstream: NodeId) -> Result<(), GraphError> {
        if node == upstream {
            return Err(GraphError::SelfConnection);
        }
        let mut topology = self.topology.lock();
        for id in [node, upstream] {
            if !topology.contains_node(id) {
                return Err(GraphError::UnknownNode(id));
            }
        }
        if topology.contains_edge(node, upstream) {
            return Err(GraphError::AlreadyConnected);
        }
        if has_path_connecting(&*topology, upstream, node, None) {
            return Err(GraphError::WouldCycle);
        }

        let target = self.node(node).ok_or(GraphError::UnknownNode(node))?;
        if !target.insert_connection(upstream) {
            return Err(GraphError::AlreadyConnected);
        }
        topology.add_edge(node, upstream, ());
        Ok(())
    }

    /// Stop `node` pulling from `upstream`. Returns false if they weren't connected.
    pub fn disconnect(&self, node: NodeId, upstream: NodeId) -> bool {
        match self.try_disconnect(node, upstream) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(?node, ?upstream, %err, "disconnection rejected");
                false
            }
        }
    }

    pub fn try_disconnect(&self, node: NodeId, upstream: NodeId) -> Result<(), GraphError> {
        let mut topology = self.topology.lock();
        if !topology.contains_node(node) {
            return Err(GraphError::UnknownNode(node));
        }
        if topology.remove_edge(node, upstream).is_none() {
            return Err(GraphError::NotConnected);
        }
        if let Some(target) = self.node(node) {
            target.remove_connection(upstream);
        }
        Ok(())
    }

    /// Snapshot of the nodes `id` pulls from.
    pub fn connections(&self, id: NodeId) -> Option<Vec<NodeId>> {
        self.node(id).map(|node| node.connections())
    }

    /// Exclude a node from traversal without removing it.
    pub fn deactivate(&self, id: NodeId) -> Result<(), GraphError> {
        let node = self.node(id).ok_or(GraphError::UnknownNode(id))?;
        node.deactivate();
        Ok(())
    }

    /// Deactivate a node, unlink it from every node pulling from it and
    /// take it out of the arena. It is dropped by a later [`reclaim`](Self::reclaim).
    pub fn remove(&self, id: NodeId) -> Result<(), GraphError> {
        let mut topology = self.topology.lock();
        if !topology.contains_node(id) {
            return Err(GraphError::UnknownNode(id));
        }
        let pullers: Vec<NodeId> = topology
            .neighbors_directed(id, Direction::Incoming)
            .collect();
        topology.remove_node(id);

        let removed = {
            let mut nodes = self.nodes.write();
            if let Some(node) = nodes.get(&id) {
                node.deactivate();
            }
            for puller in &pullers {
                if let Some(node) = nodes.get(puller) {
                    node.remove_connection(id);
                }
            }
            nodes.remove(&id)
        };
        drop(topology);

        if let Some(node) = removed {
            let stamp = self.barrier.started();
            self.retired.lock().push(Retired { node, stamp });
        }
        Ok(())
    }

    /// Drop removed nodes that no block or caller can still reference.
    /// Returns the number of nodes dropped.
    pub fn reclaim(&self) -> usize {
        let finished = self.barrier.finished();
        let mut retired = self.retired.lock();
        let before = retired.len();
        retired.retain(|r| r.stamp > finished || Arc::strong_count(&r.node) > 1);
        let reclaimed = before - retired.len();
        tracing::trace!(reclaimed, pending = retired.len(), "reclaimed removed nodes");
        reclaimed
    }

    /// Number of removed nodes not yet reclaimed.
    pub fn pending_reclaim(&self) -> usize {
        self.retired.lock().len()
    }

    /// Number of blocks the audio callback has completed.
    pub fn blocks_processed(&self) -> u64 {
        self.barrier.finished()
    }

    /// Render one block from `root` into `output`.
    ///
    /// `output` decides the block length and channel layout; `sample_rate` is
    /// its rate. `input` is the driver's input buffer. Unknown or inactive
    /// roots produce silence.
    pub fn process_replacing(
        &self,
        root: NodeId,
        input: &SamplesBuffer,
        output: &mut SamplesBuffer,
        sample_rate: u32,
        midi: &MidiBuffer,
    ) {
        let _block = self.barrier.enter();
        let nodes = self.nodes.read();
        let Some(node) = nodes.get(&root) else {
            output.zero();
            return;
        };
        let ctx = ProcessContext::new(sample_rate, output.frames())
            .with_input_sample_rate(self.input_sample_rate().unwrap_or(sample_rate));
        node.pull(&nodes, &ctx, input, output, midi);
    }
}

impl Default for AudioGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::effect::Mixer;
    use crate::nodes::source::OscillatorAudioNode;

    #[test]
    fn test_connect_disconnect_round_trip() {
        let graph = AudioGraph::new();
        let a = graph.add(Mixer::new());
        let b = graph.add(Mixer::new());
        let before = graph.connections(a).unwrap();

        assert!(graph.connect(a, b));
        assert!(!graph.connect(a, b));
        assert_eq!(graph.connections(a).unwrap(), vec![b]);
        assert!(graph.disconnect(a, b));
        assert!(!graph.disconnect(a, b));
        assert_eq!(graph.connections(a).unwrap(), before);
    }

    #[test]
    fn test_rejects_self_connection_and_cycles() {
        let graph = AudioGraph::new();
        let a = graph.add(Mixer::new());
        let b = graph.add(Mixer::new());
        let c = graph.add(Mixer::new());

        assert_eq!(graph.try_connect(a, a), Err(GraphError::SelfConnection));
        graph.try_connect(a, b).unwrap();
        graph.try_connect(b, c).unwrap();
        assert_eq!(graph.try_connect(c, a), Err(GraphError::WouldCycle));
        assert_eq!(graph.try_connect(b, a), Err(GraphError::WouldCycle));
        assert!(graph.connections(c).unwrap().is_empty());
    }

    #[test]
    fn test_remove_unlinks_and_reclaims_after_block() {
        let graph = AudioGraph::new();
        let master = graph.add(Mixer::new());
        let tone = graph.add(OscillatorAudioNode::new(440.0, 48000));
        graph.connect(master, tone);

        graph.remove(tone).unwrap();
        assert!(!graph.contains(tone));
        assert!(graph.connections(master).unwrap().is_empty());
        assert_eq!(graph.pending_reclaim(), 1);
        assert_eq!(graph.remove(tone), Err(GraphError::UnknownNode(tone)));

        let mut out = SamplesBuffer::stereo(64);
        graph.process_replacing(master, &SamplesBuffer::stereo(64), &mut out, 48000, &MidiBuffer::new());
        assert!(out.is_silent());
        assert_eq!(graph.reclaim(), 1);
        assert_eq!(graph.pending_reclaim(), 0);
    }

    #[test]
    fn test_reclaim_waits_for_outside_handles() {
        let graph = AudioGraph::new();
        let id = graph.add(Mixer::new());
        let held = graph.node(id).unwrap();
        graph.remove(id).unwrap();

        assert!(!held.is_activated());
        assert_eq!(graph.reclaim(), 0);
        drop(held);
        assert_eq!(graph.reclaim(), 1);
    }

    #[test]
    fn test_unknown_root_renders_silence() {
        let graph = AudioGraph::new();
        let mut out = SamplesBuffer::from_channels(vec![vec![1.0; 8]]);
        graph.process_replacing(NodeId(42), &SamplesBuffer::mono(8), &mut out, 44100, &MidiBuffer::new());
        assert!(out.is_silent());
        assert_eq!(graph.blocks_processed(), 1);
    }

    #[test]
    fn test_blocks_longer_than_the_configured_maximum() {
        let graph = AudioGraph::new().with_max_block_frames(16);
        assert_eq!(graph.max_block_frames(), 16);
        let master = graph.add(Mixer::new());
        let tone = graph.add(OscillatorAudioNode::new(440.0, 44100));
        graph.connect(master, tone);

        for frames in [16, 64, 8] {
            let mut out = SamplesBuffer::stereo(frames);
            graph.process_replacing(master, &SamplesBuffer::stereo(frames), &mut out, 48000, &MidiBuffer::new());
            assert_eq!(out.frames(), frames);
            assert!(!out.is_silent());
        }
    }
}
