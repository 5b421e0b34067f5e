//! Errors reported by graph and controller operations.

use thiserror::Error;

use crate::node::NodeId;
use crate::tracks::TrackId;

/// Why a structural change to the graph or an input track was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("a node cannot be connected to itself")]
    SelfConnection,
    #[error("nodes are already connected")]
    AlreadyConnected,
    #[error("nodes are not connected")]
    NotConnected,
    #[error("connection would create a cycle")]
    WouldCycle,
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("unknown input track {0:?}")]
    UnknownTrack(TrackId),
    #[error("node {0:?} is not an input track node")]
    NotAnInputTrack(NodeId),
}

/// Failures of the optional device back-ends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("unknown MIDI input device {0}")]
    UnknownMidiDevice(usize),
    #[error("MIDI driver error: {0}")]
    Midi(String),
}
