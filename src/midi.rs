//! MIDI messages, per-block MIDI buffers and the lock-free hand-off queue
//! between a MIDI driver thread and the audio callback.

use core::slice;

use rtrb::{Consumer, Producer, RingBuffer};

/// A short (up to three byte) MIDI message tagged with the input device it
/// came from and its frame offset inside the current block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MidiMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    /// Index of the MIDI input device that produced the message
    pub device_index: usize,
    /// Frame offset inside the audio block
    pub frame: u32,
}

impl MidiMessage {
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            status,
            data1,
            data2,
            device_index: 0,
            frame: 0,
        }
    }

    /// Parse raw bytes as delivered by a MIDI driver. Returns `None` for an
    /// empty slice or a slice that doesn't start with a status byte.
    pub fn from_bytes(bytes: &[u8], device_index: usize) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        if status & 0x80 == 0 {
            return None;
        }
        Some(Self {
            status,
            data1: data.first().copied().unwrap_or(0),
            data2: data.get(1).copied().unwrap_or(0),
            device_index,
            frame: 0,
        })
    }

    pub fn with_device(mut self, device_index: usize) -> Self {
        self.device_index = device_index;
        self
    }

    pub fn at_frame(mut self, frame: u32) -> Self {
        self.frame = frame;
        self
    }

    /// MIDI channel, 0..=15.
    #[inline]
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        self.status & 0xF0 == 0x90 && self.data2 > 0
    }

    /// Note off, including the running "note on with zero velocity" form.
    #[inline]
    pub fn is_note_off(&self) -> bool {
        match self.status & 0xF0 {
            0x80 => true,
            0x90 => self.data2 == 0,
            _ => false,
        }
    }

    #[inline]
    pub fn is_control_change(&self) -> bool {
        self.status & 0xF0 == 0xB0
    }
}

/// The MIDI messages that belong to one audio block.
///
/// Reuse a buffer across blocks: [`clear`](Self::clear) keeps the allocation.
#[derive(Clone, Debug, Default)]
pub struct MidiBuffer {
    messages: Vec<MidiMessage>,
}

impl MidiBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, message: MidiMessage) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, MidiMessage> {
        self.messages.iter()
    }

    /// Replace the contents with the messages of `other`.
    pub fn copy_from(&mut self, other: &MidiBuffer) {
        self.messages.clear();
        self.messages.extend_from_slice(&other.messages);
    }

    /// Replace the contents with the messages of `other` accepted by `keep`.
    pub fn copy_filtered(&mut self, other: &MidiBuffer, mut keep: impl FnMut(&MidiMessage) -> bool) {
        self.messages.clear();
        self.messages
            .extend(other.messages.iter().filter(|&m| keep(m)).copied());
    }
}

impl<'a> IntoIterator for &'a MidiBuffer {
    type Item = &'a MidiMessage;
    type IntoIter = slice::Iter<'a, MidiMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

impl FromIterator<MidiMessage> for MidiBuffer {
    fn from_iter<I: IntoIterator<Item = MidiMessage>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

/// Sending half of a MIDI queue, owned by the MIDI driver thread.
pub struct MidiSender {
    producer: Producer<MidiMessage>,
}

impl MidiSender {
    /// Queue a message for the next audio block.
    ///
    /// Returns `Err(message)` if the queue is full (message dropped).
    pub fn send(&mut self, message: MidiMessage) -> Result<(), MidiMessage> {
        self.producer
            .push(message)
            .map_err(|rtrb::PushError::Full(m)| m)
    }
}

/// Receiving half of a MIDI queue, owned by the audio callback.
pub struct MidiReceiver {
    consumer: Consumer<MidiMessage>,
}

impl MidiReceiver {
    /// Move every queued message into `buffer` (after clearing it).
    /// Returns the number of messages moved.
    pub fn drain_into(&mut self, buffer: &mut MidiBuffer) -> usize {
        buffer.clear();
        while let Ok(message) = self.consumer.pop() {
            buffer.push(message);
        }
        buffer.len()
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.consumer.slots()
    }
}

/// Create a lock-free single-producer/single-consumer MIDI queue.
pub fn midi_queue(capacity: usize) -> (MidiSender, MidiReceiver) {
    let (producer, consumer) = RingBuffer::new(capacity);
    (MidiSender { producer }, MidiReceiver { consumer })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_messages() {
        let on = MidiMessage::from_bytes(&[0x93, 60, 100], 2).unwrap();
        assert!(on.is_note_on());
        assert_eq!(on.channel(), 3);
        assert_eq!(on.device_index, 2);

        let off = MidiMessage::from_bytes(&[0x93, 60, 0], 2).unwrap();
        assert!(off.is_note_off());
        assert!(!off.is_note_on());

        assert!(MidiMessage::from_bytes(&[], 0).is_none());
        assert!(MidiMessage::from_bytes(&[0x40, 1], 0).is_none());
    }

    #[test]
    fn test_queue_delivers_in_order_and_rejects_when_full() {
        let (mut tx, mut rx) = midi_queue(2);
        assert!(tx.send(MidiMessage::new(0x90, 60, 1)).is_ok());
        assert!(tx.send(MidiMessage::new(0x90, 61, 1)).is_ok());
        assert!(tx.send(MidiMessage::new(0x90, 62, 1)).is_err());

        let mut buffer = MidiBuffer::with_capacity(4);
        assert_eq!(rx.drain_into(&mut buffer), 2);
        let notes: Vec<u8> = buffer.iter().map(|m| m.data1).collect();
        assert_eq!(notes, vec![60, 61]);
        assert_eq!(rx.pending(), 0);
    }

    #[test]
    fn test_copy_filtered() {
        let source: MidiBuffer = (0..4u8)
            .map(|c| MidiMessage::new(0x90 | c, 60, 100))
            .collect();
        let mut only_odd = MidiBuffer::new();
        only_odd.copy_filtered(&source, |m| m.channel() % 2 == 1);
        assert_eq!(only_odd.len(), 2);
    }
}
