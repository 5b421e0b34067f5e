//! Contiguous channel selections.

use core::ops::Range;

/// A contiguous selection of input channels: `count` channels starting at `first`.
///
/// An empty range (`count == 0`) means "no input".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct ChannelRange {
    first: usize,
    count: usize,
}

impl ChannelRange {
    pub const fn new(first: usize, count: usize) -> Self {
        Self { first, count }
    }

    /// The "no input" range.
    pub const fn empty() -> Self {
        Self { first: 0, count: 0 }
    }

    pub const fn mono(channel: usize) -> Self {
        Self::new(channel, 1)
    }

    pub const fn stereo(first: usize) -> Self {
        Self::new(first, 2)
    }

    #[inline]
    pub fn first_channel(&self) -> usize {
        self.first
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.count
    }

    /// Index of the last selected channel, `None` for an empty range.
    #[inline]
    pub fn last_channel(&self) -> Option<usize> {
        if self.count == 0 {
            None
        } else {
            Some(self.first + self.count - 1)
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_mono(&self) -> bool {
        self.count == 1
    }

    #[inline]
    pub fn is_stereo(&self) -> bool {
        self.count == 2
    }

    pub fn contains(&self, channel: usize) -> bool {
        self.indices().contains(&channel)
    }

    /// Selected channel indices, in order.
    pub fn indices(&self) -> Range<usize> {
        self.first..self.first + self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_and_stereo_queries() {
        let mono = ChannelRange::mono(3);
        assert!(mono.is_mono());
        assert!(!mono.is_stereo());
        assert_eq!(mono.last_channel(), Some(3));

        let stereo = ChannelRange::stereo(2);
        assert!(stereo.is_stereo());
        assert_eq!(stereo.first_channel(), 2);
        assert_eq!(stereo.last_channel(), Some(3));
        assert_eq!(stereo.indices().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_empty_range_is_no_input() {
        let empty = ChannelRange::empty();
        assert!(empty.is_empty());
        assert!(!empty.is_mono());
        assert_eq!(empty.last_channel(), None);
        assert!(!empty.contains(0));
        assert_eq!(ChannelRange::new(5, 0), ChannelRange::new(5, 0));
    }
}
