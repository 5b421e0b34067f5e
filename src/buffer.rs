//! Planar multichannel sample buffer.

use itertools::izip;

use crate::peak::AudioPeak;

/// A planar buffer of `f32` samples: one contiguous lane per channel.
///
/// The buffer keeps a logical frame length separate from its storage so it can
/// be shrunk and grown between blocks without reallocating. Storage only grows.
#[derive(Clone, Debug)]
pub struct SamplesBuffer {
    lanes: Vec<Vec<f32>>,
    frames: usize,
}

impl SamplesBuffer {
    /// A silent buffer with `channels` channels (at least one) of `frames` frames.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            lanes: (0..channels.max(1)).map(|_| vec![0.0; frames]).collect(),
            frames,
        }
    }

    pub fn mono(frames: usize) -> Self {
        Self::new(1, frames)
    }

    pub fn stereo(frames: usize) -> Self {
        Self::new(2, frames)
    }

    /// Build a buffer from per-channel sample vectors. The frame length is the
    /// shortest lane.
    pub fn from_channels(lanes: Vec<Vec<f32>>) -> Self {
        if lanes.is_empty() {
            return Self::mono(0);
        }
        let frames = lanes.iter().map(Vec::len).min().unwrap_or(0);
        Self { lanes, frames }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.lanes.len()
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn is_mono(&self) -> bool {
        self.lanes.len() == 1
    }

    /// Change the logical frame length. New frames are silent.
    pub fn set_frame_length(&mut self, frames: usize) {
        for lane in &mut self.lanes {
            if lane.len() < frames {
                lane.resize(frames, 0.0);
            }
        }
        if frames > self.frames {
            for lane in &mut self.lanes {
                lane[self.frames..frames].fill(0.0);
            }
        }
        self.frames = frames;
    }

    /// Change the channel count (at least one). New channels are silent.
    pub fn set_channels(&mut self, channels: usize) {
        let channels = channels.max(1);
        if channels > self.lanes.len() {
            let capacity = self.lanes[0].len().max(self.frames);
            self.lanes.resize_with(channels, || vec![0.0; capacity]);
        } else {
            self.lanes.truncate(channels);
        }
    }

    /// Reshape to `channels` x `frames`.
    pub fn resize(&mut self, channels: usize, frames: usize) {
        self.set_channels(channels);
        self.set_frame_length(frames);
    }

    #[inline]
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.lanes[channel][..self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.lanes[channel][..self.frames]
    }

    #[inline]
    pub fn get(&self, channel: usize, frame: usize) -> f32 {
        self.lanes[channel][frame]
    }

    #[inline]
    pub fn set(&mut self, channel: usize, frame: usize, sample: f32) {
        self.lanes[channel][frame] = sample;
    }

    pub fn zero(&mut self) {
        let frames = self.frames;
        for lane in &mut self.lanes {
            lane[..frames].fill(0.0);
        }
    }

    pub fn is_silent(&self) -> bool {
        (0..self.channels()).all(|ch| self.channel(ch).iter().all(|&s| s == 0.0))
    }

    /// Which of `source`'s channels feeds `channel` of a buffer with a
    /// different layout: mono sources feed every channel, extra channels
    /// repeat the source's last one.
    #[inline]
    fn source_lane(source: &SamplesBuffer, channel: usize) -> usize {
        channel.min(source.channels() - 1)
    }

    /// Sum `source` into this buffer, over the frames both buffers have.
    pub fn add(&mut self, source: &SamplesBuffer) {
        let frames = self.frames.min(source.frames);
        for (ch, lane) in self.lanes.iter_mut().enumerate() {
            let src = &source.lanes[Self::source_lane(source, ch)][..frames];
            for (dst, &s) in izip!(lane[..frames].iter_mut(), src) {
                *dst += s;
            }
        }
    }

    /// Overwrite this buffer with `source`, keeping this buffer's layout.
    /// Frames `source` doesn't have are silenced.
    pub fn copy_from(&mut self, source: &SamplesBuffer) {
        let frames = self.frames.min(source.frames);
        let total = self.frames;
        for (ch, lane) in self.lanes.iter_mut().enumerate() {
            let src = &source.lanes[Self::source_lane(source, ch)][..frames];
            lane[..frames].copy_from_slice(src);
            lane[frames..total].fill(0.0);
        }
    }

    /// Append the frames of `source`, keeping this buffer's layout.
    pub fn append(&mut self, source: &SamplesBuffer) {
        let start = self.frames;
        let end = start + source.frames;
        self.set_frame_length(end);
        for (ch, lane) in self.lanes.iter_mut().enumerate() {
            let src = &source.lanes[Self::source_lane(source, ch)][..source.frames];
            lane[start..end].copy_from_slice(src);
        }
    }

    /// Drop the first `frames` frames and move the rest to the front.
    pub fn discard_front(&mut self, frames: usize) {
        let total = self.frames;
        let frames = frames.min(total);
        for lane in &mut self.lanes {
            lane.copy_within(frames..total, 0);
        }
        self.frames = total - frames;
    }

    pub fn apply_gain(&mut self, gain: f32) {
        if gain == 1.0 {
            return;
        }
        let frames = self.frames;
        for lane in &mut self.lanes {
            lane[..frames].iter_mut().for_each(|s| *s *= gain);
        }
    }

    /// Scale the first two channels by `left` and `right`. Mono buffers are
    /// left untouched.
    pub fn apply_stereo_gains(&mut self, left: f32, right: f32) {
        if self.lanes.len() < 2 {
            return;
        }
        let frames = self.frames;
        let (l, rest) = self.lanes.split_at_mut(1);
        for (ls, rs) in izip!(l[0][..frames].iter_mut(), rest[0][..frames].iter_mut()) {
            *ls *= left;
            *rs *= right;
        }
    }

    /// Largest absolute sample of the left and right channels.
    pub fn peak(&self) -> AudioPeak {
        let lane_peak = |ch: usize| self.channel(ch).iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        match self.channels() {
            1 => AudioPeak::mono(lane_peak(0)),
            _ => AudioPeak::new(lane_peak(0), lane_peak(1)),
        }
    }
}

impl Default for SamplesBuffer {
    fn default() -> Self {
        Self::stereo(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_length_shrinks_and_regrows_silent() {
        let mut buffer = SamplesBuffer::from_channels(vec![vec![1.0; 8], vec![1.0; 8]]);
        buffer.set_frame_length(4);
        assert_eq!(buffer.frames(), 4);

        buffer.set_frame_length(8);
        assert_eq!(buffer.channel(0), &[1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_add_upmixes_mono_source() {
        let mut out = SamplesBuffer::stereo(3);
        let mono = SamplesBuffer::from_channels(vec![vec![0.5, 0.25, -0.5]]);
        out.add(&mono);
        out.add(&mono);
        assert_eq!(out.channel(0), &[1.0, 0.5, -1.0]);
        assert_eq!(out.channel(1), &[1.0, 0.5, -1.0]);
    }

    #[test]
    fn test_copy_from_silences_missing_frames() {
        let mut out = SamplesBuffer::from_channels(vec![vec![9.0; 4]]);
        let short = SamplesBuffer::from_channels(vec![vec![1.0, 2.0]]);
        out.copy_from(&short);
        assert_eq!(out.channel(0), &[1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_stereo_gains_and_peak() {
        let mut buffer = SamplesBuffer::from_channels(vec![vec![1.0, -0.5], vec![0.5, -1.0]]);
        buffer.apply_gain(0.5);
        buffer.apply_stereo_gains(1.0, 0.0);
        assert_eq!(buffer.peak(), AudioPeak::new(0.5, 0.0));
    }

    #[test]
    fn test_set_channels_keeps_frames() {
        let mut buffer = SamplesBuffer::mono(16);
        buffer.set_channels(2);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.channel(1).len(), 16);
        assert!(buffer.is_silent());
    }

    #[test]
    fn test_append_then_discard_front_keeps_order() {
        let mut queue = SamplesBuffer::stereo(0);
        queue.append(&SamplesBuffer::from_channels(vec![vec![1.0, 2.0, 3.0]]));
        queue.append(&SamplesBuffer::from_channels(vec![vec![4.0], vec![-4.0]]));
        assert_eq!(queue.channel(0), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(queue.channel(1), &[1.0, 2.0, 3.0, -4.0]);

        queue.discard_front(3);
        assert_eq!(queue.channel(1), &[-4.0]);
        queue.discard_front(5);
        assert_eq!(queue.frames(), 0);
    }
}
