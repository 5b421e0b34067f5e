//! Sample rate conversion between nodes running at different native rates.
//!
//! A node pulling from an upstream node at a foreign rate keeps one
//! [`LinearResampler`] per connection. Each block it asks the resampler how
//! many upstream frames the block needs, pulls exactly that many and lets the
//! resampler stretch or squeeze them to its own block length. The read
//! position carries over between blocks, so the upstream stream is consumed
//! at exactly `source_rate / target_rate` frames per output frame.

use crate::buffer::SamplesBuffer;

/// Channels a [`LinearResampler`] keeps history for. Further channels of a
/// resampled buffer are silent.
pub const MAX_RESAMPLED_CHANNELS: usize = 8;

/// Number of `source_rate` frames needed to produce `out_frames` frames at
/// `target_rate`: `ceil(out_frames * source_rate / target_rate)`.
///
/// A [`LinearResampler`] never asks for more than this plus two frames.
///
/// # Panics
///
/// Panics if `target_rate` is zero. Rates are validated at the driver boundary.
pub fn get_input_resampling_length(source_rate: u32, target_rate: u32, out_frames: usize) -> usize {
    assert!(target_rate > 0, "target sample rate must be positive");
    if source_rate == target_rate {
        return out_frames;
    }
    let numerator = out_frames as u64 * source_rate as u64;
    let target = target_rate as u64;
    ((numerator + target - 1) / target) as usize
}

/// Streaming linear interpolator from `source_rate` to `target_rate`.
///
/// The resampler remembers the last two source frames it consumed and a
/// fractional read position relative to them. Output frame `i` of a block
/// reads the source stream at `position - 1 + i * ratio`, where index `-1`
/// is the newest remembered frame. The stream lags the source by one frame.
#[derive(Clone, Copy, Debug)]
pub struct LinearResampler {
    source_rate: u32,
    target_rate: u32,
    ratio: f64,
    position: f64,
    history: [[f32; 2]; MAX_RESAMPLED_CHANNELS],
}

impl LinearResampler {
    /// # Panics
    ///
    /// Panics if `target_rate` is zero.
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        assert!(target_rate > 0, "target sample rate must be positive");
        Self {
            source_rate,
            target_rate,
            ratio: source_rate as f64 / target_rate as f64,
            position: 0.0,
            history: [[0.0; 2]; MAX_RESAMPLED_CHANNELS],
        }
    }

    #[inline]
    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    #[inline]
    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Whether this resampler converts between exactly these rates.
    #[inline]
    pub fn converts(&self, source_rate: u32, target_rate: u32) -> bool {
        self.source_rate == source_rate && self.target_rate == target_rate
    }

    /// Forget the stream: silent history, read position at the start.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.history = [[0.0; 2]; MAX_RESAMPLED_CHANNELS];
    }

    /// Source frames the next [`process`](Self::process) call consumes to
    /// produce `frames` output frames.
    pub fn frames_needed(&self, frames: usize) -> usize {
        if frames == 0 {
            return 0;
        }
        let last = self.position - 1.0 + (frames - 1) as f64 * self.ratio;
        (last.floor() as i64 + 2).max(0) as usize
    }

    /// Consume the first [`frames_needed(frames)`](Self::frames_needed)
    /// frames of `source` and write `frames` frames into `dest`, which takes
    /// the channel layout of `source`. Frames `source` lacks read as silence.
    pub fn process(&mut self, source: &SamplesBuffer, dest: &mut SamplesBuffer, frames: usize) {
        let needed = self.frames_needed(frames) as i64;
        dest.resize(source.channels(), frames);
        dest.zero();

        let channels = source.channels().min(MAX_RESAMPLED_CHANNELS);
        for ch in 0..channels {
            let history = self.history[ch];
            let src = source.channel(ch);
            let at = |index: i64| match index {
                -2 => history[0],
                -1 => history[1],
                _ => src.get(index as usize).copied().unwrap_or(0.0),
            };

            let out = dest.channel_mut(ch);
            for (i, sample) in out.iter_mut().enumerate() {
                let read = self.position - 1.0 + i as f64 * self.ratio;
                let index = read.floor();
                let t = (read - index) as f32;
                let prev = at(index as i64);
                *sample = prev + t * (at(index as i64 + 1) - prev);
            }
            self.history[ch] = [at(needed - 2), at(needed - 1)];
        }

        self.position += frames as f64 * self.ratio - needed as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed a ramp (`0, 1, 2, ...`) through `resampler` in blocks of the
    /// given sizes and return every output frame.
    fn resample_ramp(resampler: &mut LinearResampler, blocks: &[usize]) -> Vec<f32> {
        let mut next = 0.0f32;
        let mut output = Vec::new();
        let mut dest = SamplesBuffer::mono(0);
        for &frames in blocks {
            let needed = resampler.frames_needed(frames);
            let ramp: Vec<f32> = (0..needed).map(|i| next + i as f32).collect();
            next += needed as f32;
            resampler.process(&SamplesBuffer::from_channels(vec![ramp]), &mut dest, frames);
            output.extend_from_slice(dest.channel(0));
        }
        output
    }

    #[test]
    fn test_same_rate_is_identity() {
        for frames in [0, 1, 64, 512, 4096] {
            assert_eq!(get_input_resampling_length(48000, 48000, frames), frames);
        }
    }

    #[test]
    fn test_length_rounds_up() {
        assert_eq!(get_input_resampling_length(44100, 48000, 256), 236);
        assert_eq!(get_input_resampling_length(48000, 44100, 256), 279);
        assert_eq!(get_input_resampling_length(96000, 48000, 128), 256);
        assert_eq!(get_input_resampling_length(22050, 44100, 3), 2);
    }

    #[test]
    fn test_length_is_monotonic() {
        let rates = [8000, 22050, 44100, 48000, 96000];
        for &source in &rates {
            for &target in &rates {
                let mut previous = 0;
                for frames in 0..600 {
                    let length = get_input_resampling_length(source, target, frames);
                    assert!(length >= previous);
                    previous = length;
                }
            }
        }
    }

    #[test]
    #[should_panic]
    fn test_zero_target_rate_panics() {
        get_input_resampling_length(48000, 0, 64);
    }

    #[test]
    fn test_upsampling_interpolates_across_blocks() {
        let mut resampler = LinearResampler::new(24000, 48000);
        let output = resample_ramp(&mut resampler, &[3, 5, 1, 7]);
        // one frame of lag, half a source frame per output frame
        let expected: Vec<f32> = (0..16).map(|i| (i as f32 * 0.5 - 1.0).max(0.0)).collect();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_block_size_does_not_change_the_stream() {
        let blocks: [&[usize]; 2] = [&[64; 8], &[7, 100, 13, 256, 1, 135]];
        for (source, target) in [(22050, 48000), (44100, 48000), (96000, 44100), (48000, 22050)] {
            let ratio = source as f32 / target as f32;
            for sizes in blocks {
                let mut resampler = LinearResampler::new(source, target);
                let output = resample_ramp(&mut resampler, sizes);
                assert_eq!(output.len(), 512);
                for (i, &sample) in output.iter().enumerate() {
                    let expected = (i as f32 * ratio - 1.0).max(0.0);
                    assert!((sample - expected).abs() < 1e-2, "{source}->{target} frame {i}");
                }
            }
        }
    }

    #[test]
    fn test_consumes_source_at_the_rate_ratio() {
        let mut resampler = LinearResampler::new(22050, 48000);
        let mut dest = SamplesBuffer::mono(0);
        let mut consumed = 0;
        for _ in 0..3000 {
            let needed = resampler.frames_needed(16);
            resampler.process(&SamplesBuffer::mono(needed), &mut dest, 16);
            consumed += needed;
        }
        assert!((22049..=22051).contains(&consumed));
    }

    #[test]
    fn test_never_needs_more_than_rounded_up_length_plus_two() {
        let mut resampler = LinearResampler::new(44100, 48000);
        for frames in [1, 17, 256, 3, 512] {
            let needed = resampler.frames_needed(frames);
            assert!(needed <= get_input_resampling_length(44100, 48000, frames) + 2);
            resampler.process(&SamplesBuffer::stereo(needed), &mut SamplesBuffer::stereo(0), frames);
        }
    }

    #[test]
    fn test_keeps_channel_layout() {
        let mut resampler = LinearResampler::new(96000, 48000);
        let needed = resampler.frames_needed(5);
        let source = SamplesBuffer::from_channels(vec![vec![1.0; needed], vec![-1.0; needed]]);
        let mut dest = SamplesBuffer::mono(0);
        resampler.process(&source, &mut dest, 5);
        assert_eq!(dest.channels(), 2);
        // the first frame still reads the silent history
        assert_eq!(dest.channel(0)[1..], [1.0; 4]);
        assert_eq!(dest.channel(1)[1..], [-1.0; 4]);
    }
}
