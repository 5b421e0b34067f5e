mod local;
mod test_streamer;

pub use local::{InputControls, InputMode, InputSelection, InputTrackState, LocalInputAudioNode};
pub use test_streamer::{LocalInputTestStreamer, TEST_TONE_GAIN};
