//! Renders a loopback test track offline and prints the meters.
//!
//! `cargo run --example test_tone`

use std::sync::Arc;

use jamgraph::driver::{StaticAudioDriver, StaticMidiDriver};
use jamgraph::processor::shared;
use jamgraph::range::ChannelRange;
use jamgraph::tracks::TrackId;
use jamgraph::{
    AudioGraph, FaderProcessor, InputTracks, LocalInputAudioNode, LocalInputTestStreamer,
    MidiBuffer, SamplesBuffer,
};
use tracing::Level;

const RATE: u32 = 48000;
const BLOCK: usize = 256;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    let audio = StaticAudioDriver::new("Loopback", RATE)
        .with_channel_names(["In 1", "In 2"])
        .with_selected_inputs(ChannelRange::stereo(0));
    let midi_driver = StaticMidiDriver::new().with_device("Virtual Keys", true);

    let mut tracks = InputTracks::new(Arc::new(AudioGraph::new()));
    tracks.sync_with_driver(&audio);

    let tone = TrackId(0);
    let voice = TrackId(1);
    let tone_node = tracks
        .add_input_track_node(tone, LocalInputTestStreamer::new(440.0, 44100))
        .expect("test tone track");
    tracks
        .add_input_track_node(voice, LocalInputAudioNode::new(1))
        .expect("voice track");
    tracks.set_input_track_to_mono(voice, 1).expect("mono selection");

    let fade_in = shared(FaderProcessor::fade_in(RATE as usize / 10));
    let master = tracks.graph().node(tracks.master()).expect("master node");
    master.add_processor(fade_in.clone());

    for track in [tone, voice] {
        let label = tracks
            .describe_input_track(track, &audio, &midi_driver)
            .expect("input label");
        println!("track {:?}: {:?} {}", track, label.kind, label.text);
    }

    let input = SamplesBuffer::from_channels(vec![vec![0.0; BLOCK], vec![0.05; BLOCK]]);
    let mut output = SamplesBuffer::stereo(BLOCK);
    let midi = MidiBuffer::new();

    for block in 0..20 {
        tracks.process(&input, &mut output, RATE, &midi);
        let peak = master.last_peak(true);
        let tone_peak = tracks
            .graph()
            .node(tone_node)
            .map(|node| node.with_last_buffer(|buffer| buffer.peak()))
            .unwrap_or_default();
        println!(
            "block {block:2}: master L {:.3} R {:.3} | tone {:.3} | out {:.3} | fade done: {}",
            peak.left,
            peak.right,
            tone_peak.max(),
            output.peak().max(),
            fade_in.lock().finished(),
        );
    }
}
