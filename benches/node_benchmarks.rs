use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jamgraph::range::ChannelRange;
use jamgraph::{
    get_input_resampling_length, AudioGraph, InputSelection, LinearResampler, LocalInputAudioNode,
    MidiBuffer, Mixer, OscillatorAudioNode, SamplesBuffer,
};

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("process_replacing 8 inputs", |b| {
        let graph = AudioGraph::new();
        let master = graph.add(Mixer::new());
        for channel in 0..8 {
            let input = LocalInputAudioNode::new(channel)
                .with_selection(InputSelection::Audio(ChannelRange::new(channel, 1)));
            let id = graph.add(input);
            graph.connect(master, id);
        }
        let input = SamplesBuffer::from_channels(vec![vec![0.1; 256]; 8]);
        let mut output = SamplesBuffer::stereo(256);
        let midi = MidiBuffer::new();

        b.iter(|| graph.process_replacing(master, black_box(&input), &mut output, 48000, &midi))
    });

    c.bench_function("process_replacing resampled oscillator", |b| {
        let graph = AudioGraph::new();
        let master = graph.add(Mixer::new());
        let tone = graph.add(OscillatorAudioNode::new(440.0, 44100));
        graph.connect(master, tone);
        let input = SamplesBuffer::stereo(256);
        let mut output = SamplesBuffer::stereo(256);
        let midi = MidiBuffer::new();

        b.iter(|| graph.process_replacing(master, &input, &mut output, 48000, &midi))
    });

    c.bench_function("linear resampler 44100 -> 48000", |b| {
        let mut resampler = LinearResampler::new(44100, 48000);
        let source = SamplesBuffer::from_channels(vec![vec![0.25; 300]; 2]);
        let mut dest = SamplesBuffer::stereo(256);

        b.iter(|| resampler.process(black_box(&source), &mut dest, 256))
    });

    c.bench_function("get_input_resampling_length", |b| {
        b.iter(|| get_input_resampling_length(black_box(44100), black_box(48000), black_box(512)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
