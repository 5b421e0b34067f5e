mod oscillator;

pub use oscillator::OscillatorAudioNode;
