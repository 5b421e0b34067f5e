mod fader;
mod mixer;

pub use fader::FaderProcessor;
pub use mixer::Mixer;
