//! Audio and MIDI driver boundaries.
//!
//! The graph never talks to hardware. Whoever owns the device callbacks
//! describes the devices through [`AudioDriver`] and [`MidiDriver`], hands
//! input buffers to [`AudioGraph::process_replacing`](crate::AudioGraph::process_replacing)
//! and feeds MIDI through a [`midi_queue`](crate::midi::midi_queue).
//!
//! [`StaticAudioDriver`] and [`StaticMidiDriver`] are fixed descriptions for
//! tests and offline rendering. With the `cpal_input` feature,
//! [`CpalInputDevice`] describes a real input device; with `midir_input`,
//! [`MidirDriver`] lists MIDI inputs and captures from them.
//!
//! # Example: Name an input selection
//!
//! ```
//! use jamgraph::driver::{StaticAudioDriver, StaticMidiDriver};
//! use jamgraph::range::ChannelRange;
//! use jamgraph::tracks::describe_input;
//! use jamgraph::InputTrackState;
//!
//! let audio = StaticAudioDriver::new("Scarlett 2i2", 48000)
//!     .with_channel_names(["Input 1", "Input 2"])
//!     .with_selected_inputs(ChannelRange::stereo(0));
//! let midi = StaticMidiDriver::new();
//!
//! let mut input = InputTrackState::new(0);
//! input.set_audio_input_selection(0, 2);
//! assert_eq!(describe_input(&input, &audio, &midi).text, "(1+2) Input");
//! ```

use crate::range::ChannelRange;

/// What the graph needs to know about the audio device.
pub trait AudioDriver {
    /// Device channels the user enabled globally. Input buffers handed to the
    /// graph contain exactly these channels, in order.
    fn selected_inputs(&self) -> ChannelRange;

    fn input_device_name(&self) -> &str;

    /// Name of device channel `index`, if the device reports one.
    fn input_channel_name(&self, index: usize) -> Option<&str>;

    fn input_device_index(&self) -> usize;

    fn sample_rate(&self) -> u32;
}

/// What the graph needs to know about MIDI input devices.
pub trait MidiDriver {
    fn max_input_devices(&self) -> usize;

    fn device_is_globally_enabled(&self, index: usize) -> bool;

    fn input_device_name(&self, index: usize) -> Option<&str>;
}

/// A fixed audio device description.
#[derive(Clone, Debug)]
pub struct StaticAudioDriver {
    device_name: String,
    device_index: usize,
    channel_names: Vec<String>,
    selected: ChannelRange,
    sample_rate: u32,
}

impl StaticAudioDriver {
    pub fn new(device_name: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            device_name: device_name.into(),
            device_index: 0,
            channel_names: Vec::new(),
            selected: ChannelRange::empty(),
            sample_rate,
        }
    }

    /// Channel names, in device channel order. Also selects every named
    /// channel unless [`with_selected_inputs`](Self::with_selected_inputs) follows.
    pub fn with_channel_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.channel_names = names.into_iter().map(Into::into).collect();
        self.selected = ChannelRange::new(0, self.channel_names.len());
        self
    }

    pub fn with_selected_inputs(mut self, selected: ChannelRange) -> Self {
        self.selected = selected;
        self
    }

    pub fn with_device_index(mut self, index: usize) -> Self {
        self.device_index = index;
        self
    }
}

impl AudioDriver for StaticAudioDriver {
    fn selected_inputs(&self) -> ChannelRange {
        self.selected
    }

    fn input_device_name(&self) -> &str {
        &self.device_name
    }

    fn input_channel_name(&self, index: usize) -> Option<&str> {
        self.channel_names.get(index).map(String::as_str)
    }

    fn input_device_index(&self) -> usize {
        self.device_index
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// A fixed list of MIDI input devices and their global enable flags.
#[derive(Clone, Debug, Default)]
pub struct StaticMidiDriver {
    devices: Vec<(String, bool)>,
}

impl StaticMidiDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.devices.push((name.into(), enabled));
        self
    }

    pub fn set_device_enabled(&mut self, index: usize, enabled: bool) {
        if let Some(device) = self.devices.get_mut(index) {
            device.1 = enabled;
        }
    }
}

impl MidiDriver for StaticMidiDriver {
    fn max_input_devices(&self) -> usize {
        self.devices.len()
    }

    fn device_is_globally_enabled(&self, index: usize) -> bool {
        self.devices.get(index).map_or(false, |d| d.1)
    }

    fn input_device_name(&self, index: usize) -> Option<&str> {
        self.devices.get(index).map(|d| d.0.as_str())
    }
}

#[cfg(feature = "cpal_input")]
pub use self::cpal_input::CpalInputDevice;

#[cfg(feature = "cpal_input")]
mod cpal_input {
    use cpal::traits::{DeviceTrait, HostTrait};

    use super::AudioDriver;
    use crate::range::ChannelRange;

    /// A discovered audio input device.
    ///
    /// Use [`CpalInputDevice::default_input`] for the system default or
    /// [`CpalInputDevice::list_inputs`] to enumerate every input. cpal doesn't
    /// report channel names, so labels fall back to the device name.
    pub struct CpalInputDevice {
        device: cpal::Device,
        config: cpal::SupportedStreamConfig,
        name: String,
        index: usize,
        selected: ChannelRange,
    }

    impl CpalInputDevice {
        /// Returns `None` if no input device is available.
        pub fn default_input() -> Option<Self> {
            let host = cpal::default_host();
            let device = host.default_input_device()?;
            let default_name = device.name().ok();
            let index = host
                .input_devices()
                .ok()
                .and_then(|mut devices| {
                    devices.position(|d| d.name().ok() == default_name)
                })
                .unwrap_or(0);
            Self::from_device(device, index)
        }

        /// Every input device with a usable default configuration.
        pub fn list_inputs() -> Vec<Self> {
            let host = cpal::default_host();
            host.input_devices()
                .map(|devices| {
                    devices
                        .enumerate()
                        .filter_map(|(index, device)| Self::from_device(device, index))
                        .collect()
                })
                .unwrap_or_default()
        }

        fn from_device(device: cpal::Device, index: usize) -> Option<Self> {
            let config = device.default_input_config().ok()?;
            let name = device.name().unwrap_or_else(|_| "Unknown".into());
            tracing::debug!(%name, index, rate = config.sample_rate().0, channels = config.channels(), "found input device");
            Some(Self {
                selected: ChannelRange::new(0, config.channels() as usize),
                device,
                config,
                name,
                index,
            })
        }

        /// Restrict the globally enabled inputs (all channels by default).
        pub fn with_selected_inputs(mut self, selected: ChannelRange) -> Self {
            self.selected = selected;
            self
        }

        pub fn channels(&self) -> u16 {
            self.config.channels()
        }

        /// The cpal device and its default configuration, for building the
        /// capture stream.
        pub fn device(&self) -> (&cpal::Device, &cpal::SupportedStreamConfig) {
            (&self.device, &self.config)
        }
    }

    impl AudioDriver for CpalInputDevice {
        fn selected_inputs(&self) -> ChannelRange {
            self.selected
        }

        fn input_device_name(&self) -> &str {
            &self.name
        }

        fn input_channel_name(&self, _index: usize) -> Option<&str> {
            None
        }

        fn input_device_index(&self) -> usize {
            self.index
        }

        fn sample_rate(&self) -> u32 {
            self.config.sample_rate().0
        }
    }
}

#[cfg(feature = "midir_input")]
pub use self::midir_input::MidirDriver;

#[cfg(feature = "midir_input")]
mod midir_input {
    use std::sync::Arc;

    use midir::{Ignore, MidiInput, MidiInputConnection};
    use parking_lot::Mutex;

    use super::MidiDriver;
    use crate::error::DriverError;
    use crate::midi::{MidiMessage, MidiSender};

    /// MIDI inputs discovered through `midir`.
    ///
    /// Devices start disabled. [`start`](Self::start) opens every enabled
    /// device and pushes its messages, tagged with the device index, into a
    /// MIDI queue read by the audio callback.
    pub struct MidirDriver {
        client_name: String,
        names: Vec<String>,
        enabled: Vec<bool>,
        connections: Vec<MidiInputConnection<()>>,
    }

    impl MidirDriver {
        pub fn new(client_name: &str) -> Result<Self, DriverError> {
            let input = MidiInput::new(client_name).map_err(|e| DriverError::Midi(e.to_string()))?;
            let names: Vec<String> = input
                .ports()
                .iter()
                .map(|port| input.port_name(port).unwrap_or_else(|_| "Unknown".into()))
                .collect();
            tracing::debug!(devices = names.len(), "MIDI inputs listed");
            Ok(Self {
                client_name: client_name.into(),
                enabled: vec![false; names.len()],
                names,
                connections: Vec::new(),
            })
        }

        pub fn set_device_enabled(&mut self, index: usize, enabled: bool) -> Result<(), DriverError> {
            let flag = self
                .enabled
                .get_mut(index)
                .ok_or(DriverError::UnknownMidiDevice(index))?;
            *flag = enabled;
            Ok(())
        }

        /// Open every enabled device. Replaces any previous capture.
        /// Returns the number of devices opened.
        pub fn start(&mut self, sender: MidiSender) -> Result<usize, DriverError> {
            self.stop();
            let sender = Arc::new(Mutex::new(sender));

            for device in (0..self.names.len()).filter(|&d| self.enabled[d]) {
                let mut input =
                    MidiInput::new(&self.client_name).map_err(|e| DriverError::Midi(e.to_string()))?;
                input.ignore(Ignore::Sysex | Ignore::Time);
                let ports = input.ports();
                let port = ports
                    .get(device)
                    .ok_or(DriverError::UnknownMidiDevice(device))?;

                let sender = Arc::clone(&sender);
                let connection = input
                    .connect(
                        port,
                        "jamgraph-input",
                        move |_timestamp, bytes, _| {
                            if let Some(message) = MidiMessage::from_bytes(bytes, device) {
                                if sender.lock().send(message).is_err() {
                                    tracing::trace!(device, "MIDI queue full, message dropped");
                                }
                            }
                        },
                        (),
                    )
                    .map_err(|e| DriverError::Midi(e.to_string()))?;
                self.connections.push(connection);
                tracing::info!(device, name = %self.names[device], "MIDI input opened");
            }
            Ok(self.connections.len())
        }

        /// Close every open device.
        pub fn stop(&mut self) {
            for connection in self.connections.drain(..) {
                connection.close();
            }
        }
    }

    impl MidiDriver for MidirDriver {
        fn max_input_devices(&self) -> usize {
            self.names.len()
        }

        fn device_is_globally_enabled(&self, index: usize) -> bool {
            self.enabled.get(index).copied().unwrap_or(false)
        }

        fn input_device_name(&self, index: usize) -> Option<&str> {
            self.names.get(index).map(String::as_str)
        }
    }

    impl Drop for MidirDriver {
        fn drop(&mut self) {
            self.stop();
        }
    }
}
