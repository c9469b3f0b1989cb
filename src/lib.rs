mod audio_device;
pub mod config;
pub mod envelope;
mod error;
pub mod event;
mod filters;
pub mod midi;
pub mod oscillator;
pub mod recording;
mod server;
pub mod synthesizer;
pub mod voice;

/// Output sample format: signed 16-bit, interleaved.
pub type Sample = i16;

/// Output is always stereo; both channels carry the same mono mix.
pub const NUM_CHANNELS: usize = 2;

pub use audio_device::AudioOutputDeviceStream;
pub use config::{EngineConfig, EnvelopeRate};
pub use envelope::AdsrParams;
pub use error::EngineError;
pub use event::{EventSender, SynthEvent};
pub use midi::{list_midi_input_ports, MidiFile, MidiInputDeviceStream};
pub use recording::WavRecorder;
pub use server::VesperServer;
pub use synthesizer::Synthesizer;
