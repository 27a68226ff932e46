//! beatkeeper-services: audio devices, synthesis, spectrum analysis and timers

pub mod click_synth;
pub mod mic;
pub mod output;
pub mod renderer;
pub mod spectrum;
pub mod timer;

pub use click_synth::ClickSynth;
pub use mic::{list_devices, InputDevice, MicError, MicInput};
pub use output::{AudioOutputError, OutputStream};
pub use renderer::{OfflineRenderer, SynthRenderer};
pub use spectrum::SpectrumAnalyzer;
pub use timer::{ThreadScheduler, TimerEvent};
