//! beatkeeper-core: metronome timing and tempo detection

pub mod accent;
pub mod clock;
pub mod config;
pub mod detector;
mod error;
pub mod meter;
pub mod onset;
pub mod pattern;
pub mod scheduler;
mod tap;
mod tracker;

pub use accent::{AccentKind, AccentResolver, Timbre, ToneParams};
pub use clock::{BeatClock, BeatPosition, ClockListener, ClockSnapshot, ListenerId, ToneRenderer};
pub use config::{ClockSettings, DetectionSettings, MetronomeConfig};
pub use detector::{AudioInput, BeatDetector, DetectionListener, DetectorState};
pub use error::{BeatkeeperError, Result};
pub use meter::{clamp_bpm, tempo_marking, Subdivision, TimeSignature, MAX_BPM, MIN_BPM};
pub use onset::{DetectionMode, FrameAnalysis, OnsetDetector, Trigger};
pub use pattern::{PatternEngine, PatternMode, PatternPhase};
pub use scheduler::{ManualScheduler, Scheduler, TimerId};
pub use tap::TapTempo;
pub use tracker::{MicTempoTracker, TempoEstimate};
