//! Serializable settings for the clock and the beat detector

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::accent::Timbre;
use crate::meter::{Subdivision, TimeSignature, DEFAULT_BPM};
use crate::onset::DetectionMode;
use crate::pattern::PatternMode;

/// Read a string-named setting, keeping the field default when the name is
/// not recognized so one bad value does not discard the rest of the file
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
    T::Err: Display,
{
    let text = String::deserialize(deserializer)?;
    Ok(text.parse().unwrap_or_else(|e| {
        warn!(value = %text, error = %e, "Rejected configuration value, using default");
        T::default()
    }))
}

/// Everything the clock remembers between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSettings {
    pub tempo: i32,
    #[serde(deserialize_with = "or_default")]
    pub time_signature: TimeSignature,
    #[serde(deserialize_with = "or_default")]
    pub subdivision: Subdivision,
    pub emphasized_beats: Vec<u8>,
    pub play_subdivisions: bool,
    pub mute_pattern_enabled: bool,
    #[serde(deserialize_with = "or_default")]
    pub pattern_mode: PatternMode,
    pub active_bars: i32,
    pub silent_bars: i32,
    #[serde(deserialize_with = "or_default")]
    pub timbre: Timbre,
    pub volume: f32,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_BPM as i32,
            time_signature: TimeSignature::default(),
            subdivision: Subdivision::default(),
            emphasized_beats: vec![1],
            play_subdivisions: true,
            mute_pattern_enabled: false,
            pattern_mode: PatternMode::None,
            active_bars: 4,
            silent_bars: 4,
            timbre: Timbre::default(),
            volume: 0.8,
        }
    }
}

/// Microphone tempo detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    #[serde(deserialize_with = "or_default")]
    pub mode: DetectionMode,
    /// 0..=100; higher triggers more easily
    pub sensitivity: f32,
    pub min_beat_interval_ms: u64,
    pub max_beat_interval_ms: u64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            mode: DetectionMode::default(),
            sensitivity: 50.0,
            min_beat_interval_ms: 200,
            max_beat_interval_ms: 2000,
        }
    }
}

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub metronome: ClockSettings,
    pub detection: DetectionSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_names_fall_back_per_field() {
        let config: MetronomeConfig = toml::from_str(
            r#"
            [metronome]
            tempo = 96
            time_signature = "four"
            subdivision = "triplet"
            pattern_mode = "pattern"
            timbre = "gong"
            active_bars = 2

            [detection]
            mode = "vocals"
            sensitivity = 70.0
            "#,
        )
        .unwrap();

        assert_eq!(config.metronome.tempo, 96);
        assert_eq!(config.metronome.time_signature, TimeSignature::default());
        assert_eq!(config.metronome.subdivision, Subdivision::Quarter);
        assert_eq!(config.metronome.pattern_mode, PatternMode::Pattern);
        assert_eq!(config.metronome.timbre, Timbre::Click);
        assert_eq!(config.metronome.active_bars, 2);
        assert_eq!(config.detection.mode, DetectionMode::Mixed);
        assert_eq!(config.detection.sensitivity, 70.0);
    }

    #[test]
    fn test_settings_survive_toml() {
        let mut config = MetronomeConfig::default();
        config.metronome.time_signature = TimeSignature::new(7, 8);
        config.metronome.subdivision = Subdivision::Sixteenth;
        config.metronome.timbre = Timbre::Cowbell;
        config.detection.mode = DetectionMode::Drums;

        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("time_signature = \"7/8\""));
        assert_eq!(toml::from_str::<MetronomeConfig>(&text).unwrap(), config);
    }
}
