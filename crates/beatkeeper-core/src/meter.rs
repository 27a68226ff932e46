//! Tempo, time signature and subdivision types

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BeatkeeperError;

pub const MIN_BPM: u32 = 30;
pub const MAX_BPM: u32 = 300;
pub const DEFAULT_BPM: u32 = 120;

pub const MAX_BEATS_PER_BAR: u8 = 12;

/// Clamp any tempo request into the playable range
pub fn clamp_bpm(bpm: i32) -> u32 {
    bpm.clamp(MIN_BPM as i32, MAX_BPM as i32) as u32
}

/// Whether a tempo estimate is usable as-is
pub fn bpm_in_range(bpm: f64) -> bool {
    (MIN_BPM as f64..=MAX_BPM as f64).contains(&bpm)
}

/// Italian tempo marking for display
pub fn tempo_marking(bpm: u32) -> &'static str {
    match bpm {
        0..=39 => "Grave",
        40..=59 => "Largo",
        60..=65 => "Larghetto",
        66..=75 => "Adagio",
        76..=107 => "Andante",
        108..=119 => "Moderato",
        120..=155 => "Allegro",
        156..=175 => "Vivace",
        176..=199 => "Presto",
        _ => "Prestissimo",
    }
}

/// Time signature. Only the numerator affects timing; the denominator is
/// carried for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSignature {
    numerator: u8,
    denominator: u8,
}

impl TimeSignature {
    pub const FOUR_FOUR: TimeSignature = TimeSignature { numerator: 4, denominator: 4 };

    /// Build a time signature, clamping the numerator to 1..=12.
    /// A zero denominator falls back to 4; other values are accepted as-is.
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator: numerator.clamp(1, MAX_BEATS_PER_BAR),
            denominator: if denominator == 0 { 4 } else { denominator },
        }
    }

    pub fn beats_per_bar(&self) -> u8 {
        self.numerator
    }

    pub fn denominator(&self) -> u8 {
        self.denominator
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::FOUR_FOUR
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for TimeSignature {
    type Err = BeatkeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BeatkeeperError::InvalidTimeSignature(s.to_string());
        let (num, denom) = s.trim().split_once('/').ok_or_else(invalid)?;
        let num: u32 = num.trim().parse().map_err(|_| invalid())?;
        let denom: u32 = denom.trim().parse().map_err(|_| invalid())?;
        Ok(Self::new(
            num.min(u8::MAX as u32) as u8,
            denom.min(u8::MAX as u32) as u8,
        ))
    }
}

impl TryFrom<String> for TimeSignature {
    type Error = BeatkeeperError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeSignature> for String {
    fn from(sig: TimeSignature) -> Self {
        sig.to_string()
    }
}

/// Subdivision granularity of the click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subdivision {
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
}

impl Subdivision {
    pub fn per_beat(&self) -> u8 {
        match self {
            Self::Quarter => 1,
            Self::Eighth => 2,
            Self::Sixteenth => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Quarter => "quarter",
            Self::Eighth => "eighth",
            Self::Sixteenth => "sixteenth",
        }
    }
}

impl FromStr for Subdivision {
    type Err = BeatkeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quarter" | "1" => Ok(Self::Quarter),
            "eighth" | "2" => Ok(Self::Eighth),
            "sixteenth" | "4" => Ok(Self::Sixteenth),
            other => Err(BeatkeeperError::UnknownVariant {
                kind: "subdivision",
                value: other.to_string(),
            }),
        }
    }
}

/// Time between two ticks: one beat divided by the subdivision count
pub fn tick_interval(bpm: u32, subdivision: Subdivision) -> Duration {
    let beat_secs = 60.0 / bpm.max(1) as f64;
    Duration::from_secs_f64(beat_secs / subdivision.per_beat() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_bpm() {
        assert_eq!(clamp_bpm(-5), 30);
        assert_eq!(clamp_bpm(29), 30);
        assert_eq!(clamp_bpm(30), 30);
        assert_eq!(clamp_bpm(144), 144);
        assert_eq!(clamp_bpm(300), 300);
        assert_eq!(clamp_bpm(1000), 300);
    }

    #[test]
    fn test_parse_time_signature() {
        let sig: TimeSignature = "3/4".parse().unwrap();
        assert_eq!(sig.beats_per_bar(), 3);
        assert_eq!(sig.denominator(), 4);

        // Unusual denominators are cosmetic and accepted
        let odd: TimeSignature = "5/7".parse().unwrap();
        assert_eq!(odd.to_string(), "5/7");

        // Numerator is clamped into the supported range
        assert_eq!("16/8".parse::<TimeSignature>().unwrap().beats_per_bar(), 12);
        assert_eq!("0/4".parse::<TimeSignature>().unwrap().beats_per_bar(), 1);

        assert!("four/four".parse::<TimeSignature>().is_err());
        assert!("4".parse::<TimeSignature>().is_err());
    }

    #[test]
    fn test_tick_interval() {
        assert_eq!(tick_interval(120, Subdivision::Quarter), Duration::from_millis(500));
        assert_eq!(tick_interval(120, Subdivision::Eighth), Duration::from_millis(250));
        assert_eq!(tick_interval(60, Subdivision::Sixteenth), Duration::from_millis(250));
    }

    #[test]
    fn test_tempo_marking() {
        assert_eq!(tempo_marking(50), "Largo");
        assert_eq!(tempo_marking(120), "Allegro");
        assert_eq!(tempo_marking(240), "Prestissimo");
    }
}
