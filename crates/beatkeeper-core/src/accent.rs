//! Tick classification and the tone parameters each class maps to

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BeatkeeperError;

/// Accent category of an audible tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccentKind {
    Emphasized,
    MainBeat,
    Subdivision,
}

/// Sound character of the click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timbre {
    #[default]
    Click,
    Woodblock,
    Beep,
    Cowbell,
}

impl Timbre {
    /// Base frequencies (emphasized, main, subdivision) in Hz
    fn frequencies(&self) -> [f32; 3] {
        match self {
            Self::Click => [1500.0, 1000.0, 800.0],
            Self::Woodblock => [1200.0, 900.0, 700.0],
            Self::Beep => [880.0, 660.0, 440.0],
            Self::Cowbell => [800.0, 560.0, 420.0],
        }
    }

    fn duration(&self) -> Duration {
        match self {
            Self::Click => Duration::from_millis(50),
            Self::Woodblock => Duration::from_millis(80),
            Self::Beep => Duration::from_millis(100),
            Self::Cowbell => Duration::from_millis(150),
        }
    }
}

impl FromStr for Timbre {
    type Err = BeatkeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "click" => Ok(Self::Click),
            "woodblock" | "wood" => Ok(Self::Woodblock),
            "beep" => Ok(Self::Beep),
            "cowbell" => Ok(Self::Cowbell),
            other => Err(BeatkeeperError::UnknownVariant {
                kind: "timbre",
                value: other.to_string(),
            }),
        }
    }
}

/// Everything a tone renderer needs to voice one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToneParams {
    pub accent: AccentKind,
    pub timbre: Timbre,
    pub frequency: f32,
    pub gain: f32,
    pub duration: Duration,
}

/// Maps beat positions to accent classes and tone parameters
#[derive(Debug, Clone)]
pub struct AccentResolver {
    emphasized: BTreeSet<u8>,
    play_subdivisions: bool,
    timbre: Timbre,
    volume: f32,
}

impl Default for AccentResolver {
    fn default() -> Self {
        Self {
            emphasized: BTreeSet::from([1]),
            play_subdivisions: true,
            timbre: Timbre::Click,
            volume: 1.0,
        }
    }
}

impl AccentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emphasized_beats(&self) -> &BTreeSet<u8> {
        &self.emphasized
    }

    pub fn set_emphasized_beats(&mut self, beats: impl IntoIterator<Item = u8>) {
        self.emphasized = beats.into_iter().filter(|&b| b > 0).collect();
    }

    /// Flip emphasis on one beat; returns whether the beat is now emphasized
    pub fn toggle_emphasis(&mut self, beat: u8) -> bool {
        if beat == 0 {
            return false;
        }
        if !self.emphasized.remove(&beat) {
            self.emphasized.insert(beat);
            return true;
        }
        false
    }

    pub fn play_subdivisions(&self) -> bool {
        self.play_subdivisions
    }

    pub fn set_play_subdivisions(&mut self, enabled: bool) {
        self.play_subdivisions = enabled;
    }

    pub fn timbre(&self) -> Timbre {
        self.timbre
    }

    pub fn set_timbre(&mut self, timbre: Timbre) {
        self.timbre = timbre;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Master volume in `0.0..=1.0`. At zero every gain is zero and the
    /// clock skips rendering; above zero the accent gain ordering holds.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 1.0 };
    }

    /// Classify a tick. `None` means the tick stays silent.
    pub fn classify(&self, beat: u8, subdivision: u8) -> Option<AccentKind> {
        if subdivision != 0 {
            return self.play_subdivisions.then_some(AccentKind::Subdivision);
        }
        if self.emphasized.contains(&beat) {
            Some(AccentKind::Emphasized)
        } else {
            Some(AccentKind::MainBeat)
        }
    }

    /// Tone parameters for an accent class with the current timbre and volume
    pub fn tone(&self, accent: AccentKind) -> ToneParams {
        let [high, mid, low] = self.timbre.frequencies();
        let (frequency, gain) = match accent {
            AccentKind::Emphasized => (high, 1.0),
            AccentKind::MainBeat => (mid, 0.7),
            AccentKind::Subdivision => (low, 0.4),
        };
        ToneParams {
            accent,
            timbre: self.timbre,
            frequency,
            gain: gain * self.volume,
            duration: self.timbre.duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_with_two_emphasized_beats() {
        let mut resolver = AccentResolver::new();
        resolver.set_emphasized_beats([1, 3]);

        assert_eq!(resolver.classify(1, 0), Some(AccentKind::Emphasized));
        assert_eq!(resolver.classify(3, 0), Some(AccentKind::Emphasized));
        assert_eq!(resolver.classify(2, 0), Some(AccentKind::MainBeat));
        assert_eq!(resolver.classify(4, 0), Some(AccentKind::MainBeat));
        assert_eq!(resolver.classify(1, 1), Some(AccentKind::Subdivision));
        assert_eq!(resolver.classify(3, 3), Some(AccentKind::Subdivision));

        resolver.set_play_subdivisions(false);
        assert_eq!(resolver.classify(1, 1), None);
        assert_eq!(resolver.classify(1, 0), Some(AccentKind::Emphasized));
    }

    #[test]
    fn test_tone_ordering_holds_for_every_timbre() {
        let mut resolver = AccentResolver::new();
        for timbre in [Timbre::Click, Timbre::Woodblock, Timbre::Beep, Timbre::Cowbell] {
            resolver.set_timbre(timbre);
            let emphasized = resolver.tone(AccentKind::Emphasized);
            let main = resolver.tone(AccentKind::MainBeat);
            let sub = resolver.tone(AccentKind::Subdivision);
            assert!(emphasized.frequency > main.frequency && main.frequency > sub.frequency);
            assert!(emphasized.gain > main.gain && main.gain > sub.gain);
        }
    }

    #[test]
    fn test_toggle_emphasis() {
        let mut resolver = AccentResolver::new();
        assert!(resolver.toggle_emphasis(2));
        assert!(!resolver.toggle_emphasis(1));
        assert_eq!(resolver.emphasized_beats().iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_volume_scales_gain() {
        let mut resolver = AccentResolver::new();
        resolver.set_volume(0.5);
        assert_eq!(resolver.tone(AccentKind::Emphasized).gain, 0.5);
        resolver.set_volume(3.0);
        assert_eq!(resolver.volume(), 1.0);
    }
}
