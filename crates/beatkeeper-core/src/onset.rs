//! Onset detection over magnitude spectra

use std::collections::VecDeque;
use std::ops::Range;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BeatkeeperError;

/// Sum of positive bin rises is averaged over the bins and scaled by this
const ONSET_SCALE: f32 = 2.0;
/// Secondary thresholds are this fraction of the primary ones
const SECONDARY_FACTOR: f32 = 0.6;
/// Volume over recent average needed to count as evidence
const VOLUME_RATIO_THRESHOLD: f32 = 1.5;
/// Frames of volume history for the ratio (~0.5s at 60 fps)
const VOLUME_HISTORY: usize = 30;
const VOLUME_FLOOR: f32 = 0.02;

/// Instrument focus of the detector: selects the frequency band and how
/// readily each heuristic fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    Bass,
    Drums,
    Guitar,
    #[default]
    Mixed,
}

/// Per-mode multipliers on the sensitivity-derived base threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeThresholds {
    pub volume: f32,
    pub band: f32,
    pub onset: f32,
}

impl DetectionMode {
    /// Frequency band in Hz
    pub fn band_hz(&self) -> (f32, f32) {
        match self {
            Self::Bass => (40.0, 250.0),
            Self::Drums => (50.0, 3000.0),
            Self::Guitar => (80.0, 1200.0),
            Self::Mixed => (20.0, 8000.0),
        }
    }

    pub fn multipliers(&self) -> ModeThresholds {
        match self {
            Self::Bass => ModeThresholds { volume: 0.35, band: 0.3, onset: 0.2 },
            Self::Drums => ModeThresholds { volume: 0.9, band: 0.8, onset: 0.5 },
            Self::Guitar => ModeThresholds { volume: 0.4, band: 0.35, onset: 0.22 },
            Self::Mixed => ModeThresholds { volume: 0.6, band: 0.55, onset: 0.35 },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bass => "bass",
            Self::Drums => "drums",
            Self::Guitar => "guitar",
            Self::Mixed => "mixed",
        }
    }
}

impl FromStr for DetectionMode {
    type Err = BeatkeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bass" => Ok(Self::Bass),
            "drums" => Ok(Self::Drums),
            "guitar" => Ok(Self::Guitar),
            "mixed" => Ok(Self::Mixed),
            other => Err(BeatkeeperError::UnknownVariant {
                kind: "detection mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Map user sensitivity (0..=100) to the base threshold: 0.9 at 0, 0.1 at 100
pub fn base_threshold(sensitivity: f32) -> f32 {
    let s = if sensitivity.is_finite() { sensitivity.clamp(0.0, 100.0) } else { 50.0 };
    0.9 - (s / 100.0) * 0.8
}

/// Which rule produced a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Volume,
    Band,
    Onset,
    Combined,
}

/// Measurements of one analysis frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameAnalysis {
    pub volume: f32,
    pub band_volume: f32,
    pub onset_strength: f32,
    pub volume_ratio: f32,
    /// Set when this frame counts as an onset (after debouncing)
    pub trigger: Option<Trigger>,
}

impl FrameAnalysis {
    pub fn is_onset(&self) -> bool {
        self.trigger.is_some()
    }
}

/// Streaming onset detector. Feed one magnitude spectrum (bins in 0..=1)
/// per frame.
#[derive(Debug, Clone)]
pub struct OnsetDetector {
    mode: DetectionMode,
    sensitivity: f32,
    bin_hz: f32,
    min_interval: Duration,
    previous: Vec<f32>,
    recent_volumes: VecDeque<f32>,
    last_onset: Option<Duration>,
}

impl OnsetDetector {
    /// `bin_hz` is the width of one spectrum bin (sample rate / FFT size)
    pub fn new(bin_hz: f32) -> Self {
        Self {
            mode: DetectionMode::default(),
            sensitivity: 50.0,
            bin_hz: bin_hz.max(f32::EPSILON),
            min_interval: Duration::from_millis(200),
            previous: Vec::new(),
            recent_volumes: VecDeque::with_capacity(VOLUME_HISTORY),
            last_onset: None,
        }
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DetectionMode) {
        self.mode = mode;
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = if sensitivity.is_finite() { sensitivity.clamp(0.0, 100.0) } else { 50.0 };
    }

    pub fn set_bin_hz(&mut self, bin_hz: f32) {
        self.bin_hz = bin_hz.max(f32::EPSILON);
        self.previous.clear();
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn set_min_interval(&mut self, interval: Duration) {
        self.min_interval = interval;
    }

    pub fn reset(&mut self) {
        self.previous.clear();
        self.recent_volumes.clear();
        self.last_onset = None;
    }

    /// Primary thresholds (volume, band, onset) for the current mode and sensitivity
    pub fn thresholds(&self) -> ModeThresholds {
        let base = base_threshold(self.sensitivity);
        let m = self.mode.multipliers();
        ModeThresholds {
            volume: base * m.volume,
            band: base * m.band,
            onset: base * m.onset,
        }
    }

    fn band_range(&self, bins: usize) -> Range<usize> {
        let (lo, hi) = self.mode.band_hz();
        let start = ((lo / self.bin_hz).ceil() as usize).min(bins);
        let end = ((hi / self.bin_hz).floor() as usize + 1).min(bins);
        start..end.max(start)
    }

    /// Analyze one frame captured at `at`
    pub fn analyze(&mut self, spectrum: &[f32], at: Duration) -> FrameAnalysis {
        let bins = spectrum.len();
        if bins == 0 {
            return FrameAnalysis {
                volume: 0.0,
                band_volume: 0.0,
                onset_strength: 0.0,
                volume_ratio: 0.0,
                trigger: None,
            };
        }

        let volume = spectrum.iter().sum::<f32>() / bins as f32;

        let band = &spectrum[self.band_range(bins)];
        let band_volume = if band.is_empty() {
            0.0
        } else {
            band.iter().sum::<f32>() / band.len() as f32
        };

        if self.previous.len() != bins {
            self.previous = vec![0.0; bins];
        }
        let rise: f32 = spectrum
            .iter()
            .zip(&self.previous)
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();
        let onset_strength = rise / bins as f32 * ONSET_SCALE;
        self.previous.copy_from_slice(spectrum);

        let recent_avg = if self.recent_volumes.is_empty() {
            0.0
        } else {
            self.recent_volumes.iter().sum::<f32>() / self.recent_volumes.len() as f32
        };
        let volume_ratio = volume / recent_avg.max(VOLUME_FLOOR);
        self.recent_volumes.push_back(volume);
        while self.recent_volumes.len() > VOLUME_HISTORY {
            self.recent_volumes.pop_front();
        }

        let t = self.thresholds();
        let raw_trigger = if volume > t.volume {
            Some(Trigger::Volume)
        } else if band_volume > t.band {
            Some(Trigger::Band)
        } else if onset_strength > t.onset {
            Some(Trigger::Onset)
        } else {
            let evidence = [
                volume > t.volume * SECONDARY_FACTOR,
                band_volume > t.band * SECONDARY_FACTOR,
                onset_strength > t.onset * SECONDARY_FACTOR,
                volume_ratio > VOLUME_RATIO_THRESHOLD,
            ];
            (evidence.iter().filter(|&&e| e).count() >= 2).then_some(Trigger::Combined)
        };

        let debounced = self
            .last_onset
            .is_some_and(|last| at.saturating_sub(last) < self.min_interval);
        let trigger = raw_trigger.filter(|_| !debounced);
        if trigger.is_some() {
            self.last_onset = Some(at);
        }

        FrameAnalysis {
            volume,
            band_volume,
            onset_strength,
            volume_ratio,
            trigger,
        }
    }
}
