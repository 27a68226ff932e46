//! Tempo tracking from detected onsets

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

use crate::meter::bpm_in_range;

const BEAT_WINDOW: Duration = Duration::from_secs(10);
const TEMPO_HISTORY: usize = 5;

/// Smoothed tempo estimate with a 0..=100 confidence score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TempoEstimate {
    pub bpm: u32,
    pub exact_bpm: f64,
    pub confidence: f64,
}

/// Turns onset timestamps into a tempo estimate.
///
/// Onsets from the last ten seconds are kept. Intervals outside
/// `[min_interval, max_interval]` are dropped before averaging, and the last
/// five per-onset estimates are averaged into the reported tempo.
#[derive(Debug, Clone)]
pub struct MicTempoTracker {
    beats: VecDeque<Duration>,
    tempos: VecDeque<f64>,
    min_interval: Duration,
    max_interval: Duration,
}

impl Default for MicTempoTracker {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_millis(2000))
    }
}

impl MicTempoTracker {
    pub fn new(min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            beats: VecDeque::new(),
            tempos: VecDeque::with_capacity(TEMPO_HISTORY),
            min_interval,
            max_interval: max_interval.max(min_interval),
        }
    }

    pub fn set_interval_bounds(&mut self, min_interval: Duration, max_interval: Duration) {
        self.min_interval = min_interval;
        self.max_interval = max_interval.max(min_interval);
    }

    pub fn beat_count(&self) -> usize {
        self.beats.len()
    }

    pub fn reset(&mut self) {
        self.beats.clear();
        self.tempos.clear();
    }

    /// Record an onset. Returns the updated estimate when this onset
    /// produced a usable tempo.
    pub fn record_onset(&mut self, at: Duration) -> Option<TempoEstimate> {
        if self.beats.back().is_some_and(|&last| at < last) {
            self.reset();
        }
        self.beats.push_back(at);
        while self
            .beats
            .front()
            .is_some_and(|&first| at - first > BEAT_WINDOW)
        {
            self.beats.pop_front();
        }

        if self.beats.len() < 2 {
            return None;
        }

        let intervals: Vec<Duration> = self
            .beats
            .iter()
            .zip(self.beats.iter().skip(1))
            .map(|(a, b)| *b - *a)
            .filter(|i| (self.min_interval..=self.max_interval).contains(i))
            .collect();
        if intervals.is_empty() {
            return None;
        }

        let mean_ms = intervals.iter().map(|i| i.as_secs_f64() * 1000.0).sum::<f64>()
            / intervals.len() as f64;
        let bpm = 60_000.0 / mean_ms;
        if !bpm_in_range(bpm) {
            return None;
        }

        self.tempos.push_back(bpm);
        while self.tempos.len() > TEMPO_HISTORY {
            self.tempos.pop_front();
        }

        self.estimate()
    }

    /// Current estimate from the tempo history
    pub fn estimate(&self) -> Option<TempoEstimate> {
        if self.tempos.is_empty() {
            return None;
        }
        let n = self.tempos.len() as f64;
        let mean = self.tempos.iter().sum::<f64>() / n;
        let variance = self.tempos.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;
        let confidence = (100.0 - 2.0 * variance.sqrt()).clamp(0.0, 100.0);

        Some(TempoEstimate {
            bpm: mean.round() as u32,
            exact_bpm: mean,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(tracker: &mut MicTempoTracker, times_ms: &[u64]) -> Option<TempoEstimate> {
        let mut last = None;
        for &t in times_ms {
            last = tracker.record_onset(Duration::from_millis(t)).or(last);
        }
        last
    }

    #[test]
    fn test_steady_onsets_give_120_with_high_confidence() {
        let mut tracker = MicTempoTracker::default();
        // intervals 500, 505, 495, 500
        let estimate = feed(&mut tracker, &[0, 500, 1005, 1500, 2000]).unwrap();
        assert_eq!(estimate.bpm, 120);
        assert!(estimate.confidence > 90.0);
    }

    #[test]
    fn test_all_intervals_filtered_yields_nothing() {
        let mut tracker = MicTempoTracker::default();
        // 100ms apart: faster than the minimum interval
        assert_eq!(feed(&mut tracker, &[0, 100, 200, 300]), None);
        assert_eq!(tracker.estimate(), None);
    }

    #[test]
    fn test_outlier_interval_is_discarded() {
        let mut tracker = MicTempoTracker::default();
        // a 50ms double-trigger between regular 600ms beats
        let estimate = feed(&mut tracker, &[0, 600, 650, 1250]).unwrap();
        // intervals: 600 kept, 50 dropped, 600 kept
        assert_eq!(estimate.bpm, 100);
    }

    #[test]
    fn test_old_onsets_leave_the_window() {
        let mut tracker = MicTempoTracker::default();
        feed(&mut tracker, &[0, 500, 1000]);
        assert_eq!(tracker.beat_count(), 3);
        tracker.record_onset(Duration::from_millis(10_600));
        assert_eq!(tracker.beat_count(), 2);
    }

    #[test]
    fn test_unsteady_tempo_lowers_confidence() {
        let mut steady = MicTempoTracker::default();
        let steady = feed(&mut steady, &[0, 500, 1000, 1500, 2000, 2500]).unwrap();

        let mut shaky = MicTempoTracker::default();
        let shaky = feed(&mut shaky, &[0, 400, 1100, 1400, 2200, 2500]).unwrap();

        assert_eq!(steady.confidence, 100.0);
        assert!(shaky.confidence < steady.confidence);
    }
}
