//! Tap tempo estimation

use std::collections::VecDeque;
use std::time::Duration;

use crate::meter::bpm_in_range;

const MAX_TAPS: usize = 4;
const IDLE_RESET: Duration = Duration::from_secs(3);

/// Turns user taps into a tempo using the mean of the last few tap gaps
#[derive(Debug, Clone, Default)]
pub struct TapTempo {
    taps: VecDeque<Duration>,
}

impl TapTempo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tap at `at` (time since any fixed origin).
    ///
    /// Returns the estimated BPM once two or more taps are held and the
    /// estimate lies within the playable range. A gap longer than three
    /// seconds starts a new sequence.
    pub fn tap(&mut self, at: Duration) -> Option<u32> {
        if let Some(&last) = self.taps.back() {
            if at < last || at - last > IDLE_RESET {
                self.taps.clear();
            }
        }

        self.taps.push_back(at);
        while self.taps.len() > MAX_TAPS {
            self.taps.pop_front();
        }

        if self.taps.len() < 2 {
            return None;
        }

        let span = *self.taps.back()? - *self.taps.front()?;
        let mean_ms = span.as_secs_f64() * 1000.0 / (self.taps.len() - 1) as f64;
        if mean_ms <= 0.0 {
            return None;
        }

        let bpm = (60_000.0 / mean_ms).round();
        bpm_in_range(bpm).then_some(bpm as u32)
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }
}
