//! Bar muting: simple alternating mute and active/silent bar cycles

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BeatkeeperError;

/// Which bar-count pattern is in effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternMode {
    #[default]
    None,
    Pattern,
}

impl FromStr for PatternMode {
    type Err = BeatkeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "pattern" | "on" => Ok(Self::Pattern),
            other => Err(BeatkeeperError::UnknownVariant {
                kind: "pattern mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Phase of the active/silent bar cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternPhase {
    Active,
    Silent,
}

/// Decides per bar whether the click is audible.
///
/// Two strategies run side by side; a bar is silent when either one mutes it:
/// - simple mute: every second bar is muted (bar 1 audible, bar 2 muted)
/// - pattern: `active_bars` audible bars followed by `silent_bars` muted bars
#[derive(Debug, Clone)]
pub struct PatternEngine {
    mute_enabled: bool,
    mode: PatternMode,
    active_bars: u32,
    silent_bars: u32,
    current_bar: u8,
    bar_muted: bool,
    phase: PatternPhase,
    bars_remaining: u32,
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternEngine {
    pub fn new() -> Self {
        Self {
            mute_enabled: false,
            mode: PatternMode::None,
            active_bars: 4,
            silent_bars: 4,
            current_bar: 1,
            bar_muted: false,
            phase: PatternPhase::Active,
            bars_remaining: 4,
        }
    }

    pub fn mute_enabled(&self) -> bool {
        self.mute_enabled
    }

    pub fn set_mute_enabled(&mut self, enabled: bool) {
        self.mute_enabled = enabled;
        self.reset();
    }

    pub fn mode(&self) -> PatternMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PatternMode) {
        self.mode = mode;
        self.reset();
    }

    pub fn active_bars(&self) -> u32 {
        self.active_bars
    }

    pub fn silent_bars(&self) -> u32 {
        self.silent_bars
    }

    /// Set the bar counts of the cycle. Non-positive counts are clamped to 1
    /// so neither phase can last forever.
    pub fn set_bars(&mut self, active_bars: i32, silent_bars: i32) {
        self.active_bars = active_bars.max(1) as u32;
        self.silent_bars = silent_bars.max(1) as u32;
        self.reset();
    }

    pub fn phase(&self) -> PatternPhase {
        self.phase
    }

    pub fn bars_remaining(&self) -> u32 {
        self.bars_remaining
    }

    /// Back to the first bar of both strategies
    pub fn reset(&mut self) {
        self.current_bar = 1;
        self.bar_muted = false;
        self.phase = PatternPhase::Active;
        self.bars_remaining = self.active_bars;
    }

    /// Advance both strategies past a bar line
    pub fn end_of_bar(&mut self) {
        self.current_bar = if self.current_bar >= 2 { 1 } else { self.current_bar + 1 };
        self.bar_muted = self.current_bar == 2;

        self.bars_remaining = self.bars_remaining.saturating_sub(1);
        if self.bars_remaining == 0 {
            self.phase = match self.phase {
                PatternPhase::Active => PatternPhase::Silent,
                PatternPhase::Silent => PatternPhase::Active,
            };
            self.bars_remaining = match self.phase {
                PatternPhase::Active => self.active_bars,
                PatternPhase::Silent => self.silent_bars,
            };
        }
    }

    /// Muted by the alternating-bar strategy (ignores whether it is enabled)
    pub fn is_bar_muted(&self) -> bool {
        self.bar_muted
    }

    /// Muted by the bar-count cycle (ignores whether it is enabled)
    pub fn is_silent(&self) -> bool {
        self.phase == PatternPhase::Silent
    }

    /// Effective silence of the current bar
    pub fn is_muted(&self) -> bool {
        let simple = self.mute_enabled && self.bar_muted;
        let pattern = self.mode == PatternMode::Pattern && self.is_silent();
        simple || pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar_sequence(engine: &mut PatternEngine, bars: usize) -> Vec<bool> {
        let mut muted = Vec::with_capacity(bars);
        for bar in 0..bars {
            if bar > 0 {
                engine.end_of_bar();
            }
            muted.push(engine.is_muted());
        }
        muted
    }

    #[test]
    fn test_simple_mute_alternates() {
        let mut engine = PatternEngine::new();
        engine.set_mute_enabled(true);
        assert_eq!(bar_sequence(&mut engine, 6), vec![false, true, false, true, false, true]);
    }

    #[test]
    fn test_pattern_two_active_one_silent() {
        let mut engine = PatternEngine::new();
        engine.set_mode(PatternMode::Pattern);
        engine.set_bars(2, 1);
        assert_eq!(
            bar_sequence(&mut engine, 9),
            vec![false, false, true, false, false, true, false, false, true]
        );
    }

    #[test]
    fn test_disabled_strategies_never_mute() {
        let mut engine = PatternEngine::new();
        engine.set_bars(1, 1);
        assert!(bar_sequence(&mut engine, 8).iter().all(|m| !m));
    }

    #[test]
    fn test_both_strategies_combine_with_or() {
        let mut engine = PatternEngine::new();
        engine.set_mute_enabled(true);
        engine.set_mode(PatternMode::Pattern);
        engine.set_bars(3, 3);
        // simple: A M A M A M; pattern: A A A S S S
        assert_eq!(bar_sequence(&mut engine, 6), vec![false, true, false, true, true, true]);
    }

    #[test]
    fn test_non_positive_bar_counts_clamp_to_one() {
        let mut engine = PatternEngine::new();
        engine.set_mode(PatternMode::Pattern);
        engine.set_bars(0, -3);
        assert_eq!(engine.active_bars(), 1);
        assert_eq!(engine.silent_bars(), 1);
        assert_eq!(bar_sequence(&mut engine, 4), vec![false, true, false, true]);
    }

    #[test]
    fn test_reset_restores_first_bar() {
        let mut engine = PatternEngine::new();
        engine.set_mode(PatternMode::Pattern);
        engine.set_bars(1, 2);
        engine.end_of_bar();
        assert!(engine.is_silent());

        engine.reset();
        assert!(!engine.is_silent());
        assert!(!engine.is_bar_muted());
        assert_eq!(engine.phase(), PatternPhase::Active);
        assert_eq!(engine.bars_remaining(), 1);
    }
}
