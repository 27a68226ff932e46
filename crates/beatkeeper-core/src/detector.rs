//! Microphone beat detection session: frame loop, onset detection and tempo tracking

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::ListenerId;
use crate::config::DetectionSettings;
use crate::error::Result;
use crate::onset::{FrameAnalysis, OnsetDetector};
use crate::scheduler::{Scheduler, TimerId};
use crate::tracker::{MicTempoTracker, TempoEstimate};

/// Roughly one display refresh
pub const DEFAULT_FRAME_PERIOD: Duration = Duration::from_micros(16_667);

/// Source of magnitude spectra (bins normalized to 0..=1)
pub trait AudioInput {
    /// Acquire the capture device
    fn open(&mut self) -> Result<()>;
    /// Release the capture device
    fn close(&mut self);
    /// Write the latest spectrum into `out`; false when no frame is available
    fn read_spectrum(&mut self, out: &mut Vec<f32>) -> bool;
    /// Width of one spectrum bin in Hz
    fn bin_hz(&self) -> f32;
}

/// Observer of detection results. All methods default to no-ops.
pub trait DetectionListener {
    fn on_beat_detected(&mut self, _at: Duration) {}
    fn on_tempo_detected(&mut self, _bpm: u32, _confidence: f64) {}
    fn on_volume_update(&mut self, _volume: f32) {}
    fn on_error(&mut self, _message: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorState {
    #[default]
    NotInitialized,
    Listening,
    Stopped,
}

/// Listens to an audio input and reports onsets and tempo.
///
/// Frames are processed on a repeating timer; the host delivers firings
/// through [`BeatDetector::on_timer`].
pub struct BeatDetector<I: AudioInput, S: Scheduler> {
    input: I,
    scheduler: S,
    onsets: OnsetDetector,
    tracker: MicTempoTracker,
    state: DetectorState,
    timer: Option<TimerId>,
    frame_period: Duration,
    spectrum: Vec<f32>,
    estimate: Option<TempoEstimate>,
    listeners: Vec<(ListenerId, Box<dyn DetectionListener>)>,
    next_listener_id: u64,
}

impl<I: AudioInput, S: Scheduler> BeatDetector<I, S> {
    pub fn new(input: I, scheduler: S) -> Self {
        let onsets = OnsetDetector::new(input.bin_hz());
        Self {
            input,
            scheduler,
            onsets,
            tracker: MicTempoTracker::default(),
            state: DetectorState::NotInitialized,
            timer: None,
            frame_period: DEFAULT_FRAME_PERIOD,
            spectrum: Vec::new(),
            estimate: None,
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    pub fn with_frame_period(mut self, period: Duration) -> Self {
        self.frame_period = period;
        self
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == DetectorState::Listening
    }

    pub fn onsets(&self) -> &OnsetDetector {
        &self.onsets
    }

    /// Latest smoothed tempo estimate
    pub fn estimate(&self) -> Option<TempoEstimate> {
        self.estimate
    }

    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.timer == Some(id)
    }

    pub fn add_listener(&mut self, listener: impl DetectionListener + 'static) -> ListenerId {
        self.next_listener_id += 1;
        let id = ListenerId(self.next_listener_id);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn apply_settings(&mut self, settings: &DetectionSettings) {
        let min = Duration::from_millis(settings.min_beat_interval_ms);
        let max = Duration::from_millis(settings.max_beat_interval_ms);
        self.onsets.set_mode(settings.mode);
        self.onsets.set_sensitivity(settings.sensitivity);
        self.onsets.set_min_interval(min);
        self.tracker.set_interval_bounds(min, max);
    }

    /// Open the input and start the frame loop. Starting while already
    /// listening succeeds without touching the device.
    pub fn start(&mut self) -> Result<()> {
        if self.is_listening() {
            return Ok(());
        }

        if let Err(e) = self.input.open() {
            warn!(error = %e, "Audio input unavailable");
            self.state = DetectorState::NotInitialized;
            let message = e.to_string();
            for (_, listener) in &mut self.listeners {
                listener.on_error(&message);
            }
            return Err(e);
        }

        self.onsets.set_bin_hz(self.input.bin_hz());
        self.onsets.reset();
        self.state = DetectorState::Listening;
        self.timer = Some(self.scheduler.schedule_repeating(self.frame_period));
        info!(mode = self.onsets.mode().name(), sensitivity = self.onsets.sensitivity(), "Beat detection started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.is_listening() {
            return;
        }
        if let Some(id) = self.timer.take() {
            self.scheduler.cancel(id);
        }
        self.input.close();
        self.state = DetectorState::Stopped;
        info!("Beat detection stopped");
    }

    /// Forget collected onsets and the tempo estimate
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.onsets.reset();
        self.estimate = None;
    }

    /// Handle a frame-timer firing; stale firings are ignored
    pub fn on_timer(&mut self, id: TimerId) -> bool {
        if !self.is_listening() || !self.owns_timer(id) {
            return false;
        }
        self.process_frame();
        true
    }

    /// Analyze the next available frame, if any
    pub fn process_frame(&mut self) -> Option<FrameAnalysis> {
        if !self.input.read_spectrum(&mut self.spectrum) {
            return None;
        }

        let at = self.scheduler.now();
        let analysis = self.onsets.analyze(&self.spectrum, at);

        for (_, listener) in &mut self.listeners {
            listener.on_volume_update(analysis.volume);
        }

        if let Some(trigger) = analysis.trigger {
            debug!(?trigger, at_ms = at.as_millis() as u64, strength = analysis.onset_strength, "Onset");
            for (_, listener) in &mut self.listeners {
                listener.on_beat_detected(at);
            }

            if let Some(estimate) = self.tracker.record_onset(at) {
                self.estimate = Some(estimate);
                debug!(bpm = estimate.bpm, confidence = estimate.confidence, "Tempo estimate");
                for (_, listener) in &mut self.listeners {
                    listener.on_tempo_detected(estimate.bpm, estimate.confidence);
                }
            }
        }

        Some(analysis)
    }
}

impl<I: AudioInput, S: Scheduler> std::fmt::Debug for BeatDetector<I, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeatDetector")
            .field("state", &self.state)
            .field("mode", &self.onsets.mode())
            .field("estimate", &self.estimate)
            .finish()
    }
}
