//! Beat clock: tick scheduling, position tracking and click dispatch

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::accent::{AccentKind, AccentResolver, Timbre, ToneParams};
use crate::config::ClockSettings;
use crate::error::Result;
use crate::meter::{clamp_bpm, tick_interval, Subdivision, TimeSignature, DEFAULT_BPM};
use crate::pattern::{PatternEngine, PatternMode};
use crate::scheduler::{Scheduler, TimerId};
use crate::tap::TapTempo;

/// Produces the audible click for a tick. Each call is an independent sound;
/// overlapping sounds are expected.
pub trait ToneRenderer {
    fn render(&mut self, tone: &ToneParams, at: Duration) -> Result<()>;
}

impl<T: ToneRenderer + ?Sized> ToneRenderer for Box<T> {
    fn render(&mut self, tone: &ToneParams, at: Duration) -> Result<()> {
        (**self).render(tone, at)
    }
}

/// Observer notified after every tick and after start/stop
pub trait ClockListener {
    fn on_update(&mut self, snapshot: &ClockSnapshot);
}

impl<F: FnMut(&ClockSnapshot)> ClockListener for F {
    fn on_update(&mut self, snapshot: &ClockSnapshot) {
        self(snapshot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Position within the bar: beat is 1-based, subdivision 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BeatPosition {
    pub beat: u8,
    pub subdivision: u8,
}

impl BeatPosition {
    pub const START: BeatPosition = BeatPosition { beat: 1, subdivision: 0 };
}

/// Clock state as seen by listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockSnapshot {
    pub running: bool,
    pub tempo: u32,
    pub time_signature: TimeSignature,
    pub subdivision: Subdivision,
    pub position: BeatPosition,
    pub bar: u64,
    pub muted: bool,
    pub accent: Option<AccentKind>,
}

/// Metronome session. Owns tempo and meter settings, the bar pattern and
/// accent rules, and drives ticks off a repeating timer.
///
/// Any change to tempo, time signature or subdivision while running is a
/// full stop and restart from (1, 0).
pub struct BeatClock<S: Scheduler, R: ToneRenderer> {
    scheduler: S,
    renderer: R,
    tempo: u32,
    time_signature: TimeSignature,
    subdivision: Subdivision,
    pattern: PatternEngine,
    accents: AccentResolver,
    tapper: TapTempo,
    running: bool,
    timer: Option<TimerId>,
    position: BeatPosition,
    bar: u64,
    last_accent: Option<AccentKind>,
    last_muted: bool,
    listeners: Vec<(ListenerId, Box<dyn ClockListener>)>,
    next_listener_id: u64,
}

impl<S: Scheduler, R: ToneRenderer> BeatClock<S, R> {
    pub fn new(scheduler: S, renderer: R) -> Self {
        Self {
            scheduler,
            renderer,
            tempo: DEFAULT_BPM,
            time_signature: TimeSignature::default(),
            subdivision: Subdivision::default(),
            pattern: PatternEngine::new(),
            accents: AccentResolver::new(),
            tapper: TapTempo::new(),
            running: false,
            timer: None,
            position: BeatPosition::START,
            bar: 1,
            last_accent: None,
            last_muted: false,
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn add_listener(&mut self, listener: impl ClockListener + 'static) -> ListenerId {
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

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn subdivision(&self) -> Subdivision {
        self.subdivision
    }

    pub fn position(&self) -> BeatPosition {
        self.position
    }

    pub fn bar(&self) -> u64 {
        self.bar
    }

    pub fn pattern(&self) -> &PatternEngine {
        &self.pattern
    }

    pub fn accents(&self) -> &AccentResolver {
        &self.accents
    }

    /// Time between ticks at the current tempo and subdivision
    pub fn tick_interval(&self) -> Duration {
        tick_interval(self.tempo, self.subdivision)
    }

    /// Whether `id` is the timer currently driving this clock
    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.timer == Some(id)
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            running: self.running,
            tempo: self.tempo,
            time_signature: self.time_signature,
            subdivision: self.subdivision,
            position: self.position,
            bar: self.bar,
            muted: self.last_muted,
            accent: self.last_accent,
        }
    }

    /// Start from (1, 0): the first tick sounds immediately, then the timer runs
    pub fn start(&mut self) {
        if self.running {
            return;
        }

        self.running = true;
        self.position = BeatPosition::START;
        self.bar = 1;
        self.pattern.reset();

        self.dispatch_tick();

        let interval = self.tick_interval();
        self.timer = Some(self.scheduler.schedule_repeating(interval));
        info!(tempo = self.tempo, signature = %self.time_signature, interval_ms = interval.as_secs_f64() * 1000.0, "Clock started");
    }

    /// Stop and rewind to (1, 0) with the bar pattern back at its first bar.
    /// Stopping a stopped clock does nothing.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }

        if let Some(id) = self.timer.take() {
            self.scheduler.cancel(id);
        }
        self.running = false;
        self.position = BeatPosition::START;
        self.pattern.reset();
        self.last_accent = None;
        self.last_muted = false;

        info!(bars = self.bar, "Clock stopped");
        self.notify();
    }

    /// Handle a timer firing. Returns false for firings that no longer belong
    /// to this clock (cancelled or superseded timers).
    pub fn on_timer(&mut self, id: TimerId) -> bool {
        if !self.running || !self.owns_timer(id) {
            debug!(?id, "Ignoring stale timer");
            return false;
        }
        self.advance();
        self.dispatch_tick();
        true
    }

    fn advance(&mut self) {
        let per_beat = self.subdivision.per_beat();
        let beats_per_bar = self.time_signature.beats_per_bar();

        self.position.subdivision += 1;
        if self.position.subdivision >= per_beat {
            self.position.subdivision = 0;
            self.position.beat += 1;
            if self.position.beat > beats_per_bar {
                self.position.beat = 1;
                self.bar += 1;
                self.pattern.end_of_bar();
            }
        }
    }

    fn dispatch_tick(&mut self) {
        let BeatPosition { beat, subdivision } = self.position;
        let muted = self.pattern.is_muted();
        let accent = self.accents.classify(beat, subdivision);

        self.last_muted = muted;
        self.last_accent = accent;

        if let (false, Some(accent)) = (muted, accent) {
            let tone = self.accents.tone(accent);
            // zero master volume renders nothing
            if tone.gain > 0.0 {
                if let Err(e) = self.renderer.render(&tone, self.scheduler.now()) {
                    warn!(error = %e, beat, subdivision, "Click render failed");
                }
            }
        }

        debug!(bar = self.bar, beat, subdivision, muted, ?accent, "Tick");
        self.notify();
    }

    fn notify(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for (_, listener) in &mut self.listeners {
            listener.on_update(&snapshot);
        }
    }

    /// Apply a timing change: stop, change, restart if it was running
    fn restart_with(&mut self, change: impl FnOnce(&mut Self)) {
        let was_running = self.running;
        self.stop();
        change(self);
        self.pattern.reset();
        if was_running {
            self.start();
        }
    }

    /// Set the tempo, clamped to 30..=300 BPM
    pub fn set_tempo(&mut self, bpm: i32) {
        let bpm = clamp_bpm(bpm);
        if bpm == self.tempo {
            return;
        }
        self.restart_with(|clock| clock.tempo = bpm);
        info!(bpm, "Tempo set");
    }

    pub fn adjust_tempo(&mut self, delta: i32) {
        self.set_tempo((self.tempo as i32).saturating_add(delta));
    }

    pub fn set_time_signature(&mut self, signature: TimeSignature) {
        if signature == self.time_signature {
            return;
        }
        self.restart_with(|clock| clock.time_signature = signature);
    }

    pub fn set_subdivision(&mut self, subdivision: Subdivision) {
        if subdivision == self.subdivision {
            return;
        }
        self.restart_with(|clock| clock.subdivision = subdivision);
    }

    pub fn set_emphasized_beats(&mut self, beats: impl IntoIterator<Item = u8>) {
        self.accents.set_emphasized_beats(beats);
    }

    pub fn toggle_emphasis(&mut self, beat: u8) -> bool {
        self.accents.toggle_emphasis(beat)
    }

    pub fn set_play_subdivisions(&mut self, enabled: bool) {
        self.accents.set_play_subdivisions(enabled);
    }

    pub fn set_timbre(&mut self, timbre: Timbre) {
        self.accents.set_timbre(timbre);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.accents.set_volume(volume);
    }

    pub fn set_mute_enabled(&mut self, enabled: bool) {
        self.pattern.set_mute_enabled(enabled);
    }

    pub fn set_pattern_mode(&mut self, mode: PatternMode) {
        self.pattern.set_mode(mode);
    }

    pub fn set_pattern_bars(&mut self, active_bars: i32, silent_bars: i32) {
        self.pattern.set_bars(active_bars, silent_bars);
    }

    /// Register a tap at the scheduler's current time. A usable estimate
    /// becomes the new tempo.
    pub fn tap(&mut self) -> Option<u32> {
        let bpm = self.tapper.tap(self.scheduler.now())?;
        self.set_tempo(bpm as i32);
        Some(bpm)
    }

    /// Apply a full set of settings with at most one restart
    pub fn apply_settings(&mut self, settings: &ClockSettings) {
        self.accents.set_emphasized_beats(settings.emphasized_beats.iter().copied());
        self.accents.set_play_subdivisions(settings.play_subdivisions);
        self.accents.set_timbre(settings.timbre);
        self.accents.set_volume(settings.volume);

        let tempo = clamp_bpm(settings.tempo);
        self.restart_with(|clock| {
            clock.tempo = tempo;
            clock.time_signature = settings.time_signature;
            clock.subdivision = settings.subdivision;
            clock.pattern.set_mute_enabled(settings.mute_pattern_enabled);
            clock.pattern.set_mode(settings.pattern_mode);
            clock.pattern.set_bars(settings.active_bars, settings.silent_bars);
        });
    }

    pub fn settings(&self) -> ClockSettings {
        ClockSettings {
            tempo: self.tempo as i32,
            time_signature: self.time_signature,
            subdivision: self.subdivision,
            emphasized_beats: self.accents.emphasized_beats().iter().copied().collect(),
            play_subdivisions: self.accents.play_subdivisions(),
            mute_pattern_enabled: self.pattern.mute_enabled(),
            pattern_mode: self.pattern.mode(),
            active_bars: self.pattern.active_bars() as i32,
            silent_bars: self.pattern.silent_bars() as i32,
            timbre: self.accents.timbre(),
            volume: self.accents.volume(),
        }
    }
}

impl<S: Scheduler, R: ToneRenderer> std::fmt::Debug for BeatClock<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeatClock")
            .field("running", &self.running)
            .field("tempo", &self.tempo)
            .field("time_signature", &self.time_signature)
            .field("subdivision", &self.subdivision)
            .field("position", &self.position)
            .field("bar", &self.bar)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::error::BeatkeeperError;
    use crate::scheduler::ManualScheduler;

    #[derive(Default, Clone)]
    struct RecordingRenderer {
        tones: Rc<RefCell<Vec<(ToneParams, Duration)>>>,
    }

    impl ToneRenderer for RecordingRenderer {
        fn render(&mut self, tone: &ToneParams, at: Duration) -> Result<()> {
            self.tones.borrow_mut().push((*tone, at));
            Ok(())
        }
    }

    struct FailingRenderer;

    impl ToneRenderer for FailingRenderer {
        fn render(&mut self, _tone: &ToneParams, _at: Duration) -> Result<()> {
            Err(BeatkeeperError::Render("device gone".into()))
        }
    }

    fn clock() -> (BeatClock<ManualScheduler, RecordingRenderer>, Rc<RefCell<Vec<(ToneParams, Duration)>>>) {
        let renderer = RecordingRenderer::default();
        let tones = renderer.tones.clone();
        (BeatClock::new(ManualScheduler::new(), renderer), tones)
    }

    fn record_updates<R: ToneRenderer>(clock: &mut BeatClock<ManualScheduler, R>) -> Rc<RefCell<Vec<ClockSnapshot>>> {
        let updates = Rc::new(RefCell::new(Vec::new()));
        let sink = updates.clone();
        clock.add_listener(move |s: &ClockSnapshot| sink.borrow_mut().push(s.clone()));
        updates
    }

    fn run_until<R: ToneRenderer>(clock: &mut BeatClock<ManualScheduler, R>, until: Duration) {
        while let Some(id) = clock.scheduler_mut().pop_due(until) {
            clock.on_timer(id);
        }
    }

    fn positions(updates: &[ClockSnapshot]) -> Vec<(u8, u8)> {
        updates.iter().map(|s| (s.position.beat, s.position.subdivision)).collect()
    }

    #[test]
    fn test_set_tempo_clamps() {
        let (mut clock, _) = clock();
        for (input, expected) in [(10, 30), (30, 30), (97, 97), (300, 300), (301, 300), (-40, 30)] {
            clock.set_tempo(input);
            assert_eq!(clock.tempo(), expected);
        }
    }

    #[test]
    fn test_quarter_notes_in_four_four() {
        let (mut clock, tones) = clock();
        let updates = record_updates(&mut clock);

        clock.start();
        // 120 BPM quarter => 500ms; ticks at 0, 500, ..., 4000 => 9 ticks
        run_until(&mut clock, Duration::from_millis(4000));

        let updates = updates.borrow();
        assert_eq!(
            positions(&updates),
            vec![(1, 0), (2, 0), (3, 0), (4, 0), (1, 0), (2, 0), (3, 0), (4, 0), (1, 0)]
        );
        let bars: Vec<u64> = updates.iter().map(|s| s.bar).collect();
        assert_eq!(bars, vec![1, 1, 1, 1, 2, 2, 2, 2, 3]);
        assert_eq!(tones.borrow().len(), 9);

        let timestamps: Vec<u128> = tones.borrow().iter().map(|(_, at)| at.as_millis()).collect();
        assert_eq!(timestamps, vec![0, 500, 1000, 1500, 2000, 2500, 3000, 3500, 4000]);
    }

    #[test]
    fn test_eighth_subdivisions() {
        let (mut clock, tones) = clock();
        clock.set_subdivision(Subdivision::Eighth);
        clock.set_time_signature("3/4".parse().unwrap());
        assert_eq!(clock.tick_interval(), Duration::from_millis(250));

        let updates = record_updates(&mut clock);
        clock.start();
        run_until(&mut clock, Duration::from_millis(1500));

        assert_eq!(
            positions(&updates.borrow()),
            vec![(1, 0), (1, 1), (2, 0), (2, 1), (3, 0), (3, 1), (1, 0)]
        );
        let accents: Vec<AccentKind> = tones.borrow().iter().map(|(t, _)| t.accent).collect();
        assert_eq!(
            accents,
            vec![
                AccentKind::Emphasized,
                AccentKind::Subdivision,
                AccentKind::MainBeat,
                AccentKind::Subdivision,
                AccentKind::MainBeat,
                AccentKind::Subdivision,
                AccentKind::Emphasized,
            ]
        );
    }

    #[test]
    fn test_subdivision_sounds_can_be_suppressed() {
        let (mut clock, tones) = clock();
        clock.set_subdivision(Subdivision::Sixteenth);
        clock.set_play_subdivisions(false);
        clock.start();
        run_until(&mut clock, Duration::from_millis(1875));

        // 16 ticks across one bar, only the four main beats sound
        assert_eq!(tones.borrow().len(), 4);
    }

    #[test]
    fn test_emphasis_set_classification() {
        let (mut clock, tones) = clock();
        clock.set_emphasized_beats([1, 3]);
        clock.start();
        run_until(&mut clock, Duration::from_millis(1500));

        let accents: Vec<AccentKind> = tones.borrow().iter().map(|(t, _)| t.accent).collect();
        assert_eq!(
            accents,
            vec![AccentKind::Emphasized, AccentKind::MainBeat, AccentKind::Emphasized, AccentKind::MainBeat]
        );
    }

    #[test]
    fn test_stop_twice_notifies_once() {
        let (mut clock, _) = clock();
        clock.start();
        let updates = record_updates(&mut clock);

        clock.stop();
        clock.stop();

        let updates = updates.borrow();
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].running);
        assert_eq!(clock.position(), BeatPosition::START);
        assert_eq!(clock.scheduler().active_timers(), 0);
    }

    #[test]
    fn test_stale_timer_after_stop_is_ignored() {
        let (mut clock, tones) = clock();
        clock.start();
        // the timer fires, but stop() runs before the firing is delivered
        let stale = clock.scheduler_mut().pop_due(Duration::from_millis(500)).unwrap();

        clock.stop();
        assert!(!clock.on_timer(stale));
        assert_eq!(clock.position(), BeatPosition::START);
        assert_eq!(tones.borrow().len(), 1);
    }

    #[test]
    fn test_tempo_change_while_running_restarts() {
        let (mut clock, _) = clock();
        clock.start();
        run_until(&mut clock, Duration::from_millis(1000));
        assert_eq!(clock.position().beat, 3);

        let updates = record_updates(&mut clock);
        clock.set_tempo(60);

        assert!(clock.is_running());
        assert_eq!(clock.position(), BeatPosition::START);
        assert_eq!(clock.tick_interval(), Duration::from_secs(1));
        assert_eq!(clock.scheduler().active_timers(), 1);

        // stop notification, then the first tick of the restarted clock
        let updates = updates.borrow();
        assert_eq!(updates.len(), 2);
        assert!(!updates[0].running);
        assert!(updates[1].running);
        assert_eq!(updates[1].tempo, 60);
    }

    #[test]
    fn test_muted_bars_notify_without_sound() {
        let (mut clock, tones) = clock();
        clock.set_mute_enabled(true);
        let updates = record_updates(&mut clock);
        clock.start();
        run_until(&mut clock, Duration::from_millis(5500));

        // 12 ticks: bar 1 audible, bar 2 muted, bar 3 audible
        let updates = updates.borrow();
        assert_eq!(updates.len(), 12);
        let muted: Vec<bool> = updates.iter().map(|s| s.muted).collect();
        assert_eq!(muted[..4], [false; 4]);
        assert_eq!(muted[4..8], [true; 4]);
        assert_eq!(muted[8..], [false; 4]);
        assert_eq!(tones.borrow().len(), 8);
    }

    #[test]
    fn test_pattern_mode_through_clock() {
        let (mut clock, _) = clock();
        clock.set_time_signature(TimeSignature::new(1, 4));
        clock.set_pattern_mode(PatternMode::Pattern);
        clock.set_pattern_bars(2, 1);
        let updates = record_updates(&mut clock);
        clock.start();
        run_until(&mut clock, Duration::from_millis(2500));

        let muted: Vec<bool> = updates.borrow().iter().map(|s| s.muted).collect();
        assert_eq!(muted, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn test_render_failure_does_not_stop_clock() {
        let mut clock = BeatClock::new(ManualScheduler::new(), FailingRenderer);
        let updates = record_updates(&mut clock);
        clock.start();
        run_until(&mut clock, Duration::from_millis(2000));

        assert!(clock.is_running());
        assert_eq!(updates.borrow().len(), 5);
        assert_eq!(clock.position().beat, 1);
        assert_eq!(clock.bar(), 2);
    }

    #[test]
    fn test_tap_sets_tempo() {
        let (mut clock, _) = clock();
        for t in [0, 400, 800, 1200] {
            clock.scheduler_mut().set_now(Duration::from_millis(t));
            clock.tap();
        }
        assert_eq!(clock.tempo(), 150);
    }

    #[test]
    fn test_tap_while_running_restarts() {
        let (mut clock, _) = clock();
        clock.start();
        run_until(&mut clock, Duration::from_millis(1000));
        assert_eq!(clock.position().beat, 3);

        let updates = record_updates(&mut clock);
        for t in [1000, 1400, 1800, 2200] {
            clock.scheduler_mut().set_now(Duration::from_millis(t));
            clock.tap();
        }

        assert_eq!(clock.tempo(), 150);
        assert!(clock.is_running());
        assert_eq!(clock.position(), BeatPosition::START);
        assert_eq!(clock.scheduler().active_timers(), 1);

        // one restart: the stop notification, then the first tick at the new tempo
        let updates = updates.borrow();
        assert_eq!(updates.len(), 2);
        assert!(!updates[0].running);
        assert_eq!((updates[1].tempo, updates[1].position), (150, BeatPosition::START));
    }

    #[test]
    fn test_adjust_tempo_saturates() {
        let (mut clock, _) = clock();
        clock.adjust_tempo(5);
        assert_eq!(clock.tempo(), 125);
        clock.adjust_tempo(i32::MAX);
        assert_eq!(clock.tempo(), 300);
        clock.adjust_tempo(i32::MIN);
        assert_eq!(clock.tempo(), 30);
    }

    #[test]
    fn test_stop_resets_pattern() {
        let (mut clock, _) = clock();
        clock.set_mute_enabled(true);
        clock.start();
        run_until(&mut clock, Duration::from_millis(2500));
        assert!(clock.pattern().is_bar_muted());
        assert!(clock.snapshot().muted);

        clock.stop();
        assert!(!clock.pattern().is_bar_muted());
        assert!(!clock.pattern().is_muted());
        assert!(!clock.snapshot().muted);
    }

    #[test]
    fn test_zero_volume_renders_nothing() {
        let (mut clock, tones) = clock();
        clock.set_volume(0.0);
        let updates = record_updates(&mut clock);
        clock.start();
        run_until(&mut clock, Duration::from_millis(1500));

        assert!(tones.borrow().is_empty());
        assert_eq!(updates.borrow().len(), 4);
        assert_eq!(updates.borrow()[0].accent, Some(AccentKind::Emphasized));
    }

    #[test]
    fn test_remove_listener() {
        let (mut clock, _) = clock();
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        let id = clock.add_listener(move |_: &ClockSnapshot| *sink.borrow_mut() += 1);

        clock.start();
        assert!(clock.remove_listener(id));
        clock.stop();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_apply_settings() {
        let (mut clock, _) = clock();
        clock.start();

        let settings = ClockSettings {
            tempo: 90,
            time_signature: "6/8".parse().unwrap(),
            subdivision: Subdivision::Eighth,
            active_bars: 0,
            ..ClockSettings::default()
        };
        clock.apply_settings(&settings);

        assert!(clock.is_running());
        assert_eq!(clock.tempo(), 90);
        assert_eq!(clock.time_signature().beats_per_bar(), 6);
        assert_eq!(clock.pattern().active_bars(), 1);
        assert_eq!(clock.settings().time_signature.to_string(), "6/8");
    }
}
