//! Interactive metronome session on the terminal

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use beatkeeper_core::{
    tempo_marking, AccentKind, BeatClock, BeatDetector, ClockSnapshot, DetectionListener,
    DetectionSettings, MetronomeConfig, Scheduler, ToneParams, ToneRenderer,
};
use beatkeeper_services::{MicInput, SynthRenderer, ThreadScheduler, TimerEvent};
use crossbeam_channel::{select, unbounded, Receiver};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::commands::{Command, HELP};
use crate::config;

const MAX_DISPATCH_LAG: Duration = Duration::from_millis(20);

/// Stands in for the sound card when no output device opens
struct LoggingRenderer;

impl ToneRenderer for LoggingRenderer {
    fn render(&mut self, tone: &ToneParams, at: Duration) -> beatkeeper_core::Result<()> {
        debug!(accent = ?tone.accent, frequency = tone.frequency, at_ms = at.as_millis() as u64, "Click");
        Ok(())
    }
}

/// Prints detector events for the user
struct ConsoleDetection;

impl DetectionListener for ConsoleDetection {
    fn on_tempo_detected(&mut self, bpm: u32, confidence: f64) {
        println!("detected {bpm} bpm ({confidence:.0}% confidence)");
    }

    fn on_error(&mut self, message: &str) {
        println!("microphone error: {message}");
    }
}

fn beat_line(snapshot: &ClockSnapshot) -> String {
    let beats = snapshot.time_signature.beats_per_bar();
    let cells: Vec<&str> = (1..=beats)
        .map(|b| match (b == snapshot.position.beat, snapshot.accent) {
            (true, Some(AccentKind::Emphasized)) => "X",
            (true, _) => "x",
            (false, _) => ".",
        })
        .collect();
    let mute = if snapshot.muted { " (muted)" } else { "" };
    format!("[{}] bar {}{}", cells.join(" "), snapshot.bar, mute)
}

#[derive(Serialize)]
struct Status<'a> {
    clock: ClockSnapshot,
    marking: &'a str,
    listening: bool,
    detection: &'a DetectionSettings,
    detected: Option<beatkeeper_core::TempoEstimate>,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub(crate) struct Session {
    clock: BeatClock<ThreadScheduler, Box<dyn ToneRenderer>>,
    detector: BeatDetector<MicInput, ThreadScheduler>,
    detection: DetectionSettings,
    config_path: PathBuf,
}

impl Session {
    pub(crate) fn new(
        config: &MetronomeConfig,
        config_path: PathBuf,
        device: &str,
    ) -> (Self, Receiver<TimerEvent>) {
        let (scheduler, timers) = ThreadScheduler::new();

        let renderer: Box<dyn ToneRenderer> = match SynthRenderer::start() {
            Ok(renderer) => Box::new(renderer),
            Err(e) => {
                warn!(error = %e, "No audio output, clicks will only be logged");
                Box::new(LoggingRenderer)
            }
        };

        let mut clock = BeatClock::new(scheduler.clone(), renderer);
        clock.apply_settings(&config.metronome);
        clock.add_listener(|snapshot: &ClockSnapshot| {
            if snapshot.running && snapshot.position.subdivision == 0 {
                println!("{}", beat_line(snapshot));
            }
        });

        let mut detector = BeatDetector::new(MicInput::new(device), scheduler);
        detector.apply_settings(&config.detection);
        detector.add_listener(ConsoleDetection);

        let session = Self {
            clock,
            detector,
            detection: config.detection.clone(),
            config_path,
        };
        (session, timers)
    }

    fn dispatch_timer(&mut self, event: TimerEvent) {
        let lag = self.clock.scheduler().now().saturating_sub(event.at);
        if lag > MAX_DISPATCH_LAG {
            debug!(id = ?event.id, lag_ms = lag.as_millis() as u64, "Timer dispatched late");
        }
        if !self.clock.on_timer(event.id) && !self.detector.on_timer(event.id) {
            trace!(id = ?event.id, "Stale timer firing");
        }
    }

    fn config(&self) -> MetronomeConfig {
        MetronomeConfig {
            metronome: self.clock.settings(),
            detection: self.detection.clone(),
        }
    }

    fn print_tempo(&self) {
        let bpm = self.clock.tempo();
        println!("{bpm} bpm ({})", tempo_marking(bpm));
    }

    fn handle_line(&mut self, line: &str) -> Flow {
        if line.trim().is_empty() && line != " " {
            return Flow::Continue;
        }
        match line.parse::<Command>() {
            Ok(command) => self.execute(command),
            Err(e) => {
                println!("{e}");
                Flow::Continue
            }
        }
    }

    fn execute(&mut self, command: Command) -> Flow {
        match command {
            Command::Start => self.clock.start(),
            Command::Stop => self.clock.stop(),
            Command::Toggle => {
                if self.clock.is_running() {
                    self.clock.stop();
                } else {
                    self.clock.start();
                }
            }
            Command::Tempo(bpm) => {
                self.clock.set_tempo(bpm);
                self.print_tempo();
            }
            Command::Nudge(delta) => {
                self.clock.adjust_tempo(delta);
                self.print_tempo();
            }
            Command::Tap => match self.clock.tap() {
                Some(_) => self.print_tempo(),
                None => println!("tap again"),
            },
            Command::Signature(signature) => {
                self.clock.set_time_signature(signature);
                println!("time signature {}", self.clock.time_signature());
            }
            Command::Subdivision(subdivision) => {
                self.clock.set_subdivision(subdivision);
                println!("subdivision {}", subdivision.name());
            }
            Command::Accent(beat) => {
                let on = self.clock.toggle_emphasis(beat);
                println!("beat {beat} {}", if on { "emphasized" } else { "normal" });
            }
            Command::Subdivisions(enabled) => self.clock.set_play_subdivisions(enabled),
            Command::Timbre(timbre) => self.clock.set_timbre(timbre),
            Command::Volume(volume) => self.clock.set_volume(volume),
            Command::Mute(enabled) => self.clock.set_mute_enabled(enabled),
            Command::Pattern(Some((active, silent))) => {
                self.clock.set_pattern_bars(active, silent);
                self.clock.set_pattern_mode(beatkeeper_core::PatternMode::Pattern);
                let pattern = self.clock.pattern();
                println!("pattern {} on / {} off", pattern.active_bars(), pattern.silent_bars());
            }
            Command::Pattern(None) => self.clock.set_pattern_mode(beatkeeper_core::PatternMode::None),
            Command::Listen => {
                if self.detector.start().is_ok() {
                    println!("listening ({})", self.detection.mode.name());
                }
            }
            Command::Unlisten => self.detector.stop(),
            Command::Mode(mode) => {
                self.detection.mode = mode;
                self.detector.apply_settings(&self.detection);
            }
            Command::Sensitivity(sensitivity) => {
                self.detection.sensitivity = sensitivity.clamp(0.0, 100.0);
                self.detector.apply_settings(&self.detection);
            }
            Command::Sync => match self.detector.estimate() {
                Some(estimate) => {
                    self.clock.set_tempo(estimate.bpm as i32);
                    self.print_tempo();
                }
                None => println!("no tempo detected yet"),
            },
            Command::Status => {
                let status = Status {
                    clock: self.clock.snapshot(),
                    marking: tempo_marking(self.clock.tempo()),
                    listening: self.detector.is_listening(),
                    detection: &self.detection,
                    detected: self.detector.estimate(),
                };
                match serde_json::to_string_pretty(&status) {
                    Ok(json) => println!("{json}"),
                    Err(e) => warn!(error = %e, "Failed to encode status"),
                }
            }
            Command::Save => match config::save_config(&self.config_path, &self.config()) {
                Ok(()) => println!("saved to {}", self.config_path.display()),
                Err(e) => println!("save failed: {e:#}"),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn shutdown(&mut self) {
        self.clock.stop();
        self.detector.stop();
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
        debug!("stdin closed");
    });
    rx
}

/// Run the session until `quit` or end of input
pub(crate) fn run(mut session: Session, timers: Receiver<TimerEvent>) -> anyhow::Result<()> {
    let lines = spawn_stdin_reader();
    println!("beatkeeper ready, type 'help' for commands");
    info!(tempo = session.clock.tempo(), "Session started");

    loop {
        select! {
            recv(timers) -> event => match event {
                Ok(event) => session.dispatch_timer(event),
                Err(_) => break,
            },
            recv(lines) -> line => match line {
                Ok(line) => {
                    if session.handle_line(&line) == Flow::Quit {
                        break;
                    }
                }
                Err(_) => break,
            },
        }
    }

    session.shutdown();
    info!("Session ended");
    Ok(())
}
