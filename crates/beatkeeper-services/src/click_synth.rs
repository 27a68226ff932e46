//! Click synthesizer: one short percussive voice per tick

use std::f64::consts::TAU;

use beatkeeper_core::{Timbre, ToneParams};

const MASTER_GAIN: f32 = 0.9;
const MAX_VOICES: usize = 16;
const SILENCE: f64 = 0.0001;

/// State for a single click voice
#[derive(Debug, Clone)]
struct ClickVoice {
    active: bool,
    age: usize,
    timbre: Timbre,
    frequency: f64,
    gain: f64,
    decay: f64,
    max_age: usize,

    phase: f64,
    phase2: f64,
    amp_env: f64,
    noise_env: f64,
    filter_state: f64,
}

impl ClickVoice {
    fn new() -> Self {
        Self {
            active: false,
            age: 0,
            timbre: Timbre::Click,
            frequency: 1000.0,
            gain: 0.0,
            decay: 0.01,
            max_age: 0,
            phase: 0.0,
            phase2: 0.0,
            amp_env: 0.0,
            noise_env: 0.0,
            filter_state: 0.0,
        }
    }

    fn trigger(&mut self, tone: &ToneParams, sample_rate: f32) {
        let duration = tone.duration.as_secs_f64().max(0.005);

        self.active = true;
        self.age = 0;
        self.timbre = tone.timbre;
        self.frequency = tone.frequency as f64;
        self.gain = tone.gain as f64;
        // Envelope time constant; the tail is cut at twice the nominal duration
        self.decay = match tone.timbre {
            Timbre::Click => duration / 6.0,
            Timbre::Woodblock => duration / 5.0,
            Timbre::Beep => duration / 2.0,
            Timbre::Cowbell => duration / 3.0,
        };
        self.max_age = (duration * 2.0 * sample_rate as f64) as usize;
        self.phase = 0.0;
        self.phase2 = 0.0;
        self.amp_env = 1.0;
        self.noise_env = 1.0;
        self.filter_state = 0.0;
    }

    fn tick(&mut self, sample_rate: f32) -> f32 {
        if !self.active {
            return 0.0;
        }

        self.age += 1;
        let dt = 1.0 / sample_rate as f64;

        let sample = match self.timbre {
            Timbre::Click => self.tick_click(dt),
            Timbre::Woodblock => self.tick_woodblock(dt),
            Timbre::Beep => self.tick_beep(dt),
            Timbre::Cowbell => self.tick_cowbell(dt),
        };

        if self.amp_env < SILENCE || self.age >= self.max_age {
            self.active = false;
        }

        (sample * self.gain) as f32
    }

    fn tick_click(&mut self, dt: f64) -> f64 {
        // Sine body with a short noise transient on top
        self.phase += self.frequency * dt;
        let tone = (self.phase * TAU).sin();

        let noise = fastrand::f64() * 2.0 - 1.0;
        self.noise_env *= (-dt / 0.002).exp();
        self.amp_env *= (-dt / self.decay).exp();

        (tone * 0.8 + noise * self.noise_env * 0.3) * self.amp_env
    }

    fn tick_woodblock(&mut self, dt: f64) -> f64 {
        // Fundamental plus an inharmonic partial, lightly filtered noise for the knock
        self.phase += self.frequency * dt;
        self.phase2 += self.frequency * 2.76 * dt;
        let body = (self.phase * TAU).sin() * 0.7 + (self.phase2 * TAU).sin() * 0.3;

        let noise = fastrand::f64() * 2.0 - 1.0;
        self.filter_state += 0.2 * (noise - self.filter_state);
        self.noise_env *= (-dt / 0.004).exp();
        self.amp_env *= (-dt / self.decay).exp();

        (body + self.filter_state * self.noise_env * 0.5) * self.amp_env
    }

    fn tick_beep(&mut self, dt: f64) -> f64 {
        self.phase += self.frequency * dt;
        let tone = (self.phase * TAU).sin();
        self.amp_env *= (-dt / self.decay).exp();

        tone * self.amp_env * 0.8
    }

    fn tick_cowbell(&mut self, dt: f64) -> f64 {
        // Two detuned square waves
        self.phase += self.frequency * dt;
        self.phase2 += self.frequency * 1.51 * dt;
        let sq1 = if (self.phase * TAU).sin() > 0.0 { 1.0 } else { -1.0 };
        let sq2 = if (self.phase2 * TAU).sin() > 0.0 { 1.0 } else { -1.0 };

        self.amp_env *= (-dt / self.decay).exp();

        (sq1 + sq2) * 0.3 * self.amp_env
    }
}

/// Polyphonic click synthesizer. Each triggered tone gets its own voice so
/// overlapping clicks ring independently.
pub struct ClickSynth {
    sample_rate: f32,
    voices: Vec<ClickVoice>,
}

impl std::fmt::Debug for ClickSynth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickSynth")
            .field("sample_rate", &self.sample_rate)
            .field("active_voices", &self.active_voices())
            .finish()
    }
}

impl ClickSynth {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            voices: (0..MAX_VOICES).map(|_| ClickVoice::new()).collect(),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    /// Start a voice for `tone`, stealing the oldest when all are busy
    pub fn trigger(&mut self, tone: &ToneParams) {
        let idx = self
            .voices
            .iter()
            .position(|v| !v.active)
            .unwrap_or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, v)| v.age)
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            });

        self.voices[idx].trigger(tone, self.sample_rate);
    }

    pub fn next_sample(&mut self) -> f32 {
        let mut mix = 0.0f32;
        for voice in &mut self.voices {
            if voice.active {
                mix += voice.tick(self.sample_rate);
            }
        }
        (mix * MASTER_GAIN).tanh()
    }

    /// Fill an interleaved buffer, writing the same mono signal to every channel
    pub fn process(&mut self, buffer: &mut [f32], channels: usize) {
        for frame in buffer.chunks_mut(channels.max(1)) {
            let sample = self.next_sample();
            frame.fill(sample);
        }
    }
}
