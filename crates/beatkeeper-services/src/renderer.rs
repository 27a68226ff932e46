//! Tone renderers: live output through the sound card, and offline mixdown

use std::time::Duration;

use beatkeeper_core::{BeatkeeperError, Result, ToneParams, ToneRenderer};
use crossbeam_channel::{bounded, Sender, TrySendError};
use tracing::info;

use crate::click_synth::ClickSynth;
use crate::output::{AudioOutputError, OutputStream};

const TONE_QUEUE: usize = 64;

/// Plays clicks on the default output device as soon as they are rendered
pub struct SynthRenderer {
    tones: Sender<ToneParams>,
    _stream: OutputStream,
}

impl SynthRenderer {
    pub fn start() -> std::result::Result<Self, AudioOutputError> {
        let (tx, rx) = bounded::<ToneParams>(TONE_QUEUE);
        let mut synth: Option<ClickSynth> = None;

        let stream = OutputStream::start(move |buffer, sample_rate, channels| {
            let synth = synth.get_or_insert_with(|| ClickSynth::new(sample_rate as f32));
            for tone in rx.try_iter() {
                synth.trigger(&tone);
            }
            synth.process(buffer, channels as usize);
        })?;

        info!(sample_rate = stream.sample_rate(), "Click renderer ready");
        Ok(Self { tones: tx, _stream: stream })
    }
}

impl ToneRenderer for SynthRenderer {
    fn render(&mut self, tone: &ToneParams, _at: Duration) -> Result<()> {
        self.tones.try_send(*tone).map_err(|e| match e {
            TrySendError::Full(_) => BeatkeeperError::Render("click queue full".into()),
            TrySendError::Disconnected(_) => BeatkeeperError::Render("output stream closed".into()),
        })
    }
}

/// Collects rendered tones with their timestamps and mixes them into a
/// sample buffer afterwards
#[derive(Debug, Clone, Default)]
pub struct OfflineRenderer {
    events: Vec<(ToneParams, Duration)>,
}

impl OfflineRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[(ToneParams, Duration)] {
        &self.events
    }

    /// Mix all collected tones into `length` of mono audio
    pub fn mixdown(&self, sample_rate: u32, length: Duration) -> Vec<f32> {
        let total = (length.as_secs_f64() * sample_rate as f64).round() as usize;
        let mut synth = ClickSynth::new(sample_rate as f32);

        let mut pending: Vec<(usize, &ToneParams)> = self
            .events
            .iter()
            .map(|(tone, at)| ((at.as_secs_f64() * sample_rate as f64).round() as usize, tone))
            .collect();
        pending.sort_by_key(|(offset, _)| *offset);

        let mut next = 0;
        let mut samples = Vec::with_capacity(total);
        for idx in 0..total {
            while let Some(&(offset, tone)) = pending.get(next) {
                if offset > idx {
                    break;
                }
                synth.trigger(tone);
                next += 1;
            }
            samples.push(synth.next_sample());
        }
        samples
    }
}

impl ToneRenderer for OfflineRenderer {
    fn render(&mut self, tone: &ToneParams, at: Duration) -> Result<()> {
        self.events.push((*tone, at));
        Ok(())
    }
}
