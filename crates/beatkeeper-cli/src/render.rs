//! Offline click-track rendering to WAV

use std::path::Path;

use anyhow::Context;
use beatkeeper_core::{BeatClock, ClockSettings, ManualScheduler};
use beatkeeper_services::OfflineRenderer;
use tracing::info;

/// Run a clock over `bars` bars on virtual time and mix the clicks down.
/// The buffer covers exactly `bars` bars.
pub(crate) fn render_click_track(settings: &ClockSettings, bars: u32, sample_rate: u32) -> Vec<f32> {
    let mut clock = BeatClock::new(ManualScheduler::new(), OfflineRenderer::new());
    clock.apply_settings(settings);

    let ticks_per_bar = u32::from(clock.time_signature().beats_per_bar())
        * u32::from(clock.subdivision().per_beat());
    let total_ticks = bars.max(1) * ticks_per_bar;
    let interval = clock.tick_interval();
    let last_tick = interval * (total_ticks - 1);

    clock.start();
    while let Some(id) = clock.scheduler_mut().pop_due(last_tick) {
        clock.on_timer(id);
    }
    clock.stop();

    clock.renderer().mixdown(sample_rate, interval * total_ticks)
}

pub(crate) fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!(
        path = %path.display(),
        seconds = samples.len() as f64 / sample_rate as f64,
        "Click track written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use beatkeeper_core::Subdivision;

    use super::*;

    #[test]
    fn test_render_length_matches_bars() {
        let mut settings = ClockSettings::default();
        settings.tempo = 120;
        // 4/4 at 120 is 2s per bar
        let audio = render_click_track(&settings, 2, 8000);
        assert_eq!(audio.len(), 32000);

        settings.time_signature = "3/4".parse().unwrap();
        settings.subdivision = Subdivision::Eighth;
        let audio = render_click_track(&settings, 1, 8000);
        assert_eq!(audio.len(), 12000);
    }

    #[test]
    fn test_muted_bars_are_silent() {
        let mut settings = ClockSettings::default();
        settings.tempo = 120;
        settings.mute_pattern_enabled = true;

        let audio = render_click_track(&settings, 2, 8000);
        assert!(audio[..16000].iter().any(|s| s.abs() > 0.05));
        assert!(audio[16000..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_write_wav_round_trip() {
        let path = std::env::temp_dir().join(format!("beatkeeper-render-{}.wav", std::process::id()));
        let samples = vec![0.0, 0.5, -0.5, 0.25];
        write_wav(&path, &samples, 8000).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        let read: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);

        let _ = std::fs::remove_file(&path);
    }
}
