//! Magnitude spectrum of the most recent input samples

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

pub const DEFAULT_FFT_SIZE: usize = 2048;

/// Sliding-window FFT analyzer producing normalized bin levels.
///
/// Magnitudes are smoothed over time, converted to decibels and mapped from
/// `[min_db, max_db]` onto `0..=1`.
pub struct SpectrumAnalyzer {
    fft_size: usize,
    sample_rate: u32,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
    samples: VecDeque<f32>,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    levels: Vec<f32>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("fft_size", &self.fft_size)
            .field("sample_rate", &self.sample_rate)
            .field("buffered", &self.samples.len())
            .finish()
    }
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: u32, fft_size: usize) -> Self {
        let fft_size = fft_size.max(32);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        // Hann window
        let window = (0..fft_size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / fft_size as f32).cos())
            .collect();

        Self {
            fft_size,
            sample_rate,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
            samples: VecDeque::with_capacity(fft_size),
            window,
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
            levels: vec![0.0; fft_size / 2],
        }
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.smoothing = smoothing.clamp(0.0, 0.99);
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.smoothed.fill(0.0);
        self.levels.fill(0.0);
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / self.fft_size as f32
    }

    /// Append mono samples, keeping only the latest `fft_size`
    pub fn push_samples(&mut self, mono: &[f32]) {
        self.samples.extend(mono.iter().copied());
        while self.samples.len() > self.fft_size {
            self.samples.pop_front();
        }
    }

    /// Analyze the current window. Missing samples count as silence.
    pub fn analyze(&mut self) -> &[f32] {
        let pad = self.fft_size - self.samples.len();
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < pad { 0.0 } else { self.samples[i - pad] };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_db - self.min_db;
        for (i, bin) in self.buffer[..self.fft_size / 2].iter().enumerate() {
            let magnitude = bin.norm() * scale;
            let smoothed = self.smoothing * self.smoothed[i] + (1.0 - self.smoothing) * magnitude;
            self.smoothed[i] = smoothed;

            let db = 20.0 * smoothed.max(1e-12).log10();
            self.levels[i] = ((db - self.min_db) / range).clamp(0.0, 1.0);
        }

        &self.levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_silence_is_all_zero() {
        let mut analyzer = SpectrumAnalyzer::new(44100, 1024);
        analyzer.push_samples(&vec![0.0; 1024]);
        assert!(analyzer.analyze().iter().all(|&l| l == 0.0));
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let mut analyzer = SpectrumAnalyzer::new(44100, 2048);
        analyzer.set_smoothing(0.0);
        analyzer.push_samples(&sine(1000.0, 44100, 4096));

        let levels = analyzer.analyze();
        let (peak_bin, peak) = levels
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &l)| if l > best.1 { (i, l) } else { best });

        let expected = (1000.0_f64 / (44100.0 / 2048.0)).round() as usize;
        assert!(peak_bin.abs_diff(expected) <= 1);
        assert!(peak > 0.9);
        assert!(levels[expected * 4] < peak);
    }

    #[test]
    fn test_window_keeps_latest_samples() {
        let mut analyzer = SpectrumAnalyzer::new(8000, 256);
        analyzer.push_samples(&vec![1.0; 1000]);
        assert_eq!(analyzer.samples.len(), 256);
        assert_eq!(analyzer.bin_count(), 128);
        assert!((analyzer.bin_hz() - 31.25).abs() < 1e-6);
    }
}
