//! Microphone capture feeding the spectrum analyzer

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use beatkeeper_core::{AudioInput, BeatkeeperError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use thiserror::Error;
use tracing::{error, info};

use crate::spectrum::{SpectrumAnalyzer, DEFAULT_FFT_SIZE};

#[derive(Debug, Error)]
pub enum MicError {
    #[error("No audio input devices found")]
    NoDevices,
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("Failed to get input config: {0}")]
    ConfigError(String),
    #[error("Failed to build input stream: {0}")]
    StreamError(String),
}

impl From<MicError> for BeatkeeperError {
    fn from(e: MicError) -> Self {
        BeatkeeperError::Input(e.to_string())
    }
}

/// Capture device info
#[derive(Debug, Clone)]
pub struct InputDevice {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub is_default: bool,
}

/// List capture devices on the default host
pub fn list_devices() -> Result<Vec<InputDevice>, MicError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices: Vec<_> = host
        .input_devices()
        .map_err(|e| MicError::ConfigError(e.to_string()))?
        .filter_map(|device| {
            let name = device.name().ok()?;
            let config = device.default_input_config().ok()?;
            Some(InputDevice {
                is_default: default_name.as_ref() == Some(&name),
                name,
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
            })
        })
        .collect();

    if devices.is_empty() {
        return Err(MicError::NoDevices);
    }
    Ok(devices)
}

fn find_device(name: &str) -> Result<Device, MicError> {
    let host = cpal::default_host();
    if name == "default" {
        return host.default_input_device().ok_or(MicError::NoDevices);
    }

    host.input_devices()
        .map_err(|e| MicError::ConfigError(e.to_string()))?
        .find(|d| d.name().is_ok_and(|n| n == name))
        .ok_or_else(|| MicError::DeviceNotFound(name.to_string()))
}

/// Running capture stream; dropping it stops delivery
struct Capture {
    stop_flag: Arc<AtomicBool>,
    chunks: Receiver<Vec<f32>>,
    _stream: cpal::Stream,
}

impl Capture {
    /// Open `device_name` and stream mono chunks over a channel.
    /// Returns the capture and its sample rate.
    fn open(device_name: &str) -> Result<(Self, u32), MicError> {
        let device = find_device(device_name)?;
        let supported = device
            .default_input_config()
            .map_err(|e| MicError::ConfigError(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let config: StreamConfig = supported.clone().into();

        let stop_flag = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded::<Vec<f32>>(64);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, tx, stop_flag.clone()),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, tx, stop_flag.clone()),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, channels, tx, stop_flag.clone()),
            format => return Err(MicError::ConfigError(format!("Unsupported format: {:?}", format))),
        }?;

        stream.play().map_err(|e| MicError::StreamError(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "Microphone capture started"
        );

        Ok((Self { stop_flag, chunks: rx, _stream: stream }, sample_rate))
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    channels: u16,
    tx: Sender<Vec<f32>>,
    stop_flag: Arc<AtomicBool>,
) -> Result<cpal::Stream, MicError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = channels.max(1) as usize;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if stop_flag.load(Ordering::SeqCst) {
                    return;
                }
                let mono: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| {
                        frame.iter().map(|s| f32::from_sample_(*s)).sum::<f32>() / frame.len() as f32
                    })
                    .collect();
                let _ = tx.try_send(mono);
            },
            |err| error!("Input stream error: {}", err),
            None,
        )
        .map_err(|e| MicError::StreamError(e.to_string()))
}

/// Microphone as a spectrum source for beat detection.
///
/// Only one capture is held at a time; opening an open input is a no-op.
pub struct MicInput {
    device_name: String,
    capture: Option<Capture>,
    analyzer: SpectrumAnalyzer,
    received: bool,
}

impl std::fmt::Debug for MicInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicInput")
            .field("device", &self.device_name)
            .field("open", &self.capture.is_some())
            .finish()
    }
}

impl MicInput {
    /// `device_name` is a device name from [`list_devices`] or "default"
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            capture: None,
            analyzer: SpectrumAnalyzer::new(44100, DEFAULT_FFT_SIZE),
            received: false,
        }
    }
}

impl AudioInput for MicInput {
    fn open(&mut self) -> beatkeeper_core::Result<()> {
        if self.capture.is_some() {
            return Ok(());
        }
        let (capture, sample_rate) = Capture::open(&self.device_name)?;
        self.analyzer.set_sample_rate(sample_rate);
        self.received = false;
        self.capture = Some(capture);
        Ok(())
    }

    fn close(&mut self) {
        if self.capture.take().is_some() {
            info!("Microphone capture stopped");
        }
    }

    fn read_spectrum(&mut self, out: &mut Vec<f32>) -> bool {
        let Some(capture) = &self.capture else {
            return false;
        };
        for chunk in capture.chunks.try_iter() {
            self.analyzer.push_samples(&chunk);
            self.received = true;
        }
        if !self.received {
            return false;
        }

        out.clear();
        out.extend_from_slice(self.analyzer.analyze());
        true
    }

    fn bin_hz(&self) -> f32 {
        self.analyzer.bin_hz()
    }
}
