//! beatkeeper: terminal metronome with microphone tempo detection

mod app;
mod commands;
mod config;
mod render;

use std::path::PathBuf;

use beatkeeper_core::{Subdivision, TimeSignature, Timbre};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "beatkeeper", about = "Metronome with tap tempo and beat detection")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Mode>,
}

/// Settings that override the config file for this run
#[derive(clap::Args, Default)]
struct Overrides {
    #[arg(long)]
    tempo: Option<i32>,
    #[arg(long)]
    signature: Option<TimeSignature>,
    #[arg(long)]
    subdivision: Option<Subdivision>,
    #[arg(long)]
    timbre: Option<Timbre>,
}

impl Overrides {
    fn apply(self, settings: &mut beatkeeper_core::ClockSettings) {
        if let Some(tempo) = self.tempo {
            settings.tempo = tempo;
        }
        if let Some(signature) = self.signature {
            settings.time_signature = signature;
        }
        if let Some(subdivision) = self.subdivision {
            settings.subdivision = subdivision;
        }
        if let Some(timbre) = self.timbre {
            settings.timbre = timbre;
        }
    }
}

#[derive(Subcommand)]
enum Mode {
    /// Interactive metronome (default)
    Run {
        /// Input device for beat detection
        #[arg(long, default_value = "default")]
        device: String,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Render a click track to a WAV file
    Render {
        output: PathBuf,
        #[arg(long, default_value_t = 8)]
        bars: u32,
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// List audio input devices
    Devices,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("beatkeeper=info".parse()?)
                .add_directive("cpal=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::config_path);
    let mut config = config::load_config(&config_path);

    match cli.command.unwrap_or(Mode::Run { device: "default".into(), overrides: Overrides::default() }) {
        Mode::Run { device, overrides } => {
            overrides.apply(&mut config.metronome);
            tracing::info!(config = %config_path.display(), "Starting beatkeeper");
            let (session, timers) = app::Session::new(&config, config_path, &device);
            app::run(session, timers)
        }
        Mode::Render { output, bars, sample_rate, overrides } => {
            overrides.apply(&mut config.metronome);
            let samples = render::render_click_track(&config.metronome, bars, sample_rate);
            render::write_wav(&output, &samples, sample_rate)
        }
        Mode::Devices => {
            match beatkeeper_services::list_devices() {
                Ok(devices) => {
                    for device in devices {
                        let marker = if device.is_default { " (default)" } else { "" };
                        println!(
                            "{}{} - {} Hz, {} ch",
                            device.name, marker, device.sample_rate, device.channels
                        );
                    }
                }
                Err(e) => println!("{e}"),
            }
            Ok(())
        }
    }
}
