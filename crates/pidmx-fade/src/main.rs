//! pidmx-fade - fade a DMX512 channel from 0 to 255
//!
//! Sends a small frame with static channel values and ramps one channel up,
//! waiting for each frame to leave the wire before sending the next.
//!
//! ```bash
//! # Without hardware
//! pidmx-fade --config pidmx.toml --simulate
//!
//! # On a Raspberry Pi (as root)
//! cargo build --release --features pigpio
//! sudo ./target/release/pidmx-fade --config pidmx.toml --channel 3
//! ```

mod logging_setup;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pidmx::{DmxTransmitter, DriverConfig, SimProbe, SimulatedEngine, WaveformEngine};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Fade one DMX512 channel through a GPIO transmitter
#[derive(Parser, Debug)]
#[command(name = "pidmx-fade")]
#[command(version)]
#[command(about = "Fade one DMX512 channel through a GPIO transmitter")]
struct Cli {
    /// Driver configuration file
    #[arg(short, long, default_value = "pidmx.toml")]
    config: PathBuf,

    /// Use the simulated waveform engine instead of pigpio
    #[arg(long)]
    simulate: bool,

    /// Channel to fade (1-based)
    #[arg(long, default_value_t = 3)]
    channel: usize,

    /// Number of channels per frame
    #[arg(long, default_value_t = 5)]
    channels: usize,
}

/// Frame with channel 2 at half level, `fade` at `value` and everything else off
fn frame(channels: usize, fade: usize, value: u8) -> Vec<u8> {
    let mut data = vec![0u8; channels];
    if channels >= 2 {
        data[1] = 128;
    }
    data[fade - 1] = value;
    data
}

#[cfg(feature = "pigpio")]
fn hardware_engine() -> Result<Box<dyn WaveformEngine>> {
    Ok(Box::new(pidmx::PigpioEngine::new()))
}

#[cfg(not(feature = "pigpio"))]
fn hardware_engine() -> Result<Box<dyn WaveformEngine>> {
    bail!("built without pigpio support; rebuild with --features pigpio or pass --simulate")
}

async fn fade(
    dmx: &DmxTransmitter<Box<dyn WaveformEngine>>,
    cli: &Cli,
    probe: Option<&SimProbe>,
) -> Result<()> {
    let started = std::time::Instant::now();

    for value in 0..=255u8 {
        let data = frame(cli.channels, cli.channel, value);
        let report = dmx
            .transmit(&data)
            .context("Failed to start transmission")?
            .await
            .with_context(|| format!("Frame with channel {} = {} failed", cli.channel, value))?;

        debug!(
            "Frame {} sent: {} pulses in {:?}",
            value, report.pulses, report.elapsed
        );

        if let Some(probe) = probe {
            let pins = dmx.pins().context("Transmitter lost its configuration")?;
            let decoded = probe.last_frame(pins.tx, pins.invert_tx, dmx.timing().bit_unit_us);
            if decoded.as_deref() != Some(data.as_slice()) {
                warn!("Simulated frame {} decoded as {:?}", value, decoded);
            }
        }
    }

    info!("Fade finished in {:?}", started.elapsed());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = DriverConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {:?}", cli.config))?;

    logging_setup::init(&config.log)?;

    if cli.channels == 0 || cli.channels > pidmx::config::MAX_CHANNELS {
        bail!(
            "--channels must be between 1 and {}",
            pidmx::config::MAX_CHANNELS
        );
    }
    if cli.channel == 0 || cli.channel > cli.channels {
        bail!("--channel must be between 1 and {}", cli.channels);
    }

    let (engine, probe): (Box<dyn WaveformEngine>, Option<SimProbe>) = if cli.simulate {
        let engine = SimulatedEngine::new();
        let probe = engine.probe();
        (Box::new(engine), Some(probe))
    } else {
        (hardware_engine()?, None)
    };

    let dmx = DmxTransmitter::with_timing(engine, config.timing.clone())
        .context("Invalid timing configuration")?;
    dmx.init(config.pins)
        .context("Failed to initialise DMX transmitter")?;

    info!(
        "Fading channel {} of {} ({})",
        cli.channel,
        cli.channels,
        if cli.simulate { "simulated" } else { "pigpio" }
    );

    let result = tokio::select! {
        res = fade(&dmx, &cli, probe.as_ref()) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    dmx.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        assert_eq!(frame(5, 3, 42), vec![0, 128, 42, 0, 0]);
        assert_eq!(frame(1, 1, 7), vec![7]);
        // fading channel 2 overrides its static value
        assert_eq!(frame(3, 2, 9), vec![0, 9, 0]);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["pidmx-fade", "--simulate"]);
        assert!(cli.simulate);
        assert_eq!(cli.channel, 3);
        assert_eq!(cli.channels, 5);
        assert_eq!(cli.config, PathBuf::from("pidmx.toml"));
    }
}
