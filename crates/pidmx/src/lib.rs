//! pidmx - DMX512 output over a single GPIO pin
//!
//! This crate turns a buffer of channel values into a DMX512 frame and plays
//! it out of a GPIO pin through a DMA waveform engine, switching an RS-485
//! line driver on for the duration of the frame.
//!
//! - **Pulse encoding**: break, mark-after-break, start code and 8N2 framed
//!   channel bytes as timed GPIO pulses
//! - **Transmission**: one frame in flight at a time, completion reported
//!   through a future or a callback
//! - **Engines**: a simulated engine for tests and development, and a
//!   libpigpio backend for the Raspberry Pi (`pigpio` feature)
//!
//! ## Feature Flags
//!
//! - `pigpio`: Enable the libpigpio engine (links against `libpigpio`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pidmx::{DmxTransmitter, PinConfiguration, SimulatedEngine};
//!
//! # async fn run() -> pidmx::Result<()> {
//! let dmx = DmxTransmitter::new(SimulatedEngine::new());
//! dmx.init(PinConfiguration::new(22, 27).with_inversion(true, true))?;
//!
//! let report = dmx.transmit(&[0, 128, 255, 0, 0])?.await?;
//! println!("frame took {:?}", report.elapsed);
//!
//! dmx.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`pulse`] - Pulse train encoder and decoder
//! - [`enable`] - Line driver enable pin
//! - [`engine`] - Waveform engine trait and backends
//! - [`transmitter`] - Transmission controller
//! - [`config`] - Pin, timing and logging configuration
//! - [`error`] - Error types

pub mod config;
pub mod enable;
pub mod engine;
pub mod error;
pub mod pulse;
pub mod transmitter;

pub use config::{DriverConfig, LogConfig, PinConfiguration, TimingConfig};
pub use enable::EnableLine;
pub use engine::{PinMode, SimProbe, SimulatedEngine, WaveId, WaveformEngine};
pub use error::{DmxError, EngineError, PinRole, Result};
pub use pulse::{Level, Pulse, PulseEncoder, PulseSequence};
pub use transmitter::{DmxTransmitter, Transmission, TransmissionReport, TransmissionState};

#[cfg(feature = "pigpio")]
pub use engine::PigpioEngine;
