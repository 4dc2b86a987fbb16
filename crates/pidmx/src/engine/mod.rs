//! Waveform playback engines
//!
//! The transmitter never touches hardware directly. Everything goes through
//! [`WaveformEngine`], which mirrors the small part of the pigpio API used for
//! DMA waveform playback:
//!
//! - pin mode and level control
//! - building a waveform from [`Pulse`]s and playing it once
//! - polling the busy flag and deleting the waveform afterwards
//!
//! [`SimulatedEngine`] runs anywhere and records everything it is asked to do.
//! `PigpioEngine` (feature `pigpio`) drives a Raspberry Pi through libpigpio.

pub mod sim;

#[cfg(feature = "pigpio")]
pub mod pigpio;

use crate::error::EngineError;
use crate::pulse::Pulse;

pub use sim::{SimEvent, SimProbe, SimulatedEngine};

#[cfg(feature = "pigpio")]
pub use pigpio::PigpioEngine;

/// GPIO direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// Handle to a waveform stored in the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaveId(pub u32);

/// Hardware waveform playback
pub trait WaveformEngine: Send + 'static {
    /// Start the engine. Must succeed before any other call.
    fn initialise(&mut self) -> Result<(), EngineError>;

    /// Stop the engine and release the hardware. Safe to call when not running.
    fn terminate(&mut self);

    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), EngineError>;

    /// Drive `pin` high or low
    fn write(&mut self, pin: u8, high: bool) -> Result<(), EngineError>;

    /// Upload a pulse train and return a handle for playback
    fn create_waveform(&mut self, pulses: &[Pulse]) -> Result<WaveId, EngineError>;

    /// Play a waveform exactly once
    fn send_once(&mut self, wave: WaveId) -> Result<(), EngineError>;

    /// Whether a waveform is still playing
    fn is_busy(&self) -> bool;

    /// Abort the current playback
    fn stop(&mut self);

    fn delete_waveform(&mut self, wave: WaveId);
}

impl<E: WaveformEngine + ?Sized> WaveformEngine for Box<E> {
    fn initialise(&mut self) -> Result<(), EngineError> {
        (**self).initialise()
    }

    fn terminate(&mut self) {
        (**self).terminate()
    }

    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), EngineError> {
        (**self).set_mode(pin, mode)
    }

    fn write(&mut self, pin: u8, high: bool) -> Result<(), EngineError> {
        (**self).write(pin, high)
    }

    fn create_waveform(&mut self, pulses: &[Pulse]) -> Result<WaveId, EngineError> {
        (**self).create_waveform(pulses)
    }

    fn send_once(&mut self, wave: WaveId) -> Result<(), EngineError> {
        (**self).send_once(wave)
    }

    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn delete_waveform(&mut self, wave: WaveId) {
        (**self).delete_waveform(wave)
    }
}
