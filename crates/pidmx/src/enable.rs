//! Line driver enable pin

use crate::engine::WaveformEngine;
use crate::error::EngineError;

/// Switches the RS-485 transceiver between driving and idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableLine {
    pin: u8,
    invert: bool,
}

impl EnableLine {
    pub fn new(pin: u8, invert: bool) -> Self {
        Self { pin, invert }
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Physical level that turns the driver on
    pub fn active_level(&self) -> bool {
        !self.invert
    }

    pub fn enable<E: WaveformEngine + ?Sized>(&self, engine: &mut E) -> Result<(), EngineError> {
        engine.write(self.pin, self.active_level())
    }

    pub fn disable<E: WaveformEngine + ?Sized>(&self, engine: &mut E) -> Result<(), EngineError> {
        engine.write(self.pin, !self.active_level())
    }
}
