//! libpigpio backend
//!
//! Needs a Raspberry Pi, libpigpio installed and root privileges. Only one
//! process on the machine may hold the library at a time.

use std::os::raw::{c_int, c_uint};

use super::{PinMode, WaveId, WaveformEngine};
use crate::error::EngineError;
use crate::pulse::Pulse;

const PI_INPUT: c_uint = 0;
const PI_OUTPUT: c_uint = 1;
const PI_WAVE_MODE_ONE_SHOT: c_uint = 0;

const PI_BAD_GPIO: c_int = -3;
const PI_BAD_MODE: c_int = -4;

#[link(name = "pigpio")]
extern "C" {
    fn gpioInitialise() -> c_int;
    fn gpioTerminate();
    fn gpioSetMode(gpio: c_uint, mode: c_uint) -> c_int;
    fn gpioWrite(gpio: c_uint, level: c_uint) -> c_int;
    // `Pulse` is #[repr(C)] with the same field order as gpioPulse_t
    fn gpioWaveAddGeneric(num_pulses: c_uint, pulses: *const Pulse) -> c_int;
    fn gpioWaveCreate() -> c_int;
    fn gpioWaveClear() -> c_int;
    fn gpioWaveTxSend(wave_id: c_uint, wave_mode: c_uint) -> c_int;
    fn gpioWaveTxBusy() -> c_int;
    fn gpioWaveTxStop() -> c_int;
    fn gpioWaveDelete(wave_id: c_uint) -> c_int;
}

fn pin_error(pin: u8, code: c_int) -> EngineError {
    match code {
        PI_BAD_GPIO => EngineError::BadGpio(pin),
        PI_BAD_MODE => EngineError::BadMode(pin),
        other => EngineError::Wave(other),
    }
}

/// Waveform engine backed by the pigpio C library
#[derive(Debug, Default)]
pub struct PigpioEngine {
    running: bool,
}

impl PigpioEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaveformEngine for PigpioEngine {
    fn initialise(&mut self) -> Result<(), EngineError> {
        // SAFETY: no preconditions; pigpio refuses a second instance itself
        let version = unsafe { gpioInitialise() };
        if version < 0 {
            return Err(EngineError::InitFailed(version));
        }
        tracing::debug!("pigpio version {}", version);
        self.running = true;
        Ok(())
    }

    fn terminate(&mut self) {
        // SAFETY: gpioTerminate is a no-op when the library is not initialised
        unsafe { gpioTerminate() };
        self.running = false;
    }

    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), EngineError> {
        if !self.running {
            return Err(EngineError::NotInitialised);
        }
        let mode = match mode {
            PinMode::Input => PI_INPUT,
            PinMode::Output => PI_OUTPUT,
        };
        // SAFETY: arguments are plain integers, validated by the library
        let rc = unsafe { gpioSetMode(pin as c_uint, mode) };
        if rc < 0 {
            return Err(pin_error(pin, rc));
        }
        Ok(())
    }

    fn write(&mut self, pin: u8, high: bool) -> Result<(), EngineError> {
        if !self.running {
            return Err(EngineError::NotInitialised);
        }
        // SAFETY: arguments are plain integers, validated by the library
        let rc = unsafe { gpioWrite(pin as c_uint, high as c_uint) };
        if rc < 0 {
            return Err(pin_error(pin, rc));
        }
        Ok(())
    }

    fn create_waveform(&mut self, pulses: &[Pulse]) -> Result<WaveId, EngineError> {
        if !self.running {
            return Err(EngineError::NotInitialised);
        }
        // SAFETY: the pointer and length come from a live slice; pigpio copies
        // the pulses before returning
        let rc = unsafe { gpioWaveAddGeneric(pulses.len() as c_uint, pulses.as_ptr()) };
        if rc < 0 {
            unsafe { gpioWaveClear() };
            return Err(EngineError::Wave(rc));
        }
        // SAFETY: no arguments
        let id = unsafe { gpioWaveCreate() };
        if id < 0 {
            // drop the pending pulses so the next frame starts from an empty wave
            unsafe { gpioWaveClear() };
            return Err(EngineError::Wave(id));
        }
        Ok(WaveId(id as u32))
    }

    fn send_once(&mut self, wave: WaveId) -> Result<(), EngineError> {
        // SAFETY: invalid ids are rejected by the library
        let rc = unsafe { gpioWaveTxSend(wave.0 as c_uint, PI_WAVE_MODE_ONE_SHOT) };
        if rc < 0 {
            return Err(EngineError::Wave(rc));
        }
        Ok(())
    }

    fn is_busy(&self) -> bool {
        // SAFETY: no arguments
        self.running && unsafe { gpioWaveTxBusy() } == 1
    }

    fn stop(&mut self) {
        if self.running {
            // SAFETY: no arguments
            unsafe { gpioWaveTxStop() };
        }
    }

    fn delete_waveform(&mut self, wave: WaveId) {
        if self.running {
            // SAFETY: invalid ids are rejected by the library
            let rc = unsafe { gpioWaveDelete(wave.0 as c_uint) };
            if rc < 0 {
                tracing::warn!("gpioWaveDelete({}) failed: {}", wave.0, rc);
            }
        }
    }
}
