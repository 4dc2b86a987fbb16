//! In-memory waveform engine
//!
//! Plays waveforms against the wall clock: after `send_once` the engine reports
//! busy for the waveform's total duration. Every call is logged and can be
//! inspected through a [`SimProbe`], which stays valid after the engine has
//! been moved into a transmitter.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{PinMode, WaveId, WaveformEngine};
use crate::error::EngineError;
use crate::pulse::{self, Pulse};

/// A call made against the simulated engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Initialise,
    Terminate,
    SetMode { pin: u8, mode: PinMode },
    Write { pin: u8, high: bool },
    CreateWaveform { wave: WaveId, pulses: usize },
    Send { wave: WaveId },
    Stop,
    Delete { wave: WaveId },
}

#[derive(Debug, Default)]
struct SimState {
    running: bool,
    modes: HashMap<u8, PinMode>,
    levels: HashMap<u8, bool>,
    waves: HashMap<WaveId, Vec<Pulse>>,
    next_wave: u32,
    playing: Option<(Instant, Duration)>,
    hold_busy: bool,
    events: Vec<SimEvent>,
    sent: Vec<Vec<Pulse>>,

    fail_initialise: bool,
    fail_waveforms: bool,
    bad_gpio: HashSet<u8>,
    bad_mode: HashSet<u8>,
}

impl SimState {
    fn busy(&self) -> bool {
        self.hold_busy
            || self
                .playing
                .map_or(false, |(start, length)| start.elapsed() < length)
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.running {
            Ok(())
        } else {
            Err(EngineError::NotInitialised)
        }
    }
}

/// Software stand-in for the DMA waveform engine
#[derive(Debug, Default)]
pub struct SimulatedEngine {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `initialise` fail
    pub fn failing_initialise(self) -> Self {
        self.state.lock().fail_initialise = true;
        self
    }

    /// Make waveform creation fail
    pub fn failing_waveforms(self) -> Self {
        self.state.lock().fail_waveforms = true;
        self
    }

    /// Reject `pin` as a non-existent GPIO
    pub fn with_bad_gpio(self, pin: u8) -> Self {
        self.state.lock().bad_gpio.insert(pin);
        self
    }

    /// Refuse to change the mode of `pin`
    pub fn with_bad_mode(self, pin: u8) -> Self {
        self.state.lock().bad_mode.insert(pin);
        self
    }

    /// Handle for inspecting the engine after it has been handed off
    pub fn probe(&self) -> SimProbe {
        SimProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl WaveformEngine for SimulatedEngine {
    fn initialise(&mut self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.events.push(SimEvent::Initialise);
        if state.fail_initialise {
            return Err(EngineError::InitFailed(-1));
        }
        state.running = true;
        Ok(())
    }

    fn terminate(&mut self) {
        let mut state = self.state.lock();
        state.events.push(SimEvent::Terminate);
        state.running = false;
        state.playing = None;
        state.waves.clear();
        state.modes.clear();
    }

    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        state.events.push(SimEvent::SetMode { pin, mode });
        if state.bad_gpio.contains(&pin) {
            return Err(EngineError::BadGpio(pin));
        }
        if state.bad_mode.contains(&pin) {
            return Err(EngineError::BadMode(pin));
        }
        state.modes.insert(pin, mode);
        Ok(())
    }

    fn write(&mut self, pin: u8, high: bool) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        if state.bad_gpio.contains(&pin) {
            return Err(EngineError::BadGpio(pin));
        }
        state.events.push(SimEvent::Write { pin, high });
        state.levels.insert(pin, high);
        Ok(())
    }

    fn create_waveform(&mut self, pulses: &[Pulse]) -> Result<WaveId, EngineError> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        if state.fail_waveforms {
            return Err(EngineError::Wave(-1));
        }
        let wave = WaveId(state.next_wave);
        state.next_wave += 1;
        state.waves.insert(wave, pulses.to_vec());
        state.events.push(SimEvent::CreateWaveform {
            wave,
            pulses: pulses.len(),
        });
        Ok(wave)
    }

    fn send_once(&mut self, wave: WaveId) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        let pulses = state
            .waves
            .get(&wave)
            .cloned()
            .ok_or(EngineError::Wave(-2))?;
        let length: u64 = pulses.iter().map(|p| p.duration_us as u64).sum();

        // the last pulse of each mask leaves its level on the pin
        for p in &pulses {
            for pin in 0..32u8 {
                if let Some(high) = p.drives_high(pin) {
                    state.levels.insert(pin, high);
                }
            }
        }

        state.events.push(SimEvent::Send { wave });
        state.sent.push(pulses);
        state.playing = Some((Instant::now(), Duration::from_micros(length)));
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.state.lock().busy()
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.events.push(SimEvent::Stop);
        state.playing = None;
        state.hold_busy = false;
    }

    fn delete_waveform(&mut self, wave: WaveId) {
        let mut state = self.state.lock();
        state.events.push(SimEvent::Delete { wave });
        state.waves.remove(&wave);
    }
}

/// Read access to a [`SimulatedEngine`]'s state
#[derive(Debug, Clone)]
pub struct SimProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimProbe {
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().busy()
    }

    /// Last level written to `pin`
    pub fn level(&self, pin: u8) -> Option<bool> {
        self.state.lock().levels.get(&pin).copied()
    }

    pub fn mode(&self, pin: u8) -> Option<PinMode> {
        self.state.lock().modes.get(&pin).copied()
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state.lock().events.clone()
    }

    /// Waveforms created but not yet deleted
    pub fn live_waveforms(&self) -> usize {
        self.state.lock().waves.len()
    }

    /// Every waveform played so far, oldest first
    pub fn sent_waveforms(&self) -> Vec<Vec<Pulse>> {
        self.state.lock().sent.clone()
    }

    pub fn last_waveform(&self) -> Option<Vec<Pulse>> {
        self.state.lock().sent.last().cloned()
    }

    /// Channel data of the last waveform played
    pub fn last_frame(&self, tx_pin: u8, invert_tx: bool, bit_unit_us: u32) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let pulses = state.sent.last()?;
        pulse::decode(pulses, tx_pin, invert_tx, bit_unit_us)
    }

    /// Keep reporting busy regardless of playback, until released or stopped
    pub fn hold_busy(&self, hold: bool) {
        self.state.lock().hold_busy = hold;
    }
}
