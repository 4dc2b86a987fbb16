//! DMX512 pulse train encoding
//!
//! A frame is built from timed level changes on a single TX pin:
//!
//! | Segment          | Level | Duration |
//! |------------------|-------|----------|
//! | Break            | space | 22 U     |
//! | Mark after break | mark  | 2 U      |
//! | Start code 0x00  | space | 9 U      |
//! | Stop bits        | mark  | 2 U      |
//! | Per channel byte | 1 start (space) + 8 data bits LSB first + 2 stop (mark) | 11 U |
//!
//! With the default unit of 4µs the data bits run at 250 kbit/s.

use std::ops::Deref;

use crate::config::{check_bit_unit, check_gpio};
use crate::error::{PinRole, Result};

/// Units taken by break, mark-after-break and the start code frame
pub const PREFIX_UNITS: u32 = 22 + 2 + 9 + 2;

/// Units taken by one UART-framed channel byte
pub const BYTE_UNITS: u32 = 1 + 8 + 2;

/// Pulses emitted before the first channel byte
pub const PREFIX_PULSES: usize = 4;

/// Pulses emitted per channel byte
pub const BYTE_PULSES: usize = 10;

/// Logical line level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Idle level, logical 1
    Mark,
    /// Active level, logical 0
    Space,
}

impl Level {
    fn from_bit(bit: bool) -> Self {
        if bit {
            Level::Mark
        } else {
            Level::Space
        }
    }
}

/// One timed GPIO change, identical in layout to pigpio's `gpioPulse_t`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// GPIOs driven high at the start of the pulse
    pub set_mask: u32,
    /// GPIOs driven low at the start of the pulse
    pub clear_mask: u32,
    /// Time until the next pulse
    pub duration_us: u32,
}

impl Pulse {
    /// Physical level this pulse puts on `pin`, if it touches it
    pub fn drives_high(&self, pin: u8) -> Option<bool> {
        let bit = 1u32.checked_shl(pin as u32)?;
        if self.set_mask & bit != 0 {
            Some(true)
        } else if self.clear_mask & bit != 0 {
            Some(false)
        } else {
            None
        }
    }
}

/// Owned pulse train for one transmission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PulseSequence {
    pulses: Vec<Pulse>,
}

impl PulseSequence {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pulses: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, pulse: Pulse) {
        self.pulses.push(pulse);
    }

    pub fn as_slice(&self) -> &[Pulse] {
        &self.pulses
    }

    /// Sum of all pulse durations
    pub fn total_duration_us(&self) -> u64 {
        self.pulses.iter().map(|p| p.duration_us as u64).sum()
    }

    pub fn into_vec(self) -> Vec<Pulse> {
        self.pulses
    }
}

impl Deref for PulseSequence {
    type Target = [Pulse];

    fn deref(&self) -> &[Pulse] {
        &self.pulses
    }
}

impl<'a> IntoIterator for &'a PulseSequence {
    type Item = &'a Pulse;
    type IntoIter = std::slice::Iter<'a, Pulse>;

    fn into_iter(self) -> Self::IntoIter {
        self.pulses.iter()
    }
}

/// Number of pulses [`PulseEncoder::encode`] produces for `len` channel bytes
pub fn pulse_count(len: usize) -> usize {
    PREFIX_PULSES + BYTE_PULSES * len
}

/// Maps channel data to a DMX512 pulse train on one TX pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseEncoder {
    tx_pin: u8,
    invert_tx: bool,
    bit_unit_us: u32,
}

impl PulseEncoder {
    /// Fails if `tx_pin` does not fit in a pulse mask or the bit unit is out of range
    pub fn new(tx_pin: u8, invert_tx: bool, bit_unit_us: u32) -> Result<Self> {
        check_gpio(PinRole::Tx, tx_pin)?;
        check_bit_unit(bit_unit_us)?;
        Ok(Self {
            tx_pin,
            invert_tx,
            bit_unit_us,
        })
    }

    fn pulse(&self, level: Level, units: u32) -> Pulse {
        let mask = 1u32 << self.tx_pin;
        // invert_tx swaps which physical level represents mark
        let high = (level == Level::Mark) != self.invert_tx;
        Pulse {
            set_mask: if high { mask } else { 0 },
            clear_mask: if high { 0 } else { mask },
            duration_us: units * self.bit_unit_us,
        }
    }

    /// Encode `data` as break, mark-after-break, start code 0x00 and the channel bytes
    pub fn encode(&self, data: &[u8]) -> PulseSequence {
        let mut seq = PulseSequence::with_capacity(pulse_count(data.len()));

        seq.push(self.pulse(Level::Space, 22));
        seq.push(self.pulse(Level::Mark, 2));
        // start bit and eight zero bits merged into one low
        seq.push(self.pulse(Level::Space, 9));
        seq.push(self.pulse(Level::Mark, 2));

        for &byte in data {
            seq.push(self.pulse(Level::Space, 1));
            for bit in 0..8 {
                seq.push(self.pulse(Level::from_bit(byte & (1 << bit) != 0), 1));
            }
            seq.push(self.pulse(Level::Mark, 2));
        }

        seq
    }
}

/// Recover the channel bytes from a pulse train.
///
/// Samples the TX level in the middle of every bit window after the frame
/// prefix. Returns `None` if the timing does not add up to whole frames or a
/// start/stop bit has the wrong level.
pub fn decode(pulses: &[Pulse], tx_pin: u8, invert_tx: bool, bit_unit_us: u32) -> Option<Vec<u8>> {
    if bit_unit_us == 0 {
        return None;
    }

    // Timeline in half microseconds so odd units have an exact midpoint
    let mut ends = Vec::with_capacity(pulses.len());
    let mut levels = Vec::with_capacity(pulses.len());
    let mut t = 0u64;
    let mut high = false;
    for pulse in pulses {
        if let Some(h) = pulse.drives_high(tx_pin) {
            high = h;
        }
        t += 2 * pulse.duration_us as u64;
        ends.push(t);
        levels.push(if high != invert_tx {
            Level::Mark
        } else {
            Level::Space
        });
    }

    let unit = 2 * bit_unit_us as u64;
    let prefix = PREFIX_UNITS as u64 * unit;
    let frame = BYTE_UNITS as u64 * unit;
    if t < prefix || (t - prefix) % frame != 0 {
        return None;
    }

    let level_at = |time: u64| -> Level {
        let idx = ends.partition_point(|&end| end <= time);
        levels[idx.min(levels.len() - 1)]
    };

    if level_at(unit / 2) != Level::Space || level_at(23 * unit - unit / 2) != Level::Mark {
        return None;
    }

    let count = ((t - prefix) / frame) as usize;
    let mut bytes = Vec::with_capacity(count);
    for k in 0..count as u64 {
        let start = prefix + k * frame;
        let mid = |slot: u64| start + slot * unit + unit / 2;

        if level_at(mid(0)) != Level::Space || level_at(mid(9)) != Level::Mark {
            return None;
        }

        let mut byte = 0u8;
        for bit in 0..8 {
            if level_at(mid(1 + bit)) == Level::Mark {
                byte |= 1 << bit;
            }
        }
        bytes.push(byte);
    }

    Some(bytes)
}
