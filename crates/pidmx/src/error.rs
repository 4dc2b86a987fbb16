//! Error types for the DMX driver
use std::time::Duration;
use thiserror::Error;

/// Which of the two driver pins an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRole {
    /// Serial data output
    Tx,
    /// Line driver enable
    En,
}

impl std::fmt::Display for PinRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PinRole::Tx => write!(f, "TX"),
            PinRole::En => write!(f, "EN"),
        }
    }
}

/// Errors reported by a [`WaveformEngine`](crate::engine::WaveformEngine)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The GPIO number is not usable on this board
    #[error("bad GPIO {0}")]
    BadGpio(u8),

    /// The pin mode could not be applied
    #[error("bad mode for GPIO {0}")]
    BadMode(u8),

    /// Engine initialisation failed with the given status code
    #[error("initialisation failed ({0})")]
    InitFailed(i32),

    /// Waveform construction or playback failed with the given status code
    #[error("waveform error ({0})")]
    Wave(i32),

    /// The engine has not been initialised
    #[error("engine not initialised")]
    NotInitialised,
}

/// DMX driver errors
#[derive(Error, Debug)]
pub enum DmxError {
    /// `init` was called on a driver that is already configured
    #[error("driver has already been initialised")]
    AlreadyInitialized,

    /// An operation requires a configured driver
    #[error("driver has not been initialised yet")]
    NotInitialized,

    /// The waveform engine could not be started
    #[error("could not initialise waveform engine: {0}")]
    HardwareInitFailed(String),

    /// The pin number is not a valid GPIO
    #[error("bad {role} pin {pin}")]
    InvalidPin { role: PinRole, pin: u8 },

    /// The pin could not be switched to output mode
    #[error("cannot set {role} pin {pin} mode")]
    PinMode { role: PinRole, pin: u8 },

    /// TX and EN refer to the same GPIO
    #[error("EN and TX cannot be set to the same pin ({0})")]
    SamePin(u8),

    /// A previous transmission has not finished yet
    #[error("another transfer hasn't been finished yet")]
    Busy,

    /// Rejected channel data
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Failure inside the waveform engine during a transmission
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The transmission did not complete in time and was stopped
    #[error("transmission did not complete within {0:?}")]
    Timeout(Duration),

    /// The driver was closed while the transmission was in flight
    #[error("driver closed during transmission")]
    Closed,

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `transmit` needs a tokio runtime to run its completion task
    #[error("transmit must be called from within a tokio runtime")]
    NoRuntime,
}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DmxError>;
