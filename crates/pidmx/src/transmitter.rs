//! DMX512 transmission controller
//!
//! [`DmxTransmitter`] owns a [`WaveformEngine`] and the pin configuration. A
//! transmission goes through these steps:
//!
//! 1. check preconditions (configured, no transmission in flight)
//! 2. encode the channel data into a [`PulseSequence`]
//! 3. enable the line driver, upload the waveform and start one-shot playback
//! 4. on a blocking worker: sleep for the estimated frame time, then poll the
//!    engine's busy flag until playback has finished
//! 5. disable the line driver, delete the waveform and report to the caller
//!
//! Steps 1 to 3 run under the controller lock, so two callers can never both
//! pass the busy check. The controller stays [`TransmissionState::Busy`] until
//! step 5 is done.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

use crate::config::{check_gpio, validate_payload, PinConfiguration, TimingConfig};
use crate::enable::EnableLine;
use crate::engine::{PinMode, WaveId, WaveformEngine};
use crate::error::{DmxError, EngineError, PinRole, Result};
use crate::pulse::{PulseEncoder, PulseSequence};

/// Whether a frame is currently on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionState {
    Idle,
    Busy,
}

/// Outcome of a completed transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionReport {
    /// Channel bytes sent after the start code
    pub channels: usize,
    /// Pulses in the waveform
    pub pulses: usize,
    /// Nominal length of the waveform
    pub waveform: Duration,
    /// Time from submission until cleanup finished
    pub elapsed: Duration,
    /// Busy polls after the initial settle sleep
    pub polls: u32,
}

struct Inner<E> {
    engine: E,
    pins: Option<PinConfiguration>,
    state: TransmissionState,
    // bumped by init and close so stale workers leave the engine alone
    session: u64,
}

struct Shared<E> {
    inner: Mutex<Inner<E>>,
    timing: TimingConfig,
}

/// Work handed to the completion worker
struct Job {
    session: u64,
    wave: WaveId,
    enable: EnableLine,
    pulses: PulseSequence,
    channels: usize,
    submitted: Instant,
}

/// Drives DMX512 frames out of a GPIO pin
pub struct DmxTransmitter<E: WaveformEngine> {
    shared: Arc<Shared<E>>,
}

impl<E: WaveformEngine> Clone for DmxTransmitter<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: WaveformEngine> DmxTransmitter<E> {
    /// Create an unconfigured transmitter with default timing
    pub fn new(engine: E) -> Self {
        Self::build(engine, TimingConfig::default())
    }

    /// Create an unconfigured transmitter, rejecting out-of-range timing
    pub fn with_timing(engine: E, timing: TimingConfig) -> Result<Self> {
        timing.validate()?;
        Ok(Self::build(engine, timing))
    }

    fn build(engine: E, timing: TimingConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    engine,
                    pins: None,
                    state: TransmissionState::Idle,
                    session: 0,
                }),
                timing,
            }),
        }
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.shared.timing
    }

    pub fn pins(&self) -> Option<PinConfiguration> {
        self.shared.inner.lock().pins
    }

    pub fn is_initialised(&self) -> bool {
        self.shared.inner.lock().pins.is_some()
    }

    pub fn state(&self) -> TransmissionState {
        self.shared.inner.lock().state
    }

    /// Start the engine, configure both pins as outputs and park the line
    /// driver in its inactive state.
    ///
    /// Any failure after the engine has been started terminates it again, so
    /// the transmitter is left unconfigured and `init` can be retried.
    pub fn init(&self, pins: PinConfiguration) -> Result<()> {
        let mut inner = self.shared.inner.lock();

        if inner.pins.is_some() {
            return Err(DmxError::AlreadyInitialized);
        }

        inner
            .engine
            .initialise()
            .map_err(|e| DmxError::HardwareInitFailed(e.to_string()))?;

        if let Err(e) = configure_pins(&mut inner.engine, &pins) {
            warn!("Rolling back engine initialisation: {}", e);
            inner.engine.terminate();
            return Err(e);
        }

        inner.pins = Some(pins);
        inner.state = TransmissionState::Idle;
        inner.session += 1;

        info!(
            "DMX transmitter ready on TX {} / EN {} (invert tx={}, en={})",
            pins.tx, pins.en, pins.invert_tx, pins.invert_en
        );
        Ok(())
    }

    /// Start sending `data` as the channel values of one DMX512 frame.
    ///
    /// Precondition failures are returned immediately. Everything after that,
    /// including engine errors while submitting the waveform, is reported
    /// through the returned [`Transmission`]. Must be called from within a
    /// tokio runtime.
    pub fn transmit(&self, data: &[u8]) -> Result<Transmission> {
        let mut inner = self.shared.inner.lock();
        let pins = inner.pins.ok_or(DmxError::NotInitialized)?;
        validate_payload(data)?;

        if inner.state == TransmissionState::Busy || inner.engine.is_busy() {
            return Err(DmxError::Busy);
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| DmxError::NoRuntime)?;

        let encoder = PulseEncoder::new(pins.tx, pins.invert_tx, self.shared.timing.bit_unit_us)?;
        let pulses = encoder.encode(data);
        let enable = EnableLine::new(pins.en, pins.invert_en);

        let (tx, rx) = oneshot::channel();

        let wave = match submit(&mut inner.engine, &enable, &pulses) {
            Ok(wave) => wave,
            Err(e) => {
                error!("Failed to submit DMX waveform: {}", e);
                let _ = tx.send(Err(e.into()));
                return Ok(Transmission { rx });
            }
        };

        inner.state = TransmissionState::Busy;
        let job = Job {
            session: inner.session,
            wave,
            enable,
            pulses,
            channels: data.len(),
            submitted: Instant::now(),
        };
        drop(inner);

        debug!(
            "Submitted DMX frame: {} channels, {} pulses, {}us",
            job.channels,
            job.pulses.len(),
            job.pulses.total_duration_us()
        );

        let shared = Arc::clone(&self.shared);
        runtime.spawn_blocking(move || {
            let result = shared.complete(job);
            if let Err(e) = &result {
                warn!("DMX transmission failed: {}", e);
            }
            let _ = tx.send(result);
        });

        Ok(Transmission { rx })
    }

    /// Callback flavour of [`transmit`](Self::transmit).
    ///
    /// `on_complete` runs on the runtime once the frame has been sent, or
    /// with the error that stopped it.
    pub fn transmit_with<F>(&self, data: &[u8], on_complete: F) -> Result<()>
    where
        F: FnOnce(Result<TransmissionReport>) + Send + 'static,
    {
        let transmission = self.transmit(data)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| DmxError::NoRuntime)?;
        runtime.spawn(async move {
            on_complete(transmission.await);
        });
        Ok(())
    }

    /// Forget the configuration and shut the engine down.
    ///
    /// Safe to call at any time, including before `init` or twice in a row.
    /// A transmission in flight is stopped and resolves with
    /// [`DmxError::Closed`].
    pub fn close(&self) {
        let mut inner = self.shared.inner.lock();

        if inner.state == TransmissionState::Busy {
            inner.engine.stop();
            if let Some(pins) = inner.pins {
                let _ = EnableLine::new(pins.en, pins.invert_en).disable(&mut inner.engine);
            }
            warn!("DMX transmitter closed with a transmission in flight");
        }

        let was_configured = inner.pins.take().is_some();
        inner.state = TransmissionState::Idle;
        inner.session += 1;
        inner.engine.terminate();

        if was_configured {
            info!("DMX transmitter closed");
        }
    }
}

fn pin_error(role: PinRole, pin: u8, err: EngineError) -> DmxError {
    match err {
        EngineError::BadGpio(_) => DmxError::InvalidPin { role, pin },
        _ => DmxError::PinMode { role, pin },
    }
}

fn configure_pins<E: WaveformEngine>(engine: &mut E, pins: &PinConfiguration) -> Result<()> {
    if pins.tx == pins.en {
        return Err(DmxError::SamePin(pins.tx));
    }

    for (role, pin) in [(PinRole::Tx, pins.tx), (PinRole::En, pins.en)] {
        check_gpio(role, pin)?;
        engine
            .set_mode(pin, PinMode::Output)
            .map_err(|e| pin_error(role, pin, e))?;
    }

    EnableLine::new(pins.en, pins.invert_en)
        .disable(engine)
        .map_err(|e| pin_error(PinRole::En, pins.en, e))
}

fn submit<E: WaveformEngine>(
    engine: &mut E,
    enable: &EnableLine,
    pulses: &PulseSequence,
) -> std::result::Result<WaveId, EngineError> {
    enable.enable(engine)?;

    let wave = match engine.create_waveform(pulses) {
        Ok(wave) => wave,
        Err(e) => {
            let _ = enable.disable(engine);
            return Err(e);
        }
    };

    if let Err(e) = engine.send_once(wave) {
        let _ = enable.disable(engine);
        engine.delete_waveform(wave);
        return Err(e);
    }

    Ok(wave)
}

impl<E: WaveformEngine> Shared<E> {
    /// Wait for playback to end, then release the line driver and the waveform
    fn complete(&self, job: Job) -> Result<TransmissionReport> {
        std::thread::sleep(self.timing.settle_time(job.pulses.len()));

        let poll_interval = self.timing.poll_interval();
        let timeout = self.timing.completion_timeout();
        let mut polls = 0u32;
        let mut timed_out = None;

        loop {
            {
                let mut inner = self.inner.lock();
                if inner.session != job.session {
                    return Err(DmxError::Closed);
                }
                if !inner.engine.is_busy() {
                    break;
                }
                if let Some(limit) = timeout {
                    if job.submitted.elapsed() >= limit {
                        inner.engine.stop();
                        timed_out = Some(limit);
                        break;
                    }
                }
            }
            polls += 1;
            trace!("DMX waveform still playing (poll {})", polls);
            std::thread::sleep(poll_interval);
        }

        let mut inner = self.inner.lock();
        if inner.session != job.session {
            return Err(DmxError::Closed);
        }
        let disabled = job.enable.disable(&mut inner.engine);
        inner.engine.delete_waveform(job.wave);
        inner.state = TransmissionState::Idle;
        drop(inner);

        let report = TransmissionReport {
            channels: job.channels,
            pulses: job.pulses.len(),
            waveform: Duration::from_micros(job.pulses.total_duration_us()),
            elapsed: job.submitted.elapsed(),
            polls,
        };
        drop(job.pulses);

        if let Some(limit) = timed_out {
            return Err(DmxError::Timeout(limit));
        }
        disabled?;

        debug!(
            "DMX frame done after {:?} ({} polls)",
            report.elapsed, report.polls
        );
        Ok(report)
    }
}

/// Pending transmission, resolves once the frame has left the wire
#[must_use = "a transmission reports its result only when awaited"]
pub struct Transmission {
    rx: oneshot::Receiver<Result<TransmissionReport>>,
}

impl Transmission {
    /// Block the current thread until the transmission has finished.
    ///
    /// Must not be called from within an async context.
    pub fn wait_blocking(self) -> Result<TransmissionReport> {
        self.rx.blocking_recv().unwrap_or(Err(DmxError::Closed))
    }
}

impl Future for Transmission {
    type Output = Result<TransmissionReport>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // worker went away without reporting
            Poll::Ready(Err(_)) => Poll::Ready(Err(DmxError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
