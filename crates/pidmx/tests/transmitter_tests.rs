use pidmx::{
    engine::SimEvent, DmxError, DmxTransmitter, EngineError, PinConfiguration, SimProbe,
    SimulatedEngine, TimingConfig, TransmissionState,
};
use std::time::Duration;

const TX: u8 = 22;
const EN: u8 = 27;

fn ready(engine: SimulatedEngine) -> (DmxTransmitter<SimulatedEngine>, SimProbe) {
    let probe = engine.probe();
    let dmx = DmxTransmitter::new(engine);
    dmx.init(PinConfiguration::new(TX, EN)).unwrap();
    (dmx, probe)
}

#[tokio::test]
async fn test_transmit_before_init() {
    let dmx = DmxTransmitter::new(SimulatedEngine::new());
    assert!(matches!(dmx.transmit(&[0]), Err(DmxError::NotInitialized)));
}

#[tokio::test]
async fn test_empty_payload_before_init() {
    let dmx = DmxTransmitter::new(SimulatedEngine::new());
    assert!(matches!(dmx.transmit(&[]), Err(DmxError::NotInitialized)));
    assert!(matches!(
        dmx.transmit(&[0u8; 513]),
        Err(DmxError::NotInitialized)
    ));
}

#[tokio::test]
async fn test_oversized_bit_unit_rejected_before_transmit() {
    let timing = TimingConfig {
        bit_unit_us: 200_000_000,
        ..TimingConfig::default()
    };
    assert!(matches!(
        DmxTransmitter::with_timing(SimulatedEngine::new(), timing),
        Err(DmxError::Config(_))
    ));
}

#[tokio::test]
async fn test_payload_size_limits() {
    let (dmx, probe) = ready(SimulatedEngine::new());
    assert!(matches!(dmx.transmit(&[]), Err(DmxError::InvalidPayload(_))));
    assert!(matches!(
        dmx.transmit(&[0u8; 513]),
        Err(DmxError::InvalidPayload(_))
    ));
    assert!(probe.sent_waveforms().is_empty());

    let report = dmx.transmit(&[0xAA; 512]).unwrap().await.unwrap();
    assert_eq!(report.channels, 512);
    assert_eq!(report.pulses, 4 + 10 * 512);
    assert_eq!(probe.last_frame(TX, false, 4), Some(vec![0xAA; 512]));
}

#[tokio::test]
async fn test_second_transmit_while_busy() {
    let (dmx, probe) = ready(SimulatedEngine::new());
    probe.hold_busy(true);

    let first = dmx.transmit(&[1, 2, 3]).unwrap();
    assert_eq!(dmx.state(), TransmissionState::Busy);
    assert!(matches!(dmx.transmit(&[9, 9, 9]), Err(DmxError::Busy)));

    probe.hold_busy(false);
    let report = first.await.unwrap();
    assert_eq!(report.channels, 3);

    // only the first frame reached the engine
    assert_eq!(probe.sent_waveforms().len(), 1);
    assert_eq!(probe.last_frame(TX, false, 4), Some(vec![1, 2, 3]));
    assert_eq!(dmx.state(), TransmissionState::Idle);
}

#[tokio::test]
async fn test_polls_until_engine_idle() {
    let (dmx, probe) = ready(SimulatedEngine::new());
    probe.hold_busy(true);

    let pending = dmx.transmit(&[1]).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(probe.level(EN), Some(true));
    probe.hold_busy(false);

    let report = pending.await.unwrap();
    assert!(report.polls > 0);
    assert!(report.elapsed >= Duration::from_millis(5));
    assert_eq!(probe.level(EN), Some(false));
}

#[tokio::test]
async fn test_busy_until_cleanup_done() {
    let (dmx, _probe) = ready(SimulatedEngine::new());
    let first = dmx.transmit(&[0; 16]).unwrap();
    // the worker still owns the frame even if playback were already over
    assert!(matches!(dmx.transmit(&[0; 16]), Err(DmxError::Busy)));
    first.await.unwrap();
    dmx.transmit(&[0; 16]).unwrap().await.unwrap();
}

#[tokio::test]
async fn test_engine_busy_from_elsewhere() {
    let (dmx, probe) = ready(SimulatedEngine::new());
    probe.hold_busy(true);
    assert!(matches!(dmx.transmit(&[1]), Err(DmxError::Busy)));
    assert_eq!(dmx.state(), TransmissionState::Idle);
}

#[tokio::test]
async fn test_submission_failure_is_reported() {
    let (dmx, probe) = ready(SimulatedEngine::new().failing_waveforms());

    let result = dmx.transmit(&[1, 2]).unwrap().await;
    assert!(matches!(
        result,
        Err(DmxError::Engine(EngineError::Wave(_)))
    ));

    // driver released again and ready for the next frame
    assert_eq!(probe.level(EN), Some(false));
    assert_eq!(dmx.state(), TransmissionState::Idle);
    assert!(probe.sent_waveforms().is_empty());
}

#[tokio::test]
async fn test_completion_timeout_stops_playback() {
    let engine = SimulatedEngine::new();
    let probe = engine.probe();
    let timing = TimingConfig {
        completion_timeout_ms: Some(5),
        ..TimingConfig::default()
    };
    let dmx = DmxTransmitter::with_timing(engine, timing).unwrap();
    dmx.init(PinConfiguration::new(TX, EN)).unwrap();

    probe.hold_busy(true);
    let result = dmx.transmit(&[1]).unwrap().await;
    assert!(matches!(result, Err(DmxError::Timeout(d)) if d == Duration::from_millis(5)));

    assert!(probe.events().contains(&SimEvent::Stop));
    assert_eq!(probe.level(EN), Some(false));
    assert_eq!(probe.live_waveforms(), 0);
    assert_eq!(dmx.state(), TransmissionState::Idle);
}

#[tokio::test]
async fn test_close_during_transmission() {
    let (dmx, probe) = ready(SimulatedEngine::new());
    probe.hold_busy(true);

    let pending = dmx.transmit(&[5; 10]).unwrap();
    dmx.close();
    assert!(matches!(pending.await, Err(DmxError::Closed)));

    assert!(!probe.is_running());
    assert_eq!(probe.level(EN), Some(false));
    assert!(!dmx.is_initialised());

    dmx.init(PinConfiguration::new(TX, EN)).unwrap();
    dmx.transmit(&[1]).unwrap().await.unwrap();
}

#[tokio::test]
async fn test_close_then_reinit() {
    let (dmx, _probe) = ready(SimulatedEngine::new());
    dmx.close();
    assert!(matches!(dmx.transmit(&[1]), Err(DmxError::NotInitialized)));
    dmx.init(PinConfiguration::new(5, 6)).unwrap();
    assert_eq!(dmx.pins(), Some(PinConfiguration::new(5, 6)));
}

#[tokio::test]
async fn test_transmit_with_callback() {
    let (dmx, probe) = ready(SimulatedEngine::new());
    let (tx, rx) = tokio::sync::oneshot::channel();

    dmx.transmit_with(&[10, 20, 30], move |result| {
        let _ = tx.send(result);
    })
    .unwrap();

    let report = rx.await.unwrap().unwrap();
    assert_eq!(report.channels, 3);
    assert_eq!(probe.last_frame(TX, false, 4), Some(vec![10, 20, 30]));
}

#[tokio::test]
async fn test_callback_not_called_on_precondition_failure() {
    let dmx = DmxTransmitter::new(SimulatedEngine::new());
    let result = dmx.transmit_with(&[1], |_| panic!("callback must not run"));
    assert!(matches!(result, Err(DmxError::NotInitialized)));
}

#[tokio::test]
async fn test_inverted_polarity() {
    let engine = SimulatedEngine::new();
    let probe = engine.probe();
    let dmx = DmxTransmitter::new(engine);
    dmx.init(PinConfiguration::new(TX, EN).with_inversion(true, true))
        .unwrap();
    assert_eq!(probe.level(EN), Some(true));

    dmx.transmit(&[0x0F, 0xF0]).unwrap().await.unwrap();

    let wave = probe.last_waveform().unwrap();
    // break is driven high on an inverted line
    assert_eq!(wave[0].set_mask, 1 << TX);
    assert_eq!(wave[0].duration_us, 88);
    assert_eq!(probe.last_frame(TX, true, 4), Some(vec![0x0F, 0xF0]));
    assert_eq!(probe.level(EN), Some(true));
}

#[tokio::test]
async fn test_fade_sequence() {
    let (dmx, probe) = ready(SimulatedEngine::new());
    for level in 0..8u8 {
        dmx.transmit(&[0, 128, level, 0, 0]).unwrap().await.unwrap();
    }

    let frames: Vec<u8> = probe
        .sent_waveforms()
        .iter()
        .map(|w| pidmx::pulse::decode(w, TX, false, 4).unwrap()[2])
        .collect();
    assert_eq!(frames, (0..8).collect::<Vec<u8>>());
    assert_eq!(probe.live_waveforms(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_one_wins() {
    let (dmx, probe) = ready(SimulatedEngine::new());
    probe.hold_busy(true);

    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let dmx = dmx.clone();
        tasks.push(tokio::spawn(async move { dmx.transmit(&[i]).map(|_| ()) }));
    }

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => accepted += 1,
            Err(DmxError::Busy) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(probe.sent_waveforms().len(), 1);

    probe.hold_busy(false);
}

#[test]
fn test_wait_blocking_outside_async() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (dmx, probe) = ready(SimulatedEngine::new());

    let transmission = {
        let _guard = runtime.enter();
        dmx.transmit(&[42]).unwrap()
    };
    let report = transmission.wait_blocking().unwrap();
    assert_eq!(report.channels, 1);
    assert_eq!(probe.last_frame(TX, false, 4), Some(vec![42]));
}
