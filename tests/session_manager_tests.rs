// Lifecycle tests for the session manager, driven end to end through its
// public handle against the simulated speech service and audio devices.
//
// All timing runs on tokio's paused clock, so the exponential backoff
// schedule is asserted exactly.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use voice_session::sim::{SimulatedAudioDevices, SimulatedSpeechService};
use voice_session::{ConnectionState, SessionConfig, SessionHandle, SessionManager, Speaker};

fn test_config() -> SessionConfig {
    SessionConfig {
        language: "English".to_string(),
        context_document: "Coverage Amount: $500,000".to_string(),
        ..Default::default()
    }
}

fn spawn_session() -> (SimulatedSpeechService, SimulatedAudioDevices, SessionHandle) {
    let service = SimulatedSpeechService::new();
    let devices = SimulatedAudioDevices::new();
    let handle = SessionManager::spawn(
        test_config(),
        Arc::new(service.clone()),
        Arc::new(devices.clone()),
    );
    (service, devices, handle)
}

async fn wait_for_state(handle: &SessionHandle, target: ConnectionState) {
    let mut states = handle.state_changes();
    tokio::time::timeout(Duration::from_secs(120), async {
        while *states.borrow_and_update() != target {
            states.changed().await.expect("session manager stopped");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {:?}", target));
}

/// Let the manager drain everything already in flight
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test(start_paused = true)]
async fn test_connect_primes_the_agent_once() {
    let (service, _devices, handle) = spawn_session();

    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    settle().await;

    let request = service.last_request().expect("no open request seen");
    assert!(request.system_instruction.contains("Respond in English."));
    assert!(request
        .system_instruction
        .contains("Coverage Amount: $500,000"));
    assert!(request.input_transcription);
    assert!(request.output_transcription);

    let session = service.last_session().expect("no session opened");
    let hints = session.hints();
    assert_eq!(hints.len(), 1);
    assert!(hints[0].contains("greet them in English"));

    let transcript = handle.transcript().await;
    assert!(transcript
        .iter()
        .any(|t| t.speaker == Speaker::System && t.text.starts_with("Connected")));
}

#[tokio::test(start_paused = true)]
async fn test_mute_gates_outbound_audio_without_reconnecting() {
    let (service, devices, handle) = spawn_session();
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    settle().await;
    let session = service.last_session().unwrap();

    devices.push_chunk(vec![0.25f32; 1600]).await.unwrap();
    devices.push_chunk(vec![0.25f32; 1600]).await.unwrap();
    settle().await;
    let frames = session.sent_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].mime_type, "audio/pcm;rate=16000");
    assert!(handle.levels().user.value() > 0.0);

    handle.set_muted(true).await.unwrap();
    settle().await;
    devices.push_chunk(vec![0.25f32; 1600]).await.unwrap();
    devices.push_chunk(vec![0.25f32; 1600]).await.unwrap();
    settle().await;
    assert_eq!(session.sent_frames().len(), 2);

    handle.set_muted(false).await.unwrap();
    settle().await;
    devices.push_chunk(vec![0.25f32; 1600]).await.unwrap();
    settle().await;
    assert_eq!(session.sent_frames().len(), 3);

    // Capture stayed up the whole time; no reconnect was needed
    assert_eq!(service.open_attempts(), 1);
    assert_eq!(handle.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_until_terminal_error() {
    let (service, _devices, handle) = spawn_session();
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    settle().await;

    service.fail_next_opens(5);
    let start = Instant::now();
    service.last_session().unwrap().drop_transport();
    wait_for_state(&handle, ConnectionState::Error).await;

    // Delays double from 1s and cap at 10s: 1 + 2 + 4 + 8 + 10
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(25),
        "gave up too early: {:?}",
        elapsed
    );
    assert!(
        elapsed < Duration::from_secs(26),
        "gave up too late: {:?}",
        elapsed
    );
    // Initial connect plus five retries
    assert_eq!(service.open_attempts(), 6);

    // The error state is terminal; no timer ever fires again
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(service.open_attempts(), 6);
    assert_eq!(handle.state(), ConnectionState::Error);

    let transcript = handle.transcript().await;
    assert!(transcript
        .iter()
        .any(|t| t.text.contains("Unable to reconnect")));

    // A fresh connect() is still valid from the error state
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    assert_eq!(service.open_attempts(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_successful_reconnect_resets_the_backoff_counter() {
    let (service, _devices, handle) = spawn_session();
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    settle().await;

    // First retry fails, second succeeds: 1s then 2s
    service.fail_next_opens(1);
    let start = Instant::now();
    service.last_session().unwrap().drop_transport();
    wait_for_state(&handle, ConnectionState::Reconnecting).await;
    wait_for_state(&handle, ConnectionState::Connected).await;
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4),
        "unexpected reconnect timing: {:?}",
        elapsed
    );
    assert_eq!(service.open_attempts(), 3);

    // The replacement session gets its own single priming hint
    settle().await;
    let second = service.session(1).unwrap();
    assert_eq!(second.hints().len(), 1);

    // A later failure starts over at the base delay
    let start = Instant::now();
    second.drop_transport();
    wait_for_state(&handle, ConnectionState::Reconnecting).await;
    wait_for_state(&handle, ConnectionState::Connected).await;
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2),
        "backoff counter did not reset: {:?}",
        elapsed
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_reconnect_cancels_the_timer() {
    let (service, _devices, handle) = spawn_session();
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    settle().await;

    let session = service.last_session().unwrap();
    session.drop_transport();
    wait_for_state(&handle, ConnectionState::Reconnecting).await;

    handle.disconnect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Disconnected).await;
    assert!(session.is_closed());

    // The pending retry never fires
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(service.open_attempts(), 1);
    assert_eq!(handle.state(), ConnectionState::Disconnected);

    // Intentional disconnect also cleared the transcript
    assert!(handle.transcript().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_device_failure_routes_into_reconnect() {
    let (service, devices, handle) = spawn_session();

    devices.fail_next_capture_opens(2);
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Reconnecting).await;
    wait_for_state(&handle, ConnectionState::Connected).await;

    // The remote open only happens once the devices come up
    assert_eq!(service.open_attempts(), 1);

    let transcript = handle.transcript().await;
    assert!(transcript
        .iter()
        .any(|t| t.text.contains("Connection failed")));
}

#[tokio::test(start_paused = true)]
async fn test_remote_close_triggers_reconnect() {
    let (service, _devices, handle) = spawn_session();
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    settle().await;

    service.last_session().unwrap().emit_closed().await.unwrap();
    wait_for_state(&handle, ConnectionState::Reconnecting).await;
    wait_for_state(&handle, ConnectionState::Connected).await;
    assert_eq!(service.open_attempts(), 2);

    // The transcript survives the reconnect and records the outage
    let transcript = handle.transcript().await;
    assert!(transcript
        .iter()
        .any(|t| t.text.contains("Reconnecting in 1s")));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_audio_frame_is_dropped() {
    let (service, devices, handle) = spawn_session();
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    settle().await;
    let session = service.last_session().unwrap();

    session.emit_audio_payload("@@not base64@@").await.unwrap();
    session.emit_audio(&vec![800i16; 2400]).await.unwrap();
    settle().await;

    // Only the valid frame was scheduled; the session stayed up
    let recorder = devices.recorder().unwrap();
    assert_eq!(recorder.units().len(), 1);
    assert_eq!(handle.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_interruption_flushes_queued_playback() {
    let (service, devices, handle) = spawn_session();
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    settle().await;
    let session = service.last_session().unwrap();
    let recorder = devices.recorder().unwrap();

    // Three 100ms replies queue back-to-back on the output timeline
    for _ in 0..3 {
        session.emit_audio(&vec![1000i16; 2400]).await.unwrap();
    }
    settle().await;
    let units = recorder.units();
    assert_eq!(units.len(), 3);
    assert!((units[1].start - 0.1).abs() < 1e-9);
    assert!((units[2].start - 0.2).abs() < 1e-9);
    assert!(handle.levels().agent.value() > 0.0);

    session.emit_interrupted().await.unwrap();
    settle().await;
    assert_eq!(recorder.stopped_ids().len(), 3);
    assert_eq!(handle.levels().agent.value(), 0.0);

    // The next reply starts from the live output clock, not the stale cursor
    devices.clock().set(5.0);
    session.emit_audio(&vec![1000i16; 2400]).await.unwrap();
    settle().await;
    let units = recorder.units();
    assert!((units[3].start - 5.0).abs() < 1e-9);
    assert!(!units[3].stopped);

    let transcript = handle.transcript().await;
    assert!(transcript
        .iter()
        .any(|t| t.speaker == Speaker::System && t.text == "Agent interrupted."));
}
