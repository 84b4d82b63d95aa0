// Transcript behavior observed through a running session: streamed
// fragments coalescing into turns, lifecycle notices splitting them, and
// retention across reconnects versus intentional disconnects.

use std::sync::Arc;
use std::time::Duration;

use voice_session::sim::{SimulatedAudioDevices, SimulatedSpeechService};
use voice_session::{ConnectionState, SessionConfig, SessionHandle, SessionManager, Speaker};

fn spawn_session() -> (SimulatedSpeechService, SimulatedAudioDevices, SessionHandle) {
    let service = SimulatedSpeechService::new();
    let devices = SimulatedAudioDevices::new();
    let handle = SessionManager::spawn(
        SessionConfig::default(),
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

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test(start_paused = true)]
async fn test_streamed_fragments_coalesce_into_turns() {
    let (service, _devices, handle) = spawn_session();
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    let session = service.last_session().unwrap();

    session.emit_transcript(Speaker::Agent, "Hello! ").await.unwrap();
    session
        .emit_transcript(Speaker::Agent, "How can I help?")
        .await
        .unwrap();
    session.emit_transcript(Speaker::User, "What does ").await.unwrap();
    session
        .emit_transcript(Speaker::User, "my policy cover?")
        .await
        .unwrap();
    settle().await;

    let turns = handle.transcript().await;
    let spoken: Vec<_> = turns
        .iter()
        .filter(|t| t.speaker != Speaker::System)
        .collect();
    assert_eq!(spoken.len(), 2);
    assert_eq!(spoken[0].speaker, Speaker::Agent);
    assert_eq!(spoken[0].text, "Hello! How can I help?");
    assert_eq!(spoken[1].speaker, Speaker::User);
    assert_eq!(spoken[1].text, "What does my policy cover?");
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_notices_split_agent_turns() {
    let (service, _devices, handle) = spawn_session();
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    let session = service.last_session().unwrap();

    session.emit_transcript(Speaker::Agent, "One moment").await.unwrap();
    session.emit_interrupted().await.unwrap();
    session.emit_transcript(Speaker::Agent, "Actually").await.unwrap();
    settle().await;

    let turns = handle.transcript().await;
    let first = turns
        .iter()
        .position(|t| t.text == "One moment")
        .expect("agent turn missing");
    assert_eq!(turns[first + 1].speaker, Speaker::System);
    assert_eq!(turns[first + 1].text, "Agent interrupted.");
    assert_eq!(turns[first + 2].text, "Actually");
}

#[tokio::test(start_paused = true)]
async fn test_transcript_survives_reconnect_but_not_disconnect() {
    let (service, _devices, handle) = spawn_session();
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    let session = service.last_session().unwrap();

    session
        .emit_transcript(Speaker::Agent, "Hello there")
        .await
        .unwrap();
    settle().await;

    session.drop_transport();
    wait_for_state(&handle, ConnectionState::Reconnecting).await;
    wait_for_state(&handle, ConnectionState::Connected).await;

    let turns = handle.transcript().await;
    assert!(turns
        .iter()
        .any(|t| t.speaker == Speaker::Agent && t.text == "Hello there"));

    handle.disconnect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Disconnected).await;
    assert!(handle.transcript().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_long_sessions_stay_bounded() {
    let (service, _devices, handle) = spawn_session();
    handle.connect().await.unwrap();
    wait_for_state(&handle, ConnectionState::Connected).await;
    let session = service.last_session().unwrap();

    // Alternate speakers so nothing coalesces
    for i in 0..120 {
        let speaker = if i % 2 == 0 {
            Speaker::User
        } else {
            Speaker::Agent
        };
        session
            .emit_transcript(speaker, &format!("turn {}", i))
            .await
            .unwrap();
    }
    settle().await;

    // Two lifecycle notices plus 120 turns, capped to the newest 100
    let turns = handle.transcript().await;
    assert_eq!(turns.len(), 100);
    assert_eq!(turns[0].text, "turn 20");
}
