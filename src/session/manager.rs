use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::state::{ConnectionState, ReconnectState, MAX_RETRIES};
use crate::audio::{
    codec, AudioDeviceFactory, AudioLevels, CaptureChunk, CaptureDevice, PlaybackId,
    PlaybackScheduler,
};
use crate::remote::{OpenRequest, ResponseModality, ServiceEvent, SpeechService, SpeechSession};
use crate::transcript::{Speaker, TranscriptLog, TranscriptTurn};

/// Control commands accepted by the session manager
#[derive(Debug)]
pub enum Command {
    Connect,
    Disconnect,
    SetMuted(bool),
}

/// Everything owned for one live connection attempt.
///
/// Acquired as a unit on connect and released as a unit on every exit path:
/// clean close, transport failure, or intentional disconnect.
struct ActiveSession {
    session: Box<dyn SpeechSession>,
    events: mpsc::Receiver<ServiceEvent>,
    capture: Box<dyn CaptureDevice>,
    chunks: mpsc::Receiver<CaptureChunk>,
    scheduler: PlaybackScheduler,
    ended: mpsc::Receiver<PlaybackId>,
    ended_open: bool,
    primed: bool,
}

/// What woke the event loop
enum Wake {
    Command(Option<Command>),
    Service(Option<ServiceEvent>),
    Chunk(Option<CaptureChunk>),
    PlaybackEnded(Option<PlaybackId>),
    RetryTimer,
}

/// Cloneable control-and-observation handle for a running session manager.
///
/// The UI layer drives the session exclusively through this handle; the
/// manager never mutates UI state directly.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    transcript: Arc<RwLock<TranscriptLog>>,
    levels: AudioLevels,
}

impl SessionHandle {
    /// Request a fresh connection (valid from DISCONNECTED or ERROR)
    pub async fn connect(&self) -> Result<()> {
        self.send(Command::Connect).await
    }

    /// Intentionally end the session and clear the transcript
    pub async fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect).await
    }

    /// Toggle the microphone mute gate; takes effect on the next chunk
    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        self.send(Command::SetMuted(muted)).await
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch receiver for state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Snapshot of the transcript in arrival order
    pub async fn transcript(&self) -> Vec<TranscriptTurn> {
        self.transcript.read().await.snapshot()
    }

    /// Read-only live audio-level meters (visualization only)
    pub fn levels(&self) -> &AudioLevels {
        &self.levels
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.cmd_tx
            .send(command)
            .await
            .context("Session manager is no longer running")?;
        Ok(())
    }
}

/// Owns the connection state machine and wires the audio pipeline together.
///
/// Runs as a single logical actor: remote events, capture chunks, playback
/// completions, the reconnect timer and control commands are all consumed by
/// one `select!` loop, so no two handlers ever run concurrently and ordering
/// (capture order out, arrival order in) holds by construction.
pub struct SessionManager {
    config: SessionConfig,
    service: Arc<dyn SpeechService>,
    devices: Arc<dyn AudioDeviceFactory>,

    cmd_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    transcript: Arc<RwLock<TranscriptLog>>,
    levels: AudioLevels,

    muted: bool,
    active: Option<ActiveSession>,
    reconnect: ReconnectState,
    /// Pending reconnect deadline; always cancelled before a new
    /// connect/disconnect begins
    retry_at: Option<Instant>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        service: Arc<dyn SpeechService>,
        devices: Arc<dyn AudioDeviceFactory>,
    ) -> (Self, SessionHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let transcript = Arc::new(RwLock::new(TranscriptLog::new()));
        let levels = AudioLevels::new();

        let handle = SessionHandle {
            cmd_tx,
            state_rx,
            transcript: Arc::clone(&transcript),
            levels: levels.clone(),
        };

        let manager = Self {
            config,
            service,
            devices,
            cmd_rx,
            state_tx,
            transcript,
            levels,
            muted: false,
            active: None,
            reconnect: ReconnectState::new(),
            retry_at: None,
        };

        (manager, handle)
    }

    /// Spawn the manager on the current runtime and return its handle
    pub fn spawn(
        config: SessionConfig,
        service: Arc<dyn SpeechService>,
        devices: Arc<dyn AudioDeviceFactory>,
    ) -> SessionHandle {
        let (manager, handle) = Self::new(config, service, devices);
        tokio::spawn(manager.run());
        handle
    }

    /// Drive the session until every handle is dropped
    pub async fn run(mut self) {
        info!("Session manager started: {}", self.config.session_id);

        loop {
            match self.next_wake().await {
                Wake::Command(None) => {
                    // All handles dropped; tear down and exit
                    self.disconnect(true).await;
                    break;
                }
                Wake::Command(Some(Command::Connect)) => self.handle_connect().await,
                Wake::Command(Some(Command::Disconnect)) => self.disconnect(true).await,
                Wake::Command(Some(Command::SetMuted(muted))) => {
                    debug!("Microphone muted: {}", muted);
                    self.muted = muted;
                }
                Wake::Service(Some(event)) => self.handle_service_event(event).await,
                Wake::Service(None) => {
                    warn!("Session event stream ended unexpectedly");
                    self.handle_failure("session event stream ended").await;
                }
                Wake::Chunk(Some(chunk)) => self.handle_capture_chunk(chunk).await,
                Wake::Chunk(None) => {
                    warn!("Capture stream ended unexpectedly");
                    self.handle_failure("capture device stopped delivering audio")
                        .await;
                }
                Wake::PlaybackEnded(Some(id)) => {
                    if let Some(active) = self.active.as_mut() {
                        active.scheduler.on_ended(id);
                    }
                }
                Wake::PlaybackEnded(None) => {
                    // Sink dropped its notifier; stop polling it
                    if let Some(active) = self.active.as_mut() {
                        active.ended_open = false;
                    }
                }
                Wake::RetryTimer => self.handle_retry_timer().await,
            }
        }

        info!("Session manager stopped: {}", self.config.session_id);
    }

    /// Wait for the next discrete event from any wake source
    async fn next_wake(&mut self) -> Wake {
        let retry_at = self.retry_at;
        let (events, chunks, ended) = match self.active.as_mut() {
            Some(active) => (
                Some(&mut active.events),
                Some(&mut active.chunks),
                if active.ended_open {
                    Some(&mut active.ended)
                } else {
                    None
                },
            ),
            None => (None, None, None),
        };

        tokio::select! {
            command = self.cmd_rx.recv() => Wake::Command(command),
            event = recv_or_pending(events) => Wake::Service(event),
            chunk = recv_or_pending(chunks) => Wake::Chunk(chunk),
            id = recv_or_pending(ended) => Wake::PlaybackEnded(id),
            _ = async { tokio::time::sleep_until(retry_at.unwrap()).await },
                if retry_at.is_some() => Wake::RetryTimer,
        }
    }

    async fn handle_connect(&mut self) {
        let state = *self.state_tx.borrow();
        if !matches!(
            state,
            ConnectionState::Disconnected | ConnectionState::Error
        ) {
            warn!("connect() ignored in state {:?}", state);
            return;
        }

        self.reconnect.reset();
        self.open_session(false).await;
    }

    /// One connection attempt: open devices, open the remote session, and
    /// wait for its Opened event. Any failure routes into the reconnect
    /// path.
    async fn open_session(&mut self, retry: bool) {
        if retry {
            self.set_state(ConnectionState::Reconnecting);
            self.system_turn(&format!(
                "Attempting to reconnect ({}/{})...",
                self.reconnect.attempt, MAX_RETRIES
            ))
            .await;
        } else {
            self.set_state(ConnectionState::Connecting);
            self.system_turn("Connecting to the voice agent...").await;
        }

        match self.try_open().await {
            Ok(active) => {
                self.active = Some(active);
            }
            Err(e) => {
                error!("Connection attempt failed: {:#}", e);
                self.system_turn(&format!("Connection failed: {}", e)).await;
                self.reconnect.last_failure = Some(e.to_string());
                self.schedule_reconnect().await;
            }
        }
    }

    async fn try_open(&mut self) -> Result<ActiveSession> {
        let device_config = self.config.device_config();

        let mut capture = self
            .devices
            .open_capture(&device_config)
            .await
            .context("Failed to open capture device")?;
        let chunks = capture
            .start()
            .await
            .context("Failed to start microphone capture")?;
        debug!("Capture device open: {}", capture.name());

        let (ended_tx, ended) = mpsc::channel(64);
        let sink = self
            .devices
            .open_playback(&device_config, ended_tx)
            .await
            .context("Failed to open playback device")?;
        let scheduler = PlaybackScheduler::new(sink);

        let (event_tx, events) = mpsc::channel(256);
        let request = self.open_request();
        let session = self
            .service
            .open(&request, event_tx)
            .await
            .context("Failed to open remote session")?;

        Ok(ActiveSession {
            session,
            events,
            capture,
            chunks,
            scheduler,
            ended,
            ended_open: true,
            primed: false,
        })
    }

    fn open_request(&self) -> OpenRequest {
        OpenRequest {
            model: self.config.model.clone(),
            voice: self.config.voice.clone(),
            system_instruction: self.config.system_instruction(),
            language: self.config.language.clone(),
            response_modality: ResponseModality::Audio,
            input_transcription: true,
            output_transcription: true,
        }
    }

    async fn handle_service_event(&mut self, event: ServiceEvent) {
        match event {
            ServiceEvent::Opened => {
                self.set_state(ConnectionState::Connected);
                self.reconnect.reset();

                if let Some(active) = self.active.as_mut() {
                    // Fresh output timeline; never schedule from a stale offset
                    active.scheduler.rebase();
                }

                self.system_turn("Connected. The agent is joining the conversation.")
                    .await;
                info!("Session {} connected", self.config.session_id);

                // Prime the agent so it greets the user first
                let hint = self.config.priming_hint();
                if let Some(active) = self.active.as_mut() {
                    if !active.primed {
                        active.primed = true;
                        if let Err(e) = active.session.send_text_hint(&hint).await {
                            warn!("Failed to send priming hint: {:#}", e);
                        }
                    }
                }
            }
            ServiceEvent::Audio(payload) => match codec::decode_frame(&payload) {
                Ok(buffer) => {
                    self.levels.agent.update_from_i16(&buffer.samples);
                    if let Some(active) = self.active.as_mut() {
                        if let Err(e) = active.scheduler.enqueue(buffer) {
                            warn!("Failed to schedule inbound audio: {:#}", e);
                        }
                    }
                }
                Err(e) => {
                    // Single-frame decode failures never stop the pipeline
                    warn!("Dropping malformed audio frame: {:#}", e);
                }
            },
            ServiceEvent::Transcript { speaker, text } => {
                self.transcript.write().await.append(speaker, &text);
            }
            ServiceEvent::Interrupted => {
                if let Some(active) = self.active.as_mut() {
                    active.scheduler.flush();
                }
                self.levels.agent.reset();
                self.system_turn("Agent interrupted.").await;
            }
            ServiceEvent::Closed => {
                info!("Remote session closed");
                self.handle_failure("session closed by the remote service")
                    .await;
            }
            ServiceEvent::Error(reason) => {
                error!("Session error: {}", reason);
                self.handle_failure(&reason).await;
            }
        }
    }

    async fn handle_capture_chunk(&mut self, chunk: CaptureChunk) {
        // Mute drops the chunk silently; the current flag value is read on
        // every chunk, so unmuting takes effect immediately
        if self.muted {
            return;
        }

        self.levels.user.update_from_f32(&chunk.samples);
        let frame = codec::encode_chunk(&chunk.samples);

        if let Some(active) = self.active.as_ref() {
            if let Err(e) = active.session.send_audio(&frame).await {
                // Outbound frames are best-effort; no retry, no buffering
                debug!("Dropped outbound frame: {:#}", e);
            }
        }
    }

    /// Unexpected close or transport error on a live session
    async fn handle_failure(&mut self, reason: &str) {
        self.reconnect.last_failure = Some(reason.to_string());
        self.disconnect(false).await;
        self.schedule_reconnect().await;
    }

    async fn schedule_reconnect(&mut self) {
        if self.reconnect.exhausted() {
            self.enter_error().await;
            return;
        }

        let delay = self.reconnect.next_delay();
        self.set_state(ConnectionState::Reconnecting);
        self.system_turn(&format!(
            "Connection lost. Reconnecting in {}s...",
            delay.as_secs()
        ))
        .await;

        warn!(
            "Reconnect attempt {}/{} in {:?} ({})",
            self.reconnect.attempt + 1,
            MAX_RETRIES,
            delay,
            self.reconnect.last_failure.as_deref().unwrap_or("unknown")
        );

        self.retry_at = Some(Instant::now() + delay);
    }

    async fn handle_retry_timer(&mut self) {
        self.retry_at = None;
        self.reconnect.attempt += 1;
        self.open_session(true).await;
    }

    /// Retries exhausted: terminal ERROR, full teardown, no further
    /// automatic attempts
    async fn enter_error(&mut self) {
        self.retry_at = None;
        self.teardown_active().await;
        self.set_state(ConnectionState::Error);
        self.system_turn("Unable to reconnect after multiple attempts. Please try again later.")
            .await;
        error!(
            "Giving up after {} reconnect attempts ({})",
            MAX_RETRIES,
            self.reconnect.last_failure.as_deref().unwrap_or("unknown")
        );
    }

    /// Tear down the live session. When intentional, land in DISCONNECTED
    /// and clear the transcript; on the failure path the caller decides
    /// between reconnecting and the terminal error state.
    async fn disconnect(&mut self, intentional: bool) {
        // Cancel any pending reconnect before anything else so no stale
        // timer can fire mid-teardown
        self.retry_at = None;
        self.teardown_active().await;

        if intentional {
            self.reconnect.reset();
            self.set_state(ConnectionState::Disconnected);
            self.transcript.write().await.clear();
            info!("Session {} disconnected", self.config.session_id);
        }
    }

    async fn teardown_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.session.close().await {
                debug!("Error closing remote session: {:#}", e);
            }
            if let Err(e) = active.capture.stop().await {
                warn!("Failed to stop capture device: {:#}", e);
            }
            // Stops all in-flight playback and drops the device
            active.scheduler.flush();
        }
        self.levels.reset();
    }

    /// Apply a lifecycle transition, validated against the allowed-from set
    fn set_state(&mut self, next: ConnectionState) {
        let current = *self.state_tx.borrow();
        if current == next {
            return;
        }
        if !current.allows(next) {
            warn!("Refusing invalid state transition {:?} -> {:?}", current, next);
            return;
        }
        info!("Connection state: {:?} -> {:?}", current, next);
        let _ = self.state_tx.send(next);
    }

    async fn system_turn(&self, text: &str) {
        self.transcript.write().await.append(Speaker::System, text);
    }
}

/// Receive from an optional channel; absent channels never wake the loop
async fn recv_or_pending<T>(rx: Option<&mut mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
