//! In-process simulations of the external collaborators.
//!
//! The real remote speech service and the platform audio devices live
//! outside this crate; these simulations implement the same traits with
//! scripted behavior, a manual output clock and failure injection. The demo
//! binary and the integration tests both run against them.

use anyhow::{Context, Result};
use base64::Engine;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::audio::{
    AudioBuffer, AudioDeviceFactory, CaptureChunk, CaptureDevice, DeviceConfig, OutboundFrame,
    PlaybackId, PlaybackSink,
};
use crate::remote::{OpenRequest, ServiceEvent, SpeechService, SpeechSession};
use crate::transcript::Speaker;

// ============================================================================
// Speech service
// ============================================================================

#[derive(Default)]
struct ServiceInner {
    fail_opens: u32,
    manual_open: bool,
    open_attempts: u32,
    sessions: Vec<SimSessionCtl>,
    last_request: Option<OpenRequest>,
}

/// Scripted remote speech service.
///
/// Every `open` either fails (if failures were injected) or produces a
/// session whose control handle lets the caller emit events and inspect
/// what the client sent.
#[derive(Clone, Default)]
pub struct SimulatedSpeechService {
    inner: Arc<Mutex<ServiceInner>>,
}

impl SimulatedSpeechService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` open calls fail
    pub fn fail_next_opens(&self, n: u32) {
        self.inner.lock().unwrap().fail_opens = n;
    }

    /// When set, `Opened` is not emitted automatically; the test drives the
    /// handshake through `SimSessionCtl::emit_opened`
    pub fn set_manual_open(&self, manual: bool) {
        self.inner.lock().unwrap().manual_open = manual;
    }

    /// Total open calls seen, including failed ones
    pub fn open_attempts(&self) -> u32 {
        self.inner.lock().unwrap().open_attempts
    }

    /// Control handle for the i-th successfully opened session
    pub fn session(&self, index: usize) -> Option<SimSessionCtl> {
        self.inner.lock().unwrap().sessions.get(index).cloned()
    }

    pub fn last_session(&self) -> Option<SimSessionCtl> {
        self.inner.lock().unwrap().sessions.last().cloned()
    }

    /// The configuration the client sent on the most recent open
    pub fn last_request(&self) -> Option<OpenRequest> {
        self.inner.lock().unwrap().last_request.clone()
    }
}

#[async_trait::async_trait]
impl SpeechService for SimulatedSpeechService {
    async fn open(
        &self,
        request: &OpenRequest,
        events: mpsc::Sender<ServiceEvent>,
    ) -> Result<Box<dyn SpeechSession>> {
        let (ctl, manual_open) = {
            let mut inner = self.inner.lock().unwrap();
            inner.open_attempts += 1;
            inner.last_request = Some(request.clone());

            if inner.fail_opens > 0 {
                inner.fail_opens -= 1;
                anyhow::bail!("simulated transport rejected the open");
            }

            let ctl = SimSessionCtl::new(events.clone());
            inner.sessions.push(ctl.clone());
            (ctl, inner.manual_open)
        };

        if !manual_open {
            // Handshake completes immediately
            events.send(ServiceEvent::Opened).await.ok();
        }

        Ok(Box::new(SimSession { ctl }))
    }
}

/// Test-side control handle for one simulated session
#[derive(Clone)]
pub struct SimSessionCtl {
    events: Arc<Mutex<Option<mpsc::Sender<ServiceEvent>>>>,
    sent_frames: Arc<Mutex<Vec<OutboundFrame>>>,
    hints: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl SimSessionCtl {
    fn new(events: mpsc::Sender<ServiceEvent>) -> Self {
        Self {
            events: Arc::new(Mutex::new(Some(events))),
            sent_frames: Arc::new(Mutex::new(Vec::new())),
            hints: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            fail_sends: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn emit_opened(&self) -> Result<()> {
        self.emit(ServiceEvent::Opened).await
    }

    /// Emit one synthesized audio frame (i16 PCM, framed as on the wire)
    pub async fn emit_audio(&self, samples: &[i16]) -> Result<()> {
        self.emit(ServiceEvent::Audio(encode_pcm(samples))).await
    }

    /// Emit a raw (possibly malformed) audio payload
    pub async fn emit_audio_payload(&self, payload: &str) -> Result<()> {
        self.emit(ServiceEvent::Audio(payload.to_string())).await
    }

    pub async fn emit_transcript(&self, speaker: Speaker, text: &str) -> Result<()> {
        self.emit(ServiceEvent::Transcript {
            speaker,
            text: text.to_string(),
        })
        .await
    }

    pub async fn emit_interrupted(&self) -> Result<()> {
        self.emit(ServiceEvent::Interrupted).await
    }

    pub async fn emit_closed(&self) -> Result<()> {
        self.emit(ServiceEvent::Closed).await
    }

    pub async fn emit_error(&self, reason: &str) -> Result<()> {
        self.emit(ServiceEvent::Error(reason.to_string())).await
    }

    /// Abruptly drop the transport without a Closed event
    pub fn drop_transport(&self) {
        self.events.lock().unwrap().take();
    }

    /// Frames the client streamed on this session
    pub fn sent_frames(&self) -> Vec<OutboundFrame> {
        self.sent_frames.lock().unwrap().clone()
    }

    /// Out-of-band text hints the client sent
    pub fn hints(&self) -> Vec<String> {
        self.hints.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make subsequent audio/hint sends fail (mid-session send failure)
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    async fn emit(&self, event: ServiceEvent) -> Result<()> {
        let sender = self
            .events
            .lock()
            .unwrap()
            .clone()
            .context("Session transport already dropped")?;
        sender
            .send(event)
            .await
            .context("Client stopped listening for session events")?;
        Ok(())
    }
}

struct SimSession {
    ctl: SimSessionCtl,
}

#[async_trait::async_trait]
impl SpeechSession for SimSession {
    async fn send_audio(&self, frame: &OutboundFrame) -> Result<()> {
        if self.ctl.closed.load(Ordering::SeqCst) {
            anyhow::bail!("session is closed");
        }
        if self.ctl.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("simulated send failure");
        }
        self.ctl.sent_frames.lock().unwrap().push(frame.clone());
        Ok(())
    }

    async fn send_text_hint(&self, text: &str) -> Result<()> {
        if self.ctl.closed.load(Ordering::SeqCst) {
            anyhow::bail!("session is closed");
        }
        if self.ctl.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("simulated send failure");
        }
        self.ctl.hints.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.ctl.closed.store(true, Ordering::SeqCst);
        self.ctl.events.lock().unwrap().take();
        Ok(())
    }
}

fn encode_pcm(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    base64::engine::general_purpose::STANDARD.encode(&bytes)
}

// ============================================================================
// Audio devices
// ============================================================================

/// Manually advanced output clock shared between a sink and its test
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> f64 {
        *self.now.lock().unwrap()
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock().unwrap() += secs;
    }

    pub fn set(&self, secs: f64) {
        *self.now.lock().unwrap() = secs;
    }
}

/// One scheduled playback unit as the sink saw it
#[derive(Debug, Clone)]
pub struct ScheduledUnit {
    pub id: PlaybackId,
    pub start: f64,
    pub duration: f64,
    pub stopped: bool,
}

/// Inspection handle for a simulated playback sink
#[derive(Clone)]
pub struct PlaybackRecorder {
    units: Arc<Mutex<Vec<ScheduledUnit>>>,
    ended_tx: mpsc::Sender<PlaybackId>,
}

impl PlaybackRecorder {
    /// Everything ever scheduled, in schedule order
    pub fn units(&self) -> Vec<ScheduledUnit> {
        self.units.lock().unwrap().clone()
    }

    pub fn stopped_ids(&self) -> Vec<PlaybackId> {
        self.units
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.stopped)
            .map(|u| u.id)
            .collect()
    }

    /// Report natural completion of a scheduled unit
    pub async fn complete(&self, id: PlaybackId) -> Result<()> {
        self.ended_tx
            .send(id)
            .await
            .context("Client stopped listening for playback completions")?;
        Ok(())
    }
}

/// Playback sink driven by a [`ManualClock`]
pub struct SimPlaybackSink {
    clock: ManualClock,
    units: Arc<Mutex<Vec<ScheduledUnit>>>,
    next_id: Arc<AtomicU64>,
}

impl SimPlaybackSink {
    pub fn new(clock: ManualClock, ended_tx: mpsc::Sender<PlaybackId>) -> (Self, PlaybackRecorder) {
        let units = Arc::new(Mutex::new(Vec::new()));
        let recorder = PlaybackRecorder {
            units: Arc::clone(&units),
            ended_tx,
        };
        let sink = Self {
            clock,
            units,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (sink, recorder)
    }
}

impl PlaybackSink for SimPlaybackSink {
    fn current_time(&self) -> f64 {
        self.clock.now()
    }

    fn schedule(&mut self, buffer: AudioBuffer, at: f64) -> Result<PlaybackId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.units.lock().unwrap().push(ScheduledUnit {
            id,
            start: at,
            duration: buffer.duration_secs(),
            stopped: false,
        });
        Ok(id)
    }

    fn stop_all(&mut self) {
        for unit in self.units.lock().unwrap().iter_mut() {
            unit.stopped = true;
        }
    }
}

/// Push-driven capture device; the test injects chunks explicitly
struct SimCaptureDevice {
    shared: Arc<Mutex<DevicesInner>>,
    capturing: bool,
}

#[async_trait::async_trait]
impl CaptureDevice for SimCaptureDevice {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureChunk>> {
        let (tx, rx) = mpsc::channel(64);
        self.shared.lock().unwrap().capture_tx = Some(tx);
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.shared.lock().unwrap().capture_tx = None;
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "simulated-microphone"
    }
}

struct DevicesInner {
    fail_capture_opens: u32,
    fail_playback_opens: u32,
    capture_sample_rate: u32,
    capture_tx: Option<mpsc::Sender<CaptureChunk>>,
    recorder: Option<PlaybackRecorder>,
}

impl Default for DevicesInner {
    fn default() -> Self {
        Self {
            fail_capture_opens: 0,
            fail_playback_opens: 0,
            capture_sample_rate: crate::audio::CAPTURE_SAMPLE_RATE,
            capture_tx: None,
            recorder: None,
        }
    }
}

/// Simulated audio device factory with a shared manual clock.
///
/// Capture chunks are injected with `push_chunk`; scheduled playback is
/// inspected through the most recent [`PlaybackRecorder`].
#[derive(Clone, Default)]
pub struct SimulatedAudioDevices {
    clock: ManualClock,
    inner: Arc<Mutex<DevicesInner>>,
}

impl SimulatedAudioDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    /// Make the next `n` capture opens fail (permission denied, device busy)
    pub fn fail_next_capture_opens(&self, n: u32) {
        self.inner.lock().unwrap().fail_capture_opens = n;
    }

    pub fn fail_next_playback_opens(&self, n: u32) {
        self.inner.lock().unwrap().fail_playback_opens = n;
    }

    /// Inject one captured chunk into the open capture stream
    pub async fn push_chunk(&self, samples: Vec<f32>) -> Result<()> {
        let (tx, sample_rate) = {
            let inner = self.inner.lock().unwrap();
            let tx = inner
                .capture_tx
                .clone()
                .context("No capture device is open")?;
            (tx, inner.capture_sample_rate)
        };
        tx.send(CaptureChunk {
            samples,
            sample_rate,
        })
        .await
        .context("Capture stream receiver dropped")?;
        Ok(())
    }

    /// Recorder for the most recently opened playback sink
    pub fn recorder(&self) -> Option<PlaybackRecorder> {
        self.inner.lock().unwrap().recorder.clone()
    }
}

#[async_trait::async_trait]
impl AudioDeviceFactory for SimulatedAudioDevices {
    async fn open_capture(&self, config: &DeviceConfig) -> Result<Box<dyn CaptureDevice>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_capture_opens > 0 {
            inner.fail_capture_opens -= 1;
            anyhow::bail!("simulated microphone permission denied");
        }
        inner.capture_sample_rate = config.capture_sample_rate;
        drop(inner);

        Ok(Box::new(SimCaptureDevice {
            shared: Arc::clone(&self.inner),
            capturing: false,
        }))
    }

    async fn open_playback(
        &self,
        _config: &DeviceConfig,
        ended_tx: mpsc::Sender<PlaybackId>,
    ) -> Result<Box<dyn PlaybackSink>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_playback_opens > 0 {
            inner.fail_playback_opens -= 1;
            anyhow::bail!("simulated playback device unavailable");
        }

        let (sink, recorder) = SimPlaybackSink::new(self.clock.clone(), ended_tx);
        inner.recorder = Some(recorder);
        Ok(Box::new(sink))
    }
}
