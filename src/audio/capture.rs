use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::playback::{PlaybackId, PlaybackSink};

/// A fixed-duration chunk of captured microphone audio
///
/// Samples are mono float PCM in [-1.0, 1.0] at the capture sample rate.
#[derive(Debug, Clone)]
pub struct CaptureChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Configuration for opening audio devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Sample rate for the microphone capture stream
    pub capture_sample_rate: u32,
    /// Sample rate of the playback output timeline
    pub playback_sample_rate: u32,
    /// Capture chunk size in milliseconds (affects send latency)
    pub chunk_duration_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: super::codec::CAPTURE_SAMPLE_RATE,
            playback_sample_rate: super::codec::PLAYBACK_SAMPLE_RATE,
            chunk_duration_ms: 128,
        }
    }
}

/// Microphone capture device
///
/// Implementations deliver fixed-cadence chunks on the returned channel for
/// as long as the device is open. Dropping the receiver or calling `stop`
/// releases the device.
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive capture chunks
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureChunk>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if the device is currently capturing
    fn is_capturing(&self) -> bool;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Opens the platform's audio devices for a session.
///
/// The session lifecycle manager acquires both devices on connect and
/// releases them on every exit path. A denied microphone permission or an
/// unavailable output device surfaces here as an open error and is routed
/// through the reconnect path.
#[async_trait::async_trait]
pub trait AudioDeviceFactory: Send + Sync {
    /// Open the microphone at the configured capture rate
    async fn open_capture(&self, config: &DeviceConfig) -> Result<Box<dyn CaptureDevice>>;

    /// Open the playback output.
    ///
    /// `ended_tx` receives the id of every scheduled unit whose rendering
    /// completes naturally (not force-stopped).
    async fn open_playback(
        &self,
        config: &DeviceConfig,
        ended_tx: mpsc::Sender<PlaybackId>,
    ) -> Result<Box<dyn PlaybackSink>>;
}
