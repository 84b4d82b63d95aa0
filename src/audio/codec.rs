use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Sample rate for microphone audio sent to the remote service
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized audio received from the remote service
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// A captured audio frame framed for the wire.
///
/// Samples are 16-bit signed little-endian PCM, base64-encoded. Immutable
/// once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Base64-encoded i16 LE PCM payload
    pub data: String,

    /// Format tag understood by the remote service
    pub mime_type: String,

    pub sample_rate: u32,
}

/// A decoded inbound audio frame, ready for playback scheduling
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// i16 PCM samples, interleaved
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    /// Playback duration of this buffer in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Quantize captured float samples and frame them for the wire.
///
/// Input samples are expected in [-1.0, 1.0]; out-of-range values are
/// clamped rather than wrapped.
pub fn encode_chunk(samples: &[f32]) -> OutboundFrame {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let quantized = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        bytes.extend_from_slice(&quantized.to_le_bytes());
    }

    OutboundFrame {
        data: base64::engine::general_purpose::STANDARD.encode(&bytes),
        mime_type: format!("audio/pcm;rate={}", CAPTURE_SAMPLE_RATE),
        sample_rate: CAPTURE_SAMPLE_RATE,
    }
}

/// Decode a base64 wire payload into a playable buffer (24kHz mono PCM).
///
/// A malformed frame returns an error; the caller drops that single frame
/// and keeps the session running.
pub fn decode_frame(payload: &str) -> Result<AudioBuffer> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .context("Failed to base64-decode audio frame")?;

    if bytes.len() % 2 != 0 {
        anyhow::bail!("Audio frame has odd byte count: {}", bytes.len());
    }

    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(AudioBuffer {
        samples,
        sample_rate: PLAYBACK_SAMPLE_RATE,
        channels: 1,
    })
}
