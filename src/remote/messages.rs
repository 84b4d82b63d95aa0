use serde::{Deserialize, Serialize};

use crate::transcript::Speaker;

/// Configuration sent when opening a remote speech session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRequest {
    /// Remote model identifier
    pub model: String,

    /// Voice used for synthesized replies
    pub voice: String,

    /// Conversation instructions (persona + resolved context document)
    pub system_instruction: String,

    /// BCP-47-ish language tag for the conversation
    pub language: String,

    /// Response modality; this client always asks for audio
    pub response_modality: ResponseModality,

    /// Request incremental transcription of user speech
    pub input_transcription: bool,

    /// Request incremental transcription of agent speech
    pub output_transcription: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseModality {
    Audio,
    Text,
}


/// Events emitted by an open remote session.
///
/// Delivered in arrival order over a single channel into the session
/// manager's event loop; the channel closing without a `Closed` event is
/// treated as an unexpected close.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// The session handshake completed; the session is live
    Opened,

    /// One synthesized audio frame, base64 i16 LE PCM at 24kHz
    Audio(String),

    /// Incremental transcribed text for one side of the conversation
    Transcript { speaker: Speaker, text: String },

    /// The agent's speech was interrupted (user barge-in); all queued
    /// playback is stale and must be discarded
    Interrupted,

    /// The remote side closed the session
    Closed,

    /// Transport or protocol error
    Error(String),
}
