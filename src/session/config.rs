use serde::{Deserialize, Serialize};

use crate::audio::DeviceConfig;

const INSTRUCTION_PREFIX: &str = "You are Alex, a professional, empathetic \
and knowledgeable senior support agent. You are interacting via a real-time \
voice call. Keep responses concise and natural for speech; summarize instead \
of listing. Use the provided context to answer questions, and say so when \
the answer is not covered. Respond in {language}.\n\nCONTEXT:\n";

/// Parameters for one logical conversation.
///
/// Immutable for the session's lifetime; a changed language or context
/// requires a fresh connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,

    /// Remote model identifier
    pub model: String,

    /// Voice used for synthesized replies
    pub voice: String,

    /// Conversation language (e.g. "English", "Hindi")
    pub language: String,

    /// Resolved plain-text context document the agent answers from
    pub context_document: String,

    /// Audio device parameters for this session's I/O
    #[serde(default)]
    pub device: DeviceConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            model: "native-audio-dialog-v1".to_string(),
            voice: "zephyr".to_string(),
            language: "English".to_string(),
            context_document: String::new(),
            device: DeviceConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Assemble the system instruction from the persona prefix, the
    /// conversation language and the context document.
    pub fn system_instruction(&self) -> String {
        let mut instruction = INSTRUCTION_PREFIX.replace("{language}", &self.language);
        instruction.push_str(&self.context_document);
        instruction
    }

    /// The out-of-band hint sent once per successful open so the agent
    /// greets the user instead of waiting in silence.
    pub fn priming_hint(&self) -> String {
        format!(
            "(System: the user has connected. Immediately greet them in {} \
             and ask how you can help.)",
            self.language
        )
    }

    /// Device parameters used for this session's audio I/O
    pub fn device_config(&self) -> DeviceConfig {
        self.device.clone()
    }
}
