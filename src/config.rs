use anyhow::Result;
use serde::Deserialize;

use crate::audio::DeviceConfig;
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceSection,
    pub session: SessionSection,
    pub audio: AudioSection,
}

#[derive(Debug, Deserialize)]
pub struct ServiceSection {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionSection {
    pub model: String,
    pub voice: String,
    pub language: String,
    /// Plain-text context the agent answers from (already resolved by the
    /// embedding application)
    #[serde(default)]
    pub context_document: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioSection {
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub chunk_duration_ms: u64,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Session parameters derived from this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.session.model.clone(),
            voice: self.session.voice.clone(),
            language: self.session.language.clone(),
            context_document: self.session.context_document.clone(),
            device: DeviceConfig {
                capture_sample_rate: self.audio.capture_sample_rate,
                playback_sample_rate: self.audio.playback_sample_rate,
                chunk_duration_ms: self.audio.chunk_duration_ms,
            },
            ..Default::default()
        }
    }
}
