pub mod audio;
pub mod config;
pub mod remote;
pub mod session;
pub mod sim;
pub mod transcript;

pub use audio::{
    AudioBuffer, AudioDeviceFactory, AudioLevels, CaptureChunk, CaptureDevice, DeviceConfig,
    LevelMeter, OutboundFrame, PlaybackId, PlaybackScheduler, PlaybackSink,
};
pub use config::Config;
pub use remote::{OpenRequest, ResponseModality, ServiceEvent, SpeechService, SpeechSession};
pub use session::{ConnectionState, SessionConfig, SessionHandle, SessionManager, MAX_RETRIES};
pub use transcript::{Speaker, TranscriptLog, TranscriptTurn};
