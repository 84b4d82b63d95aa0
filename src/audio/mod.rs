pub mod capture;
pub mod codec;
pub mod level;
pub mod playback;

pub use capture::{AudioDeviceFactory, CaptureChunk, CaptureDevice, DeviceConfig};
pub use codec::{AudioBuffer, OutboundFrame, CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};
pub use level::{AudioLevels, LevelMeter};
pub use playback::{PlaybackId, PlaybackScheduler, PlaybackSink};
