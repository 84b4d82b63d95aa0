pub mod messages;
pub mod service;

pub use messages::{OpenRequest, ResponseModality, ServiceEvent};
pub use service::{SpeechService, SpeechSession};
