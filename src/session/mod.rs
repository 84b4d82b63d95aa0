//! Session lifecycle management

pub mod config;
pub mod manager;
pub mod state;

pub use config::SessionConfig;
pub use manager::{SessionHandle, SessionManager};
pub use state::{ConnectionState, ReconnectState, MAX_RETRIES};
