use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use voice_session::sim::{SimulatedAudioDevices, SimulatedSpeechService};
use voice_session::{Config, SessionManager, Speaker};

/// Real-time voice session client (demo against simulated collaborators)
#[derive(Debug, Parser)]
#[command(name = "voice-session")]
struct Args {
    /// Configuration file (without extension)
    #[arg(long, default_value = "config/voice-session")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v0.1.0", cfg.service.name);
    info!(
        "Model: {}, voice: {}, language: {}",
        cfg.session.model, cfg.session.voice, cfg.session.language
    );

    // The real deployment wires a live speech service and platform audio
    // devices here; the demo runs a scripted session in-process.
    let service = SimulatedSpeechService::new();
    let devices = SimulatedAudioDevices::new();

    let handle = SessionManager::spawn(
        cfg.session_config(),
        Arc::new(service.clone()),
        Arc::new(devices.clone()),
    );

    handle.connect().await?;
    wait_for_connected(&handle).await?;

    let session = service.last_session().context("No session was opened")?;
    info!("Priming hints sent: {:?}", session.hints());

    // Scripted conversation: greeting audio + transcripts, a user question,
    // then a barge-in that flushes the agent's queued audio
    session.emit_transcript(Speaker::Agent, "Hello! ").await?;
    session
        .emit_transcript(Speaker::Agent, "How can I help you today?")
        .await?;
    session.emit_audio(&vec![2000i16; 2400]).await?; // 100ms at 24kHz
    session.emit_audio(&vec![1500i16; 2400]).await?;

    devices.push_chunk(vec![0.1f32; 2048]).await?;
    session
        .emit_transcript(Speaker::User, "What does my policy cover?")
        .await?;
    session.emit_interrupted().await?;

    tokio::time::sleep(Duration::from_millis(200)).await;

    println!("--- transcript ---");
    println!(
        "{}",
        serde_json::to_string_pretty(&handle.transcript().await)?
    );

    info!(
        "Frames sent: {}, agent level: {:.3}",
        session.sent_frames().len(),
        handle.levels().agent.value()
    );

    handle.disconnect().await?;
    Ok(())
}

async fn wait_for_connected(handle: &voice_session::SessionHandle) -> Result<()> {
    let mut states = handle.state_changes();
    loop {
        if *states.borrow() == voice_session::ConnectionState::Connected {
            return Ok(());
        }
        states
            .changed()
            .await
            .context("Session manager stopped before connecting")?;
    }
}
