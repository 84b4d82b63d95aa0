use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Lock-free RMS level of an audio stream.
///
/// The write side updates the level as frames pass through the pipeline;
/// readers (visualizers) poll `value()`. Snapshots are eventually consistent
/// and must never drive control decisions.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    // f32 bits stored in a u32 so readers never block the audio path
    level: Arc<AtomicU32>,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from float samples in [-1.0, 1.0]
    pub fn update_from_f32(&self, samples: &[f32]) {
        self.store(rms_f32(samples));
    }

    /// Update from i16 PCM samples
    pub fn update_from_i16(&self, samples: &[i16]) {
        if samples.is_empty() {
            self.store(0.0);
            return;
        }
        let sum_squares: f64 = samples
            .iter()
            .map(|&s| {
                let normalized = s as f64 / 32768.0;
                normalized * normalized
            })
            .sum();
        self.store((sum_squares / samples.len() as f64).sqrt() as f32);
    }

    /// Most recent RMS level, 0.0 when silent or never updated
    pub fn value(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    /// Reset to silence (session teardown)
    pub fn reset(&self) {
        self.store(0.0);
    }

    fn store(&self, value: f32) {
        self.level.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Read-only level handles for both conversation directions
#[derive(Debug, Clone, Default)]
pub struct AudioLevels {
    /// Microphone side
    pub user: LevelMeter,
    /// Synthesized agent audio side
    pub agent: LevelMeter,
}

impl AudioLevels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.user.reset();
        self.agent.reset();
    }
}

fn rms_f32(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
