use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of turns kept in the log. Oldest turns are evicted first
/// so long sessions stay bounded.
pub const MAX_TURNS: usize = 100;

/// Who produced a transcript turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The local user (microphone side)
    User,
    /// The remote conversational agent
    Agent,
    /// Lifecycle notices (connecting, reconnecting, interrupted, ...)
    System,
}

/// A single turn in the conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    /// When the first fragment of this turn arrived
    pub timestamp: DateTime<Utc>,

    /// Which side of the conversation produced it
    pub speaker: Speaker,

    /// Accumulated text (partial fragments are coalesced in place)
    pub text: String,
}

/// Ordered, bounded log of conversation turns.
///
/// Incremental text fragments from the same speaker grow the most recent
/// turn in place; a fragment from a different speaker starts a new turn.
/// System turns are never coalesced, so lifecycle notices always stand on
/// their own line.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    turns: VecDeque<TranscriptTurn>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self {
            turns: VecDeque::new(),
        }
    }

    /// Apply one incremental text event.
    pub fn append(&mut self, speaker: Speaker, text: &str) {
        if let Some(last) = self.turns.back_mut() {
            if last.speaker == speaker && speaker != Speaker::System {
                last.text.push_str(text);
                return;
            }
        }

        self.turns.push_back(TranscriptTurn {
            timestamp: Utc::now(),
            speaker,
            text: text.to_string(),
        });

        while self.turns.len() > MAX_TURNS {
            self.turns.pop_front();
        }
    }

    /// Drop all turns (used on intentional disconnect)
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Clone the current turns in arrival order
    pub fn snapshot(&self) -> Vec<TranscriptTurn> {
        self.turns.iter().cloned().collect()
    }
}
