//! Conversation history entries.

use super::state::{ConversationState, Phase};
use crate::intent::Intent;
use serde::{Deserialize, Serialize};

/// What opened the phase gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTrigger {
    FileChange,
    UserTurn,
}

/// A single exchange in the conversation history.
///
/// Synthetic entries (phase transitions) carry an empty `user` and a
/// `trigger`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user: String,
    pub assistant: String,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ConversationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<PhaseTrigger>,
    /// ISO 8601
    pub timestamp: String,
}

impl HistoryEntry {
    pub fn turn(
        user: impl Into<String>,
        assistant: impl Into<String>,
        phase: Phase,
        state: ConversationState,
    ) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            phase,
            state: Some(state),
            intent: None,
            trigger: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn synthetic(assistant: impl Into<String>, phase: Phase, trigger: PhaseTrigger) -> Self {
        Self {
            user: String::new(),
            assistant: assistant.into(),
            phase,
            state: Some(ConversationState::Analysis),
            intent: None,
            trigger: Some(trigger),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_intent(mut self, intent: Option<Intent>) -> Self {
        self.intent = intent;
        self
    }

    pub fn is_synthetic(&self) -> bool {
        self.trigger.is_some()
    }
}
