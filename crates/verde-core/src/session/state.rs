//! Conversation state and phase types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// States of the conversation machine.
///
/// `initial` is the entry state; `complete` and `error` are terminal for
/// Phase 1 and leave only through the phase gate or recovery respectively.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Initial,
    GatheringGeometry,
    GatheringMaterials,
    GatheringWwr,
    Complete,
    Analysis,
    Error,
}

impl ConversationState {
    /// States a Phase-2 session may be in.
    pub fn allowed_in_phase2(self) -> bool {
        matches!(self, Self::Complete | Self::Analysis)
    }
}

/// Conversation phase. Serialized as the bare number `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Phase {
    /// Spec gathering
    #[default]
    One,
    /// Analysis Q&A
    Two,
}

impl Phase {
    pub fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> Self {
        phase.number()
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("invalid phase {}", other)),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}
