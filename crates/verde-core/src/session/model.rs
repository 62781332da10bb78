//! Session domain model.

use super::message::{HistoryEntry, PhaseTrigger};
use super::state::{ConversationState, Phase};
use crate::design::DesignData;
use crate::error::{Result, VerdeError};
use serde::{Deserialize, Serialize};

/// Assistant text recorded when the phase gate opens.
pub const PHASE2_BANNER: &str = "Analysis results are in. We are now in Phase 2: ask about \
energy or carbon, request improvement suggestions, or change the design to compare variants.";

/// Assistant text recorded when a later ML run lands during analysis.
pub const RERUN_BANNER: &str =
    "A new analysis is available for the updated design. Ask me how it compares.";

/// One active conversation.
///
/// The session is owned by the orchestrator; only the knowledge directory
/// outlives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Caller-supplied session identifier
    pub id: String,
    pub current_state: ConversationState,
    pub phase: Phase,
    /// Monotonic: never returns to false once set
    pub phase2_activated: bool,
    pub design_data: DesignData,
    #[serde(default)]
    pub conversation_history: Vec<HistoryEntry>,
    /// Banner raised off-turn (by the watcher), shown on the next user turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_notice: Option<String>,
    /// ISO 8601
    pub created_at: String,
    /// ISO 8601
    pub updated_at: String,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            current_state: ConversationState::Initial,
            phase: Phase::One,
            phase2_activated: false,
            design_data: DesignData::new(),
            conversation_history: Vec::new(),
            pending_notice: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.conversation_history.push(entry);
        self.touch();
    }

    /// Moves the session into Phase 2.
    ///
    /// Returns `Ok(false)` when Phase 2 was already active. Fails without
    /// touching the session if the design is not ready for analysis.
    pub fn activate_phase2(&mut self, trigger: PhaseTrigger) -> Result<bool> {
        if self.phase2_activated {
            return Ok(false);
        }
        let design = &self.design_data;
        if !design.materials_complete() || design.wwr.is_none() {
            return Err(VerdeError::invariant(
                "phase 2 requires every material code and the WWR",
            ));
        }

        self.phase2_activated = true;
        self.phase = Phase::Two;
        self.current_state = ConversationState::Analysis;
        self.push_history(HistoryEntry::synthetic(PHASE2_BANNER, Phase::Two, trigger));
        self.queue_notice(PHASE2_BANNER, trigger);
        Ok(true)
    }

    /// Records that a new ML run was picked up while already in analysis.
    pub fn record_rerun(&mut self, trigger: PhaseTrigger) {
        self.current_state = ConversationState::Analysis;
        self.push_history(HistoryEntry::synthetic(RERUN_BANNER, Phase::Two, trigger));
        self.queue_notice(RERUN_BANNER, trigger);
    }

    /// Takes the banner waiting for the next turn, if any.
    pub fn take_notice(&mut self) -> Option<String> {
        self.pending_notice.take()
    }

    fn queue_notice(&mut self, banner: &str, trigger: PhaseTrigger) {
        if trigger == PhaseTrigger::FileChange {
            self.pending_notice = Some(banner.to_string());
        }
    }

    /// Phase-2 consistency: allowed states and a complete parameter set.
    pub fn check_invariants(&self) -> Result<()> {
        if self.phase == Phase::Two {
            if !self.current_state.allowed_in_phase2() {
                return Err(VerdeError::invariant(format!(
                    "phase 2 session in state {}",
                    self.current_state
                )));
            }
            if !self.design_data.materials_complete() || self.design_data.wwr.is_none() {
                return Err(VerdeError::invariant(
                    "phase 2 session without a complete material set",
                ));
            }
        }
        if self.phase2_activated != (self.phase == Phase::Two) {
            return Err(VerdeError::invariant("phase flag out of sync with phase"));
        }
        self.design_data.validate()
    }

    /// Synthetic phase-transition entries, oldest first.
    pub fn transitions(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.conversation_history.iter().filter(|e| e.is_synthetic())
    }
}
