//! Phase gate.
//!
//! The gate opens when
//! `ml_output.json exists AND ml_processed.flag absent AND state == complete
//! AND phase2_activated == false`. Opening flips the session into analysis
//! and creates the flag in one step, so evaluating twice without a new ML
//! run is a no-op.

use serde::Serialize;
use verde_core::error::Result;
use verde_core::session::{ConversationState, PhaseTrigger, Session};
use verde_infrastructure::KnowledgeStore;

/// What an evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Closed,
    /// Phase 2 was activated
    Opened,
    /// A new ML run landed while already in analysis
    Rerun,
}

#[derive(Debug, Clone)]
pub struct PhaseGate {
    store: KnowledgeStore,
}

impl PhaseGate {
    pub fn new(store: KnowledgeStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    /// The activation predicate, without side effects.
    pub fn is_open(&self, session: &Session) -> bool {
        self.fresh_output()
            && session.current_state == ConversationState::Complete
            && !session.phase2_activated
    }

    /// A later ML run is waiting to be announced.
    pub fn rerun_pending(&self, session: &Session) -> bool {
        session.phase2_activated && self.fresh_output()
    }

    /// Evaluates the gate for `session` and applies the transition.
    ///
    /// The session is only modified once the flag has been written.
    pub fn evaluate(&self, session: &mut Session, trigger: PhaseTrigger) -> Result<GateOutcome> {
        if self.is_open(session) {
            let mut next = session.clone();
            next.activate_phase2(trigger)?;
            let stamp = self.store.create_processed_flag()?;
            *session = next;
            tracing::info!(
                "[PhaseGate] Session {} entered phase 2 ({:?}, flag {})",
                session.id,
                trigger,
                stamp
            );
            return Ok(GateOutcome::Opened);
        }

        if self.rerun_pending(session) {
            self.store.create_processed_flag()?;
            session.record_rerun(trigger);
            tracing::info!(
                "[PhaseGate] Session {} picked up a new ML run ({:?})",
                session.id,
                trigger
            );
            return Ok(GateOutcome::Rerun);
        }

        Ok(GateOutcome::Closed)
    }

    /// A new ML output invalidates prior processing. An output older than
    /// the flag was already announced and leaves it in place.
    pub fn invalidate(&self) -> Result<bool> {
        if !self.store.ml_output_is_newer() {
            tracing::debug!("[PhaseGate] ML output already processed, flag kept");
            return Ok(false);
        }
        let removed = self.store.remove_processed_flag()?;
        if removed {
            tracing::info!("[PhaseGate] ML output changed, processed flag cleared");
        }
        Ok(removed)
    }

    fn fresh_output(&self) -> bool {
        self.store.ml_output_exists() && !self.store.processed_flag_exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use verde_core::analysis::MlOutput;
    use verde_core::design::{Geometry, Typology};
    use verde_core::session::Phase;
    use verde_infrastructure::KnowledgePaths;

    fn setup() -> (TempDir, PhaseGate) {
        let dir = TempDir::new().unwrap();
        let store = KnowledgeStore::new(KnowledgePaths::new(dir.path()));
        store.ensure_layout().unwrap();
        (dir, PhaseGate::new(store))
    }

    fn complete_session() -> Session {
        let mut session = Session::new("gate");
        session.design_data.geometry = Geometry {
            typology: Some(Typology::Block),
            number_of_levels: Some(2),
            width_m: Some(9.0),
            depth_m: Some(9.0),
        };
        session.design_data.self_modeling = Some(true);
        session.design_data.apply_simple_material("wood");
        session.design_data.wwr = Some(0.3);
        session.current_state = ConversationState::Complete;
        session
    }

    fn write_output(gate: &PhaseGate) {
        gate.store()
            .write_ml_output(&MlOutput::from_prediction(&[1.0; 7]))
            .unwrap();
    }

    #[test]
    fn closed_without_ml_output() {
        let (_dir, gate) = setup();
        let mut session = complete_session();
        assert_eq!(
            gate.evaluate(&mut session, PhaseTrigger::UserTurn).unwrap(),
            GateOutcome::Closed
        );
        assert_eq!(session.phase, Phase::One);
    }

    #[test]
    fn opens_once_and_creates_flag() {
        let (_dir, gate) = setup();
        write_output(&gate);
        let mut session = complete_session();

        assert_eq!(
            gate.evaluate(&mut session, PhaseTrigger::FileChange).unwrap(),
            GateOutcome::Opened
        );
        assert!(gate.store().processed_flag_exists());
        assert!(session.phase2_activated);
        assert_eq!(session.current_state, ConversationState::Analysis);

        let snapshot = session.clone();
        assert_eq!(
            gate.evaluate(&mut session, PhaseTrigger::UserTurn).unwrap(),
            GateOutcome::Closed
        );
        assert_eq!(session, snapshot);
    }

    #[test]
    fn gathering_sessions_stay_closed() {
        let (_dir, gate) = setup();
        write_output(&gate);
        let mut session = complete_session();
        session.current_state = ConversationState::GatheringWwr;
        assert!(!gate.is_open(&session));
        assert!(!gate.store().processed_flag_exists());
    }

    #[test]
    fn rerun_after_invalidation() {
        let (_dir, gate) = setup();
        write_output(&gate);
        let mut session = complete_session();
        gate.evaluate(&mut session, PhaseTrigger::FileChange).unwrap();

        write_output(&gate);
        assert!(gate.invalidate().unwrap());
        assert!(!gate.invalidate().unwrap());
        assert_eq!(
            gate.evaluate(&mut session, PhaseTrigger::UserTurn).unwrap(),
            GateOutcome::Rerun
        );
        assert!(gate.store().processed_flag_exists());
        assert_eq!(session.transitions().count(), 2);
    }

    #[test]
    fn announced_output_keeps_its_flag() {
        let (_dir, gate) = setup();
        write_output(&gate);
        std::thread::sleep(std::time::Duration::from_millis(50));
        let mut session = complete_session();
        gate.evaluate(&mut session, PhaseTrigger::UserTurn).unwrap();

        assert!(!gate.invalidate().unwrap());
        assert!(gate.store().processed_flag_exists());
        assert_eq!(
            gate.evaluate(&mut session, PhaseTrigger::FileChange).unwrap(),
            GateOutcome::Closed
        );
    }
}
