//! The watcher side of the phase gate.
//!
//! Consumes knowledge-directory events. A write of `ml_output.json` clears
//! the processed flag, then every session is evaluated with
//! `PhaseTrigger::FileChange`.

use crate::phase_gate::{GateOutcome, PhaseGate};
use crate::registry::SessionRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use verde_core::error::Result;
use verde_core::session::PhaseTrigger;
use verde_infrastructure::FileEvent;

pub struct PhaseGateSynchronizer {
    registry: Arc<SessionRegistry>,
    gate: PhaseGate,
}

impl PhaseGateSynchronizer {
    pub fn new(registry: Arc<SessionRegistry>, gate: PhaseGate) -> Self {
        Self { registry, gate }
    }

    /// Handles one watcher event. Returns the sessions whose gate moved.
    pub async fn handle_event(&self, event: &FileEvent) -> Result<Vec<(String, GateOutcome)>> {
        if !event.is_write() || !self.gate.store().paths().is_ml_output(&event.path) {
            return Ok(Vec::new());
        }
        self.gate.invalidate()?;
        self.evaluate_all(PhaseTrigger::FileChange).await
    }

    /// Evaluates the gate for every registered session.
    pub async fn evaluate_all(&self, trigger: PhaseTrigger) -> Result<Vec<(String, GateOutcome)>> {
        let mut moved = Vec::new();
        for (id, session) in self.registry.entries().await {
            let mut session = session.lock().await;
            match self.gate.evaluate(&mut session, trigger) {
                Ok(GateOutcome::Closed) => {}
                Ok(outcome) => moved.push((id, outcome)),
                Err(e) => {
                    tracing::warn!("[PhaseGate] Session {} not advanced: {}", id, e);
                }
            }
        }
        Ok(moved)
    }

    /// Runs until `cancel` fires or the event channel closes.
    pub async fn run(self, mut events: mpsc::Receiver<FileEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("[PhaseGate] Synchronizer cancelled");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("[PhaseGate] Watcher closed, synchronizer stopping");
                        break;
                    };
                    match self.handle_event(&event).await {
                        Ok(moved) => {
                            for (id, outcome) in moved {
                                tracing::debug!("[PhaseGate] {} -> {:?}", id, outcome);
                            }
                        }
                        Err(e) => tracing::warn!("[PhaseGate] Event handling failed: {}", e),
                    }
                }
            }
        }
    }

    pub fn spawn(self, events: mpsc::Receiver<FileEvent>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(events, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use verde_core::analysis::MlOutput;
    use verde_core::design::{Geometry, Typology};
    use verde_core::session::{ConversationState, Phase};
    use verde_infrastructure::{FileEventKind, KnowledgePaths, KnowledgeStore};

    async fn setup() -> (TempDir, KnowledgeStore, PhaseGateSynchronizer, Arc<SessionRegistry>) {
        let dir = TempDir::new().unwrap();
        let store = KnowledgeStore::new(KnowledgePaths::new(dir.path()));
        store.ensure_layout().unwrap();
        let registry = Arc::new(SessionRegistry::new());
        let shared = registry.get_or_create("sync").await;
        {
            let mut session = shared.lock().await;
            session.design_data.geometry = Geometry {
                typology: Some(Typology::Courtyard),
                number_of_levels: Some(3),
                width_m: Some(24.0),
                depth_m: Some(24.0),
            };
            session.design_data.self_modeling = Some(false);
            session.design_data.apply_simple_material("concrete");
            session.design_data.wwr = Some(0.35);
            session.current_state = ConversationState::Complete;
        }
        let synchronizer = PhaseGateSynchronizer::new(registry.clone(), PhaseGate::new(store.clone()));
        (dir, store, synchronizer, registry)
    }

    fn event(path: std::path::PathBuf, kind: FileEventKind) -> FileEvent {
        FileEvent { path, kind }
    }

    fn publish(store: &KnowledgeStore, value: f64) {
        store
            .write_ml_output(&MlOutput::from_prediction(&[value; 7]))
            .unwrap();
    }

    #[tokio::test]
    async fn other_files_are_ignored() {
        let (_dir, store, synchronizer, registry) = setup().await;
        publish(&store, 3.0);

        let design = event(store.paths().design_file(), FileEventKind::Modified);
        assert!(synchronizer.handle_event(&design).await.unwrap().is_empty());
        let session = registry.get("sync").await.unwrap();
        assert_eq!(session.lock().await.phase, Phase::One);
        assert!(!store.processed_flag_exists());
    }

    #[tokio::test]
    async fn removal_is_ignored() {
        let (_dir, store, synchronizer, _registry) = setup().await;
        publish(&store, 3.0);
        store.create_processed_flag().unwrap();

        let removed = event(store.paths().ml_output_file(), FileEventKind::Removed);
        assert!(synchronizer.handle_event(&removed).await.unwrap().is_empty());
        assert!(store.processed_flag_exists());
    }

    #[tokio::test]
    async fn ml_output_write_opens_then_reruns() {
        let (_dir, store, synchronizer, registry) = setup().await;
        publish(&store, 3.0);

        let created = event(store.paths().ml_output_file(), FileEventKind::Created);
        let moved = synchronizer.handle_event(&created).await.unwrap();
        assert_eq!(moved, vec![("sync".to_string(), GateOutcome::Opened)]);
        assert!(store.processed_flag_exists());
        {
            let shared = registry.get("sync").await.unwrap();
            let session = shared.lock().await;
            assert_eq!(session.phase, Phase::Two);
            assert_eq!(session.current_state, ConversationState::Analysis);
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        publish(&store, 4.0);
        let modified = event(store.paths().ml_output_file(), FileEventKind::Modified);
        let moved = synchronizer.handle_event(&modified).await.unwrap();
        assert_eq!(moved, vec![("sync".to_string(), GateOutcome::Rerun)]);
        assert!(store.processed_flag_exists());
    }
}
