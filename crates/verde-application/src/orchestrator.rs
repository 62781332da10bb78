//! Orchestrator: the entry point for every user turn.
//!
//! Serializes turns per session, runs the user-turn side of the phase gate,
//! drives the state machine and applies the side effects its outcome asks
//! for. No error crosses this boundary; failures come back inside the
//! [`TurnResponse`].

use crate::machine::{ConversationMachine, TurnOutcome, TurnRequest, failed_state};
use crate::phase_gate::{GateOutcome, PhaseGate};
use crate::prediction::{PredictionReport, PredictionService};
use crate::registry::SessionRegistry;
use crate::synchronizer::PhaseGateSynchronizer;
use serde::Serialize;
use std::sync::Arc;
use verde_core::analysis::Metric;
use verde_core::design::DesignData;
use verde_core::error::VerdeError;
use verde_core::intent::Intent;
use verde_core::session::{
    ConversationState, HistoryEntry, PHASE2_BANNER, Phase, PhaseTrigger, RERUN_BANNER, Session,
};
use verde_core::version::{PredictionOutcome, VersionId, VersionRepository};

/// What a caller gets back from one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub prior_state: ConversationState,
    pub state: ConversationState,
    pub phase: Phase,
    pub phase2_activated: bool,
    pub response: String,
    pub design_data: DesignData,
    pub trigger_geometry_generation: bool,
    pub intent: Option<Intent>,
    /// Version saved by a prediction this turn ran
    pub version: Option<VersionId>,
    pub error: Option<VerdeError>,
}

pub struct Orchestrator {
    machine: ConversationMachine,
    registry: Arc<SessionRegistry>,
    gate: PhaseGate,
    predictions: PredictionService,
    versions: Arc<dyn VersionRepository>,
    auto_predict: bool,
}

impl Orchestrator {
    pub fn new(
        machine: ConversationMachine,
        registry: Arc<SessionRegistry>,
        gate: PhaseGate,
        predictions: PredictionService,
        versions: Arc<dyn VersionRepository>,
    ) -> Self {
        Self {
            machine,
            registry,
            gate,
            predictions,
            versions,
            auto_predict: false,
        }
    }

    /// Predict in-process as soon as Phase 1 completes.
    pub fn with_auto_predict(mut self, auto_predict: bool) -> Self {
        self.auto_predict = auto_predict;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn gate(&self) -> &PhaseGate {
        &self.gate
    }

    pub fn versions(&self) -> &Arc<dyn VersionRepository> {
        &self.versions
    }

    /// The watcher-side consumer sharing this orchestrator's sessions.
    pub fn synchronizer(&self) -> PhaseGateSynchronizer {
        PhaseGateSynchronizer::new(self.registry.clone(), self.gate.clone())
    }

    /// A copy of the session, if it exists.
    pub async fn snapshot(&self, session_id: &str) -> Option<Session> {
        let shared = self.registry.get(session_id).await?;
        let session = shared.lock().await;
        Some(session.clone())
    }

    pub async fn handle_turn(&self, session_id: &str, input: &str) -> TurnResponse {
        let shared = self.registry.get_or_create(session_id).await;
        let mut session = shared.lock().await;
        let prior_state = session.current_state;

        let mut notes: Vec<String> = session.take_notice().into_iter().collect();
        notes.extend(self.open_gate(&mut session));
        // the gate wrote its flag, so a rejected turn rolls back to here
        let checkpoint = session.clone();

        if input.trim().is_empty() && !notes.is_empty() {
            let response = notes.join("\n\n");
            let entry = HistoryEntry::turn(input, &response, session.phase, session.current_state);
            session.push_history(entry);
            return respond(&session, prior_state, response, None, None, false, None);
        }

        let outcome = self.run_machine(&session, input).await;
        let mut response = outcome.response.clone();
        session.current_state = outcome.new_state;
        session.design_data = outcome.design_data.clone();

        if !outcome.changed.is_empty() {
            self.write_design(&session.design_data);
        }
        if outcome.trigger_geometry_generation {
            self.request_geometry(&session.design_data);
        }

        let mut version = None;
        let wants_prediction = (outcome.completed_phase1() && self.auto_predict)
            || outcome.changed_design_in_analysis();
        if wants_prediction {
            let mut design = session.design_data.clone();
            match self.predictions.run(&mut design).await {
                Ok(report) => {
                    response = format!("{} {}", response, describe_report(&report));
                    version = Some(report.version);
                    session.design_data = design;
                    self.write_design(&session.design_data);
                }
                Err(e) => {
                    tracing::warn!("[Orchestrator] Prediction not run: {}", e);
                    response = format!("{} I couldn't run the prediction: {}.", response, e);
                }
            }
        }

        if let Err(e) = session.check_invariants() {
            tracing::error!("[Orchestrator] Turn rejected, {}", e);
            *session = checkpoint;
            session.current_state = failed_state(session.phase);
            let text = format!("Something went wrong: {}. Your design is unchanged.", e);
            let entry = HistoryEntry::turn(input, &text, session.phase, session.current_state);
            session.push_history(entry);
            return respond(&session, prior_state, text, None, None, false, Some(e));
        }

        // results may already be waiting when this turn completes the brief
        let late = self.open_gate(&mut session);
        if !notes.is_empty() {
            notes.push(response);
            response = notes.join("\n\n");
        }
        if let Some(banner) = late {
            response = format!("{}\n\n{}", response, banner);
        }
        let entry = HistoryEntry::turn(input, &response, session.phase, session.current_state)
            .with_intent(outcome.intent);
        session.push_history(entry);

        respond(
            &session,
            prior_state,
            response,
            outcome.intent,
            version,
            outcome.trigger_geometry_generation,
            outcome.error,
        )
    }

    /// User-turn side of the phase gate. Returns the banner to show, if any.
    fn open_gate(&self, session: &mut Session) -> Option<String> {
        match self.gate.evaluate(session, PhaseTrigger::UserTurn) {
            Ok(GateOutcome::Opened) => Some(PHASE2_BANNER.to_string()),
            Ok(GateOutcome::Rerun) => Some(RERUN_BANNER.to_string()),
            Ok(GateOutcome::Closed) => None,
            Err(e) => {
                tracing::warn!("[Orchestrator] Phase gate evaluation failed: {}", e);
                None
            }
        }
    }

    async fn run_machine(&self, session: &Session, input: &str) -> TurnOutcome {
        let (ml_output, versions) = if session.phase == Phase::Two {
            let versions = self.versions.list().await.unwrap_or_else(|e| {
                tracing::warn!("[Orchestrator] Version history unavailable: {}", e);
                Vec::new()
            });
            (self.gate.store().read_ml_output(), versions)
        } else {
            (None, Vec::new())
        };

        let request = TurnRequest::new(session.current_state, input, &session.design_data)
            .with_phase(session.phase)
            .with_analysis(ml_output.as_ref(), &versions);
        self.machine.handle(request).await
    }

    fn write_design(&self, design: &DesignData) {
        if let Err(e) = self.gate.store().write_design(design) {
            tracing::warn!("[Orchestrator] Design snapshot not written: {}", e);
        }
    }

    fn request_geometry(&self, design: &DesignData) {
        let Some(request) = design.geometry.to_request() else {
            return;
        };
        if let Err(e) = self.gate.store().write_geometry_request(&request) {
            tracing::warn!("[Orchestrator] Geometry request not written: {}", e);
        }
    }
}

fn respond(
    session: &Session,
    prior_state: ConversationState,
    response: String,
    intent: Option<Intent>,
    version: Option<VersionId>,
    trigger_geometry_generation: bool,
    error: Option<VerdeError>,
) -> TurnResponse {
    TurnResponse {
        session_id: session.id.clone(),
        prior_state,
        state: session.current_state,
        phase: session.phase,
        phase2_activated: session.phase2_activated,
        response,
        design_data: session.design_data.clone(),
        trigger_geometry_generation,
        intent,
        version,
        error,
    }
}

fn describe_report(report: &PredictionReport) -> String {
    match &report.outcome {
        PredictionOutcome::Metrics(_) => {
            let headline: Vec<String> = [Metric::GwpTotal, Metric::Eui]
                .into_iter()
                .filter_map(|metric| {
                    report
                        .outcome
                        .metric(metric)
                        .map(|value| format!("{} {:.1} {}", metric, value, metric.unit()))
                })
                .collect();
            format!("Prediction saved as {}: {}.", report.version, headline.join(", "))
        }
        PredictionOutcome::Failed(_) => {
            format!("The prediction failed; recorded as {}.", report.version)
        }
    }
}
