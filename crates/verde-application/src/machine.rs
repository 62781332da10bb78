//! Conversation state machine.
//!
//! One call per user turn: `(state, input, design_data)` in, a
//! [`TurnOutcome`] out. The machine never fails: fatal errors land in
//! `error` with the prior design data, recoverable ones keep the state
//! and re-ask.
//!
//! Side effects (writing files, running the predictor, the phase gate) are
//! left to the orchestrator; the outcome carries what it needs to know.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use verde_core::analysis::MlOutput;
use verde_core::design::{DesignData, MaterialField};
use verde_core::error::{Result, VerdeError};
use verde_core::intent::{Intent, IntentRouter, ResponderKind};
use verde_core::session::{ConversationState, Phase};
use verde_core::version::VersionRecord;
use verde_interaction::{AnalysisContext, Extraction, ParameterExtractor, Responders};

pub const GREETING: &str = "Hi, I'm Verde. Let's set up your building: I need the massing, \
the materials and the window-to-wall ratio.";

const COMPLETE_MESSAGE: &str = "That completes the design brief. The parameters are ready for \
the energy and carbon model; analysis starts as soon as results arrive.";
const GEOMETRY_MESSAGE: &str = "I've asked the geometry host to generate the massing.";
const WAITING_MESSAGE: &str = "Your design is complete. I'm waiting for the model results \
before we move on to analysis.";
const ANALYSIS_PROMPT: &str = "Ask me about energy or carbon, ask for improvements, or \
request a design change.";
const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything one turn may look at.
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub state: ConversationState,
    pub phase: Phase,
    pub input: &'a str,
    pub design_data: &'a DesignData,
    pub ml_output: Option<&'a MlOutput>,
    pub versions: &'a [VersionRecord],
}

impl<'a> TurnRequest<'a> {
    /// A request whose phase follows from the state.
    pub fn new(state: ConversationState, input: &'a str, design_data: &'a DesignData) -> Self {
        let phase = if state == ConversationState::Analysis {
            Phase::Two
        } else {
            Phase::One
        };
        Self {
            state,
            phase,
            input,
            design_data,
            ml_output: None,
            versions: &[],
        }
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_analysis(
        mut self,
        ml_output: Option<&'a MlOutput>,
        versions: &'a [VersionRecord],
    ) -> Self {
        self.ml_output = ml_output;
        self.versions = versions;
        self
    }
}

/// Response envelope of one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub prior_state: ConversationState,
    pub new_state: ConversationState,
    pub response: String,
    pub design_data: DesignData,
    /// Set on the turn that asks the geometry host to build the massing
    pub trigger_geometry_generation: bool,
    /// Design keys this turn changed
    pub changed: Vec<String>,
    /// Phase-2 intent the turn was routed by
    pub intent: Option<Intent>,
    pub error: Option<VerdeError>,
}

impl TurnOutcome {
    /// This turn finished Phase-1 gathering.
    pub fn completed_phase1(&self) -> bool {
        self.new_state == ConversationState::Complete
            && !matches!(
                self.prior_state,
                ConversationState::Complete | ConversationState::Analysis
            )
            && self.error.is_none()
    }

    /// A Phase-2 design change was applied.
    pub fn changed_design_in_analysis(&self) -> bool {
        self.new_state == ConversationState::Analysis && !self.changed.is_empty()
    }

    fn with_error(mut self, error: VerdeError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Phase-1 state implied by what the design already holds.
pub fn infer_state(design: &DesignData) -> ConversationState {
    if !design.geometry_ready() {
        ConversationState::GatheringGeometry
    } else if !design.materials_complete() {
        ConversationState::GatheringMaterials
    } else if design.wwr.is_none() {
        ConversationState::GatheringWwr
    } else {
        ConversationState::Complete
    }
}

pub struct ConversationMachine {
    extractor: Arc<dyn ParameterExtractor>,
    router: Arc<dyn IntentRouter>,
    responders: Arc<Responders>,
    oracle_timeout: Duration,
}

impl ConversationMachine {
    pub fn new(
        extractor: Arc<dyn ParameterExtractor>,
        router: Arc<dyn IntentRouter>,
        responders: Arc<Responders>,
    ) -> Self {
        Self {
            extractor,
            router,
            responders,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }

    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub async fn handle_turn(
        &self,
        state: ConversationState,
        input: &str,
        design_data: &DesignData,
    ) -> TurnOutcome {
        self.handle(TurnRequest::new(state, input, design_data)).await
    }

    pub async fn handle(&self, request: TurnRequest<'_>) -> TurnOutcome {
        let outcome = match self.step(request).await {
            Ok(outcome) => outcome,
            Err(e) => return fail(request, e),
        };
        if let Err(e) = outcome.design_data.validate() {
            return fail(request, e);
        }
        if outcome.new_state != request.state {
            tracing::debug!(
                "[StateMachine] {} -> {}",
                request.state,
                outcome.new_state
            );
        }
        outcome
    }

    async fn step(&self, req: TurnRequest<'_>) -> Result<TurnOutcome> {
        let input = req.input.trim();
        match req.state {
            ConversationState::Initial => {
                if input.is_empty() {
                    let text = format!("{} {}", GREETING, question_for(req.design_data));
                    return Ok(stay(req, ConversationState::Initial, text));
                }
                self.gather(req, input, Some(GREETING)).await
            }
            ConversationState::GatheringGeometry
            | ConversationState::GatheringMaterials
            | ConversationState::GatheringWwr => self.gather(req, input, None).await,
            ConversationState::Complete => Ok(stay(req, ConversationState::Complete, WAITING_MESSAGE)),
            ConversationState::Analysis => self.analyse(req, input).await,
            ConversationState::Error => self.recover(req, input).await,
        }
    }

    async fn gather(
        &self,
        req: TurnRequest<'_>,
        input: &str,
        prefix: Option<&str>,
    ) -> Result<TurnOutcome> {
        let current = infer_state(req.design_data);
        let with_prefix = |text: String| match prefix {
            Some(prefix) => format!("{} {}", prefix, text),
            None => text,
        };
        if input.is_empty() {
            return Ok(stay(req, current, with_prefix(question_for(req.design_data))));
        }

        let extraction = self
            .timed(async { Ok(self.extractor.extract(input, req.design_data).await) })
            .await?;

        let update = match extraction {
            Extraction::Parsed(update) if update.is_empty() => {
                let text = format!(
                    "I didn't catch any design parameters there. {}",
                    question_for(req.design_data)
                );
                return Ok(stay(req, current, with_prefix(text)));
            }
            Extraction::Parsed(update) => update,
            Extraction::ParseError(message) => {
                tracing::debug!("[StateMachine] Extraction parse error: {}", message);
                let text = format!(
                    "I couldn't read that as design parameters. {}",
                    question_for(req.design_data)
                );
                return Ok(stay(req, current, with_prefix(text))
                    .with_error(VerdeError::parse(message)));
            }
            Extraction::Unavailable(e @ VerdeError::OracleTimeout { .. }) => return Err(e),
            Extraction::Unavailable(e) => {
                let text = format!(
                    "I can't reach the language model right now ({}). {}",
                    e,
                    question_for(req.design_data)
                );
                return Ok(stay(req, current, with_prefix(text)).with_error(e));
            }
        };

        let mut design = req.design_data.clone();
        let mut changed = match design.merge(&update) {
            Ok(changed) => changed,
            Err(e) if e.is_recoverable() => {
                let text = format!("{}. {}", e, question_for(req.design_data));
                return Ok(stay(req, current, with_prefix(text)).with_error(e));
            }
            Err(e) => return Err(e),
        };
        changed.extend(default_insulation(&mut design));

        Ok(self.advance(req, design, changed, prefix))
    }

    fn advance(
        &self,
        req: TurnRequest<'_>,
        mut design: DesignData,
        mut changed: Vec<String>,
        prefix: Option<&str>,
    ) -> TurnOutcome {
        let next = infer_state(&design);
        let mut parts: Vec<String> = prefix.map(str::to_string).into_iter().collect();
        if !changed.is_empty() {
            parts.push(acknowledge(&design, &changed));
        }

        let mut trigger = false;
        if next == ConversationState::Complete {
            // atomic with the transition: the flag flips in the same update
            if design.should_trigger_geometry() && design.mark_geometry_generated() {
                trigger = true;
                changed.push("geometry_generated".to_string());
            }
            parts.push(COMPLETE_MESSAGE.to_string());
            if trigger {
                parts.push(GEOMETRY_MESSAGE.to_string());
            }
        } else {
            parts.push(question_for(&design));
        }

        TurnOutcome {
            prior_state: req.state,
            new_state: next,
            response: parts.join(" "),
            design_data: design,
            trigger_geometry_generation: trigger,
            changed,
            intent: None,
            error: None,
        }
    }

    async fn analyse(&self, req: TurnRequest<'_>, input: &str) -> Result<TurnOutcome> {
        if req.phase != Phase::Two {
            return Err(VerdeError::invariant("analysis turn while in phase 1"));
        }
        if input.is_empty() {
            return Ok(stay(req, ConversationState::Analysis, ANALYSIS_PROMPT));
        }

        let intent = self.router.classify(input).await;
        tracing::debug!("[StateMachine] Routed to {} ({})", intent.responder(), intent);
        let ctx = AnalysisContext::new(req.design_data)
            .with_ml_output(req.ml_output)
            .with_versions(req.versions);

        let result = match intent.responder() {
            ResponderKind::DataAnswer => self
                .timed(self.responders.data_answer(intent, input, ctx))
                .await
                .map(|text| (text, None)),
            ResponderKind::Advisor => self
                .timed(self.responders.advise(input, ctx))
                .await
                .map(|text| (text, None)),
            ResponderKind::ChangeParser => self
                .timed(self.responders.parse_change(input, ctx))
                .await
                .map(|proposal| {
                    let text = format!(
                        "Updated {}. Re-running the prediction for the new variant.",
                        describe_changes(&proposal.design, &proposal.changed)
                    );
                    (text, Some(proposal))
                }),
        };

        let mut outcome = match result {
            Ok((text, None)) => stay(req, ConversationState::Analysis, text),
            Ok((text, Some(proposal))) => TurnOutcome {
                prior_state: req.state,
                new_state: ConversationState::Analysis,
                response: text,
                design_data: proposal.design,
                trigger_geometry_generation: false,
                changed: proposal.changed,
                intent: None,
                error: None,
            },
            Err(e) if e.is_recoverable() => {
                let text = match &e {
                    VerdeError::Parse(message) => format!("{}. {}", message, ANALYSIS_PROMPT),
                    other => format!("I can't answer that right now ({}).", other),
                };
                stay(req, ConversationState::Analysis, text).with_error(e)
            }
            Err(e) => return Err(e),
        };
        outcome.intent = Some(intent);
        Ok(outcome)
    }

    async fn recover(&self, req: TurnRequest<'_>, input: &str) -> Result<TurnOutcome> {
        let resumed = if req.phase == Phase::Two {
            ConversationState::Analysis
        } else {
            infer_state(req.design_data)
        };
        tracing::info!("[StateMachine] Recovering from error into {}", resumed);
        let resumed_req = TurnRequest {
            state: resumed,
            ..req
        };

        let mut outcome = match resumed {
            ConversationState::Analysis => self.analyse(resumed_req, input).await?,
            ConversationState::Complete => stay(req, resumed, WAITING_MESSAGE),
            _ => self.gather(resumed_req, input, Some("Let's pick up where we left off.")).await?,
        };
        outcome.prior_state = ConversationState::Error;
        Ok(outcome)
    }

    /// Bounds an oracle-backed call by the configured timeout.
    async fn timed<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.oracle_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(VerdeError::OracleTimeout {
                secs: self.oracle_timeout.as_secs(),
            }),
        }
    }
}

fn stay(req: TurnRequest<'_>, state: ConversationState, response: impl Into<String>) -> TurnOutcome {
    TurnOutcome {
        prior_state: req.state,
        new_state: state,
        response: response.into(),
        design_data: req.design_data.clone(),
        trigger_geometry_generation: false,
        changed: Vec::new(),
        intent: None,
        error: None,
    }
}

/// Phase 1 drops into `error`; a Phase-2 session stays in analysis.
fn fail(req: TurnRequest<'_>, error: VerdeError) -> TurnOutcome {
    tracing::warn!("[StateMachine] Turn in {} failed: {}", req.state, error);
    TurnOutcome {
        prior_state: req.state,
        new_state: failed_state(req.phase),
        response: format!(
            "Something went wrong: {}. Your design is unchanged; send another message to continue.",
            error
        ),
        design_data: req.design_data.clone(),
        trigger_geometry_generation: false,
        changed: Vec::new(),
        intent: None,
        error: Some(error),
    }
}

pub(crate) fn failed_state(phase: Phase) -> ConversationState {
    match phase {
        Phase::One => ConversationState::Error,
        Phase::Two => ConversationState::Analysis,
    }
}

/// Insulation falls back to index 0 once every partition is chosen.
fn default_insulation(design: &mut DesignData) -> Vec<String> {
    let partitions_set = MaterialField::all()
        .filter(|f| !f.is_insulation())
        .all(|f| design.material(f).is_some());
    if !partitions_set {
        return Vec::new();
    }
    let defaulted: Vec<String> = MaterialField::all()
        .filter(|f| f.is_insulation() && design.material(*f).is_none())
        .map(|f| f.key().to_string())
        .collect();
    design.default_insulation();
    defaulted
}

/// The next question, for the first field still missing.
fn question_for(design: &DesignData) -> String {
    let missing = design.missing_fields();
    let Some(first) = missing.first() else {
        return COMPLETE_MESSAGE.to_string();
    };
    let text = match *first {
        "typology" => "Which typology is it: block, courtyard, L-shape or C-shape?",
        "number_of_levels" => "How many levels does the building have?",
        "width_m" => "How wide is the footprint, in meters?",
        "depth_m" => "How deep is the footprint, in meters?",
        "self_modeling" => {
            "Will you model the geometry yourself in the host, or should I generate it?"
        }
        "wwr" => "What window-to-wall ratio should I use? For example 30% or 0.3.",
        _ => {
            "Which materials should I use? One word like wood or concrete covers the whole \
building, or name them per part: exterior walls, interior walls, slabs and roof."
        }
    };
    text.to_string()
}

fn acknowledge(design: &DesignData, changed: &[String]) -> String {
    format!("Noted: {}.", describe_changes(design, changed))
}

fn describe_changes(design: &DesignData, changed: &[String]) -> String {
    let parts: Vec<String> = changed
        .iter()
        .filter_map(|key| describe_field(design, key))
        .collect();
    if parts.is_empty() {
        "the design".to_string()
    } else {
        parts.join(", ")
    }
}

fn describe_field(design: &DesignData, key: &str) -> Option<String> {
    let geometry = &design.geometry;
    let text = match key {
        "typology" => format!("{} typology", geometry.typology?),
        "number_of_levels" => format!("{} levels", geometry.number_of_levels?),
        "width_m" => format!("width {} m", geometry.width_m?),
        "depth_m" => format!("depth {} m", geometry.depth_m?),
        "self_modeling" => {
            if design.self_modeling? {
                "you model the geometry".to_string()
            } else {
                "I generate the geometry".to_string()
            }
        }
        "wwr" => format!("WWR {:.0}%", design.wwr? * 100.0),
        "gfa" => format!("GFA {:.0} m²", design.gfa?),
        "av" => format!("compactness {:.2}", design.av?),
        "geometry_generated" => return None,
        other => {
            let field = MaterialField::from_key(other)?;
            format!("{} {}", field.label(), design.material_name(field)?)
        }
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use verde_core::design::{Geometry, Typology};

    #[test]
    fn state_follows_design() {
        let mut design = DesignData::new();
        assert_eq!(infer_state(&design), ConversationState::GatheringGeometry);
        design.geometry = Geometry {
            typology: Some(Typology::Block),
            number_of_levels: Some(3),
            width_m: Some(12.0),
            depth_m: Some(12.0),
        };
        assert_eq!(infer_state(&design), ConversationState::GatheringGeometry);
        design.self_modeling = Some(true);
        assert_eq!(infer_state(&design), ConversationState::GatheringMaterials);
        design.apply_simple_material("concrete");
        assert_eq!(infer_state(&design), ConversationState::GatheringWwr);
        design.set_wwr(0.25).unwrap();
        assert_eq!(infer_state(&design), ConversationState::Complete);
    }

    #[test]
    fn questions_follow_missing_fields() {
        let mut design = DesignData::new();
        assert!(question_for(&design).contains("typology"));
        design.geometry.typology = Some(Typology::LShape);
        assert!(question_for(&design).contains("levels"));
    }

    #[test]
    fn failures_keep_phase_two_in_analysis() {
        let design = DesignData::new();
        let analysis = TurnRequest::new(ConversationState::Analysis, "gwp?", &design);
        let outcome = fail(analysis, VerdeError::OracleTimeout { secs: 1 });
        assert_eq!(outcome.new_state, ConversationState::Analysis);
        assert!(matches!(outcome.error, Some(VerdeError::OracleTimeout { secs: 1 })));

        let gathering = TurnRequest::new(ConversationState::GatheringWwr, "30%", &design);
        let outcome = fail(gathering, VerdeError::OracleTimeout { secs: 1 });
        assert_eq!(outcome.new_state, ConversationState::Error);
    }

    #[test]
    fn insulation_defaults_only_after_partitions() {
        let mut design = DesignData::new();
        design.ew_par = Some(0);
        assert!(default_insulation(&mut design).is_empty());
        design.iw_par = Some(0);
        design.is_par = Some(0);
        design.ro_par = Some(0);
        design.ro_ins = Some(3);
        let defaulted = default_insulation(&mut design);
        assert_eq!(defaulted, vec!["ew_ins".to_string(), "es_ins".to_string()]);
        assert_eq!(design.ro_ins, Some(3));
        assert!(design.materials_complete());
    }
}
