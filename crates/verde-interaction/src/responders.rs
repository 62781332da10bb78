//! Phase-2 responders.
//!
//! Each intent tag dispatches to one of three responders: the data answer,
//! the advisor and the change parser. With an oracle configured the answer
//! text comes from the LLM; without one a deterministic summary is built
//! from the same context.

use crate::extractor::{json_object_text, LexicalExtractor};
use crate::oracle::ChatOracle;
use crate::prompts::{
    PromptLibrary, ADVISOR_SYSTEM, ANALYSIS_USER, CHANGE_SYSTEM, DATA_ANSWER_SYSTEM,
};
use minijinja::context;
use std::fmt::Write as _;
use std::sync::Arc;
use verde_core::analysis::{Metric, MetricGroup, MlOutput};
use verde_core::design::{DesignData, Material, MaterialField, ParameterSet};
use verde_core::error::{Result, VerdeError};
use verde_core::intent::Intent;
use verde_core::version::VersionRecord;

/// What a responder may look at.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub design: &'a DesignData,
    pub ml_output: Option<&'a MlOutput>,
    /// Stored versions, oldest first
    pub versions: &'a [VersionRecord],
}

impl<'a> AnalysisContext<'a> {
    pub fn new(design: &'a DesignData) -> Self {
        Self {
            design,
            ml_output: None,
            versions: &[],
        }
    }

    pub fn with_ml_output(mut self, ml_output: Option<&'a MlOutput>) -> Self {
        self.ml_output = ml_output;
        self
    }

    pub fn with_versions(mut self, versions: &'a [VersionRecord]) -> Self {
        self.versions = versions;
        self
    }

    fn results_json(&self) -> String {
        self.ml_output
            .and_then(|output| serde_json::to_string_pretty(output).ok())
            .unwrap_or_else(|| "(no prediction yet)".to_string())
    }

    fn history_lines(&self) -> String {
        self.versions
            .iter()
            .map(|record| {
                let outcome = match record.outputs.metric(Metric::GwpTotal) {
                    Some(gwp) => format!("GWP total {:.1} kgCO2e/m²", gwp),
                    None => "prediction failed".to_string(),
                };
                format!("{}: wwr {:.2}, {}", record.version, record.inputs.wwr, outcome)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A design change ready to be applied and re-predicted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeProposal {
    /// Design data after the change
    pub design: DesignData,
    /// Keys that differ from the current design
    pub changed: Vec<String>,
}

pub struct Responders {
    oracle: Option<Arc<dyn ChatOracle>>,
    prompts: Arc<PromptLibrary>,
    lexical: LexicalExtractor,
}

impl Responders {
    pub fn new(oracle: Option<Arc<dyn ChatOracle>>, prompts: Arc<PromptLibrary>) -> Self {
        Self {
            oracle,
            prompts,
            lexical: LexicalExtractor::new(),
        }
    }

    /// Answers carbon, data and general questions.
    pub async fn data_answer(
        &self,
        intent: Intent,
        utterance: &str,
        ctx: AnalysisContext<'_>,
    ) -> Result<String> {
        let Some(oracle) = &self.oracle else {
            return Ok(summarize_results(intent, ctx));
        };
        let system = self.prompts.render(
            DATA_ANSWER_SYSTEM,
            context! { intent => intent.to_string() },
        )?;
        let user = self.analysis_prompt(utterance, ctx)?;
        Ok(oracle.complete(&system, &user).await?)
    }

    /// Suggests improvements.
    pub async fn advise(&self, utterance: &str, ctx: AnalysisContext<'_>) -> Result<String> {
        let Some(oracle) = &self.oracle else {
            return Ok(suggest_improvements(ctx.design));
        };
        let system = self.prompts.render(
            ADVISOR_SYSTEM,
            context! { fields => PromptLibrary::material_fields() },
        )?;
        let user = self.analysis_prompt(utterance, ctx)?;
        Ok(oracle.complete(&system, &user).await?)
    }

    /// Turns a change request into a new design.
    ///
    /// The oracle must answer with all ten parameters. An unusable answer
    /// falls back to lexical reading of the request; a request nothing can
    /// be read from is a parse error.
    pub async fn parse_change(
        &self,
        utterance: &str,
        ctx: AnalysisContext<'_>,
    ) -> Result<ChangeProposal> {
        if let Some(oracle) = &self.oracle {
            let system = self.prompts.render(
                CHANGE_SYSTEM,
                context! { fields => PromptLibrary::material_fields() },
            )?;
            let current = serde_json::to_string_pretty(&ctx.design.parameter_set().ok())?;
            let user = format!("Current parameters:\n{}\n\nRequest: {}", current, utterance);
            let reply = oracle.complete(&system, &user).await?;
            match parse_parameter_set(&reply) {
                Ok(params) => return proposal_from_parameters(ctx.design, params),
                Err(e) => {
                    tracing::debug!("[ChangeParser] falling back to lexical: {}", e);
                }
            }
        }
        self.lexical_change(utterance, ctx.design)
    }

    fn lexical_change(&self, utterance: &str, design: &DesignData) -> Result<ChangeProposal> {
        let update = self.lexical.extract_update(utterance, design);
        if update.is_empty() {
            return Err(VerdeError::parse(
                "no design change recognised; name a material, a dimension or the window ratio",
            ));
        }

        let mut next = design.clone();
        let changed = next.merge(&update)?;
        if changed.is_empty() {
            return Err(VerdeError::parse("the design already has those values"));
        }
        let geometry_changed = changed.iter().any(|key| {
            matches!(
                key.as_str(),
                "typology" | "number_of_levels" | "width_m" | "depth_m"
            )
        });
        if geometry_changed && next.self_modeling == Some(false) {
            if let Some(metrics) = next.geometry.synthesize_metrics() {
                next.apply_metrics(metrics);
            }
        }
        Ok(ChangeProposal {
            design: next,
            changed,
        })
    }

    fn analysis_prompt(&self, utterance: &str, ctx: AnalysisContext<'_>) -> Result<String> {
        let design = serde_json::to_string_pretty(ctx.design)?;
        self.prompts.render(
            ANALYSIS_USER,
            context! {
                design => design,
                results => ctx.results_json(),
                history => ctx.history_lines(),
                utterance => utterance,
            },
        )
    }
}

/// Strict ten-field parameter object.
fn parse_parameter_set(reply: &str) -> Result<ParameterSet> {
    let text = json_object_text(reply)
        .ok_or_else(|| VerdeError::parse("change reply holds no JSON object"))?;
    let params: ParameterSet = serde_json::from_str(text)
        .map_err(|e| VerdeError::parse(format!("change reply is not a parameter set: {}", e)))?;
    params.validate()?;
    Ok(params)
}

fn proposal_from_parameters(design: &DesignData, params: ParameterSet) -> Result<ChangeProposal> {
    let mut next = design.clone();
    next.apply_parameters(&params)?;

    let before = design.parameter_set().ok();
    let mut changed: Vec<String> = params
        .material_codes()
        .iter()
        .filter(|(field, code)| design.material(*field) != Some(*code))
        .map(|(field, _)| field.key().to_string())
        .collect();
    for (key, old, new) in [
        ("wwr", before.map(|p| p.wwr), params.wwr),
        ("av", before.map(|p| p.av), params.av),
        ("gfa", before.map(|p| p.gfa), params.gfa),
    ] {
        if old != Some(new) {
            changed.push(key.to_string());
        }
    }

    Ok(ChangeProposal {
        design: next,
        changed,
    })
}

fn summarize_results(intent: Intent, ctx: AnalysisContext<'_>) -> String {
    let Some(output) = ctx.ml_output else {
        return "No prediction results are available yet.".to_string();
    };

    let metrics: Vec<Metric> = match intent {
        Intent::CarbonQuery => Metric::all()
            .filter(|m| m.group() == MetricGroup::Carbon)
            .collect(),
        _ => Metric::all().collect(),
    };
    let mut text = String::from("Current predictions:");
    for metric in metrics {
        if let Some(value) = output.metric(metric) {
            let _ = write!(text, "\n- {}: {:.1} {}", metric, value, metric.unit());
        }
    }
    for (key, value) in &output.extra {
        let _ = write!(text, "\n- {}: {}", key, value);
    }
    if !ctx.versions.is_empty() {
        let _ = write!(text, "\n{} version(s) stored.", ctx.versions.len());
    }
    text
}

fn suggest_improvements(design: &DesignData) -> String {
    let mut ideas = Vec::new();
    if design.material_name(MaterialField::EwPar) != Some(Material::TimberMass) {
        ideas.push("switch the exterior wall partition to timber_mass to cut embodied carbon");
    }
    if !matches!(
        design.material_name(MaterialField::RoIns),
        Some(Material::WoodFiber | Material::Cellulose)
    ) {
        ideas.push("use wood_fiber or cellulose roof insulation");
    }
    if design.wwr.is_some_and(|wwr| wwr > 0.4) {
        ideas.push("reduce the window-to-wall ratio towards 0.3 to lower cooling demand");
    }
    if design.material_name(MaterialField::IsPar) == Some(Material::Concrete) {
        ideas.push("replace concrete interior slabs with timber_mass");
    }
    if ideas.is_empty() {
        return "The design already uses low-carbon options; try comparing window ratios between 0.2 and 0.4.".to_string();
    }
    format!("You could:\n- {}", ideas.join("\n- "))
}
