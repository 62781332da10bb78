//! Prompt templates rendered with minijinja.

use minijinja::{Environment, Value};
use verde_core::design::MaterialField;
use verde_core::error::{Result, VerdeError};

pub const EXTRACT_SYSTEM: &str = "extract_system";
pub const EXTRACT_USER: &str = "extract_user";
pub const CHANGE_SYSTEM: &str = "change_system";
pub const DATA_ANSWER_SYSTEM: &str = "data_answer_system";
pub const ADVISOR_SYSTEM: &str = "advisor_system";
pub const ANALYSIS_USER: &str = "analysis_user";

const EXTRACT_SYSTEM_TEMPLATE: &str = r#"You extract building design parameters from an architect's message.
Reply with ONE JSON object and nothing else. Use null for anything the message does not state.

Keys:
- "typology": one of "block", "courtyard", "l-shape", "c-shape"
- "number_of_levels": integer >= 1
- "width_m", "depth_m": footprint in meters
- "self_modeling": true if the user models the geometry themselves, false if they want it generated
- "simple_material": a single material word meant for the whole building (e.g. "wood", "concrete")
{%- for field in fields %}
- "{{ field.key }}": {{ field.label }}, one of: {{ field.options }}
{%- endfor %}
- "wwr": window-to-wall ratio as a fraction in [0, 1]

Material values may be given as the listed name or its numeric code."#;

const EXTRACT_USER_TEMPLATE: &str = r#"Known so far:
{{ design }}
{% if missing %}Still missing: {{ missing | join(", ") }}
{% endif %}
Message: {{ utterance }}"#;

const CHANGE_SYSTEM_TEMPLATE: &str = r#"You apply a requested design change to the current parameter set.
Reply with ONE JSON object holding all ten numeric parameters and nothing else:
{"ew_par", "ew_ins", "iw_par", "es_ins", "is_par", "ro_par", "ro_ins", "wwr", "av", "gfa"}.
Keep every parameter the request does not mention at its current value.
Material parameters are integer codes:
{%- for field in fields %}
- {{ field.key }} ({{ field.label }}): {{ field.options }}
{%- endfor %}
"wwr" is a fraction in [0, 1]. Do not change "av" or "gfa" unless the request is explicitly about them."#;

const DATA_ANSWER_SYSTEM_TEMPLATE: &str = r#"You are a building performance analyst. Answer the architect's question using only the
prediction results and design parameters provided. Quote values with their units
(energy in kWh/m²a, carbon in kgCO2e/m²). Be concise.{% if intent == "carbon_query" %}
Focus on embodied and operational carbon and the total GWP.{% endif %}"#;

const ADVISOR_SYSTEM_TEMPLATE: &str = r#"You are a sustainable design advisor. Suggest two or three concrete changes to the
design parameters that would improve the metric the architect cares about, and
explain the expected effect of each. Only suggest materials from these options:
{%- for field in fields %}
- {{ field.label }}: {{ field.options }}
{%- endfor %}"#;

const ANALYSIS_USER_TEMPLATE: &str = r#"Design parameters:
{{ design }}

Prediction results:
{{ results }}
{% if history %}
Version history:
{{ history }}
{% endif %}
Question: {{ utterance }}"#;

/// Compiled prompt set.
pub struct PromptLibrary {
    env: Environment<'static>,
}

impl PromptLibrary {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            (EXTRACT_SYSTEM, EXTRACT_SYSTEM_TEMPLATE),
            (EXTRACT_USER, EXTRACT_USER_TEMPLATE),
            (CHANGE_SYSTEM, CHANGE_SYSTEM_TEMPLATE),
            (DATA_ANSWER_SYSTEM, DATA_ANSWER_SYSTEM_TEMPLATE),
            (ADVISOR_SYSTEM, ADVISOR_SYSTEM_TEMPLATE),
            (ANALYSIS_USER, ANALYSIS_USER_TEMPLATE),
        ] {
            env.add_template(name, source)
                .map_err(|e| VerdeError::internal(format!("template {}: {}", name, e)))?;
        }
        Ok(Self { env })
    }

    pub fn render(&self, name: &str, ctx: Value) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| VerdeError::internal(format!("template {}: {}", name, e)))?;
        template
            .render(ctx)
            .map_err(|e| VerdeError::internal(format!("render {}: {}", name, e)))
    }

    /// Per-field material tables as template input.
    pub fn material_fields() -> Value {
        let fields: Vec<Value> = MaterialField::all()
            .map(|field| {
                minijinja::context! {
                    key => field.key(),
                    label => field.label(),
                    options => field.category().describe(),
                }
            })
            .collect();
        Value::from(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn extraction_prompt_lists_every_field() {
        let prompts = PromptLibrary::new().unwrap();
        let system = prompts
            .render(
                EXTRACT_SYSTEM,
                context! { fields => PromptLibrary::material_fields() },
            )
            .unwrap();
        for field in MaterialField::all() {
            assert!(system.contains(field.key()), "missing {}", field);
        }
        assert!(system.contains("expanded_glass"));
    }

    #[test]
    fn user_prompt_mentions_missing_fields() {
        let prompts = PromptLibrary::new().unwrap();
        let user = prompts
            .render(
                EXTRACT_USER,
                context! { design => "{}", missing => vec!["wwr", "ro_ins"], utterance => "30%" },
            )
            .unwrap();
        assert!(user.contains("Still missing: wwr, ro_ins"));
        assert!(user.ends_with("Message: 30%"));
    }

    #[test]
    fn carbon_focus_only_for_carbon_queries() {
        let prompts = PromptLibrary::new().unwrap();
        let carbon = prompts
            .render(DATA_ANSWER_SYSTEM, context! { intent => "carbon_query" })
            .unwrap();
        let data = prompts
            .render(DATA_ANSWER_SYSTEM, context! { intent => "data_query" })
            .unwrap();
        assert!(carbon.contains("GWP"));
        assert!(!data.contains("Focus on embodied"));
    }
}
