use super::lexical::LexicalExtractor;
use super::{json_object_text, Extraction, ParameterExtractor};
use crate::oracle::ChatOracle;
use crate::prompts::{PromptLibrary, EXTRACT_SYSTEM, EXTRACT_USER};
use async_trait::async_trait;
use minijinja::context;
use serde_json::{Map, Value};
use std::sync::Arc;
use verde_core::design::{normalize_wwr, DesignData, DesignUpdate, MaterialField, Typology};
use verde_core::error::VerdeError;

/// Extractor backed by the chat oracle.
///
/// The oracle's JSON is authoritative; the lexical extractor only fills
/// fields the oracle left null.
pub struct OracleExtractor {
    oracle: Arc<dyn ChatOracle>,
    prompts: Arc<PromptLibrary>,
    lexical: LexicalExtractor,
}

impl OracleExtractor {
    pub fn new(oracle: Arc<dyn ChatOracle>, prompts: Arc<PromptLibrary>) -> Self {
        Self {
            oracle,
            prompts,
            lexical: LexicalExtractor::new(),
        }
    }

    fn render(&self, utterance: &str, current: &DesignData) -> Result<(String, String), VerdeError> {
        let system = self.prompts.render(
            EXTRACT_SYSTEM,
            context! { fields => PromptLibrary::material_fields() },
        )?;
        let design = serde_json::to_string_pretty(current)?;
        let user = self.prompts.render(
            EXTRACT_USER,
            context! {
                design => design,
                missing => current.missing_fields(),
                utterance => utterance,
            },
        )?;
        Ok((system, user))
    }
}

#[async_trait]
impl ParameterExtractor for OracleExtractor {
    async fn extract(&self, utterance: &str, current: &DesignData) -> Extraction {
        let (system, user) = match self.render(utterance, current) {
            Ok(prompts) => prompts,
            Err(e) => return Extraction::Unavailable(e),
        };

        let reply = match self.oracle.complete(&system, &user).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("[Extractor] oracle call failed: {}", e);
                return Extraction::Unavailable(e.into());
            }
        };

        match parse_update(&reply) {
            Ok(update) => {
                let fallback = self.lexical.extract_update(utterance, current);
                Extraction::Parsed(update.or(fallback))
            }
            Err(message) => {
                tracing::debug!("[Extractor] unusable oracle reply: {}", message);
                Extraction::ParseError(message)
            }
        }
    }
}

/// Reads the oracle's parameter object. Null and absent keys stay unset.
pub(crate) fn parse_update(reply: &str) -> Result<DesignUpdate, String> {
    let text = json_object_text(reply).ok_or_else(|| "reply holds no JSON object".to_string())?;
    let object: Map<String, Value> =
        serde_json::from_str(text).map_err(|e| format!("invalid JSON: {}", e))?;

    let mut update = DesignUpdate::default();

    if let Some(raw) = present(&object, "typology") {
        let text = raw
            .as_str()
            .ok_or_else(|| "typology must be a string".to_string())?;
        update.typology = Some(
            Typology::from_user_text(text).ok_or_else(|| format!("unknown typology '{}'", text))?,
        );
    }
    if let Some(raw) = present(&object, "number_of_levels") {
        let levels = number(raw).ok_or_else(|| "number_of_levels must be a number".to_string())?;
        if levels < 1.0 || levels.fract() != 0.0 {
            return Err(format!("number_of_levels {} is not a positive integer", levels));
        }
        update.number_of_levels = Some(levels as u32);
    }
    update.width_m = positive(&object, "width_m")?;
    update.depth_m = positive(&object, "depth_m")?;
    if let Some(raw) = present(&object, "self_modeling") {
        update.self_modeling = Some(boolean(raw).ok_or_else(|| "self_modeling must be a boolean".to_string())?);
    }
    if let Some(raw) = present(&object, "simple_material") {
        let word = raw
            .as_str()
            .ok_or_else(|| "simple_material must be a string".to_string())?;
        update.simple_material = Some(word.to_string());
    }
    for field in MaterialField::all() {
        if let Some(raw) = present(&object, field.key()) {
            update.materials.insert(field, material_code(field, raw)?);
        }
    }
    if let Some(raw) = present(&object, "wwr") {
        let value = number(raw).ok_or_else(|| "wwr must be a number".to_string())?;
        update.wwr = Some(normalize_wwr(value).ok_or_else(|| format!("wwr {} out of range", value))?);
    }

    Ok(update)
}

fn present<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('m').trim().parse().ok(),
        _ => None,
    }
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn positive(object: &Map<String, Value>, key: &str) -> Result<Option<f64>, String> {
    let Some(raw) = present(object, key) else {
        return Ok(None);
    };
    match number(raw) {
        Some(meters) if meters.is_finite() && meters > 0.0 => Ok(Some(meters)),
        _ => Err(format!("{} must be a positive number", key)),
    }
}

/// Accepts a code or a material name of the field's category.
fn material_code(field: MaterialField, value: &Value) -> Result<u8, String> {
    let category = field.category();
    let code = match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|c| u8::try_from(c).ok())
            .ok_or_else(|| format!("{} code {} is not an integer", field, n))?,
        Value::String(s) => match s.trim().parse::<u8>() {
            Ok(code) => code,
            Err(_) => category
                .code_for_text(s)
                .ok_or_else(|| format!("'{}' is not a {} material", s, field.label()))?,
        },
        other => return Err(format!("{} has unsupported value {}", field, other)),
    };
    if !category.is_valid_code(code) {
        return Err(format!(
            "{} is not a valid {} code (expected {})",
            code,
            field.label(),
            category.describe()
        ));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleError;
    use std::sync::Mutex;

    struct Scripted {
        reply: std::result::Result<String, OracleError>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(reply: std::result::Result<&str, OracleError>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatOracle for Scripted {
        async fn complete(&self, _system: &str, user: &str) -> std::result::Result<String, OracleError> {
            self.seen.lock().unwrap().push(user.to_string());
            self.reply.clone()
        }
    }

    fn extractor(oracle: Arc<Scripted>) -> OracleExtractor {
        OracleExtractor::new(oracle, Arc::new(PromptLibrary::new().unwrap()))
    }

    #[tokio::test]
    async fn oracle_json_becomes_update() {
        let oracle = Scripted::new(Ok(
            "```json\n{\"typology\": \"block\", \"number_of_levels\": 4, \"width_m\": \"15\", \"depth_m\": 15, \"self_modeling\": null, \"ew_par\": \"brick\", \"ro_ins\": 7, \"wwr\": null}\n```",
        ));
        let extraction = extractor(oracle.clone())
            .extract("a 4-storey block, 15 by 15", &DesignData::new())
            .await;
        let Extraction::Parsed(update) = extraction else {
            panic!("expected parsed update, got {:?}", extraction);
        };
        assert_eq!(update.typology, Some(Typology::Block));
        assert_eq!(update.number_of_levels, Some(4));
        assert_eq!(update.width_m, Some(15.0));
        assert_eq!(update.materials.get(&MaterialField::EwPar), Some(&0));
        assert_eq!(update.materials.get(&MaterialField::RoIns), Some(&7));
        assert_eq!(update.self_modeling, None);

        let prompt = oracle.seen.lock().unwrap()[0].clone();
        assert!(prompt.contains("Still missing: typology"));
    }

    #[tokio::test]
    async fn lexical_fills_what_the_oracle_left_null() {
        let oracle = Scripted::new(Ok(r#"{"typology": "courtyard", "width_m": null}"#));
        let extraction = extractor(oracle)
            .extract("courtyard, 20x30m", &DesignData::new())
            .await;
        let Extraction::Parsed(update) = extraction else {
            panic!("expected parsed update");
        };
        assert_eq!(update.typology, Some(Typology::Courtyard));
        assert_eq!(update.width_m, Some(20.0));
        assert_eq!(update.depth_m, Some(30.0));
    }

    #[tokio::test]
    async fn prose_reply_is_a_parse_error() {
        let oracle = Scripted::new(Ok("I'm not sure what you mean."));
        let extraction = extractor(oracle).extract("hmm", &DesignData::new()).await;
        assert!(matches!(extraction, Extraction::ParseError(_)));
    }

    #[tokio::test]
    async fn connection_failure_is_unavailable() {
        let oracle = Scripted::new(Err(OracleError::Connection("refused".into())));
        let extraction = extractor(oracle).extract("block", &DesignData::new()).await;
        assert!(matches!(
            extraction,
            Extraction::Unavailable(VerdeError::OracleUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn timeout_is_reported_as_timeout() {
        let oracle = Scripted::new(Err(OracleError::Timeout { secs: 30 }));
        let extraction = extractor(oracle).extract("block", &DesignData::new()).await;
        assert_eq!(
            extraction,
            Extraction::Unavailable(VerdeError::OracleTimeout { secs: 30 })
        );
    }

    #[test]
    fn invalid_codes_and_names_are_rejected() {
        assert!(parse_update(r#"{"es_ins": 3}"#).is_err());
        assert!(parse_update(r#"{"is_par": "brick"}"#).is_err());
        assert!(parse_update(r#"{"typology": "tower"}"#).is_err());
        assert!(parse_update(r#"{"number_of_levels": 0}"#).is_err());
        assert!(parse_update(r#"{"wwr": 140}"#).is_err());
    }

    #[test]
    fn percent_wwr_and_string_booleans() {
        let update = parse_update(r#"{"wwr": 30, "self_modeling": "yes", "simple_material": ""}"#).unwrap();
        assert_eq!(update.wwr, Some(0.3));
        assert_eq!(update.self_modeling, Some(true));
        assert_eq!(update.simple_material, None);
    }
}
