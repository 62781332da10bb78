//! Deterministic extractor.
//!
//! Reads the phrasing architects actually use ("4-story", "15 by 15
//! meters", "30% windows", "I will model it myself") without an oracle.
//! It also runs ahead of the oracle extractor to fill fields the oracle
//! left null.

use super::{Extraction, ParameterExtractor};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use verde_core::design::{
    DesignData, DesignUpdate, Material, MaterialField, Typology, find_percentage, normalize_wwr,
    parse_wwr, simple_material_codes,
};

static LEVELS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s*-?\s*(?:stor(?:e)?ys?|stories|floors?|levels?)\b").expect("valid levels regex")
});
static LEVEL_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(single|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)\s*-?\s*(?:stor(?:e)?ys?|stories|floors?|levels?)\b",
    )
    .expect("valid level words regex")
});
static FOOTPRINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(?:m|meters?|metres?)?\s*(?:by|x|×|\*)\s*(\d+(?:\.\d+)?)")
        .expect("valid footprint regex")
});
static WIDTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bwid(?:th|e)\s*(?:of|is|=|:)?\s*(\d+(?:\.\d+)?)").expect("valid width regex")
});
static DEPTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:depth|deep|length|long)\s*(?:of|is|=|:)?\s*(\d+(?:\.\d+)?)")
        .expect("valid depth regex")
});
static TYPOLOGY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(courtyard|perimeter[\s-]block|atrium|[lcu][\s-]?shaped?|block|box|cube)\b")
        .expect("valid typology regex")
});
static WWR_LABELLED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:wwr|window[\s-]to[\s-]wall(?:\s+ratio)?|glazing(?:\s+ratio)?|windows?(?:\s+ratio)?)\s*(?:of|is|=|:|at|to|around|about)?\s*(\d+(?:\.\d+)?)\s*(%|percent)?",
    )
    .expect("valid wwr regex")
});
static SELF_MODELING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:model(?:ing)?\s+(?:it|the\s+\w+)\s+myself|i(?:'ll|\s+will|\s+am\s+going\s+to)?\s+model\b|my\s+own\s+(?:model|geometry|massing)|self[\s-]model|i(?:'m|\s+am)\s+modell?ing|myself)",
    )
    .expect("valid self-modeling regex")
});
static GENERATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:generate\s+(?:it|the\s+\w+)|you\s+(?:can\s+|should\s+)?(?:model|generate|create|build)|(?:create|build|make|model)\s+it\s+for\s+me|auto(?:matically)?[\s-]?generate)",
    )
    .expect("valid generation regex")
});
static BARE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(?:m|meters?|metres?)?\s*$").expect("valid number regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    ExteriorWall,
    InteriorWall,
    Slab,
    Roof,
}

impl Zone {
    fn fields(self) -> &'static [MaterialField] {
        match self {
            Self::ExteriorWall => &[MaterialField::EwPar, MaterialField::EwIns],
            Self::InteriorWall => &[MaterialField::IwPar],
            Self::Slab => &[MaterialField::IsPar, MaterialField::EsIns],
            Self::Roof => &[MaterialField::RoPar, MaterialField::RoIns],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LexicalExtractor;

impl LexicalExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Everything this utterance states, as a partial update.
    pub fn extract_update(&self, utterance: &str, current: &DesignData) -> DesignUpdate {
        let text = utterance.to_lowercase();
        let mut update = DesignUpdate {
            typology: TYPOLOGY
                .captures(&text)
                .and_then(|caps| Typology::from_user_text(&caps[1])),
            number_of_levels: levels(&text),
            self_modeling: self_modeling(&text, current),
            wwr: wwr(&text, current),
            ..Default::default()
        };

        if let Some(caps) = FOOTPRINT.captures(&text) {
            update.width_m = caps[1].parse().ok();
            update.depth_m = caps[2].parse().ok();
        }
        update.width_m = update.width_m.or_else(|| capture_f64(&WIDTH, &text));
        update.depth_m = update.depth_m.or_else(|| capture_f64(&DEPTH, &text));

        read_materials(&text, &mut update);

        if update.is_empty() {
            fill_bare_answer(&text, current, &mut update);
        }
        update
    }
}

#[async_trait]
impl ParameterExtractor for LexicalExtractor {
    async fn extract(&self, utterance: &str, current: &DesignData) -> Extraction {
        Extraction::Parsed(self.extract_update(utterance, current))
    }
}

fn capture_f64(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text).and_then(|caps| caps[1].parse().ok())
}

fn levels(text: &str) -> Option<u32> {
    if let Some(caps) = LEVELS.captures(text) {
        return caps[1].parse().ok().filter(|n| *n >= 1);
    }
    let caps = LEVEL_WORDS.captures(text)?;
    let n = match &caps[1] {
        "single" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        _ => return None,
    };
    Some(n)
}

fn self_modeling(text: &str, current: &DesignData) -> Option<bool> {
    if SELF_MODELING.is_match(text) {
        return Some(true);
    }
    if GENERATED.is_match(text) {
        return Some(false);
    }
    // short answers to "will you model it yourself or should I generate it?"
    if current.geometry.is_complete() && current.self_modeling.is_none() {
        let answer = text.trim().trim_end_matches(['.', '!']);
        if matches!(answer, "me" | "i will" | "i do" | "myself") {
            return Some(true);
        }
        if matches!(answer, "you" | "you do" | "generate" | "you generate") {
            return Some(false);
        }
    }
    None
}

fn wwr(text: &str, current: &DesignData) -> Option<f64> {
    if let Some(caps) = WWR_LABELLED.captures(text) {
        let value: f64 = caps[1].parse().ok()?;
        return if caps.get(2).is_some() {
            (value <= 100.0).then_some(value / 100.0)
        } else {
            normalize_wwr(value)
        };
    }
    if let Some(ratio) = find_percentage(text) {
        return Some(ratio);
    }
    // a bare "0.3" only counts when the WWR is what is being asked for
    if current.geometry_ready() && current.materials_complete() && current.wwr.is_none() {
        return parse_wwr(text);
    }
    None
}

/// Splits into clauses so a zone word ("roof", "walls") only qualifies the
/// materials in the same clause.
fn clauses(text: &str) -> Vec<&str> {
    text.split([',', ';', '.', '\n'])
        .flat_map(|part| part.split(" and "))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

fn zones(clause: &str) -> Vec<Zone> {
    let mut zones = Vec::new();
    let has_wall = clause.contains("wall") || clause.contains("facade");
    let exterior = clause.contains("exterior")
        || clause.contains("external")
        || clause.contains("outer")
        || clause.contains("facade");
    let interior = clause.contains("interior") || clause.contains("internal") || clause.contains("inner");
    if has_wall {
        if exterior || !interior {
            zones.push(Zone::ExteriorWall);
        }
        if interior || !exterior {
            zones.push(Zone::InteriorWall);
        }
    }
    if clause.contains("slab") || clause.contains("ceiling") {
        zones.push(Zone::Slab);
    }
    if clause.contains("roof") {
        zones.push(Zone::Roof);
    }
    zones
}

/// Material mentions in a clause, longest phrase first.
fn materials_in(clause: &str) -> Vec<(String, Material)> {
    let tokens: Vec<&str> = clause
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let mut found = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if i + 1 < tokens.len() {
            let phrase = format!("{} {}", tokens[i], tokens[i + 1]);
            if let Some(material) = Material::from_user_text(&phrase) {
                found.push((phrase, material));
                i += 2;
                continue;
            }
        }
        if let Some(material) = Material::from_user_text(tokens[i]) {
            found.push((tokens[i].to_string(), material));
        }
        i += 1;
    }
    found
}

fn read_materials(text: &str, update: &mut DesignUpdate) {
    for clause in clauses(text) {
        let zones = zones(clause);
        for (phrase, material) in materials_in(clause) {
            // partition and insulation materials never overlap
            let is_partition = !simple_material_codes(&phrase).is_empty();

            if zones.is_empty() && is_partition {
                if update.simple_material.is_none() {
                    update.simple_material = Some(phrase);
                }
                continue;
            }

            let candidates: Vec<MaterialField> = if zones.is_empty() {
                MaterialField::all().collect()
            } else {
                zones.iter().flat_map(|z| z.fields().iter().copied()).collect()
            };
            for field in candidates {
                if field.is_insulation() == is_partition {
                    continue;
                }
                let code = field
                    .category()
                    .code_of(material)
                    .or_else(|| field.category().code_for_text(&phrase));
                if let Some(code) = code {
                    update.materials.entry(field).or_insert(code);
                }
            }
        }
    }
}

/// A bare number answers the first open numeric question.
fn fill_bare_answer(text: &str, current: &DesignData, update: &mut DesignUpdate) {
    let Some(value) = capture_f64(&BARE_NUMBER, text) else {
        return;
    };
    let geometry = &current.geometry;
    if geometry.number_of_levels.is_none() && geometry.typology.is_some() {
        if value >= 1.0 && value.fract() == 0.0 {
            update.number_of_levels = Some(value as u32);
        }
    } else if geometry.width_m.is_none() && geometry.number_of_levels.is_some() {
        update.width_m = Some(value);
    } else if geometry.depth_m.is_none() && geometry.width_m.is_some() {
        update.depth_m = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verde_core::design::Geometry;

    fn extract(text: &str) -> DesignUpdate {
        LexicalExtractor::new().extract_update(text, &DesignData::new())
    }

    #[test]
    fn happy_path_sentence() {
        let update = extract(
            "a 4-story block, 15 by 15 meters, wood, 30% windows, I will model it myself",
        );
        assert_eq!(update.typology, Some(Typology::Block));
        assert_eq!(update.number_of_levels, Some(4));
        assert_eq!(update.width_m, Some(15.0));
        assert_eq!(update.depth_m, Some(15.0));
        assert_eq!(update.simple_material.as_deref(), Some("wood"));
        assert_eq!(update.wwr, Some(0.3));
        assert_eq!(update.self_modeling, Some(true));
    }

    #[test]
    fn generation_request() {
        let update = extract("an L-shaped building, three floors, 20x30m, please generate it");
        assert_eq!(update.typology, Some(Typology::LShape));
        assert_eq!(update.number_of_levels, Some(3));
        assert_eq!(update.width_m, Some(20.0));
        assert_eq!(update.depth_m, Some(30.0));
        assert_eq!(update.self_modeling, Some(false));

        let update = extract("I want you to generate it");
        assert_eq!(update.self_modeling, Some(false));
    }

    #[test]
    fn courtyard_wins_over_block() {
        assert_eq!(
            extract("a perimeter block around a garden").typology,
            Some(Typology::Courtyard)
        );
        assert_eq!(extract("u-shaped plan").typology, Some(Typology::CShape));
    }

    #[test]
    fn zoned_materials_and_insulation() {
        let update = extract("brick exterior walls with cork insulation, and a concrete roof with xps insulation");
        assert_eq!(update.materials.get(&MaterialField::EwPar), Some(&0));
        assert_eq!(update.materials.get(&MaterialField::EwIns), Some(&1));
        assert_eq!(update.materials.get(&MaterialField::IwPar), None);
        assert_eq!(update.materials.get(&MaterialField::RoPar), Some(&0));
        assert_eq!(update.materials.get(&MaterialField::RoIns), Some(&7));
        assert!(update.simple_material.is_none());
    }

    #[test]
    fn bare_insulation_goes_to_every_insulation_field_that_has_it() {
        let update = extract("let's use cellulose");
        assert_eq!(update.materials.get(&MaterialField::EwIns), Some(&0));
        assert_eq!(update.materials.get(&MaterialField::RoIns), Some(&0));
        assert_eq!(update.materials.get(&MaterialField::EsIns), None);
        assert!(update.simple_material.is_none());
    }

    #[test]
    fn multi_word_materials() {
        let update = extract("timber frame");
        assert_eq!(update.simple_material.as_deref(), Some("timber frame"));
        let update = extract("roof insulation in mineral wool");
        assert_eq!(update.materials.get(&MaterialField::RoIns), Some(&5));
    }

    #[test]
    fn labelled_wwr_forms() {
        assert_eq!(extract("window to wall ratio of 0.45").wwr, Some(0.45));
        assert_eq!(extract("wwr 25").wwr, Some(0.25));
        assert_eq!(extract("glazing at 40 percent").wwr, Some(0.4));
    }

    #[test]
    fn bare_answers_follow_the_open_question() {
        let extractor = LexicalExtractor::new();
        let mut design = DesignData::new();
        design.geometry.typology = Some(Typology::Block);
        assert_eq!(extractor.extract_update("5", &design).number_of_levels, Some(5));

        design.geometry = Geometry {
            typology: Some(Typology::Block),
            number_of_levels: Some(5),
            width_m: Some(12.0),
            depth_m: Some(18.0),
        };
        assert_eq!(extractor.extract_update("me", &design).self_modeling, Some(true));

        design.self_modeling = Some(true);
        design.apply_simple_material("concrete");
        assert_eq!(extractor.extract_update("0.35", &design).wwr, Some(0.35));
    }
}
