//! Design data: the canonical parameter record of a session.

use super::geometry::{Geometry, GeometryMetrics, MAX_FOOTPRINT_M, Typology};
use super::material::{simple_material_codes, Material, MaterialField};
use super::wwr::normalize_wwr;
use crate::error::{Result, VerdeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Order of the regressor's input vector.
pub const FEATURE_ORDER: [&str; 10] = [
    "ew_par", "ew_ins", "iw_par", "es_ins", "is_par", "ro_par", "ro_ins", "wwr", "av", "gfa",
];

/// Everything the assistant knows about the design so far.
///
/// Fields stay `None` until the user (or the geometry host) supplies them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignData {
    #[serde(default)]
    pub geometry: Geometry,
    /// `true` when the user models the massing in the host themselves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_modeling: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ew_par: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ew_ins: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iw_par: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub es_ins: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_par: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ro_par: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ro_ins: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wwr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gfa: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub av: Option<f64>,
    /// Set once the geometry host has been asked to build the massing
    #[serde(default)]
    pub geometry_generated: bool,
}

impl DesignData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn material(&self, field: MaterialField) -> Option<u8> {
        match field {
            MaterialField::EwPar => self.ew_par,
            MaterialField::EwIns => self.ew_ins,
            MaterialField::IwPar => self.iw_par,
            MaterialField::EsIns => self.es_ins,
            MaterialField::IsPar => self.is_par,
            MaterialField::RoPar => self.ro_par,
            MaterialField::RoIns => self.ro_ins,
        }
    }

    fn material_slot(&mut self, field: MaterialField) -> &mut Option<u8> {
        match field {
            MaterialField::EwPar => &mut self.ew_par,
            MaterialField::EwIns => &mut self.ew_ins,
            MaterialField::IwPar => &mut self.iw_par,
            MaterialField::EsIns => &mut self.es_ins,
            MaterialField::IsPar => &mut self.is_par,
            MaterialField::RoPar => &mut self.ro_par,
            MaterialField::RoIns => &mut self.ro_ins,
        }
    }

    /// Sets a material code after checking it against the field's category.
    pub fn set_material(&mut self, field: MaterialField, code: u8) -> Result<()> {
        if !field.category().is_valid_code(code) {
            return Err(VerdeError::parse(format!(
                "{} is not a valid {} code (expected {})",
                code,
                field.label(),
                field.category().describe()
            )));
        }
        *self.material_slot(field) = Some(code);
        Ok(())
    }

    pub fn material_name(&self, field: MaterialField) -> Option<Material> {
        self.material(field)
            .and_then(|code| field.category().material_at(code))
    }

    pub fn missing_materials(&self) -> Vec<MaterialField> {
        MaterialField::all()
            .filter(|field| self.material(*field).is_none())
            .collect()
    }

    pub fn materials_complete(&self) -> bool {
        self.missing_materials().is_empty()
    }

    /// Applies the one-word material shortcut. Unset insulation fields fall
    /// back to index 0. Returns `false` when the word maps to nothing.
    pub fn apply_simple_material(&mut self, word: &str) -> bool {
        let codes = simple_material_codes(word);
        if codes.is_empty() {
            return false;
        }
        for (field, code) in codes {
            *self.material_slot(field) = Some(code);
        }
        self.default_insulation();
        true
    }

    /// Wall, slab and roof insulation default to index 0 when unspecified.
    pub fn default_insulation(&mut self) {
        for field in MaterialField::all().filter(|f| f.is_insulation()) {
            let slot = self.material_slot(field);
            if slot.is_none() {
                *slot = Some(0);
            }
        }
    }

    pub fn set_wwr(&mut self, value: f64) -> Result<()> {
        let normalized = normalize_wwr(value)
            .ok_or_else(|| VerdeError::parse(format!("WWR {} is outside [0, 1]", value)))?;
        self.wwr = Some(normalized);
        Ok(())
    }

    /// Geometry block complete and the modeling choice made.
    pub fn geometry_ready(&self) -> bool {
        self.geometry.is_complete() && self.self_modeling.is_some()
    }

    /// Phase-1 fields still unknown, in asking order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = self.geometry.missing_fields();
        if self.self_modeling.is_none() {
            missing.push("self_modeling");
        }
        missing.extend(self.missing_materials().iter().map(|f| f.key()));
        if self.wwr.is_none() {
            missing.push("wwr");
        }
        missing
    }

    pub fn has_host_metrics(&self) -> bool {
        self.gfa.is_some() && self.av.is_some()
    }

    pub fn apply_metrics(&mut self, metrics: GeometryMetrics) {
        self.gfa = Some(metrics.gfa);
        self.av = Some(metrics.av);
    }

    /// Whether completing Phase 1 must ask the host to generate geometry.
    pub fn should_trigger_geometry(&self) -> bool {
        self.self_modeling == Some(false) && self.geometry.is_complete() && !self.geometry_generated
    }

    /// Flips `geometry_generated` to true. Returns `false` if it already was.
    pub fn mark_geometry_generated(&mut self) -> bool {
        if self.geometry_generated {
            return false;
        }
        self.geometry_generated = true;
        true
    }

    /// Checks codes and ranges of everything currently set.
    pub fn validate(&self) -> Result<()> {
        for field in MaterialField::all() {
            if let Some(code) = self.material(field) {
                if !field.category().is_valid_code(code) {
                    return Err(VerdeError::invariant(format!(
                        "{} holds invalid code {}",
                        field, code
                    )));
                }
            }
        }
        if let Some(wwr) = self.wwr {
            if !(0.0..=1.0).contains(&wwr) {
                return Err(VerdeError::invariant(format!("wwr {} outside [0, 1]", wwr)));
            }
        }
        if let Some(levels) = self.geometry.number_of_levels {
            if levels == 0 {
                return Err(VerdeError::invariant("number_of_levels must be at least 1"));
            }
        }
        for meters in [self.geometry.width_m, self.geometry.depth_m].into_iter().flatten() {
            if !(meters > 0.0 && meters <= MAX_FOOTPRINT_M) {
                return Err(VerdeError::invariant(format!(
                    "footprint side {} m outside (0, {}]",
                    meters, MAX_FOOTPRINT_M
                )));
            }
        }
        Ok(())
    }

    /// The ten-field regressor input. Fails while anything is missing.
    pub fn parameter_set(&self) -> Result<ParameterSet> {
        let missing: Vec<&str> = self
            .missing_materials()
            .iter()
            .map(|f| f.key())
            .chain(self.wwr.is_none().then_some("wwr"))
            .chain(self.av.is_none().then_some("av"))
            .chain(self.gfa.is_none().then_some("gfa"))
            .collect();
        if !missing.is_empty() {
            return Err(VerdeError::invariant(format!(
                "parameter set incomplete, missing: {}",
                missing.join(", ")
            )));
        }

        // all present, checked above
        let code = |field| self.material(field).unwrap_or_default();
        Ok(ParameterSet {
            ew_par: code(MaterialField::EwPar),
            ew_ins: code(MaterialField::EwIns),
            iw_par: code(MaterialField::IwPar),
            es_ins: code(MaterialField::EsIns),
            is_par: code(MaterialField::IsPar),
            ro_par: code(MaterialField::RoPar),
            ro_ins: code(MaterialField::RoIns),
            wwr: self.wwr.unwrap_or_default(),
            av: self.av.unwrap_or_default(),
            gfa: self.gfa.unwrap_or_default(),
        })
    }

    /// Overwrites every parameter field with `params`.
    pub fn apply_parameters(&mut self, params: &ParameterSet) -> Result<()> {
        params.validate()?;
        for (field, code) in params.material_codes() {
            *self.material_slot(field) = Some(code);
        }
        self.wwr = Some(params.wwr);
        self.gfa = Some(params.gfa);
        self.av = Some(params.av);
        Ok(())
    }

    /// Merges a partial update. Fields the update leaves unset keep their
    /// prior values. Returns the keys that changed.
    pub fn merge(&mut self, update: &DesignUpdate) -> Result<Vec<String>> {
        let mut next = self.clone();
        let mut changed = Vec::new();

        if let Some(typology) = update.typology {
            if next.geometry.typology != Some(typology) {
                changed.push("typology".to_string());
            }
            next.geometry.typology = Some(typology);
        }
        if let Some(levels) = update.number_of_levels {
            if levels == 0 {
                return Err(VerdeError::parse("number_of_levels must be at least 1"));
            }
            if next.geometry.number_of_levels != Some(levels) {
                changed.push("number_of_levels".to_string());
            }
            next.geometry.number_of_levels = Some(levels);
        }
        for (key, value, slot) in [
            ("width_m", update.width_m, &mut next.geometry.width_m),
            ("depth_m", update.depth_m, &mut next.geometry.depth_m),
        ] {
            if let Some(meters) = value {
                if !(meters.is_finite() && meters > 0.0) {
                    return Err(VerdeError::parse(format!("{} must be positive", key)));
                }
                if meters > MAX_FOOTPRINT_M {
                    return Err(VerdeError::parse(format!(
                        "{} of {} m is over the {} m limit",
                        key, meters, MAX_FOOTPRINT_M
                    )));
                }
                if *slot != Some(meters) {
                    changed.push(key.to_string());
                }
                *slot = Some(meters);
            }
        }
        if let Some(self_modeling) = update.self_modeling {
            if next.self_modeling != Some(self_modeling) {
                changed.push("self_modeling".to_string());
            }
            next.self_modeling = Some(self_modeling);
        }
        if let Some(word) = &update.simple_material {
            let before: Vec<Option<u8>> = MaterialField::all().map(|f| next.material(f)).collect();
            if next.apply_simple_material(word) {
                for (field, prior) in MaterialField::all().zip(before) {
                    if next.material(field) != prior {
                        changed.push(field.key().to_string());
                    }
                }
            }
        }
        for (field, code) in &update.materials {
            if next.material(*field) != Some(*code) {
                changed.push(field.key().to_string());
            }
            next.set_material(*field, *code)?;
        }
        if let Some(wwr) = update.wwr {
            next.set_wwr(wwr)?;
            if self.wwr != next.wwr {
                changed.push("wwr".to_string());
            }
        }

        // host metrics describe the old massing
        if changed.iter().any(|key| is_massing_key(key)) {
            next.gfa = None;
            next.av = None;
        }

        *self = next;
        changed.dedup();
        Ok(changed)
    }
}

fn is_massing_key(key: &str) -> bool {
    matches!(
        key,
        "typology" | "number_of_levels" | "width_m" | "depth_m" | "self_modeling"
    )
}

/// A partial update extracted from one utterance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typology: Option<Typology>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_levels: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_modeling: Option<bool>,
    /// One-word material applied through the shortcut before explicit codes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple_material: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub materials: BTreeMap<MaterialField, u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wwr: Option<f64>,
}

impl DesignUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fills fields this update leaves unset from `other`.
    pub fn or(mut self, other: DesignUpdate) -> DesignUpdate {
        self.typology = self.typology.or(other.typology);
        self.number_of_levels = self.number_of_levels.or(other.number_of_levels);
        self.width_m = self.width_m.or(other.width_m);
        self.depth_m = self.depth_m.or(other.depth_m);
        self.self_modeling = self.self_modeling.or(other.self_modeling);
        self.simple_material = self.simple_material.or(other.simple_material);
        self.wwr = self.wwr.or(other.wwr);
        for (field, code) in other.materials {
            self.materials.entry(field).or_insert(code);
        }
        self
    }
}

/// The ten numeric regressor inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub ew_par: u8,
    pub ew_ins: u8,
    pub iw_par: u8,
    pub es_ins: u8,
    pub is_par: u8,
    pub ro_par: u8,
    pub ro_ins: u8,
    pub wwr: f64,
    pub av: f64,
    pub gfa: f64,
}

impl ParameterSet {
    pub fn material_codes(&self) -> [(MaterialField, u8); 7] {
        [
            (MaterialField::EwPar, self.ew_par),
            (MaterialField::EwIns, self.ew_ins),
            (MaterialField::IwPar, self.iw_par),
            (MaterialField::EsIns, self.es_ins),
            (MaterialField::IsPar, self.is_par),
            (MaterialField::RoPar, self.ro_par),
            (MaterialField::RoIns, self.ro_ins),
        ]
    }

    /// Input vector in `FEATURE_ORDER`.
    pub fn to_vector(&self) -> [f64; 10] {
        [
            self.ew_par as f64,
            self.ew_ins as f64,
            self.iw_par as f64,
            self.es_ins as f64,
            self.is_par as f64,
            self.ro_par as f64,
            self.ro_ins as f64,
            self.wwr,
            self.av,
            self.gfa,
        ]
    }

    pub fn validate(&self) -> Result<()> {
        for (field, code) in self.material_codes() {
            if !field.category().is_valid_code(code) {
                return Err(VerdeError::parse(format!(
                    "{} is not a valid {} code",
                    code,
                    field.label()
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.wwr) {
            return Err(VerdeError::parse(format!("wwr {} outside [0, 1]", self.wwr)));
        }
        if !(self.gfa.is_finite() && self.gfa > 0.0) {
            return Err(VerdeError::parse("gfa must be positive"));
        }
        if !(self.av.is_finite() && self.av > 0.0) {
            return Err(VerdeError::parse("av must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_design() -> DesignData {
        let mut design = DesignData::new();
        design.geometry = Geometry {
            typology: Some(Typology::Block),
            number_of_levels: Some(4),
            width_m: Some(15.0),
            depth_m: Some(15.0),
        };
        design.self_modeling = Some(true);
        assert!(design.apply_simple_material("wood"));
        design.set_wwr(0.3).unwrap();
        design
    }

    #[test]
    fn simple_material_fills_insulation_defaults() {
        let design = complete_design();
        assert_eq!(design.ew_par, Some(5));
        assert_eq!(design.iw_par, Some(5));
        assert_eq!(design.is_par, Some(2));
        assert_eq!(design.ro_par, Some(2));
        assert_eq!(design.ew_ins, Some(0));
        assert_eq!(design.es_ins, Some(0));
        assert_eq!(design.ro_ins, Some(0));
        assert!(design.missing_fields().is_empty());
    }

    #[test]
    fn missing_fields_in_asking_order() {
        let mut design = DesignData::new();
        design.geometry.typology = Some(Typology::Courtyard);
        design.ro_ins = Some(1);
        let missing = design.missing_fields();
        assert_eq!(missing[0], "number_of_levels");
        assert_eq!(missing[3], "self_modeling");
        assert!(!missing.contains(&"ro_ins"));
        assert_eq!(missing.last(), Some(&"wwr"));
    }

    #[test]
    fn simple_material_keeps_explicit_insulation() {
        let mut design = DesignData::new();
        design.set_material(MaterialField::EwIns, 4).unwrap();
        design.apply_simple_material("concrete");
        assert_eq!(design.ew_ins, Some(4));
        assert_eq!(design.ew_par, Some(1));
        assert_eq!(design.is_par, Some(0));
    }

    #[test]
    fn invalid_code_is_rejected() {
        let mut design = DesignData::new();
        let err = design.set_material(MaterialField::EsIns, 2).unwrap_err();
        assert!(matches!(err, VerdeError::Parse(_)));
        assert_eq!(design.es_ins, None);
    }

    #[test]
    fn parameter_set_requires_host_metrics() {
        let mut design = complete_design();
        let err = design.parameter_set().unwrap_err();
        assert!(err.to_string().contains("av, gfa"));

        design.apply_metrics(GeometryMetrics::new(900.0, 0.43));
        let params = design.parameter_set().unwrap();
        assert_eq!(
            params.to_vector(),
            [5.0, 0.0, 5.0, 0.0, 2.0, 2.0, 0.0, 0.3, 0.43, 900.0]
        );
    }

    #[test]
    fn merge_keeps_prior_values() {
        let mut design = complete_design();
        let update = DesignUpdate {
            wwr: Some(40.0),
            ..Default::default()
        };
        let changed = design.merge(&update).unwrap();
        assert_eq!(changed, vec!["wwr".to_string()]);
        assert_eq!(design.wwr, Some(0.4));
        assert_eq!(design.geometry.width_m, Some(15.0));
        assert_eq!(design.ew_par, Some(5));
    }

    #[test]
    fn massing_change_drops_host_metrics() {
        let mut design = complete_design();
        design.apply_metrics(GeometryMetrics::new(900.0, 0.43));
        let wwr_only = DesignUpdate {
            wwr: Some(0.35),
            ..Default::default()
        };
        design.merge(&wwr_only).unwrap();
        assert_eq!(design.gfa, Some(900.0));

        let taller = DesignUpdate {
            number_of_levels: Some(8),
            ..Default::default()
        };
        design.merge(&taller).unwrap();
        assert_eq!(design.gfa, None);
        assert_eq!(design.av, None);
        assert!(design.parameter_set().is_err());
    }

    #[test]
    fn oversized_footprint_is_rejected() {
        let mut design = complete_design();
        let update = DesignUpdate {
            width_m: Some(100_000.0),
            ..Default::default()
        };
        let err = design.merge(&update).unwrap_err();
        assert!(matches!(err, VerdeError::Parse(_)));
        assert_eq!(design.geometry.width_m, Some(15.0));

        design.geometry.depth_m = Some(5_000.0);
        assert!(design.validate().is_err());
    }

    #[test]
    fn failed_merge_leaves_design_untouched() {
        let mut design = complete_design();
        let before = design.clone();
        let mut update = DesignUpdate {
            number_of_levels: Some(8),
            ..Default::default()
        };
        update.materials.insert(MaterialField::RoPar, 9);
        assert!(design.merge(&update).is_err());
        assert_eq!(design, before);
    }

    #[test]
    fn geometry_trigger_fires_once() {
        let mut design = complete_design();
        assert!(!design.should_trigger_geometry());
        design.self_modeling = Some(false);
        assert!(design.should_trigger_geometry());
        assert!(design.mark_geometry_generated());
        assert!(!design.should_trigger_geometry());
        assert!(!design.mark_geometry_generated());
    }

    #[test]
    fn update_or_prefers_self() {
        let first = DesignUpdate {
            width_m: Some(10.0),
            ..Default::default()
        };
        let second = DesignUpdate {
            width_m: Some(20.0),
            depth_m: Some(12.0),
            ..Default::default()
        };
        let combined = first.or(second);
        assert_eq!(combined.width_m, Some(10.0));
        assert_eq!(combined.depth_m, Some(12.0));
    }

    #[test]
    fn apply_parameters_validates_first() {
        let mut design = complete_design();
        let bad = ParameterSet {
            ew_par: 1,
            ew_ins: 0,
            iw_par: 1,
            es_ins: 1,
            is_par: 0,
            ro_par: 0,
            ro_ins: 8,
            wwr: 0.2,
            av: 0.4,
            gfa: 600.0,
        };
        assert!(design.apply_parameters(&bad).is_err());
        assert_eq!(design.ew_par, Some(5));
    }
}
