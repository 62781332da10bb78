//! Material mapper.
//!
//! Every assembly category owns an ordered list of canonical materials; a
//! material's numeric code is its index in that list. The mapping is the
//! encoding the regressor was trained on, so the order must never change.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Canonical material names across all assembly categories.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Material {
    Brick,
    Concrete,
    Earth,
    Straw,
    TimberFrame,
    TimberMass,
    Cellulose,
    Cork,
    Eps,
    GlassWool,
    MineralWool,
    WoodFiber,
    ExpandedGlass,
    Xps,
    Steel,
    Timber,
}

impl Material {
    /// Resolves free user text to a canonical material, without regard to
    /// category. Handles case, separators and language aliases.
    pub fn from_user_text(text: &str) -> Option<Material> {
        let key = normalize_key(text);
        if key.is_empty() {
            return None;
        }
        if let Some(alias) = alias_for(&key) {
            return Some(alias);
        }
        key.parse().ok()
    }
}

/// Assembly categories that carry a material code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MaterialCategory {
    /// Exterior and interior wall partition
    WallPartition,
    /// Exterior wall insulation
    WallInsulation,
    /// Exterior slab insulation
    SlabInsulation,
    /// Interior slab and roof partition
    SlabRoofPartition,
    /// Roof insulation
    RoofInsulation,
    /// Beams and columns
    BeamsColumns,
}

impl MaterialCategory {
    /// Materials of this category, ordered by code.
    pub fn materials(self) -> &'static [Material] {
        use Material::*;
        match self {
            Self::WallPartition => &[Brick, Concrete, Earth, Straw, TimberFrame, TimberMass],
            Self::WallInsulation => &[Cellulose, Cork, Eps, GlassWool, MineralWool, WoodFiber],
            Self::SlabInsulation => &[ExpandedGlass, Xps],
            Self::SlabRoofPartition => &[Concrete, TimberFrame, TimberMass],
            Self::RoofInsulation => &[
                Cellulose,
                Cork,
                Eps,
                ExpandedGlass,
                GlassWool,
                MineralWool,
                WoodFiber,
                Xps,
            ],
            Self::BeamsColumns => &[Steel, Concrete, Timber],
        }
    }

    pub fn code_of(self, material: Material) -> Option<u8> {
        self.materials()
            .iter()
            .position(|m| *m == material)
            .map(|idx| idx as u8)
    }

    pub fn material_at(self, code: u8) -> Option<Material> {
        self.materials().get(code as usize).copied()
    }

    pub fn is_valid_code(self, code: u8) -> bool {
        (code as usize) < self.materials().len()
    }

    /// Resolves user text to a material of this category.
    ///
    /// "timber" means mass timber everywhere except beams and columns, where
    /// a plain `timber` entry exists.
    pub fn resolve(self, text: &str) -> Option<Material> {
        let key = normalize_key(text);
        if let Ok(exact) = key.parse::<Material>() {
            if self.code_of(exact).is_some() {
                return Some(exact);
            }
        }
        let material = Material::from_user_text(text)?;
        if self.code_of(material).is_some() {
            return Some(material);
        }
        // beams/columns only know the generic timber entry
        if self == Self::BeamsColumns
            && matches!(material, Material::TimberMass | Material::TimberFrame)
        {
            return Some(Material::Timber);
        }
        None
    }

    /// Resolves user text straight to a code in this category.
    pub fn code_for_text(self, text: &str) -> Option<u8> {
        self.resolve(text).and_then(|m| self.code_of(m))
    }

    /// Human-readable table used in prompts: `brick=0, concrete=1, ...`.
    pub fn describe(self) -> String {
        self.materials()
            .iter()
            .enumerate()
            .map(|(idx, m)| format!("{}={}", m, idx))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The seven material code fields of the parameter vector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum MaterialField {
    EwPar,
    EwIns,
    IwPar,
    EsIns,
    IsPar,
    RoPar,
    RoIns,
}

impl MaterialField {
    pub fn all() -> impl Iterator<Item = MaterialField> {
        MaterialField::iter()
    }

    /// JSON key of this field in design data and parameter sets.
    pub fn key(self) -> &'static str {
        match self {
            Self::EwPar => "ew_par",
            Self::EwIns => "ew_ins",
            Self::IwPar => "iw_par",
            Self::EsIns => "es_ins",
            Self::IsPar => "is_par",
            Self::RoPar => "ro_par",
            Self::RoIns => "ro_ins",
        }
    }

    pub fn from_key(key: &str) -> Option<MaterialField> {
        MaterialField::iter().find(|field| field.key() == key)
    }

    pub fn category(self) -> MaterialCategory {
        match self {
            Self::EwPar | Self::IwPar => MaterialCategory::WallPartition,
            Self::EwIns => MaterialCategory::WallInsulation,
            Self::EsIns => MaterialCategory::SlabInsulation,
            Self::IsPar | Self::RoPar => MaterialCategory::SlabRoofPartition,
            Self::RoIns => MaterialCategory::RoofInsulation,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::EwPar => "exterior wall partition",
            Self::EwIns => "exterior wall insulation",
            Self::IwPar => "interior wall partition",
            Self::EsIns => "exterior slab insulation",
            Self::IsPar => "interior slab partition",
            Self::RoPar => "roof partition",
            Self::RoIns => "roof insulation",
        }
    }

    pub fn is_insulation(self) -> bool {
        matches!(self, Self::EwIns | Self::EsIns | Self::RoIns)
    }
}

impl fmt::Display for MaterialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Codes produced by the simple-material shortcut: one word such as "wood"
/// or "concrete" applied to every partition field that has a variant of it.
///
/// Insulation fields are never set here; callers default them to index 0.
pub fn simple_material_codes(word: &str) -> Vec<(MaterialField, u8)> {
    let Some(material) = Material::from_user_text(word) else {
        return Vec::new();
    };
    let material = match material {
        Material::Timber => Material::TimberMass,
        other => other,
    };

    MaterialField::all()
        .filter(|field| !field.is_insulation())
        .filter_map(|field| {
            field
                .category()
                .code_of(material)
                .map(|code| (field, code))
        })
        .collect()
}

fn normalize_key(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let mut key = String::with_capacity(lowered.len());
    let mut last_sep = false;
    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() {
            key.push(ch);
            last_sep = false;
        } else if !last_sep && !key.is_empty() {
            key.push('_');
            last_sep = true;
        }
    }
    while key.ends_with('_') {
        key.pop();
    }
    key
}

fn alias_for(key: &str) -> Option<Material> {
    let material = match key {
        "wood" | "mass_timber" | "massive_timber" | "clt" | "timber" => Material::TimberMass,
        "wood_frame" | "wooden_frame" | "timber_framed" => Material::TimberFrame,
        "rammed_earth" | "clay" => Material::Earth,
        "straw_bale" => Material::Straw,
        "bricks" | "masonry" => Material::Brick,
        "reinforced_concrete" | "rc" => Material::Concrete,
        "wood_fibre" | "woodfiber" | "woodfibre" => Material::WoodFiber,
        "glasswool" => Material::GlassWool,
        "mineralwool" | "rock_wool" | "rockwool" | "stone_wool" => Material::MineralWool,
        "foam_glass" | "foamglass" => Material::ExpandedGlass,
        "expanded_polystyrene" | "polystyrene" => Material::Eps,
        "extruded_polystyrene" => Material::Xps,
        _ => return None,
    };
    Some(material)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_category_order() {
        assert_eq!(
            MaterialCategory::WallPartition.code_of(Material::TimberMass),
            Some(5)
        );
        assert_eq!(MaterialCategory::SlabInsulation.code_of(Material::Xps), Some(1));
        assert_eq!(MaterialCategory::RoofInsulation.code_of(Material::Xps), Some(7));
        assert_eq!(
            MaterialCategory::SlabRoofPartition.code_of(Material::Brick),
            None
        );
    }

    #[test]
    fn name_code_name_is_identity_for_every_category() {
        for category in MaterialCategory::iter() {
            for material in category.materials() {
                let code = category.code_of(*material).unwrap();
                assert_eq!(category.material_at(code), Some(*material));
                assert_eq!(category.resolve(&material.to_string()), Some(*material));
            }
        }
    }

    #[test]
    fn aliases_are_case_insensitive() {
        assert_eq!(Material::from_user_text("Wood"), Some(Material::TimberMass));
        assert_eq!(
            Material::from_user_text("wood frame"),
            Some(Material::TimberFrame)
        );
        assert_eq!(
            Material::from_user_text("Mass-Timber"),
            Some(Material::TimberMass)
        );
        assert_eq!(
            Material::from_user_text("GLASS WOOL"),
            Some(Material::GlassWool)
        );
        assert_eq!(Material::from_user_text("unobtainium"), None);
    }

    #[test]
    fn timber_resolves_per_category() {
        assert_eq!(
            MaterialCategory::BeamsColumns.resolve("wood"),
            Some(Material::Timber)
        );
        assert_eq!(
            MaterialCategory::SlabRoofPartition.resolve("timber"),
            Some(Material::TimberMass)
        );
    }

    #[test]
    fn simple_wood_covers_all_partitions() {
        let codes = simple_material_codes("wood");
        assert_eq!(
            codes,
            vec![
                (MaterialField::EwPar, 5),
                (MaterialField::IwPar, 5),
                (MaterialField::IsPar, 2),
                (MaterialField::RoPar, 2),
            ]
        );
    }

    #[test]
    fn simple_brick_only_reaches_walls() {
        let codes = simple_material_codes("brick");
        assert_eq!(
            codes,
            vec![(MaterialField::EwPar, 0), (MaterialField::IwPar, 0)]
        );
    }

    #[test]
    fn field_keys_round_trip() {
        for field in MaterialField::all() {
            assert_eq!(MaterialField::from_key(field.key()), Some(field));
        }
    }
}
