//! Design domain module.
//!
//! # Module Structure
//!
//! - `material`: Material mapper (names, categories, codes, shortcut)
//! - `geometry`: Typologies, host request descriptor, voxel estimator
//! - `model`: `DesignData`, partial `DesignUpdate`, ten-field `ParameterSet`
//! - `wwr`: Window-to-wall ratio parsing

mod geometry;
mod material;
mod model;
mod wwr;

pub use geometry::{
    FLOOR_HEIGHT_M, Geometry, GeometryMetrics, GeometryRequest, MAX_FOOTPRINT_M, MAX_VOXELS,
    REQUEST_SOURCE, Typology, VOXEL_SIZE_M, voxel_count,
};
pub use material::{Material, MaterialCategory, MaterialField, simple_material_codes};
pub use model::{DesignData, DesignUpdate, FEATURE_ORDER, ParameterSet};
pub use wwr::{find_percentage, normalize_wwr, parse_wwr};
