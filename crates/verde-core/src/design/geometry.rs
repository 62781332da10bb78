//! Massing geometry: typologies, the host request descriptor and the voxel
//! estimator used when no host result is available.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Edge length of one voxel in the host's massing grid.
pub const VOXEL_SIZE_M: f64 = 3.0;
/// Storey height assumed by the estimator.
pub const FLOOR_HEIGHT_M: f64 = 3.0;
/// Longest footprint side accepted, in meters.
pub const MAX_FOOTPRINT_M: f64 = 1000.0;
/// Voxels along one footprint side at `MAX_FOOTPRINT_M`.
pub const MAX_VOXELS: u32 = (MAX_FOOTPRINT_M / VOXEL_SIZE_M) as u32;
/// Source tag written into every geometry request.
pub const REQUEST_SOURCE: &str = "verde";

/// Massing archetype.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum Typology {
    #[serde(rename = "block")]
    #[strum(serialize = "block")]
    Block,
    #[serde(rename = "courtyard")]
    #[strum(serialize = "courtyard")]
    Courtyard,
    #[serde(rename = "l-shape")]
    #[strum(serialize = "l-shape")]
    LShape,
    #[serde(rename = "c-shape")]
    #[strum(serialize = "c-shape")]
    CShape,
}

impl Typology {
    /// Matches the typology names users actually type ("L shaped", "U-shape",
    /// "perimeter block", ...).
    pub fn from_user_text(text: &str) -> Option<Typology> {
        let lowered = text.trim().to_lowercase().replace(['_', ' '], "-");
        if let Ok(exact) = lowered.parse() {
            return Some(exact);
        }
        match lowered.as_str() {
            "box" | "bar" | "cube" | "slab" | "solid" => Some(Self::Block),
            "court" | "perimeter-block" | "ring" | "atrium" => Some(Self::Courtyard),
            "l" | "lshape" | "l-shaped" | "el" => Some(Self::LShape),
            "c" | "cshape" | "c-shaped" | "u" | "u-shape" | "u-shaped" => Some(Self::CShape),
            _ => None,
        }
    }

    pub fn all() -> impl Iterator<Item = Typology> {
        Typology::iter()
    }

    /// Occupancy mask of an `nx` by `ny` voxel footprint. Each side is
    /// clamped to `1..=MAX_VOXELS`.
    pub fn footprint(self, nx: u32, ny: u32) -> Vec<Vec<bool>> {
        let (nx, ny) = (nx.clamp(1, MAX_VOXELS), ny.clamp(1, MAX_VOXELS));
        (0..nx)
            .map(|i| (0..ny).map(|j| self.occupies(i, j, nx, ny)).collect())
            .collect()
    }

    fn occupies(self, i: u32, j: u32, nx: u32, ny: u32) -> bool {
        match self {
            Self::Block => true,
            Self::Courtyard => {
                if nx < 3 || ny < 3 {
                    return true;
                }
                let t = (nx.min(ny) / 3).max(1);
                i < t || i >= nx - t || j < t || j >= ny - t
            }
            Self::LShape => {
                let ax = (nx / 2).max(1);
                let ay = (ny / 2).max(1);
                i < ax || j < ay
            }
            Self::CShape => {
                let ax = (nx / 2).max(1);
                let ay = (ny / 3).max(1);
                i < ax || j < ay || j >= ny - ay
            }
        }
    }
}

/// Geometry block of the design data. Every field is optional while the
/// conversation is still gathering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typology: Option<Typology>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_levels: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_m: Option<f64>,
}

impl Geometry {
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of the geometry fields still unknown, in asking order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.typology.is_none() {
            missing.push("typology");
        }
        if self.number_of_levels.is_none() {
            missing.push("number_of_levels");
        }
        if self.width_m.is_none() {
            missing.push("width_m");
        }
        if self.depth_m.is_none() {
            missing.push("depth_m");
        }
        missing
    }

    /// Host descriptor, available once the block is complete.
    pub fn to_request(&self) -> Option<GeometryRequest> {
        Some(GeometryRequest {
            typology: self.typology?,
            voxels_x: voxel_count(self.width_m?),
            voxels_y: voxel_count(self.depth_m?),
            number_of_levels: self.number_of_levels?,
            source: REQUEST_SOURCE.to_string(),
        })
    }

    /// Estimates GFA and compactness from the voxel grid the host would build.
    pub fn synthesize_metrics(&self) -> Option<GeometryMetrics> {
        let request = self.to_request()?;
        GeometryMetrics::from_request(&request)
    }
}

/// Meters to whole voxels, floored, within `1..=MAX_VOXELS`.
pub fn voxel_count(meters: f64) -> u32 {
    ((meters / VOXEL_SIZE_M).floor() as u32).clamp(1, MAX_VOXELS)
}

/// Descriptor written for the geometry host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryRequest {
    pub typology: Typology,
    pub voxels_x: u32,
    pub voxels_y: u32,
    pub number_of_levels: u32,
    pub source: String,
}

/// Metrics published back by the geometry host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryMetrics {
    pub gfa: f64,
    pub av: f64,
}

impl GeometryMetrics {
    pub fn new(gfa: f64, av: f64) -> Self {
        Self { gfa, av }
    }

    pub fn is_valid(&self) -> bool {
        self.gfa.is_finite() && self.gfa > 0.0 && self.av.is_finite() && self.av > 0.0
    }

    fn from_request(request: &GeometryRequest) -> Option<Self> {
        if request.number_of_levels == 0 {
            return None;
        }
        let mask = request.typology.footprint(request.voxels_x, request.voxels_y);
        let cells: usize = mask.iter().map(|row| row.iter().filter(|c| **c).count()).sum();
        if cells == 0 {
            return None;
        }

        let cell_area = VOXEL_SIZE_M * VOXEL_SIZE_M;
        let levels = request.number_of_levels as f64;
        let footprint_area = cells as f64 * cell_area;
        let exposed_edges = exposed_edge_count(&mask) as f64;

        let gfa = footprint_area * levels;
        let volume = gfa * FLOOR_HEIGHT_M;
        let walls = exposed_edges * VOXEL_SIZE_M * FLOOR_HEIGHT_M * levels;
        let surface = 2.0 * footprint_area + walls;

        Some(Self {
            gfa,
            av: surface / volume,
        })
    }
}

fn exposed_edge_count(mask: &[Vec<bool>]) -> usize {
    let nx = mask.len() as i64;
    let ny = mask.first().map(|row| row.len()).unwrap_or(0) as i64;
    let filled = |i: i64, j: i64| {
        i >= 0 && j >= 0 && i < nx && j < ny && mask[i as usize][j as usize]
    };

    let mut edges = 0;
    for i in 0..nx {
        for j in 0..ny {
            if !filled(i, j) {
                continue;
            }
            for (di, dj) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                if !filled(i + di, j + dj) {
                    edges += 1;
                }
            }
        }
    }
    edges
}
