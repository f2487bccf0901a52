// Anchoring building footprints to the terrain and scaling their heights
use geo::Area;
use geo_types::{LineString, Polygon};

use crate::console_log;
use crate::elevation_grid::ElevationGrid;
use crate::mesh::{MeshFrame, VERTICAL_BAND};
use crate::models::{BuildingFootprint, GeoBoundingBox};
use crate::vectortile::{BuildingCandidate, DEFAULT_BUILDING_HEIGHT};

pub const MIN_BUILDING_HEIGHT: f64 = 2.0;
pub const MAX_BUILDING_HEIGHT: f64 = 500.0;
/// Mesh units a building base sinks below the lowest terrain point under it.
pub const SUBMERGE_OFFSET: f64 = 0.5;

const METERS_PER_DEGREE: f64 = 111_320.0;
const MIN_SCALE_FACTOR: f64 = 0.001;
const MAX_SCALE_FACTOR: f64 = 0.5;
const LARGE_AREA_METERS: f64 = 10_000.0;
const SMALL_AREA_METERS: f64 = 2_000.0;

/// Equirectangular diagonal of the bbox in meters.
pub fn bbox_diagonal_meters(bbox: &GeoBoundingBox) -> f64 {
    let (_, center_lat) = bbox.center();
    let width = (bbox.max_lng - bbox.min_lng) * METERS_PER_DEGREE * center_lat.to_radians().cos();
    let height = (bbox.max_lat - bbox.min_lat) * METERS_PER_DEGREE;
    width.hypot(height)
}

/// Mesh units per real meter of building height. Starts from the terrain's
/// own vertical scale, is boosted for large areas and damped for small ones.
pub fn adaptive_scale_factor(diagonal_meters: f64, elevation_span: f64) -> f64 {
    let mut factor = if elevation_span.is_finite() && elevation_span > 0.0 {
        VERTICAL_BAND / elevation_span
    } else {
        1.0
    };

    if diagonal_meters > LARGE_AREA_METERS {
        factor *= 1.5;
    } else if diagonal_meters < SMALL_AREA_METERS {
        factor *= 0.8;
    }

    if factor.is_nan() {
        return MIN_SCALE_FACTOR;
    }
    factor.clamp(MIN_SCALE_FACTOR, MAX_SCALE_FACTOR)
}

/// Clamp a raw tile height into the plausible range. Non-finite heights use
/// the extraction default.
pub fn clamp_building_height(height_meters: f64) -> f64 {
    let height = if height_meters.is_finite() {
        height_meters
    } else {
        DEFAULT_BUILDING_HEIGHT
    };
    height.clamp(MIN_BUILDING_HEIGHT, MAX_BUILDING_HEIGHT)
}

/// A footprint placed in mesh space, ready for extrusion.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectedBuilding {
    pub footprint: BuildingFootprint,
    /// Counter-clockwise in mesh xy, no repeated closing vertex.
    pub mesh_ring: Vec<[f64; 2]>,
    pub lowest_terrain_z: f64,
    pub highest_terrain_z: f64,
    pub effective_height: f64,
}

impl ProjectedBuilding {
    pub fn top_z(&self) -> f64 {
        self.lowest_terrain_z + self.effective_height
    }

    pub fn bottom_z(&self) -> f64 {
        self.lowest_terrain_z - SUBMERGE_OFFSET
    }
}

// Drop the repeated closing vertex and consecutive duplicates
fn clean_ring(ring: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut cleaned: Vec<[f64; 2]> = Vec::with_capacity(ring.len());
    for point in ring {
        if cleaned.last() != Some(point) {
            cleaned.push(*point);
        }
    }
    while cleaned.len() > 1 && cleaned.first() == cleaned.last() {
        cleaned.pop();
    }
    cleaned
}

pub struct BuildingProjector<'a> {
    grid: &'a ElevationGrid,
    frame: MeshFrame,
    scale_factor: f64,
    vertical_exaggeration: f64,
    building_scale_factor: f64,
}

impl<'a> BuildingProjector<'a> {
    pub fn new(
        grid: &'a ElevationGrid,
        frame: MeshFrame,
        vertical_exaggeration: f64,
        building_scale_factor: f64,
    ) -> Self {
        let diagonal = bbox_diagonal_meters(&frame.bbox);
        let scale_factor = adaptive_scale_factor(diagonal, frame.elevation_span());
        console_log!(
            "Building scale factor {:.4} for a {:.0}m diagonal and {:.1}m relief",
            scale_factor,
            diagonal,
            frame.elevation_span()
        );
        BuildingProjector {
            grid,
            frame,
            scale_factor,
            vertical_exaggeration,
            building_scale_factor,
        }
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    // Fractional grid position of a coordinate
    fn grid_position(&self, lng: f64, lat: f64) -> (f64, f64) {
        let (nx, ny) = self.frame.bbox.normalize(lng, lat);
        (
            nx * (self.grid.width - 1) as f64,
            ny * (self.grid.height - 1) as f64,
        )
    }

    /// Grid elevation at the cell nearest the ring's vertex centroid.
    pub fn base_elevation(&self, ring: &[[f64; 2]]) -> f64 {
        if ring.is_empty() {
            return self.frame.min_elevation;
        }
        let count = ring.len() as f64;
        let centroid_lng = ring.iter().map(|p| p[0]).sum::<f64>() / count;
        let centroid_lat = ring.iter().map(|p| p[1]).sum::<f64>() / count;

        let (fx, fy) = self.grid_position(centroid_lng, centroid_lat);
        let gx = (fx.round().max(0.0) as usize).min(self.grid.width - 1);
        let gy = (fy.round().max(0.0) as usize).min(self.grid.height - 1);
        self.grid.get(gx, gy)
    }

    /// Terrain surface height in mesh units, bilinear between grid cells.
    /// Points outside the bbox sit at the lowest terrain level.
    pub fn terrain_z_at(&self, lng: f64, lat: f64) -> f64 {
        if !self.frame.bbox.contains(lng, lat) {
            return self.frame.elevation_to_z(self.frame.min_elevation);
        }
        let (src_x, src_y) = self.grid_position(lng, lat);
        let width = self.grid.width;
        let height = self.grid.height;

        let x0 = (src_x.floor().max(0.0) as usize).min(width - 1);
        let y0 = (src_y.floor().max(0.0) as usize).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let dx = src_x - x0 as f64;
        let dy = src_y - y0 as f64;

        let v00 = self.grid.get(x0, y0);
        let v10 = self.grid.get(x1, y0);
        let v01 = self.grid.get(x0, y1);
        let v11 = self.grid.get(x1, y1);

        let v0 = v00 * (1.0 - dx) + v10 * dx;
        let v1 = v01 * (1.0 - dx) + v11 * dx;
        self.frame.elevation_to_z(v0 * (1.0 - dy) + v1 * dy)
    }

    /// Rendered height in mesh units for a building of `height_meters`
    /// standing on ground that rises `slope_z` under its footprint.
    pub fn effective_height(&self, height_meters: f64, slope_z: f64) -> f64 {
        clamp_building_height(height_meters)
            * self.scale_factor
            * self.vertical_exaggeration
            * self.building_scale_factor
            + slope_z
            + SUBMERGE_OFFSET
    }

    /// None when the ring has fewer than three distinct vertices or no area.
    pub fn project(&self, candidate: &BuildingCandidate) -> Option<ProjectedBuilding> {
        let mut ring = clean_ring(&candidate.ring);
        if ring.len() < 3 {
            return None;
        }

        let mut mesh_ring: Vec<[f64; 2]> = ring
            .iter()
            .map(|[lng, lat]| self.frame.project_xy(*lng, *lat))
            .collect();
        let exterior: LineString<f64> = mesh_ring.iter().map(|[x, y]| (*x, *y)).collect();
        let signed_area = Polygon::new(exterior, vec![]).signed_area();
        if !signed_area.is_finite() || signed_area == 0.0 {
            return None;
        }
        if signed_area < 0.0 {
            ring.reverse();
            mesh_ring.reverse();
        }

        let mut lowest_terrain_z = f64::INFINITY;
        let mut highest_terrain_z = f64::NEG_INFINITY;
        for [lng, lat] in &ring {
            let z = self.terrain_z_at(*lng, *lat);
            lowest_terrain_z = lowest_terrain_z.min(z);
            highest_terrain_z = highest_terrain_z.max(z);
        }

        let height_meters = clamp_building_height(candidate.height_meters);
        let effective_height =
            self.effective_height(height_meters, highest_terrain_z - lowest_terrain_z);
        let base_elevation_meters = self.base_elevation(&ring);

        Some(ProjectedBuilding {
            footprint: BuildingFootprint {
                ring,
                height_meters,
                base_elevation_meters,
            },
            mesh_ring,
            lowest_terrain_z,
            highest_terrain_z,
            effective_height,
        })
    }

    pub fn project_all(&self, candidates: &[BuildingCandidate]) -> Vec<ProjectedBuilding> {
        let projected: Vec<ProjectedBuilding> =
            candidates.iter().filter_map(|c| self.project(c)).collect();
        let skipped = candidates.len() - projected.len();
        if skipped > 0 {
            console_log!("Skipped {} degenerate building footprints", skipped);
        }
        projected
    }
}
