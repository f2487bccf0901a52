// Shared data structures for one mesh generation request
use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Highest latitude representable in the Web-Mercator tile pyramid.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// WGS84 bounding box in degrees.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct GeoBoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl GeoBoundingBox {
    pub fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Result<Self, MeshError> {
        let bbox = GeoBoundingBox {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Build a bbox from the vertices of a polygon ring (`[[lng, lat], ...]`).
    pub fn from_ring(ring: &[Vec<f64>]) -> Result<Self, MeshError> {
        if ring.is_empty() {
            return Err(MeshError::InvalidInput("polygon ring is empty".into()));
        }

        let mut min_lng = f64::INFINITY;
        let mut min_lat = f64::INFINITY;
        let mut max_lng = f64::NEG_INFINITY;
        let mut max_lat = f64::NEG_INFINITY;

        for coord in ring {
            if coord.len() < 2 {
                return Err(MeshError::InvalidInput(format!(
                    "coordinate {:?} needs at least two components",
                    coord
                )));
            }
            min_lng = min_lng.min(coord[0]);
            min_lat = min_lat.min(coord[1]);
            max_lng = max_lng.max(coord[0]);
            max_lat = max_lat.max(coord[1]);
        }

        Self::new(min_lng, min_lat, max_lng, max_lat)
    }

    /// Accepts a GeoJSON `Feature` with a `Polygon` geometry or a bare
    /// `Polygon` geometry. Only the first ring is used.
    pub fn from_geojson(value: &serde_json::Value) -> Result<Self, MeshError> {
        let geometry = match value.get("type").and_then(|t| t.as_str()) {
            Some("Feature") => value
                .get("geometry")
                .ok_or_else(|| MeshError::InvalidInput("feature has no geometry".into()))?,
            _ => value,
        };

        let geometry_type = geometry.get("type").and_then(|t| t.as_str());
        if geometry_type != Some("Polygon") {
            return Err(MeshError::InvalidInput(format!(
                "expected a Polygon geometry, got {}",
                geometry_type.unwrap_or("nothing")
            )));
        }

        let ring_value = geometry
            .get("coordinates")
            .and_then(|c| c.get(0))
            .cloned()
            .ok_or_else(|| MeshError::InvalidInput("polygon has no rings".into()))?;
        let ring: Vec<Vec<f64>> = serde_json::from_value(ring_value)
            .map_err(|e| MeshError::InvalidInput(format!("malformed polygon ring: {}", e)))?;

        Self::from_ring(&ring)
    }

    fn validate(&self) -> Result<(), MeshError> {
        let values = [self.min_lng, self.min_lat, self.max_lng, self.max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(MeshError::InvalidInput(format!("non-finite bbox {:?}", values)));
        }
        if self.min_lng < -180.0 || self.max_lng > 180.0 {
            return Err(MeshError::InvalidInput(format!(
                "longitude range [{}, {}] exceeds [-180, 180]",
                self.min_lng, self.max_lng
            )));
        }
        if self.min_lat < -MAX_MERCATOR_LAT || self.max_lat > MAX_MERCATOR_LAT {
            return Err(MeshError::InvalidInput(format!(
                "latitude range [{}, {}] exceeds the Web-Mercator limit",
                self.min_lat, self.max_lat
            )));
        }
        if self.min_lng >= self.max_lng || self.min_lat >= self.max_lat {
            return Err(MeshError::InvalidInput(format!(
                "degenerate bbox [{}, {}, {}, {}]",
                self.min_lng, self.min_lat, self.max_lng, self.max_lat
            )));
        }
        Ok(())
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lng + self.max_lng) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        lng >= self.min_lng && lng <= self.max_lng && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Position of (lng, lat) inside the box, 0..1 on both axes.
    pub fn normalize(&self, lng: f64, lat: f64) -> (f64, f64) {
        (
            (lng - self.min_lng) / (self.max_lng - self.min_lng),
            (lat - self.min_lat) / (self.max_lat - self.min_lat),
        )
    }
}

/// Slippy-map tile address.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoordinate {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoordinate {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        TileCoordinate { x, y, z }
    }

    /// Wraps x across the antimeridian and clamps y into the pyramid so the
    /// coordinate can be fetched.
    pub fn normalized(&self) -> Self {
        let n = 1u64 << self.z;
        TileCoordinate {
            x: (self.x as u64 % n) as u32,
            y: (self.y as u64).min(n - 1) as u32,
            z: self.z,
        }
    }

    /// Substitute `{z}`, `{x}` and `{y}` in a URL template.
    pub fn url(&self, template: &str) -> String {
        template
            .replace("{z}", &self.z.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }
}

impl std::fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Decoded RGBA raster tile.
#[derive(Clone, Debug)]
pub struct RasterTile {
    pub width: u32,
    pub height: u32,
    pub tile: TileCoordinate,
    /// Row-major RGBA, four bytes per pixel.
    pub pixels: Vec<u8>,
}

/// A building ring anchored to the terrain.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BuildingFootprint {
    /// (lng, lat) vertices, implicitly closed.
    pub ring: Vec<[f64; 2]>,
    pub height_meters: f64,
    pub base_elevation_meters: f64,
}
