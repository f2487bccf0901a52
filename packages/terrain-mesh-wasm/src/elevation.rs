// Terrain-RGB decoding of raster elevation tiles
use serde::{Deserialize, Serialize};

use crate::models::RasterTile;

// Process RGB channels to extract an elevation value in meters.
// Terrain-RGB encoding: -10000 + ((R * 256² + G * 256 + B) * 0.1)
pub fn process_pixel_to_elevation(r: u8, g: u8, b: u8) -> f64 {
    let value = (r as u32) * 65536 + (g as u32) * 256 + (b as u32);
    -10000.0 + (value as f64) * 0.1
}

/// Inverse of [`process_pixel_to_elevation`], rounding to the 0.1 m step.
/// Values outside the encodable range saturate.
pub fn encode_elevation_to_pixel(elevation: f64) -> [u8; 3] {
    let value = ((elevation + 10000.0) / 0.1).round().clamp(0.0, 16_777_215.0) as u32;
    [(value >> 16) as u8, ((value >> 8) & 0xff) as u8, (value & 0xff) as u8]
}

impl RasterTile {
    /// Decoded elevation of pixel (px, py), or `None` when the pixel lies
    /// outside the buffer or decodes to a non-finite value.
    pub fn elevation_at(&self, px: u32, py: u32) -> Option<f64> {
        if px >= self.width || py >= self.height {
            return None;
        }
        let idx = ((py as usize) * (self.width as usize) + px as usize) * 4;
        if idx + 2 >= self.pixels.len() {
            return None;
        }
        let elevation =
            process_pixel_to_elevation(self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]);
        if elevation.is_finite() {
            Some(elevation)
        } else {
            None
        }
    }
}

/// Running min/max over valid elevation samples.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ElevationRange {
    pub min: f64,
    pub max: f64,
}

impl Default for ElevationRange {
    fn default() -> Self {
        ElevationRange {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl ElevationRange {
    pub fn include(&mut self, elevation: f64) {
        if elevation.is_finite() {
            self.min = self.min.min(elevation);
            self.max = self.max.max(elevation);
        }
    }

    /// False until at least one valid sample was included.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn span(&self) -> f64 {
        if self.is_valid() {
            self.max - self.min
        } else {
            0.0
        }
    }

    pub fn midpoint(&self) -> Option<f64> {
        if self.is_valid() {
            Some((self.min + self.max) / 2.0)
        } else {
            None
        }
    }
}

/// First pass over every pixel of every tile, before any resampling.
pub fn scan_elevation_range(tiles: &[RasterTile]) -> ElevationRange {
    let mut range = ElevationRange::default();
    for tile in tiles {
        for py in 0..tile.height {
            for px in 0..tile.width {
                if let Some(elevation) = tile.elevation_at(px, py) {
                    range.include(elevation);
                }
            }
        }
    }
    range
}
