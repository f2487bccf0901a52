// Slippy-map tile arithmetic for the Web-Mercator pyramid
use std::f64::consts::PI;

use crate::models::{GeoBoundingBox, TileCoordinate};

/// Default ceiling for the terrain zoom search.
pub const DEFAULT_MAX_TERRAIN_ZOOM: u8 = 12;
/// Default tile budget for a terrain request.
pub const DEFAULT_MAX_TERRAIN_TILES: usize = 4;
/// Building tiles are only populated at high zoom, independent of terrain zoom.
pub const DEFAULT_BUILDING_ZOOM: u8 = 14;
/// Default cap on building tiles before buildings are skipped.
pub const DEFAULT_MAX_BUILDING_TILES: usize = 256;

// Upper bound on the up-front allocation in `tiles_for_bbox`
const PREALLOCATED_TILES: usize = 1024;

fn tiles_per_axis(zoom: u8) -> f64 {
    2.0_f64.powi(zoom as i32)
}

/// Fractional tile position of a coordinate. The integer part is the tile
/// index, the fraction is the position inside the tile.
pub fn lng_lat_to_tile_fraction(lng: f64, lat: f64, zoom: u8) -> (f64, f64) {
    let n = tiles_per_axis(zoom);
    let lat_rad = lat.to_radians();
    let x = (lng + 180.0) / 360.0 * n;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;
    (x, y)
}

// Convert a coordinate to the tile containing it
pub fn lng_lat_to_tile(lng: f64, lat: f64, zoom: u8) -> (u32, u32) {
    let (x, y) = lng_lat_to_tile_fraction(lng, lat, zoom);
    (x.floor().max(0.0) as u32, y.floor().max(0.0) as u32)
}

// Convert a tile X coordinate to longitude of its west edge
pub fn tile_x_to_lng(x: f64, zoom: u8) -> f64 {
    x / tiles_per_axis(zoom) * 360.0 - 180.0
}

// Convert a tile Y coordinate to latitude of its north edge
pub fn tile_y_to_lat(y: f64, zoom: u8) -> f64 {
    let lat_rad = (PI * (1.0 - 2.0 * y / tiles_per_axis(zoom))).sinh().atan();
    lat_rad.to_degrees()
}

/// Geographic extent of a tile.
pub fn tile_bounds(tile: &TileCoordinate) -> GeoBounds {
    GeoBounds {
        min_lng: tile_x_to_lng(tile.x as f64, tile.z),
        max_lng: tile_x_to_lng(tile.x as f64 + 1.0, tile.z),
        max_lat: tile_y_to_lat(tile.y as f64, tile.z),
        min_lat: tile_y_to_lat(tile.y as f64 + 1.0, tile.z),
    }
}

/// Unvalidated lng/lat rectangle, used for tile extents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBounds {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl GeoBounds {
    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        lng >= self.min_lng && lng <= self.max_lng && lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn intersects(&self, bbox: &GeoBoundingBox) -> bool {
        self.min_lng <= bbox.max_lng
            && self.max_lng >= bbox.min_lng
            && self.min_lat <= bbox.max_lat
            && self.max_lat >= bbox.min_lat
    }
}

// Corner tiles of a bbox: (min_x, min_y, max_x, max_y). Tile y grows southwards.
fn corner_tiles(bbox: &GeoBoundingBox, zoom: u8) -> (u32, u32, u32, u32) {
    let (x_a, y_a) = lng_lat_to_tile(bbox.min_lng, bbox.max_lat, zoom);
    let (x_b, y_b) = lng_lat_to_tile(bbox.max_lng, bbox.min_lat, zoom);
    (x_a.min(x_b), y_a.min(y_b), x_a.max(x_b), y_a.max(y_b))
}

/// Number of tiles spanning the bbox at `zoom`, saturating at `usize::MAX`
/// where the product does not fit (wasm32 at high zoom).
pub fn tile_count(bbox: &GeoBoundingBox, zoom: u8) -> usize {
    usize::try_from(tile_count_u64(bbox, zoom)).unwrap_or(usize::MAX)
}

fn tile_count_u64(bbox: &GeoBoundingBox, zoom: u8) -> u64 {
    let (min_x, min_y, max_x, max_y) = corner_tiles(bbox, zoom);
    let columns = u64::from(max_x - min_x) + 1;
    let rows = u64::from(max_y - min_y) + 1;
    columns.saturating_mul(rows)
}

/// Every tile of the rectangle between the bbox corner tiles, row by row.
pub fn tiles_for_bbox(bbox: &GeoBoundingBox, zoom: u8) -> Vec<TileCoordinate> {
    let (min_x, min_y, max_x, max_y) = corner_tiles(bbox, zoom);
    let mut tiles = Vec::with_capacity(tile_count(bbox, zoom).min(PREALLOCATED_TILES));
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            tiles.push(TileCoordinate::new(x, y, zoom));
        }
    }
    tiles
}

/// Highest zoom not above `max_zoom` whose tile count fits `max_tiles`,
/// bottoming out at zoom 0.
pub fn select_zoom(bbox: &GeoBoundingBox, max_zoom: u8, max_tiles: usize) -> u8 {
    let mut zoom = max_zoom;
    while zoom > 0 {
        if tile_count(bbox, zoom) <= max_tiles {
            break;
        }
        zoom -= 1;
    }
    zoom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> GeoBoundingBox {
        GeoBoundingBox::new(min_lng, min_lat, max_lng, max_lat).unwrap()
    }

    #[test]
    fn known_tile_for_coordinate() {
        // Bonn at zoom 12
        assert_eq!(lng_lat_to_tile(7.0982, 50.7374, 12), (2128, 1375));
        assert_eq!(lng_lat_to_tile(0.0, 0.0, 1), (1, 1));
    }

    #[test]
    fn tile_bounds_invert_tile_lookup() {
        let (x, y) = lng_lat_to_tile(-73.98, 40.75, 14);
        let bounds = tile_bounds(&TileCoordinate::new(x, y, 14));
        assert!(bounds.contains(-73.98, 40.75));
        assert!((tile_y_to_lat(0.0, 0) - 85.0511).abs() < 1e-3);
    }

    #[test]
    fn enumeration_matches_count_and_intersects_bbox() {
        let boxes = [
            bbox(7.0, 50.6, 7.3, 50.8),
            bbox(-74.02, 40.70, -73.93, 40.80),
            bbox(-0.5, -0.5, 0.5, 0.5),
            bbox(139.6, 35.6, 139.9, 35.8),
        ];
        for b in boxes.iter() {
            for zoom in [0u8, 5, 9, 12, 14] {
                let tiles = tiles_for_bbox(b, zoom);
                assert_eq!(tiles.len(), tile_count(b, zoom));
                for tile in &tiles {
                    assert!(tile_bounds(tile).intersects(b), "{} misses {:?}", tile, b);
                }
            }
        }
    }

    #[test]
    fn select_zoom_caps_tile_count() {
        let b = bbox(7.0, 50.6, 7.3, 50.8);
        let zoom = select_zoom(&b, 12, 4);
        assert!(tile_count(&b, zoom) <= 4);
        assert!(zoom == 12 || tile_count(&b, zoom + 1) > 4);
    }

    #[test]
    fn select_zoom_prefers_max_zoom_for_small_boxes() {
        let b = bbox(-73.9860, 40.7480, -73.9825, 40.7507);
        assert_eq!(select_zoom(&b, 12, 4), 12);
    }

    #[test]
    fn whole_world_falls_back_to_zoom_zero() {
        let b = bbox(-180.0, -85.0, 180.0, 85.0);
        assert_eq!(select_zoom(&b, 12, 4), 0);
    }

    #[test]
    fn deep_zoom_world_count_does_not_overflow() {
        let b = bbox(-180.0, -85.0, 180.0, 85.0);
        let exact = tile_count_u64(&b, 22);
        // Wider than a 32-bit usize
        assert!(exact > u64::from(u32::MAX));
        assert_eq!(tile_count(&b, 22) as u64, exact.min(usize::MAX as u64));
        assert_eq!(select_zoom(&b, 22, 4), 0);
        assert!(tile_count(&b, 22) > DEFAULT_MAX_BUILDING_TILES);
    }
}
