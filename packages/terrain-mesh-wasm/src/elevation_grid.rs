// Resampling of decoded raster tiles onto the uniform output grid
use serde::{Deserialize, Serialize};

use crate::console_log;
use crate::elevation::{scan_elevation_range, ElevationRange};
use crate::models::{GeoBoundingBox, RasterTile};
use crate::tile_math::{tile_bounds, GeoBounds};

pub const DEFAULT_GRID_SIZE: usize = 150;
pub const DEFAULT_SMOOTHING_PASSES: usize = 2;
pub const DEFAULT_SMOOTHING_RADIUS: usize = 2;

// Weight lost at a tile border relative to its center
const EDGE_FALLOFF: f64 = 0.7;

/// Elevation in meters, `values[y][x]`; row 0 is the southern edge of the bbox.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ElevationGrid {
    pub values: Vec<Vec<f64>>,
    pub width: usize,
    pub height: usize,
}

impl ElevationGrid {
    pub fn filled(width: usize, height: usize, value: f64) -> Self {
        ElevationGrid {
            values: vec![vec![value; width]; height],
            width,
            height,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.values[y][x]
    }

    pub fn range(&self) -> ElevationRange {
        let mut range = ElevationRange::default();
        for row in &self.values {
            for &cell in row {
                range.include(cell);
            }
        }
        range
    }

    /// Geographic position of grid cell (x, y).
    pub fn cell_lng_lat(&self, bbox: &GeoBoundingBox, x: usize, y: usize) -> (f64, f64) {
        let lng = bbox.min_lng + (bbox.max_lng - bbox.min_lng) * (x as f64) / ((self.width - 1) as f64);
        let lat = bbox.min_lat + (bbox.max_lat - bbox.min_lat) * (y as f64) / ((self.height - 1) as f64);
        (lng, lat)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct GridBuildOptions {
    pub width: usize,
    pub height: usize,
    pub smoothing_passes: usize,
    pub smoothing_radius: usize,
}

impl Default for GridBuildOptions {
    fn default() -> Self {
        GridBuildOptions {
            width: DEFAULT_GRID_SIZE,
            height: DEFAULT_GRID_SIZE,
            smoothing_passes: DEFAULT_SMOOTHING_PASSES,
            smoothing_radius: DEFAULT_SMOOTHING_RADIUS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ElevationGridResult {
    pub grid: ElevationGrid,
    /// Range over every valid source pixel, before resampling.
    pub source_range: ElevationRange,
    /// Cells that received no tile sample and were gap-filled.
    pub filled_cells: usize,
}

// Bilinear sample of a tile at a geographic point, weighted by distance from
// the tile center. None when any of the four neighbours is unusable.
fn sample_tile(tile: &RasterTile, bounds: &GeoBounds, lng: f64, lat: f64) -> Option<(f64, f64)> {
    if tile.width < 2 || tile.height < 2 {
        return None;
    }
    let norm_x = (lng - bounds.min_lng) / (bounds.max_lng - bounds.min_lng);
    let norm_y = (lat - bounds.min_lat) / (bounds.max_lat - bounds.min_lat);

    // Image rows grow southwards
    let frac_x = norm_x * ((tile.width - 1) as f64);
    let frac_y = (1.0 - norm_y) * ((tile.height - 1) as f64);
    if !(frac_x >= 0.0 && frac_y >= 0.0) {
        return None;
    }

    let pixel_x = frac_x.floor() as u32;
    let pixel_y = frac_y.floor() as u32;
    if pixel_x >= tile.width - 1 || pixel_y >= tile.height - 1 {
        return None;
    }

    let dx = frac_x - pixel_x as f64;
    let dy = frac_y - pixel_y as f64;

    let elev_tl = tile.elevation_at(pixel_x, pixel_y)?;
    let elev_tr = tile.elevation_at(pixel_x + 1, pixel_y)?;
    let elev_bl = tile.elevation_at(pixel_x, pixel_y + 1)?;
    let elev_br = tile.elevation_at(pixel_x + 1, pixel_y + 1)?;

    let top = elev_tl * (1.0 - dx) + elev_tr * dx;
    let bottom = elev_bl * (1.0 - dx) + elev_br * dx;
    let elevation = top * (1.0 - dy) + bottom * dy;

    let dist_from_center_x = (2.0 * norm_x - 1.0).abs();
    let dist_from_center_y = (2.0 * norm_y - 1.0).abs();
    let max_dist = dist_from_center_x.max(dist_from_center_y);
    let edge_weight = 1.0 - max_dist * max_dist * EDGE_FALLOFF;

    Some((elevation, edge_weight))
}

/// Resample `tiles` onto a `width x height` grid covering `bbox`, fill cells
/// no tile covered and smooth the result.
pub fn build_elevation_grid(
    tiles: &[RasterTile],
    bbox: &GeoBoundingBox,
    options: &GridBuildOptions,
) -> ElevationGridResult {
    let grid_width = options.width.max(2);
    let grid_height = options.height.max(2);

    let source_range = scan_elevation_range(tiles);
    if source_range.is_valid() {
        console_log!(
            "Elevation range: {:.2}m - {:.2}m over {} tiles",
            source_range.min,
            source_range.max,
            tiles.len()
        );
    }

    let mut grid = ElevationGrid::filled(grid_width, grid_height, 0.0);
    let mut coverage = vec![vec![0.0_f64; grid_width]; grid_height];

    for tile in tiles {
        let bounds = tile_bounds(&tile.tile);
        for gy in 0..grid_height {
            for gx in 0..grid_width {
                let (lng, lat) = grid.cell_lng_lat(bbox, gx, gy);
                if !bounds.contains(lng, lat) {
                    continue;
                }
                if let Some((elevation, weight)) = sample_tile(tile, &bounds, lng, lat) {
                    grid.values[gy][gx] += elevation * weight;
                    coverage[gy][gx] += weight;
                }
            }
        }
    }

    let mut covered: Vec<(usize, usize)> = Vec::new();
    for gy in 0..grid_height {
        for gx in 0..grid_width {
            if coverage[gy][gx] > 0.0 {
                grid.values[gy][gx] /= coverage[gy][gx];
                covered.push((gx, gy));
            }
        }
    }

    let filled_cells = fill_gaps(&mut grid, &coverage, &covered, &source_range);
    if filled_cells > 0 {
        console_log!("Filled {} missing data points", filled_cells);
    }

    let mut smoothed = grid;
    for _ in 0..options.smoothing_passes {
        smoothed = smooth_elevation_grid(&smoothed, options.smoothing_radius);
    }

    ElevationGridResult {
        grid: smoothed,
        source_range,
        filled_cells,
    }
}

// Nearest covered cell (Euclidean, grid index space) for every uncovered cell.
// Ties go to the first covered cell in row-major order.
fn fill_gaps(
    grid: &mut ElevationGrid,
    coverage: &[Vec<f64>],
    covered: &[(usize, usize)],
    source_range: &ElevationRange,
) -> usize {
    let fallback = source_range.midpoint().unwrap_or(0.0);
    let mut filled = 0;

    for gy in 0..grid.height {
        for gx in 0..grid.width {
            if coverage[gy][gx] > 0.0 {
                continue;
            }
            filled += 1;

            let nearest = covered.iter().min_by_key(|(cx, cy)| {
                let ddx = *cx as i64 - gx as i64;
                let ddy = *cy as i64 - gy as i64;
                ddx * ddx + ddy * ddy
            });

            grid.values[gy][gx] = match nearest {
                Some(&(nx, ny)) => grid.values[ny][nx],
                None => fallback,
            };
        }
    }

    filled
}

/// One Gaussian pass with a (2r+1)² kernel. Edge cells are normalized by the
/// kernel weights that fall inside the grid.
pub fn smooth_elevation_grid(grid: &ElevationGrid, radius: usize) -> ElevationGrid {
    let r = radius as i64;
    let sigma_sq = ((radius * radius) as f64).max(f64::MIN_POSITIVE);
    let width = grid.width as i64;
    let height = grid.height as i64;

    let mut kernel = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
    for ky in -r..=r {
        for kx in -r..=r {
            let dist_sq = (kx * kx + ky * ky) as f64;
            kernel.push((kx, ky, (-dist_sq / (2.0 * sigma_sq)).exp()));
        }
    }

    let mut result = ElevationGrid::filled(grid.width, grid.height, 0.0);
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0;
            let mut total_weight = 0.0;
            for &(kx, ky, weight) in &kernel {
                let nx = x + kx;
                let ny = y + ky;
                if nx >= 0 && nx < width && ny >= 0 && ny < height {
                    sum += grid.values[ny as usize][nx as usize] * weight;
                    total_weight += weight;
                }
            }
            result.values[y as usize][x as usize] = if total_weight > 0.0 {
                sum / total_weight
            } else {
                grid.values[y as usize][x as usize]
            };
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::encode_elevation_to_pixel;
    use crate::models::TileCoordinate;
    use crate::tile_math::lng_lat_to_tile;

    fn tile_from_fn(tile: TileCoordinate, size: u32, f: impl Fn(u32, u32) -> f64) -> RasterTile {
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for py in 0..size {
            for px in 0..size {
                let [r, g, b] = encode_elevation_to_pixel(f(px, py));
                pixels.extend_from_slice(&[r, g, b, 255]);
            }
        }
        RasterTile {
            width: size,
            height: size,
            tile,
            pixels,
        }
    }

    fn small_options(size: usize, passes: usize) -> GridBuildOptions {
        GridBuildOptions {
            width: size,
            height: size,
            smoothing_passes: passes,
            smoothing_radius: 2,
        }
    }

    fn inland_bbox() -> GeoBoundingBox {
        GeoBoundingBox::new(7.18, 50.56, 7.22, 50.59).unwrap()
    }

    fn covering_tile(bbox: &GeoBoundingBox, zoom: u8) -> TileCoordinate {
        let (lng, lat) = bbox.center();
        let (x, y) = lng_lat_to_tile(lng, lat, zoom);
        TileCoordinate::new(x, y, zoom)
    }

    #[test]
    fn uniform_tile_yields_uniform_grid() {
        let bbox = inland_bbox();
        let tile = tile_from_fn(covering_tile(&bbox, 10), 64, |_, _| 312.4);
        let result = build_elevation_grid(&[tile], &bbox, &small_options(20, 2));
        assert_eq!(result.filled_cells, 0);
        for row in &result.grid.values {
            for &v in row {
                assert!((v - 312.4).abs() < 0.06, "cell {}", v);
            }
        }
    }

    #[test]
    fn no_tiles_gives_flat_finite_grid() {
        let result = build_elevation_grid(&[], &inland_bbox(), &small_options(8, 2));
        assert_eq!(result.filled_cells, 64);
        assert!(result.grid.values.iter().flatten().all(|v| *v == 0.0));
    }

    #[test]
    fn partial_coverage_is_gap_filled_with_finite_values() {
        let bbox = inland_bbox();
        let tile_coord = covering_tile(&bbox, 10);
        let tile = tile_from_fn(tile_coord, 64, |px, py| 100.0 + px as f64 + py as f64);
        // A bbox twice as wide extends past the tile's east edge
        let wide = GeoBoundingBox::new(
            bbox.min_lng,
            bbox.min_lat,
            tile_bounds(&tile_coord).max_lng + 0.2,
            bbox.max_lat,
        )
        .unwrap();
        let result = build_elevation_grid(&[tile], &wide, &small_options(30, 2));
        assert!(result.filled_cells > 0);
        assert!(result.grid.values.iter().flatten().all(|v| v.is_finite()));
        let range = result.grid.range();
        assert!(range.min >= 100.0 - 0.1 && range.max <= 226.0 + 0.1);
    }

    #[test]
    fn adjacent_tiles_meet_without_gaps() {
        use crate::tile_math::{tile_x_to_lng, tile_y_to_lat};

        // Four z12 tiles around the shared corner of (2128, 1375)
        let corner_lng = tile_x_to_lng(2128.0, 12);
        let corner_lat = tile_y_to_lat(1375.0, 12);
        let tiles = [
            tile_from_fn(TileCoordinate::new(2127, 1374, 12), 64, |_, _| 100.0),
            tile_from_fn(TileCoordinate::new(2128, 1374, 12), 64, |_, _| 200.0),
            tile_from_fn(TileCoordinate::new(2127, 1375, 12), 64, |_, _| 300.0),
            tile_from_fn(TileCoordinate::new(2128, 1375, 12), 64, |_, _| 400.0),
        ];
        let bbox = GeoBoundingBox::new(
            corner_lng - 0.02,
            corner_lat - 0.02,
            corner_lng + 0.02,
            corner_lat + 0.02,
        )
        .unwrap();

        let result = build_elevation_grid(&tiles, &bbox, &small_options(41, 0));
        assert_eq!(result.filled_cells, 0);
        assert!((result.source_range.min - 100.0).abs() < 0.06);
        assert!((result.source_range.max - 400.0).abs() < 0.06);

        let grid = &result.grid;
        let quadrant_value = |x: usize, y: usize| match (x > 20, y > 20) {
            (false, false) => 300.0,
            (true, false) => 400.0,
            (false, true) => 100.0,
            (true, true) => 200.0,
        };
        for y in 0..grid.height {
            for x in 0..grid.width {
                let v = grid.get(x, y);
                assert!(v.is_finite());
                if x == 20 || y == 20 {
                    // Seam cells blend their neighbours
                    assert!((100.0 - 0.06..=400.0 + 0.06).contains(&v), "seam cell {}", v);
                } else {
                    let expected = quadrant_value(x, y);
                    assert!((v - expected).abs() < 0.06, "cell ({}, {}) = {}", x, y, v);
                }
            }
        }
    }

    #[test]
    fn grid_build_is_deterministic() {
        let bbox = inland_bbox();
        let tile = tile_from_fn(covering_tile(&bbox, 11), 32, |px, py| {
            ((px * 7 + py * 13) % 50) as f64 * 1.7
        });
        let a = build_elevation_grid(&[tile.clone()], &bbox, &small_options(25, 2));
        let b = build_elevation_grid(&[tile], &bbox, &small_options(25, 2));
        assert_eq!(a.grid, b.grid);
    }

    #[test]
    fn smoothing_preserves_constant_and_flattens_spike() {
        let flat = ElevationGrid::filled(6, 6, 42.0);
        let smoothed = smooth_elevation_grid(&flat, 2);
        for v in smoothed.values.iter().flatten() {
            assert!((v - 42.0).abs() < 1e-9);
        }

        let mut spike = ElevationGrid::filled(7, 7, 0.0);
        spike.values[3][3] = 100.0;
        let smoothed = smooth_elevation_grid(&spike, 2);
        assert!(smoothed.values[3][3] < 100.0);
        assert!(smoothed.values[3][4] > 0.0);
        assert_eq!(smoothed.values[0][0], 0.0);
    }

    #[test]
    fn edge_samples_weigh_less_than_center_samples() {
        let tile_coord = TileCoordinate::new(0, 0, 1);
        let tile = tile_from_fn(tile_coord, 16, |_, _| 10.0);
        let bounds = tile_bounds(&tile_coord);
        let center_lng = (bounds.min_lng + bounds.max_lng) / 2.0;
        let center_lat = (bounds.min_lat + bounds.max_lat) / 2.0;
        let (_, center_weight) = sample_tile(&tile, &bounds, center_lng, center_lat).unwrap();
        let (_, edge_weight) =
            sample_tile(&tile, &bounds, bounds.min_lng + 1e-6, center_lat).unwrap();
        assert!((center_weight - 1.0).abs() < 1e-9);
        assert!(edge_weight < 0.31 && edge_weight > 0.29);
    }
}
