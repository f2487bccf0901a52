// Building footprints from Mapbox Vector Tiles
use std::io::Read;

use flate2::read::GzDecoder;
use geozero::mvt::tile::{Feature, GeomType, Layer, Value};
use geozero::mvt::{Message, Tile};
use serde::{Deserialize, Serialize};

use crate::error::MeshError;
use crate::models::TileCoordinate;
use crate::tile_math::{tile_x_to_lng, tile_y_to_lat};
use crate::{console_log, console_warn};

pub const DEFAULT_EXTENT: u32 = 4096;
pub const DEFAULT_BUILDING_HEIGHT: f64 = 5.0;

// Property names consulted for the building height, in priority order
const HEIGHT_PROPERTIES: [&str; 2] = ["render_height", "height"];

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

/// One exterior ring lifted out of a polygon feature.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BuildingCandidate {
    /// (lng, lat), first vertex not repeated at the end.
    pub ring: Vec<[f64; 2]>,
    pub height_meters: f64,
}

pub fn is_gzipped(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, MeshError> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed_data = Vec::new();
    decoder
        .read_to_end(&mut decompressed_data)
        .map_err(|e| MeshError::Decode(format!("gzip: {}", e)))?;
    Ok(decompressed_data)
}

/// Decode a raw MVT payload, inflating it first when it is gzip-compressed.
pub fn decode_tile(data: &[u8]) -> Result<Tile, MeshError> {
    let decoded = if is_gzipped(data) {
        let inflated = decompress_gzip(data)?;
        Tile::decode(&inflated[..])
    } else {
        Tile::decode(data)
    };
    decoded.map_err(|e| MeshError::Decode(format!("protobuf: {}", e)))
}

fn zigzag_decode(value: u32) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Decode a polygon command stream into rings in tile-local coordinates
/// (y grows downwards). Decoding stops at the first malformed command.
pub fn decode_polygon_rings(commands: &[u32]) -> Vec<Vec<[i64; 2]>> {
    let mut rings = Vec::new();
    let mut current_ring: Vec<[i64; 2]> = Vec::new();
    let mut cursor_x = 0_i64;
    let mut cursor_y = 0_i64;
    let mut i = 0;

    while i < commands.len() {
        let cmd_id = commands[i] & 0x7;
        let cmd_count = (commands[i] >> 3) as usize;
        i += 1;

        match cmd_id {
            CMD_MOVE_TO | CMD_LINE_TO => {
                if i + 2 * cmd_count > commands.len() {
                    break;
                }
                for _ in 0..cmd_count {
                    cursor_x += zigzag_decode(commands[i]);
                    cursor_y += zigzag_decode(commands[i + 1]);
                    i += 2;

                    if cmd_id == CMD_MOVE_TO && !current_ring.is_empty() {
                        rings.push(std::mem::take(&mut current_ring));
                    }
                    current_ring.push([cursor_x, cursor_y]);
                }
            }
            CMD_CLOSE_PATH => {
                if !current_ring.is_empty() {
                    rings.push(std::mem::take(&mut current_ring));
                }
            }
            _ => break,
        }
    }

    if !current_ring.is_empty() {
        rings.push(current_ring);
    }
    rings
}

/// Surveyor's formula in tile space. Positive for exterior rings,
/// negative for holes.
pub fn ring_signed_area(ring: &[[i64; 2]]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice_area = 0_i128;
    for i in 0..n {
        let [x0, y0] = ring[i];
        let [x1, y1] = ring[(i + 1) % n];
        twice_area += (x0 as i128) * (y1 as i128) - (x1 as i128) * (y0 as i128);
    }
    twice_area as f64 / 2.0
}

// Convert a tile-local point to lng/lat
fn tile_point_to_lng_lat(point: [i64; 2], tile: &TileCoordinate, extent: u32) -> [f64; 2] {
    let extent = extent as f64;
    let lng = tile_x_to_lng(tile.x as f64 + point[0] as f64 / extent, tile.z);
    let lat = tile_y_to_lat(tile.y as f64 + point[1] as f64 / extent, tile.z);
    [lng, lat]
}

fn value_as_f64(value: &Value) -> Option<f64> {
    if let Some(v) = value.double_value {
        return Some(v);
    }
    if let Some(v) = value.float_value {
        return Some(v as f64);
    }
    if let Some(v) = value.int_value {
        return Some(v as f64);
    }
    if let Some(v) = value.sint_value {
        return Some(v as f64);
    }
    if let Some(v) = value.uint_value {
        return Some(v as f64);
    }
    value
        .string_value
        .as_deref()
        .and_then(|s| s.trim().parse::<f64>().ok())
}

fn feature_property<'a>(feature: &Feature, layer: &'a Layer, name: &str) -> Option<&'a Value> {
    feature.tags.chunks_exact(2).find_map(|pair| {
        let key = layer.keys.get(pair[0] as usize)?;
        if key == name {
            layer.values.get(pair[1] as usize)
        } else {
            None
        }
    })
}

/// `render_height`, then `height`, then the default. A value that is not
/// numeric counts as absent.
pub fn resolve_height(feature: &Feature, layer: &Layer) -> f64 {
    HEIGHT_PROPERTIES
        .iter()
        .find_map(|name| feature_property(feature, layer, name).and_then(value_as_f64))
        .unwrap_or(DEFAULT_BUILDING_HEIGHT)
}

fn layer_buildings(layer: &Layer, tile: &TileCoordinate) -> Vec<BuildingCandidate> {
    let extent = layer.extent.filter(|e| *e > 0).unwrap_or(DEFAULT_EXTENT);
    let mut buildings = Vec::new();

    for feature in &layer.features {
        if feature.r#type != Some(GeomType::Polygon as i32) {
            continue;
        }
        let height_meters = resolve_height(feature, layer);

        // Every exterior ring is its own building; holes are ignored
        for ring in decode_polygon_rings(&feature.geometry) {
            if ring_signed_area(&ring) <= 0.0 {
                continue;
            }
            buildings.push(BuildingCandidate {
                ring: ring
                    .iter()
                    .map(|point| tile_point_to_lng_lat(*point, tile, extent))
                    .collect(),
                height_meters,
            });
        }
    }
    buildings
}

/// Buildings of `layer_name` in one tile, or an error when the payload
/// cannot be decoded. A missing layer yields an empty list.
pub fn parse_buildings(
    data: &[u8],
    tile: &TileCoordinate,
    layer_name: &str,
) -> Result<Vec<BuildingCandidate>, MeshError> {
    let mvt_tile = decode_tile(data)?;
    Ok(mvt_tile
        .layers
        .iter()
        .filter(|layer| layer.name == layer_name)
        .flat_map(|layer| layer_buildings(layer, tile))
        .collect())
}

/// Like [`parse_buildings`], but a broken tile only logs a warning and
/// contributes nothing.
pub fn extract_buildings(data: &[u8], tile: &TileCoordinate, layer_name: &str) -> Vec<BuildingCandidate> {
    match parse_buildings(data, tile, layer_name) {
        Ok(buildings) => {
            if !buildings.is_empty() {
                console_log!(
                    "Tile {}: {} buildings in layer '{}'",
                    tile,
                    buildings.len(),
                    layer_name
                );
            }
            buildings
        }
        Err(e) => {
            console_warn!("Skipping vector tile {}: {}", tile, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile_math::tile_bounds;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn command(id: u32, count: u32) -> u32 {
        (id & 0x7) | (count << 3)
    }

    fn zigzag(value: i64) -> u32 {
        ((value << 1) ^ (value >> 63)) as u32
    }

    // Encode closed rings given as absolute tile-local points
    fn encode_rings(rings: &[Vec<[i64; 2]>]) -> Vec<u32> {
        let mut out = Vec::new();
        let (mut cx, mut cy) = (0, 0);
        for ring in rings {
            let [x0, y0] = ring[0];
            out.push(command(CMD_MOVE_TO, 1));
            out.push(zigzag(x0 - cx));
            out.push(zigzag(y0 - cy));
            (cx, cy) = (x0, y0);
            out.push(command(CMD_LINE_TO, (ring.len() - 1) as u32));
            for &[x, y] in &ring[1..] {
                out.push(zigzag(x - cx));
                out.push(zigzag(y - cy));
                (cx, cy) = (x, y);
            }
            out.push(command(CMD_CLOSE_PATH, 1));
        }
        out
    }

    fn square(x: i64, y: i64, size: i64) -> Vec<[i64; 2]> {
        vec![[x, y], [x + size, y], [x + size, y + size], [x, y + size]]
    }

    fn reversed(ring: Vec<[i64; 2]>) -> Vec<[i64; 2]> {
        ring.into_iter().rev().collect()
    }

    fn building_tile(features: Vec<Feature>, values: Vec<Value>) -> Vec<u8> {
        let layer = Layer {
            version: 2,
            name: "building".to_string(),
            features,
            keys: vec!["render_height".to_string(), "height".to_string()],
            values,
            extent: Some(4096),
            ..Default::default()
        };
        Tile {
            layers: vec![layer],
            ..Default::default()
        }
        .encode_to_vec()
    }

    fn polygon_feature(rings: &[Vec<[i64; 2]>], tags: Vec<u32>) -> Feature {
        Feature {
            id: Some(1),
            tags,
            r#type: Some(GeomType::Polygon as i32),
            geometry: encode_rings(rings),
            ..Default::default()
        }
    }

    fn int_value(v: i64) -> Value {
        Value {
            int_value: Some(v),
            ..Default::default()
        }
    }

    fn string_value(v: &str) -> Value {
        Value {
            string_value: Some(v.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn command_stream_decodes_to_rings() {
        let rings = vec![square(10, 10, 20), reversed(square(12, 12, 4))];
        let decoded = decode_polygon_rings(&encode_rings(&rings));
        assert_eq!(decoded, rings);
        assert!(ring_signed_area(&decoded[0]) > 0.0);
        assert!(ring_signed_area(&decoded[1]) < 0.0);
    }

    #[test]
    fn truncated_stream_keeps_complete_rings() {
        let mut commands = encode_rings(&[square(0, 0, 8)]);
        commands.extend_from_slice(&[command(CMD_MOVE_TO, 1), zigzag(3)]);
        assert_eq!(decode_polygon_rings(&commands), vec![square(0, 0, 8)]);
    }

    #[test]
    fn holes_are_dropped_and_multipolygons_split() {
        let tile = TileCoordinate::new(4824, 6157, 14);
        let feature = polygon_feature(
            &[
                square(100, 100, 400),
                reversed(square(200, 200, 50)),
                square(1000, 1000, 200),
            ],
            vec![0, 0],
        );
        let data = building_tile(vec![feature], vec![int_value(30)]);
        let buildings = parse_buildings(&data, &tile, "building").unwrap();
        assert_eq!(buildings.len(), 2);
        assert!(buildings.iter().all(|b| b.height_meters == 30.0 && b.ring.len() == 4));
    }

    #[test]
    fn reprojected_ring_lies_inside_the_tile() {
        let tile = TileCoordinate::new(4824, 6157, 14);
        let bounds = tile_bounds(&tile);
        let data = building_tile(vec![polygon_feature(&[square(0, 0, 4096)], vec![])], vec![]);
        let buildings = parse_buildings(&data, &tile, "building").unwrap();
        assert_eq!(buildings.len(), 1);
        let ring = &buildings[0].ring;
        assert!((ring[0][0] - bounds.min_lng).abs() < 1e-9);
        assert!((ring[0][1] - bounds.max_lat).abs() < 1e-9);
        assert!((ring[2][0] - bounds.max_lng).abs() < 1e-9);
        assert!((ring[2][1] - bounds.min_lat).abs() < 1e-9);
    }

    #[test]
    fn height_resolution_order() {
        let tile = TileCoordinate::new(0, 0, 14);
        let ring = [square(0, 0, 100)];
        let features = vec![
            // render_height wins over height
            polygon_feature(&ring, vec![0, 0, 1, 1]),
            // non-numeric render_height falls through to height
            polygon_feature(&ring, vec![0, 2, 1, 3]),
            // nothing tagged
            polygon_feature(&ring, vec![]),
        ];
        let values = vec![int_value(42), int_value(7), string_value("tall"), string_value(" 12.5 ")];
        let data = building_tile(features, values);
        let heights: Vec<f64> = parse_buildings(&data, &tile, "building")
            .unwrap()
            .iter()
            .map(|b| b.height_meters)
            .collect();
        assert_eq!(heights, vec![42.0, 12.5, DEFAULT_BUILDING_HEIGHT]);
    }

    #[test]
    fn non_polygons_and_other_layers_are_ignored() {
        let tile = TileCoordinate::new(0, 0, 14);
        let mut line = polygon_feature(&[square(0, 0, 100)], vec![]);
        line.r#type = Some(GeomType::Linestring as i32);
        let data = building_tile(vec![line], vec![]);
        assert!(parse_buildings(&data, &tile, "building").unwrap().is_empty());

        let data = building_tile(vec![polygon_feature(&[square(0, 0, 100)], vec![])], vec![]);
        assert!(parse_buildings(&data, &tile, "landuse").unwrap().is_empty());
    }

    #[test]
    fn gzipped_payload_is_inflated() {
        let tile = TileCoordinate::new(0, 0, 14);
        let raw = building_tile(vec![polygon_feature(&[square(0, 0, 100)], vec![])], vec![]);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let gzipped = encoder.finish().unwrap();
        assert!(is_gzipped(&gzipped));
        assert_eq!(extract_buildings(&gzipped, &tile, "building").len(), 1);
    }

    #[test]
    fn corrupt_payload_yields_nothing() {
        let tile = TileCoordinate::new(0, 0, 14);
        let garbage = [0x1f, 0x8b, 0x00, 0x01, 0x02];
        assert!(matches!(
            parse_buildings(&garbage, &tile, "building"),
            Err(MeshError::Decode(_))
        ));
        assert!(extract_buildings(&garbage, &tile, "building").is_empty());
        assert!(extract_buildings(&[0xff, 0xff, 0xff], &tile, "building").is_empty());
    }
}
