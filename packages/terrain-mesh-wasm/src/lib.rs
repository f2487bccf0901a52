use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

// Create a console module for logging
pub mod console;

pub mod bbox_filter;
pub mod buildings;
pub mod cancellation;
pub mod config;
pub mod elevation;
pub mod elevation_grid;
pub mod error;
pub mod extrude;
pub mod mesh;
pub mod models;
pub mod pipeline;
pub mod terrain_mesh_gen;
pub mod tile_math;
pub mod tile_source;
pub mod vectortile;

pub use cancellation::{cancel_operation, cleanup_cancellation_token, create_cancellation_token};
pub use config::{BuildingSourceConfig, BuildingStrategy, GenerationConfig};
pub use error::MeshError;
pub use models::{GeoBoundingBox, TileCoordinate};
pub use pipeline::{generate_from_request, generate_mesh, GeneratedMesh, MeshRequest};
pub use tile_source::{JsTileFetcher, TileFetcher};

// Enable better panic messages in console during development
#[cfg(feature = "console_error_panic_hook")]
pub use console_error_panic_hook::set_once as set_panic_hook;

#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => ($crate::console::log(&format!($($t)*)))
}

#[macro_export]
macro_rules! console_warn {
    ($($t:tt)*) => ($crate::console::warn(&format!($($t)*)))
}

use std::sync::Once;
static INIT: Once = Once::new();

#[wasm_bindgen(start)]
pub fn start() {
    INIT.call_once(|| {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        console_log!("WASM module initialized successfully");
    });
}

/// Generate the terrain + buildings solid for a `{bbox, config?,
/// operation_id?}` request. Resolves to `{operation_id, obj, stats}`.
#[wasm_bindgen]
pub async fn generate_terrain_mesh(input_js: JsValue) -> Result<JsValue, JsValue> {
    let request: MeshRequest = from_value(input_js)
        .map_err(|e| MeshError::InvalidInput(format!("mesh request: {}", e)))?;

    let generated = generate_from_request(&JsTileFetcher, request).await?;
    Ok(to_js(&generated)?)
}

// Serialize an export's result into a JS value
fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, MeshError> {
    to_value(value).map_err(|e| MeshError::Serialization(e.to_string()))
}

#[wasm_bindgen]
pub fn calculate_tile_count(
    min_lng: f64,
    min_lat: f64,
    max_lng: f64,
    max_lat: f64,
    zoom: u8,
) -> Result<usize, JsValue> {
    let bbox = GeoBoundingBox::new(min_lng, min_lat, max_lng, max_lat)?;
    Ok(tile_math::tile_count(&bbox, zoom))
}

/// Terrain zoom the generator would pick for this bbox.
#[wasm_bindgen]
pub fn select_terrain_zoom(
    min_lng: f64,
    min_lat: f64,
    max_lng: f64,
    max_lat: f64,
    max_zoom: u8,
    max_tiles: usize,
) -> Result<u8, JsValue> {
    let bbox = GeoBoundingBox::new(min_lng, min_lat, max_lng, max_lat)?;
    Ok(tile_math::select_zoom(&bbox, max_zoom, max_tiles))
}

/// Default configuration as a JS object, for UIs that edit it.
#[wasm_bindgen]
pub fn default_generation_config() -> Result<JsValue, JsValue> {
    Ok(to_js(&GenerationConfig::default())?)
}
