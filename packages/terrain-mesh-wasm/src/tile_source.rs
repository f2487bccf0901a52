// Tile fetching seam between the pipeline and the network
use js_sys::Uint8Array;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::error::MeshError;
use crate::models::{RasterTile, TileCoordinate};

#[wasm_bindgen]
extern "C" {
    // JavaScript function to fetch data from URL. Raster URLs resolve to
    // `{width, height, pixelData}`, anything else to the raw bytes.
    #[wasm_bindgen(js_namespace = wasmJsHelpers, catch)]
    fn fetch(url: &str) -> Result<js_sys::Promise, JsValue>;
}

/// One attempt per tile; errors are reported, never retried.
#[allow(async_fn_in_trait)]
pub trait TileFetcher {
    /// Fetch and decode an elevation raster into RGBA pixels.
    async fn fetch_raster(&self, url: &str, tile: TileCoordinate) -> Result<RasterTile, MeshError>;

    /// Fetch a vector tile payload, possibly gzip-compressed.
    async fn fetch_vector(&self, url: &str) -> Result<Vec<u8>, MeshError>;
}

/// Fetches through the `wasmJsHelpers.fetch` helper of the host page, which
/// also decodes WebP rasters.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsTileFetcher;

fn js_error(url: &str, err: JsValue) -> MeshError {
    let reason = err
        .as_string()
        .unwrap_or_else(|| format!("{:?}", err));
    MeshError::fetch(url, reason)
}

fn dimension(obj: &js_sys::Object, url: &str, name: &str) -> Result<u32, MeshError> {
    js_sys::Reflect::get(obj, &JsValue::from_str(name))
        .map_err(|e| js_error(url, e))?
        .as_f64()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u32)
        .ok_or_else(|| MeshError::Decode(format!("{}: invalid {}", url, name)))
}

impl TileFetcher for JsTileFetcher {
    async fn fetch_raster(&self, url: &str, tile: TileCoordinate) -> Result<RasterTile, MeshError> {
        let promise = fetch(url).map_err(|e| js_error(url, e))?;
        let js_result = JsFuture::from(promise).await.map_err(|e| js_error(url, e))?;

        let js_obj = js_sys::Object::from(js_result);
        let width = dimension(&js_obj, url, "width")?;
        let height = dimension(&js_obj, url, "height")?;
        let pixel_data_js = js_sys::Reflect::get(&js_obj, &JsValue::from_str("pixelData"))
            .map_err(|e| js_error(url, e))?;
        let pixels = Uint8Array::new(&pixel_data_js).to_vec();

        let expected = (width as usize) * (height as usize) * 4;
        if pixels.len() < expected {
            return Err(MeshError::Decode(format!(
                "{}: {} pixel bytes for a {}x{} tile",
                url,
                pixels.len(),
                width,
                height
            )));
        }

        Ok(RasterTile {
            width,
            height,
            tile,
            pixels,
        })
    }

    async fn fetch_vector(&self, url: &str) -> Result<Vec<u8>, MeshError> {
        let promise = fetch(url).map_err(|e| js_error(url, e))?;
        let js_result = JsFuture::from(promise).await.map_err(|e| js_error(url, e))?;
        Ok(Uint8Array::new(&js_result).to_vec())
    }
}
