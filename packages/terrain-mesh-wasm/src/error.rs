use thiserror::Error;
use wasm_bindgen::JsValue;

/// Errors surfaced by the mesh generation pipeline.
///
/// `Fetch` and `Decode` are tile-local: the pipeline logs them and treats the
/// tile as contributing nothing. The remaining variants abort the request.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to decode tile: {0}")]
    Decode(String),

    #[error("operation {0} was cancelled")]
    Cancelled(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl MeshError {
    pub fn fetch(url: &str, reason: impl Into<String>) -> Self {
        MeshError::Fetch {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors that only remove one tile's contribution.
    pub fn is_tile_local(&self) -> bool {
        matches!(self, MeshError::Fetch { .. } | MeshError::Decode(_))
    }
}

impl From<MeshError> for JsValue {
    fn from(err: MeshError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}
