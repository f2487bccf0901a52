// Request configuration, deserialized from the JS side with snake_case keys
use serde::{Deserialize, Serialize};

use crate::elevation_grid::{
    GridBuildOptions, DEFAULT_GRID_SIZE, DEFAULT_SMOOTHING_PASSES, DEFAULT_SMOOTHING_RADIUS,
};
use crate::error::MeshError;
use crate::tile_math::{
    DEFAULT_BUILDING_ZOOM, DEFAULT_MAX_BUILDING_TILES, DEFAULT_MAX_TERRAIN_TILES,
    DEFAULT_MAX_TERRAIN_ZOOM,
};

pub const DEFAULT_RASTER_URL_TEMPLATE: &str =
    "https://wms.wheregroup.com/dem_tileserver/raster_dem/{z}/{x}/{y}.webp";
pub const DEFAULT_BUILDING_URL_TEMPLATE: &str =
    "https://wms.wheregroup.com/tileserver/tile/world-0-14/{z}/{x}/{y}.pbf";
pub const DEFAULT_BUILDING_LAYER: &str = "building";

// Deepest zoom any tile server in use publishes
const MAX_SUPPORTED_ZOOM: u8 = 22;

/// Where building footprints are read from.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BuildingSourceConfig {
    pub url_template: String,
    pub source_layer: String,
}

impl Default for BuildingSourceConfig {
    fn default() -> Self {
        BuildingSourceConfig {
            url_template: DEFAULT_BUILDING_URL_TEMPLATE.to_string(),
            source_layer: DEFAULT_BUILDING_LAYER.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BuildingStrategy {
    /// Only the source named by the map style.
    Style,
    /// Only the hardcoded source.
    Direct,
    /// Style source first, hardcoded source when it yields nothing.
    #[default]
    StyleThenDirect,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub raster_url_template: String,
    pub max_terrain_zoom: u8,
    pub max_terrain_tiles: usize,
    pub building_zoom: u8,
    /// Areas spanning more building tiles than this are generated without buildings.
    pub max_building_tiles: usize,
    pub grid_width: usize,
    pub grid_height: usize,
    pub smoothing_passes: usize,
    pub smoothing_radius: usize,
    pub vertical_exaggeration: f64,
    pub building_scale_factor: f64,
    pub include_buildings: bool,
    pub building_strategy: BuildingStrategy,
    pub style_source: Option<BuildingSourceConfig>,
    pub direct_source: BuildingSourceConfig,
    pub max_concurrent_fetches: usize,
    pub terrain_base_thickness: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            raster_url_template: DEFAULT_RASTER_URL_TEMPLATE.to_string(),
            max_terrain_zoom: DEFAULT_MAX_TERRAIN_ZOOM,
            max_terrain_tiles: DEFAULT_MAX_TERRAIN_TILES,
            building_zoom: DEFAULT_BUILDING_ZOOM,
            max_building_tiles: DEFAULT_MAX_BUILDING_TILES,
            grid_width: DEFAULT_GRID_SIZE,
            grid_height: DEFAULT_GRID_SIZE,
            smoothing_passes: DEFAULT_SMOOTHING_PASSES,
            smoothing_radius: DEFAULT_SMOOTHING_RADIUS,
            vertical_exaggeration: 0.05,
            building_scale_factor: 20.0,
            include_buildings: true,
            building_strategy: BuildingStrategy::default(),
            style_source: None,
            direct_source: BuildingSourceConfig::default(),
            max_concurrent_fetches: 4,
            terrain_base_thickness: 4.0,
        }
    }
}

fn check_template(name: &str, template: &str) -> Result<(), MeshError> {
    for placeholder in ["{z}", "{x}", "{y}"] {
        if !template.contains(placeholder) {
            return Err(MeshError::InvalidConfig(format!(
                "{} '{}' lacks the {} placeholder",
                name, template, placeholder
            )));
        }
    }
    Ok(())
}

fn check_factor(name: &str, value: f64) -> Result<(), MeshError> {
    if !value.is_finite() || value < 0.0 {
        return Err(MeshError::InvalidConfig(format!(
            "{} must be a finite non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), MeshError> {
        check_template("raster_url_template", &self.raster_url_template)?;
        check_template("direct_source.url_template", &self.direct_source.url_template)?;
        if let Some(style) = &self.style_source {
            check_template("style_source.url_template", &style.url_template)?;
        }

        if self.max_terrain_zoom > MAX_SUPPORTED_ZOOM || self.building_zoom > MAX_SUPPORTED_ZOOM {
            return Err(MeshError::InvalidConfig(format!(
                "zoom levels must not exceed {}",
                MAX_SUPPORTED_ZOOM
            )));
        }
        if self.max_terrain_tiles == 0 {
            return Err(MeshError::InvalidConfig("max_terrain_tiles must be at least 1".into()));
        }
        if self.max_building_tiles == 0 {
            return Err(MeshError::InvalidConfig("max_building_tiles must be at least 1".into()));
        }
        if self.grid_width < 2 || self.grid_height < 2 {
            return Err(MeshError::InvalidConfig(format!(
                "grid must be at least 2x2, got {}x{}",
                self.grid_width, self.grid_height
            )));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(MeshError::InvalidConfig(
                "max_concurrent_fetches must be at least 1".into(),
            ));
        }

        check_factor("vertical_exaggeration", self.vertical_exaggeration)?;
        check_factor("building_scale_factor", self.building_scale_factor)?;
        check_factor("terrain_base_thickness", self.terrain_base_thickness)?;
        if self.terrain_base_thickness == 0.0 {
            return Err(MeshError::InvalidConfig(
                "terrain_base_thickness must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn grid_options(&self) -> GridBuildOptions {
        GridBuildOptions {
            width: self.grid_width,
            height: self.grid_height,
            smoothing_passes: self.smoothing_passes,
            smoothing_radius: self.smoothing_radius,
        }
    }

    /// Building sources in the order the strategy consults them.
    pub fn building_sources(&self) -> Vec<&BuildingSourceConfig> {
        match self.building_strategy {
            BuildingStrategy::Style => self.style_source.iter().collect(),
            BuildingStrategy::Direct => vec![&self.direct_source],
            BuildingStrategy::StyleThenDirect => self
                .style_source
                .iter()
                .chain(std::iter::once(&self.direct_source))
                .collect(),
        }
    }
}
