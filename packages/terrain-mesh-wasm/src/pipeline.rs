// End-to-end generation: tiles in, watertight OBJ out
use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::bbox_filter::ring_intersects_bbox;
use crate::buildings::{BuildingProjector, ProjectedBuilding};
use crate::cancellation::{register_cancellation_token, release_cancellation_token, CancellationToken};
use crate::config::{BuildingSourceConfig, GenerationConfig};
use crate::elevation_grid::{build_elevation_grid, ElevationGrid};
use crate::error::MeshError;
use crate::extrude::emit_building;
use crate::mesh::{MeshBuffer, MeshFrame};
use crate::models::{GeoBoundingBox, RasterTile, TileCoordinate};
use crate::terrain_mesh_gen::emit_terrain;
use crate::tile_math::{select_zoom, tile_count, tiles_for_bbox};
use crate::tile_source::TileFetcher;
use crate::vectortile::{extract_buildings, BuildingCandidate};
use crate::{console_log, console_warn};

/// What the caller sends: the selection polygon plus optional settings.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MeshRequest {
    /// GeoJSON Feature or Polygon.
    pub bbox: serde_json::Value,
    #[serde(default)]
    pub config: GenerationConfig,
    #[serde(default)]
    pub operation_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GenerationStats {
    pub vertex_count: usize,
    pub face_count: usize,
    pub building_count: usize,
    pub terrain_zoom: u8,
    pub terrain_tile_count: usize,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub building_scale_factor: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GeneratedMesh {
    pub operation_id: String,
    pub obj: String,
    pub stats: GenerationStats,
}

/// Tiles covering the bbox, wrapped and clamped into the pyramid and
/// deduplicated in first-seen order.
pub fn fetchable_tiles(bbox: &GeoBoundingBox, zoom: u8) -> Vec<TileCoordinate> {
    let mut seen = HashSet::new();
    tiles_for_bbox(bbox, zoom)
        .into_iter()
        .map(|tile| tile.normalized())
        .filter(|tile| seen.insert(*tile))
        .collect()
}

async fn fetch_rasters<F: TileFetcher>(
    fetcher: &F,
    tiles: &[TileCoordinate],
    config: &GenerationConfig,
) -> Result<Vec<RasterTile>, MeshError> {
    let results: Vec<Result<RasterTile, MeshError>> = stream::iter(tiles.iter().map(|tile| {
        let url = tile.url(&config.raster_url_template);
        async move { fetcher.fetch_raster(&url, *tile).await }
    }))
    .buffered(config.max_concurrent_fetches)
    .collect()
    .await;

    let mut rasters = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(raster) => rasters.push(raster),
            Err(e) if e.is_tile_local() => console_warn!("Elevation tile skipped: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(rasters)
}

async fn fetch_building_source<F: TileFetcher>(
    fetcher: &F,
    tiles: &[TileCoordinate],
    source: &BuildingSourceConfig,
    concurrency: usize,
) -> Result<Vec<BuildingCandidate>, MeshError> {
    let results: Vec<(TileCoordinate, Result<Vec<u8>, MeshError>)> =
        stream::iter(tiles.iter().map(|tile| {
            let url = tile.url(&source.url_template);
            async move { (*tile, fetcher.fetch_vector(&url).await) }
        }))
        .buffered(concurrency)
        .collect()
        .await;

    let mut candidates = Vec::new();
    for (tile, result) in results {
        match result {
            Ok(data) => candidates.extend(extract_buildings(&data, &tile, &source.source_layer)),
            Err(e) if e.is_tile_local() => console_warn!("Building tile skipped: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(candidates)
}

/// Consult the configured building sources in order and keep the first
/// that yields footprints inside the bbox.
async fn collect_buildings<F: TileFetcher>(
    fetcher: &F,
    bbox: &GeoBoundingBox,
    config: &GenerationConfig,
    token: &CancellationToken,
) -> Result<Vec<BuildingCandidate>, MeshError> {
    let sources = config.building_sources();
    if sources.is_empty() {
        console_log!("No building source configured, skipping buildings");
        return Ok(Vec::new());
    }

    let count = tile_count(bbox, config.building_zoom);
    if count > config.max_building_tiles {
        console_warn!(
            "Area spans {} building tiles at zoom {}, over the limit of {}, skipping buildings",
            count,
            config.building_zoom,
            config.max_building_tiles
        );
        return Ok(Vec::new());
    }
    let tiles = fetchable_tiles(bbox, config.building_zoom);

    for (i, source) in sources.iter().enumerate() {
        if i > 0 {
            console_log!("Falling back to building source {}", source.url_template);
        }
        let candidates =
            fetch_building_source(fetcher, &tiles, source, config.max_concurrent_fetches).await?;
        token.check()?;

        let inside: Vec<BuildingCandidate> = candidates
            .into_iter()
            .filter(|c| ring_intersects_bbox(&c.ring, bbox))
            .collect();
        console_log!(
            "{} buildings from layer '{}' intersect the area",
            inside.len(),
            source.source_layer
        );
        if !inside.is_empty() {
            return Ok(inside);
        }
    }
    Ok(Vec::new())
}

/// Assemble terrain and buildings into one mesh. Returns the buffer and the
/// number of buildings emitted.
pub fn emit_solid_mesh(
    grid: &ElevationGrid,
    frame: &MeshFrame,
    buildings: &[ProjectedBuilding],
    base_thickness: f64,
) -> (MeshBuffer, usize) {
    let bbox = &frame.bbox;
    let mut mesh = MeshBuffer::new();
    mesh.add_header_comment("OBJ file generated from elevation data");
    mesh.add_header_comment(format!(
        "Bounds: {}, {}, {}, {}",
        bbox.min_lng, bbox.min_lat, bbox.max_lng, bbox.max_lat
    ));

    mesh.begin_group("terrain", vec![]);
    emit_terrain(&mut mesh, grid, frame, base_thickness);

    let mut emitted = 0;
    for building in buildings {
        if building.mesh_ring.len() < 3 {
            continue;
        }
        let mut preamble = Vec::new();
        if emitted == 0 {
            preamble.push(String::new());
            preamble.push("# Building models".to_string());
        }
        preamble.push(format!("# Building {}", emitted + 1));
        mesh.begin_group("building", preamble);
        if emit_building(&mut mesh, building) {
            emitted += 1;
        }
    }
    (mesh, emitted)
}

/// Run one generation request. Each await boundary and stage transition
/// honours `token`; a cancelled run returns no mesh.
pub async fn generate_mesh<F: TileFetcher>(
    fetcher: &F,
    bbox: &GeoBoundingBox,
    config: &GenerationConfig,
    token: &CancellationToken,
) -> Result<GeneratedMesh, MeshError> {
    config.validate()?;
    token.check()?;

    let zoom = select_zoom(bbox, config.max_terrain_zoom, config.max_terrain_tiles);
    let tiles = fetchable_tiles(bbox, zoom);
    console_log!("Fetching {} elevation tiles at zoom {}", tiles.len(), zoom);

    let rasters = fetch_rasters(fetcher, &tiles, config).await?;
    token.check()?;
    if rasters.is_empty() {
        console_warn!("No elevation tiles available, terrain will be flat");
    }

    let grid_result = build_elevation_grid(&rasters, bbox, &config.grid_options());
    let grid = grid_result.grid;
    token.check()?;

    let frame = MeshFrame::new(*bbox, grid.range());

    let candidates = if config.include_buildings {
        collect_buildings(fetcher, bbox, config, token).await?
    } else {
        Vec::new()
    };
    token.check()?;

    let projector = BuildingProjector::new(
        &grid,
        frame,
        config.vertical_exaggeration,
        config.building_scale_factor,
    );
    let buildings = projector.project_all(&candidates);
    token.check()?;

    let (mesh, building_count) =
        emit_solid_mesh(&grid, &frame, &buildings, config.terrain_base_thickness);
    console_log!(
        "Generated mesh with {} vertices, {} faces and {} buildings",
        mesh.vertex_count(),
        mesh.face_count(),
        building_count
    );

    let stats = GenerationStats {
        vertex_count: mesh.vertex_count(),
        face_count: mesh.face_count(),
        building_count,
        terrain_zoom: zoom,
        terrain_tile_count: tiles.len(),
        min_elevation: frame.min_elevation,
        max_elevation: frame.max_elevation,
        building_scale_factor: projector.scale_factor(),
    };

    Ok(GeneratedMesh {
        operation_id: token.id.clone(),
        obj: mesh.to_obj(),
        stats,
    })
}

/// Validate a request, register its cancellation token for the duration of
/// the run and generate the mesh.
pub async fn generate_from_request<F: TileFetcher>(
    fetcher: &F,
    request: MeshRequest,
) -> Result<GeneratedMesh, MeshError> {
    let bbox = GeoBoundingBox::from_geojson(&request.bbox)?;
    let operation_id = request
        .operation_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let token = register_cancellation_token(&operation_id);
    let result = generate_mesh(fetcher, &bbox, &request.config, &token).await;
    release_cancellation_token(&token);

    if let Err(e) = &result {
        console_warn!("Mesh generation {} failed: {}", operation_id, e);
    }
    result
}
