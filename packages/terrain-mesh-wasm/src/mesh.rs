// Mesh frame and the indexed triangle buffer serialized to OBJ
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::elevation::ElevationRange;
use crate::models::GeoBoundingBox;

/// Edge length of the square mesh footprint, centered at the origin.
pub const MESH_SIZE: f64 = 200.0;
/// Height of the band terrain elevations are scaled into.
pub const VERTICAL_BAND: f64 = MESH_SIZE * 0.2;

/// Maps geographic positions and elevations into mesh units.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct MeshFrame {
    pub bbox: GeoBoundingBox,
    pub min_elevation: f64,
    pub max_elevation: f64,
}

impl MeshFrame {
    /// An invalid range maps every elevation to the floor of the band.
    pub fn new(bbox: GeoBoundingBox, range: ElevationRange) -> Self {
        let (min_elevation, max_elevation) = if range.is_valid() {
            (range.min, range.max)
        } else {
            (0.0, 0.0)
        };
        MeshFrame {
            bbox,
            min_elevation,
            max_elevation,
        }
    }

    pub fn elevation_span(&self) -> f64 {
        self.max_elevation - self.min_elevation
    }

    /// x grows east, y grows north.
    pub fn project_xy(&self, lng: f64, lat: f64) -> [f64; 2] {
        let (nx, ny) = self.bbox.normalize(lng, lat);
        [(nx - 0.5) * MESH_SIZE, (ny - 0.5) * MESH_SIZE]
    }

    pub fn elevation_to_z(&self, elevation: f64) -> f64 {
        let span = self.elevation_span();
        if span <= 0.0 {
            return 0.0;
        }
        (elevation - self.min_elevation) / span * VERTICAL_BAND
    }
}

// A named run of vertices and faces, written as one `g` block
#[derive(Clone, Debug)]
struct MeshGroup {
    name: String,
    preamble: Vec<String>,
    first_vertex: usize,
    first_face: usize,
}

/// Append-only triangle mesh. Indices are 0-based in memory and 1-based in
/// the OBJ output.
#[derive(Clone, Debug, Default)]
pub struct MeshBuffer {
    vertices: Vec<[f64; 3]>,
    faces: Vec<[usize; 3]>,
    groups: Vec<MeshGroup>,
    header: Vec<String>,
}

impl MeshBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_header_comment(&mut self, comment: impl Into<String>) {
        self.header.push(comment.into());
    }

    /// Start a group. Preamble lines are written verbatim before `g <name>`.
    pub fn begin_group(&mut self, name: &str, preamble: Vec<String>) {
        self.groups.push(MeshGroup {
            name: name.to_string(),
            preamble,
            first_vertex: self.vertices.len(),
            first_face: self.faces.len(),
        });
    }

    pub fn push_vertex(&mut self, x: f64, y: f64, z: f64) -> usize {
        self.vertices.push([x, y, z]);
        self.vertices.len() - 1
    }

    pub fn push_triangle(&mut self, a: usize, b: usize, c: usize) {
        self.faces.push([a, b, c]);
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    pub fn group_count(&self, name: &str) -> usize {
        self.groups.iter().filter(|g| g.name == name).count()
    }

    pub fn to_obj(&self) -> String {
        let mut obj = String::with_capacity(self.vertices.len() * 40 + self.faces.len() * 24);
        for line in &self.header {
            let _ = writeln!(obj, "# {}", line);
        }

        // Anything emitted before the first group is written ungrouped
        let first_grouped_vertex = self.groups.first().map_or(self.vertices.len(), |g| g.first_vertex);
        let first_grouped_face = self.groups.first().map_or(self.faces.len(), |g| g.first_face);
        self.write_range(&mut obj, 0..first_grouped_vertex, 0..first_grouped_face);

        for (i, group) in self.groups.iter().enumerate() {
            let (vertex_end, face_end) = match self.groups.get(i + 1) {
                Some(next) => (next.first_vertex, next.first_face),
                None => (self.vertices.len(), self.faces.len()),
            };
            for line in &group.preamble {
                let _ = writeln!(obj, "{}", line);
            }
            let _ = writeln!(obj, "g {}", group.name);
            self.write_range(&mut obj, group.first_vertex..vertex_end, group.first_face..face_end);
        }
        obj
    }

    fn write_range(
        &self,
        obj: &mut String,
        vertices: std::ops::Range<usize>,
        faces: std::ops::Range<usize>,
    ) {
        for [x, y, z] in &self.vertices[vertices] {
            let _ = writeln!(obj, "v {:.4} {:.4} {:.4}", x, y, z);
        }
        for [a, b, c] in &self.faces[faces] {
            let _ = writeln!(obj, "f {} {} {}", a + 1, b + 1, c + 1);
        }
    }
}
