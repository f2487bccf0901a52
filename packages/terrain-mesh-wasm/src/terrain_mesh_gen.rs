// Watertight terrain slab: top surface, flat bottom and four side walls
use crate::elevation_grid::ElevationGrid;
use crate::mesh::{MeshBuffer, MeshFrame};

/// Vertex and face totals of a terrain slab for a `width x height` grid.
pub fn terrain_counts(width: usize, height: usize) -> (usize, usize) {
    let vertices = 2 * width * height;
    let cap_faces = 2 * (width - 1) * (height - 1);
    let wall_faces = 4 * (width - 1) + 4 * (height - 1);
    (vertices, 2 * cap_faces + wall_faces)
}

/// Emit the slab for `grid`. Top vertices come first in row-major order
/// (row 0 south), followed by the bottom layer in the same order, which sits
/// `base_thickness` mesh units below the lowest terrain point.
pub fn emit_terrain(
    mesh: &mut MeshBuffer,
    grid: &ElevationGrid,
    frame: &MeshFrame,
    base_thickness: f64,
) {
    let width = grid.width;
    let height = grid.height;
    let layer_size = width * height;
    let bottom_z = -base_thickness;

    let first = mesh.vertex_count();
    let top = |gx: usize, gy: usize| first + gy * width + gx;
    let bottom = |gx: usize, gy: usize| first + layer_size + gy * width + gx;

    for gy in 0..height {
        for gx in 0..width {
            let (lng, lat) = grid.cell_lng_lat(&frame.bbox, gx, gy);
            let [x, y] = frame.project_xy(lng, lat);
            mesh.push_vertex(x, y, frame.elevation_to_z(grid.get(gx, gy)));
        }
    }
    for gy in 0..height {
        for gx in 0..width {
            let (lng, lat) = grid.cell_lng_lat(&frame.bbox, gx, gy);
            let [x, y] = frame.project_xy(lng, lat);
            mesh.push_vertex(x, y, bottom_z);
        }
    }

    // Top surface, counter-clockwise seen from above
    for gy in 0..height - 1 {
        for gx in 0..width - 1 {
            let tl = top(gx, gy);
            let tr = top(gx + 1, gy);
            let bl = top(gx, gy + 1);
            let br = top(gx + 1, gy + 1);
            mesh.push_triangle(tl, tr, bl);
            mesh.push_triangle(bl, tr, br);
        }
    }

    // Bottom surface, reversed so normals point down
    for gy in 0..height - 1 {
        for gx in 0..width - 1 {
            let btl = bottom(gx, gy);
            let btr = bottom(gx + 1, gy);
            let bbl = bottom(gx, gy + 1);
            let bbr = bottom(gx + 1, gy + 1);
            mesh.push_triangle(btl, bbl, btr);
            mesh.push_triangle(bbl, bbr, btr);
        }
    }

    // West and east walls run along y
    for gy in 0..height - 1 {
        let (t1, t2) = (top(0, gy), top(0, gy + 1));
        let (b1, b2) = (bottom(0, gy), bottom(0, gy + 1));
        mesh.push_triangle(t1, t2, b1);
        mesh.push_triangle(t2, b2, b1);

        let (t1, t2) = (top(width - 1, gy), top(width - 1, gy + 1));
        let (b1, b2) = (bottom(width - 1, gy), bottom(width - 1, gy + 1));
        mesh.push_triangle(t1, b1, t2);
        mesh.push_triangle(t2, b1, b2);
    }

    // South and north walls run along x
    for gx in 0..width - 1 {
        let (t1, t2) = (top(gx, 0), top(gx + 1, 0));
        let (b1, b2) = (bottom(gx, 0), bottom(gx + 1, 0));
        mesh.push_triangle(t1, b1, t2);
        mesh.push_triangle(t2, b1, b2);

        let (t1, t2) = (top(gx, height - 1), top(gx + 1, height - 1));
        let (b1, b2) = (bottom(gx, height - 1), bottom(gx + 1, height - 1));
        mesh.push_triangle(t1, t2, b1);
        mesh.push_triangle(t2, b2, b1);
    }
}
