// Building prisms: flat roof, flat base sunk into the terrain, one wall quad per edge
use crate::buildings::ProjectedBuilding;
use crate::mesh::MeshBuffer;

/// Vertex and face totals of a prism over an `n`-gon.
pub fn prism_counts(n: usize) -> (usize, usize) {
    if n < 3 {
        return (0, 0);
    }
    (2 * n, 2 * (n - 2) + 2 * n)
}

/// Emit one building. The ring must be counter-clockwise in mesh space;
/// caps are fan-triangulated from vertex 0, so strongly concave footprints
/// can self-intersect. Returns false and emits nothing for fewer than three
/// vertices.
pub fn emit_building(mesh: &mut MeshBuffer, building: &ProjectedBuilding) -> bool {
    let ring = &building.mesh_ring;
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let top_z = building.top_z();
    let bottom_z = building.bottom_z();

    // Walls reuse the cap vertices: top layer first, then bottom
    let first = mesh.vertex_count();
    for [x, y] in ring {
        mesh.push_vertex(*x, *y, top_z);
    }
    for [x, y] in ring {
        mesh.push_vertex(*x, *y, bottom_z);
    }
    let top = |i: usize| first + i;
    let bottom = |i: usize| first + n + i;

    for i in 2..n {
        mesh.push_triangle(top(0), top(i - 1), top(i));
    }
    for i in 2..n {
        mesh.push_triangle(bottom(0), bottom(i), bottom(i - 1));
    }

    for i in 0..n {
        let next = (i + 1) % n;
        mesh.push_triangle(bottom(i), bottom(next), top(next));
        mesh.push_triangle(bottom(i), top(next), top(i));
    }
    true
}
