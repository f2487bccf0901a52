// Footprint / request-area overlap test
use geo::Intersects;
use geo_types::{coord, LineString, Polygon, Rect};

use crate::models::GeoBoundingBox;

fn bbox_rect(bbox: &GeoBoundingBox) -> Rect<f64> {
    Rect::new(
        coord! { x: bbox.min_lng, y: bbox.min_lat },
        coord! { x: bbox.max_lng, y: bbox.max_lat },
    )
}

/// True when the ring touches the bbox: a vertex inside, an edge crossing a
/// bbox edge, or the bbox lying inside the ring.
pub fn ring_intersects_bbox(ring: &[[f64; 2]], bbox: &GeoBoundingBox) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let rect = bbox_rect(bbox);

    // Cheap envelope rejection before the exact test
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for [x, y] in ring {
        min_x = min_x.min(*x);
        min_y = min_y.min(*y);
        max_x = max_x.max(*x);
        max_y = max_y.max(*y);
    }
    if max_x < bbox.min_lng || min_x > bbox.max_lng || max_y < bbox.min_lat || min_y > bbox.max_lat {
        return false;
    }

    let exterior: LineString<f64> = ring.iter().map(|[x, y]| coord! { x: *x, y: *y }).collect();
    Polygon::new(exterior, vec![]).intersects(&rect)
}
