//! Standard shape tessellation

use crate::geo::Point;
use std::f64::consts::PI;

/// Tessellate a circle into a counter-clockwise triangle fan
pub fn tessellate_circle(center: Point, radius: f64, segments: u32) -> (Vec<Point>, Vec<u32>) {
    let segments = segments.max(8);
    let mut vertices = vec![center];
    let mut indices = Vec::with_capacity(segments as usize * 3);

    for i in 0..segments {
        let angle = (i as f64 / segments as f64) * 2.0 * PI;
        vertices.push(Point::new(
            center.x + angle.cos() * radius,
            center.y + angle.sin() * radius,
        ));
    }

    for i in 0..segments {
        indices.push(0);
        indices.push(i + 1);
        indices.push((i + 1) % segments + 1);
    }

    (vertices, indices)
}
