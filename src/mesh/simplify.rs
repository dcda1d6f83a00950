//! Douglas-Peucker simplification of lines and rings

use crate::geo::Point;

/// Douglas-Peucker polyline simplification
/// Reduces number of points while keeping every dropped point within `tolerance`
pub fn douglas_peucker(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let last = points.len() - 1;
    let mut dmax = 0.0;
    let mut index = 0;
    for i in 1..last {
        let d = point_segment_distance(points[i], points[0], points[last]);
        if d > dmax {
            dmax = d;
            index = i;
        }
    }

    if dmax > tolerance {
        let mut left = douglas_peucker(&points[0..=index], tolerance);
        let right = douglas_peucker(&points[index..], tolerance);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![points[0], points[last]]
    }
}

/// Simplify an open ring, falling back to the input when fewer than three
/// vertices would survive
pub fn simplify_ring(ring: &[Point], tolerance: f64) -> Vec<Point> {
    if tolerance <= 0.0 || ring.len() < 4 {
        return ring.to_vec();
    }
    // run on the closed ring so the seam vertex can be dropped too
    let mut closed = ring.to_vec();
    closed.push(ring[0]);
    let mut simplified = douglas_peucker(&closed, tolerance);
    simplified.pop();
    if simplified.len() >= 3 {
        simplified
    } else {
        ring.to_vec()
    }
}

fn point_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;

    if len_sq < 1e-24 {
        return ((p.x - a.x).powi(2) + (p.y - a.y).powi(2)).sqrt();
    }

    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    let proj_x = a.x + t * dx;
    let proj_y = a.y + t * dy;
    ((p.x - proj_x).powi(2) + (p.y - proj_y).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_douglas_peucker_drops_near_points() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.1),
            Point::new(2.0, 0.0),
            Point::new(3.0, 1.0),
            Point::new(4.0, 0.0),
        ];
        let simplified = douglas_peucker(&points, 0.5);
        assert_eq!(simplified, vec![points[0], points[2], points[3], points[4]]);
    }

    #[test]
    fn test_simplify_ring_drops_collinear_vertices() {
        let ring = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 2.0),
            Point::new(0.0, 2.0),
        ];
        assert_eq!(simplify_ring(&ring, 0.01).len(), 4);
    }

    #[test]
    fn test_simplify_ring_never_collapses() {
        let sliver = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1e-6),
            Point::new(0.0, 1e-6),
        ];
        assert_eq!(simplify_ring(&sliver, 0.1), sliver);
    }
}
