//! Clipping of lines and rings against a tile's bounding box
//!
//! Geometry is clipped to the tile before tessellation so neighbouring
//! tiles meet exactly on their shared edge.

use super::quadkey::BoundingBox;
use super::types::{Geometry, Point};

/// Liang-Barsky clip of one segment, `None` when it misses the box
pub fn clip_segment(a: Point, b: Point, bbox: &BoundingBox) -> Option<(Point, Point)> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    let checks = [
        (-dx, a.x - bbox.min_lon),
        (dx, bbox.max_lon - a.x),
        (-dy, a.y - bbox.min_lat),
        (dy, bbox.max_lat - a.y),
    ];

    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    // uncut ends are returned as-is so consecutive segments still chain
    let start = if t0 == 0.0 { a } else { Point::new(a.x + t0 * dx, a.y + t0 * dy) };
    let end = if t1 == 1.0 { b } else { Point::new(a.x + t1 * dx, a.y + t1 * dy) };
    Some((start, end))
}

/// Clip a polyline into the pieces that lie inside the box
pub fn clip_line(points: &[Point], bbox: &BoundingBox) -> Vec<Vec<Point>> {
    let mut pieces: Vec<Vec<Point>> = Vec::new();
    let mut current: Vec<Point> = Vec::new();

    for w in points.windows(2) {
        match clip_segment(w[0], w[1], bbox) {
            Some((start, end)) => {
                if current.last() != Some(&start) {
                    if current.len() >= 2 {
                        pieces.push(std::mem::take(&mut current));
                    }
                    current.clear();
                    current.push(start);
                }
                if start != end {
                    current.push(end);
                }
            }
            None => {
                if current.len() >= 2 {
                    pieces.push(std::mem::take(&mut current));
                }
                current.clear();
            }
        }
    }
    if current.len() >= 2 {
        pieces.push(current);
    }
    pieces
}

/// Sutherland-Hodgman clip of a ring against the (convex) box
pub fn clip_ring(ring: &[Point], bbox: &BoundingBox) -> Vec<Point> {
    #[derive(Clone, Copy)]
    enum Edge {
        Left,
        Right,
        Bottom,
        Top,
    }

    let inside = |p: &Point, edge: Edge| match edge {
        Edge::Left => p.x >= bbox.min_lon,
        Edge::Right => p.x <= bbox.max_lon,
        Edge::Bottom => p.y >= bbox.min_lat,
        Edge::Top => p.y <= bbox.max_lat,
    };

    let intersect = |a: &Point, b: &Point, edge: Edge| -> Point {
        match edge {
            Edge::Left | Edge::Right => {
                let x = if matches!(edge, Edge::Left) { bbox.min_lon } else { bbox.max_lon };
                let t = (x - a.x) / (b.x - a.x);
                Point::new(x, a.y + t * (b.y - a.y))
            }
            Edge::Bottom | Edge::Top => {
                let y = if matches!(edge, Edge::Bottom) { bbox.min_lat } else { bbox.max_lat };
                let t = (y - a.y) / (b.y - a.y);
                Point::new(a.x + t * (b.x - a.x), y)
            }
        }
    };

    let mut output = ring.to_vec();
    for edge in [Edge::Left, Edge::Right, Edge::Bottom, Edge::Top] {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        let mut prev = input[input.len() - 1];
        for current in input {
            let cur_in = inside(&current, edge);
            let prev_in = inside(&prev, edge);
            if cur_in {
                if !prev_in {
                    output.push(intersect(&prev, &current, edge));
                }
                output.push(current);
            } else if prev_in {
                output.push(intersect(&prev, &current, edge));
            }
            prev = current;
        }
    }

    output.dedup();
    if output.len() > 1 && output.first() == output.last() {
        output.pop();
    }
    output
}

/// Clip any geometry to the box; empty when nothing remains
///
/// A line leaving and re-entering the box yields one geometry per piece.
pub fn clip_geometry(geometry: &Geometry, bbox: &BoundingBox) -> Vec<Geometry> {
    match geometry {
        Geometry::Point(p) => {
            if bbox.contains(p) {
                vec![Geometry::Point(*p)]
            } else {
                Vec::new()
            }
        }
        Geometry::Line(points) => clip_line(points, bbox).into_iter().map(Geometry::Line).collect(),
        Geometry::Polygon { outer, holes } => {
            let outer = clip_ring(outer, bbox);
            if outer.len() < 3 {
                return Vec::new();
            }
            let holes = holes
                .iter()
                .map(|h| clip_ring(h, bbox))
                .filter(|h| h.len() >= 3)
                .collect();
            vec![Geometry::Polygon { outer, holes }]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::types::signed_area;

    fn unit_box() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 1.0, 1.0)
    }

    #[test]
    fn test_clip_segment_crossing() {
        let (a, b) = clip_segment(Point::new(-1.0, 0.5), Point::new(2.0, 0.5), &unit_box()).unwrap();
        assert_eq!(a, Point::new(0.0, 0.5));
        assert_eq!(b, Point::new(1.0, 0.5));
    }

    #[test]
    fn test_clip_segment_outside() {
        assert!(clip_segment(Point::new(-1.0, 2.0), Point::new(2.0, 2.0), &unit_box()).is_none());
    }

    #[test]
    fn test_clip_line_splits_into_pieces() {
        // Leaves the box through the top and comes back in
        let line = vec![
            Point::new(0.2, 0.5),
            Point::new(0.4, 1.5),
            Point::new(0.6, 1.5),
            Point::new(0.8, 0.5),
        ];
        let pieces = clip_line(&line, &unit_box());
        assert_eq!(pieces.len(), 2);
        assert!(pieces.iter().all(|p| p.len() >= 2));
    }

    #[test]
    fn test_clip_ring_to_quadrant() {
        let ring = vec![
            Point::new(-1.0, -1.0),
            Point::new(0.5, -1.0),
            Point::new(0.5, 0.5),
            Point::new(-1.0, 0.5),
        ];
        let clipped = clip_ring(&ring, &unit_box());
        assert!((signed_area(&clipped) - 0.25).abs() < 1e-12);
        assert!(clipped.iter().all(|p| unit_box().contains(p)));
    }

    #[test]
    fn test_clip_ring_outside() {
        let ring = vec![Point::new(2.0, 2.0), Point::new(3.0, 2.0), Point::new(3.0, 3.0)];
        assert!(clip_ring(&ring, &unit_box()).is_empty());
    }
}
