//! Polygon triangulation using earcut

use crate::geo::Point;

/// Triangulate an outer ring with optional holes
/// Returns (vertices, indices); indices are counter-clockwise
pub fn tessellate_polygon(outer: &[Point], holes: &[Vec<Point>]) -> (Vec<Point>, Vec<u32>) {
    let mut vertices: Vec<Point> = outer.to_vec();
    let mut hole_indices: Vec<usize> = Vec::new();

    for hole in holes {
        if hole.len() < 3 {
            continue;
        }
        hole_indices.push(vertices.len());
        vertices.extend_from_slice(hole);
    }

    let flat_coords: Vec<f64> = vertices.iter().flat_map(|p| [p.x, p.y]).collect();
    let indices = earcutr::earcut(&flat_coords, &hole_indices, 2).unwrap_or_default();
    let mut indices: Vec<u32> = indices.into_iter().map(|i| i as u32).collect();
    orient_ccw(&vertices, &mut indices);

    (vertices, indices)
}

/// Flip any clockwise triangle in place
pub fn orient_ccw(vertices: &[Point], indices: &mut [u32]) {
    for tri in indices.chunks_exact_mut(3) {
        let (a, b, c) = (
            vertices[tri[0] as usize],
            vertices[tri[1] as usize],
            vertices[tri[2] as usize],
        );
        if (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x) < 0.0 {
            tri.swap(1, 2);
        }
    }
}

#[cfg(test)]
pub(crate) fn is_ccw(vertices: &[Point], indices: &[u32]) -> bool {
    indices.chunks_exact(3).all(|tri| {
        let (a, b, c) = (
            vertices[tri[0] as usize],
            vertices[tri[1] as usize],
            vertices[tri[2] as usize],
        );
        (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x) >= 0.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(coords: &[(f64, f64)]) -> Vec<Point> {
        coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_square_two_triangles() {
        // clockwise input still yields counter-clockwise output
        let square = ring(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]);
        let (vertices, indices) = tessellate_polygon(&square, &[]);
        assert_eq!(vertices.len(), 4);
        assert_eq!(indices.len(), 6);
        assert!(is_ccw(&vertices, &indices));
    }

    #[test]
    fn test_concave_polygon_with_hole() {
        let outer = ring(&[(0.0, 0.0), (6.0, 0.0), (6.0, 6.0), (3.0, 3.0), (0.0, 6.0)]);
        let hole = ring(&[(2.0, 1.0), (4.0, 1.0), (4.0, 2.0), (2.0, 2.0)]);
        let (vertices, indices) = tessellate_polygon(&outer, &[hole]);
        assert_eq!(vertices.len(), 9);
        assert!(indices.len() >= 3 * 7);
        assert!(is_ccw(&vertices, &indices));
    }
}
