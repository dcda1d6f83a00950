//! Style-driven mesh construction for one tile

use super::frame::LocalFrame;
use super::polygon::tessellate_polygon;
use super::polyline::{tessellate_polyline, LineCap};
use super::shapes::tessellate_circle;
use super::simplify::simplify_ring;
use super::Mesh;
use crate::elevation::ElevationProvider;
use crate::error::{MeshError, StyleError};
use crate::geo::{
    clip_geometry, clip_line, distinct_vertices, signed_area, BoundingBox, Geometry, GeometryRecord, Point,
    QuadKey,
};
use crate::style::{pack_color, AttributeSet};

/// Rings at or below this area (square degrees) carry no surface
const MIN_RING_AREA: f64 = 1e-20;

/// Ring simplification tolerance as a fraction of the tile width
const SIMPLIFY_DIVISOR: f64 = 2048.0;

const CIRCLE_SEGMENTS: u32 = 24;

const DEFAULT_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

/// Mesh-relevant properties resolved from an attribute set
#[derive(Debug, Clone)]
struct MeshStyle {
    name: String,
    fill: u32,
    stroke: u32,
    stroke_width: f64,
    width: f64,
    cap: LineCap,
    radius: f64,
    relief: bool,
    height: f64,
    ele_offset: f64,
}

impl MeshStyle {
    fn resolve(attrs: &AttributeSet, default_name: &str) -> Result<Self, StyleError> {
        let fill = match attrs.get_color("fill-color")? {
            Some(c) => c,
            None => attrs.get_color("color")?.unwrap_or(DEFAULT_COLOR),
        };
        let stroke = attrs.get_color("stroke-color")?.unwrap_or(fill);

        let positive = |key: &str, default: f64| -> Result<f64, StyleError> {
            match attrs.get_f64(key)? {
                Some(v) if v <= 0.0 => Err(StyleError::InvalidValue {
                    key: key.to_string(),
                    value: v.to_string(),
                }),
                Some(v) => Ok(v),
                None => Ok(default),
            }
        };

        let cap = match attrs.get("line-cap") {
            Some(v) => LineCap::parse(v).ok_or_else(|| StyleError::InvalidValue {
                key: "line-cap".to_string(),
                value: v.to_string(),
            })?,
            None => LineCap::default(),
        };

        Ok(Self {
            name: attrs.get("mesh-name").unwrap_or(default_name).to_string(),
            fill: pack_color(fill),
            stroke: pack_color(stroke),
            stroke_width: attrs.get_f64("stroke-width")?.unwrap_or(0.0).max(0.0),
            width: positive("width", 1.0)?,
            cap,
            radius: positive("radius", 5.0)?,
            relief: attrs.get_bool("relief")?.unwrap_or(false),
            height: attrs.get_f64("height")?.unwrap_or(0.0),
            ele_offset: attrs.get_f64("ele-offset")?.unwrap_or(0.0),
        })
    }
}

/// Triangles accumulated from several tessellation passes
#[derive(Default)]
struct TriangleBatch {
    vertices: Vec<Point>,
    triangles: Vec<u32>,
}

impl TriangleBatch {
    fn append(&mut self, vertices: Vec<Point>, triangles: Vec<u32>) {
        let offset = self.vertices.len() as u32;
        self.vertices.extend(vertices);
        self.triangles.extend(triangles.into_iter().map(|i| i + offset));
    }
}

/// Builds meshes for records visible in one tile
///
/// Geometry is clipped to the tile footprint before tessellation, so fills
/// from neighbouring tiles meet along the shared edge. Strokes are clipped
/// along their centreline and may overhang the edge by half their width.
pub struct MeshBuilder<'a> {
    bbox: BoundingBox,
    frame: LocalFrame,
    elevation: &'a dyn ElevationProvider,
}

impl<'a> MeshBuilder<'a> {
    pub fn new(quadkey: QuadKey, elevation: &'a dyn ElevationProvider) -> Self {
        let bbox = quadkey.bounding_box();
        Self {
            bbox,
            frame: LocalFrame::new(bbox.center()),
            elevation,
        }
    }

    /// Tessellate `record` with the resolved `style`
    ///
    /// Returns no meshes when nothing of the record survives clipping.
    pub fn build(&self, record: &GeometryRecord, style: &AttributeSet) -> Result<Vec<Mesh>, MeshError> {
        let style = MeshStyle::resolve(style, record.kind().as_str())?;
        match &record.geometry {
            Geometry::Polygon { outer, holes } => {
                if distinct_vertices(outer) < 3 || signed_area(outer).abs() <= MIN_RING_AREA {
                    return Err(MeshError::Degenerate {
                        reason: "polygon has no area".to_string(),
                    });
                }
                let mut meshes = self.fill_polygon(&record.geometry, &style)?;
                if style.stroke_width > 0.0 {
                    let rings = std::iter::once(outer).chain(holes.iter());
                    let outline = self.stroke(rings.map(|r| closed(r)), style.stroke_width, LineCap::Butt);
                    if !outline.triangles.is_empty() {
                        meshes.push(self.assemble(format!("{}:outline", style.name), outline, style.stroke, &style));
                    }
                }
                Ok(meshes)
            }
            Geometry::Line(points) => {
                if distinct_vertices(points) < 2 {
                    return Err(MeshError::Degenerate {
                        reason: "line has a single distinct vertex".to_string(),
                    });
                }
                let batch = self.stroke(std::iter::once(points.clone()), style.width, style.cap);
                if batch.triangles.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![self.assemble(style.name.clone(), batch, style.fill, &style)])
            }
            Geometry::Point(p) => {
                if !self.bbox.contains(p) {
                    return Ok(Vec::new());
                }
                let (local, triangles) =
                    tessellate_circle(self.frame.to_local(*p), style.radius, CIRCLE_SEGMENTS);
                let mut batch = TriangleBatch::default();
                batch.append(local.into_iter().map(|v| self.frame.to_geo(v)).collect(), triangles);
                Ok(vec![self.assemble(style.name.clone(), batch, style.fill, &style)])
            }
        }
    }

    fn fill_polygon(&self, geometry: &Geometry, style: &MeshStyle) -> Result<Vec<Mesh>, MeshError> {
        let tolerance = self.bbox.width() / SIMPLIFY_DIVISOR;
        let mut meshes = Vec::new();
        for piece in clip_geometry(geometry, &self.bbox) {
            let Geometry::Polygon { outer, holes } = piece else {
                continue;
            };
            let outer = simplify_ring(&outer, tolerance);
            if signed_area(&outer).abs() <= MIN_RING_AREA {
                continue;
            }
            let holes: Vec<Vec<Point>> = holes
                .iter()
                .map(|h| simplify_ring(h, tolerance))
                .filter(|h| signed_area(h).abs() > MIN_RING_AREA)
                .collect();

            let (vertices, triangles) = tessellate_polygon(&outer, &holes);
            if triangles.is_empty() {
                return Err(MeshError::EmptyTriangulation);
            }
            let mut batch = TriangleBatch::default();
            batch.append(vertices, triangles);
            meshes.push(self.assemble(style.name.clone(), batch, style.fill, style));
        }
        Ok(meshes)
    }

    /// Clip each line to the tile and stroke it in the local plane
    fn stroke(&self, lines: impl Iterator<Item = Vec<Point>>, width: f64, cap: LineCap) -> TriangleBatch {
        let mut batch = TriangleBatch::default();
        for line in lines {
            for piece in clip_line(&line, &self.bbox) {
                let local: Vec<Point> = piece.iter().map(|p| self.frame.to_local(*p)).collect();
                let (vertices, triangles) = tessellate_polyline(&local, width, cap);
                batch.append(vertices.into_iter().map(|v| self.frame.to_geo(v)).collect(), triangles);
            }
        }
        batch
    }

    fn assemble(&self, name: String, batch: TriangleBatch, color: u32, style: &MeshStyle) -> Mesh {
        let mut vertices = Vec::with_capacity(batch.vertices.len() * 3);
        for p in &batch.vertices {
            vertices.extend_from_slice(&[p.x, p.y, self.elevation_at(p, style)]);
        }
        Mesh {
            name,
            colors: vec![color; batch.vertices.len()],
            vertices,
            triangles: batch.triangles,
        }
    }

    fn elevation_at(&self, p: &Point, style: &MeshStyle) -> f64 {
        let base = if style.relief {
            self.elevation.sample(p.x, p.y).unwrap_or(style.height)
        } else {
            style.height
        };
        base + style.ele_offset
    }
}

fn closed(ring: &[Point]) -> Vec<Point> {
    let mut ring = ring.to_vec();
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::FlatElevation;
    use crate::geo::TagSet;
    use crate::mesh::polygon::is_ccw;

    struct FixedElevation(f64);

    impl ElevationProvider for FixedElevation {
        fn sample(&self, _lon: f64, _lat: f64) -> Option<f64> {
            Some(self.0)
        }
    }

    fn attrs(pairs: &[(&str, &str)]) -> AttributeSet {
        let mut set = AttributeSet::new();
        for (k, v) in pairs {
            set.set(*k, *v);
        }
        set
    }

    fn record(geometry: Geometry) -> GeometryRecord {
        GeometryRecord::new(Some(1), TagSet::new(), geometry)
    }

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Geometry {
        Geometry::polygon(
            vec![
                Point::new(min_x, min_y),
                Point::new(max_x, min_y),
                Point::new(max_x, max_y),
                Point::new(min_x, max_y),
            ],
            vec![],
        )
    }

    fn points(mesh: &Mesh) -> Vec<Point> {
        mesh.vertices.chunks_exact(3).map(|v| Point::new(v[0], v[1])).collect()
    }

    fn tile() -> QuadKey {
        QuadKey::new(1, 1, 1).unwrap()
    }

    #[test]
    fn test_polygon_clipped_to_tile() {
        // spans all four lod-1 quadrants
        let polygon = record(rect(-90.0, -45.0, 90.0, 45.0));
        let builder = MeshBuilder::new(tile(), &FlatElevation);
        let meshes = builder
            .build(&polygon, &attrs(&[("fill-color", "#ff0000"), ("mesh-name", "land")]))
            .unwrap();

        assert_eq!(meshes.len(), 1);
        let mesh = &meshes[0];
        assert_eq!(mesh.name, "land");
        assert!(mesh.triangle_count() > 0);
        assert_eq!(mesh.color_count(), mesh.vertex_count());
        assert!(mesh.colors.iter().all(|&c| c == 0xFF0000FF));

        let bbox = tile().bounding_box();
        let verts = points(mesh);
        assert!(verts.iter().all(|p| p.x >= bbox.min_lon - 1e-9 && p.x <= 90.0 + 1e-9));
        assert!(verts.iter().all(|p| p.y <= 1e-9 && p.y >= -45.0 - 1e-9));
        assert!(is_ccw(&verts, &mesh.triangles));
    }

    #[test]
    fn test_polygon_outside_tile_yields_nothing() {
        let polygon = record(rect(-90.0, 10.0, -80.0, 20.0));
        let meshes = MeshBuilder::new(tile(), &FlatElevation)
            .build(&polygon, &AttributeSet::new())
            .unwrap();
        assert!(meshes.is_empty());
    }

    #[test]
    fn test_outline_mesh_and_default_color() {
        let polygon = record(rect(10.0, -20.0, 20.0, -10.0));
        let meshes = MeshBuilder::new(tile(), &FlatElevation)
            .build(&polygon, &attrs(&[("stroke-width", "500"), ("stroke-color", "black")]))
            .unwrap();
        assert_eq!(meshes.len(), 2);
        assert_eq!(meshes[0].name, "area");
        assert_eq!(meshes[0].colors[0], 0x808080FF);
        assert_eq!(meshes[1].name, "area:outline");
        assert_eq!(meshes[1].colors[0], 0x000000FF);
        assert!(meshes[1].triangle_count() > 0);
    }

    #[test]
    fn test_line_stroke_width_in_metres() {
        let line = record(Geometry::Line(vec![Point::new(10.0, -10.0), Point::new(10.1, -10.0)]));
        let meshes = MeshBuilder::new(tile(), &FlatElevation)
            .build(&line, &attrs(&[("width", "100"), ("color", "blue")]))
            .unwrap();
        assert_eq!(meshes.len(), 1);
        let verts = points(&meshes[0]);
        let span = verts.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max)
            - verts.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        // 100 m is about 0.0009 degrees of latitude
        assert!((span - 100.0 / 111_319.49).abs() < 1e-6);
        assert!(meshes[0].colors.iter().all(|&c| c == 0x0000FFFF));
    }

    #[test]
    fn test_point_becomes_disc() {
        let point = record(Geometry::Point(Point::new(45.0, -45.0)));
        let meshes = MeshBuilder::new(tile(), &FlatElevation).build(&point, &AttributeSet::new()).unwrap();
        assert_eq!(meshes[0].name, "point");
        assert_eq!(meshes[0].vertex_count(), CIRCLE_SEGMENTS as usize + 1);
        assert_eq!(meshes[0].triangle_count(), CIRCLE_SEGMENTS as usize);
    }

    #[test]
    fn test_relief_samples_elevation() {
        let polygon = record(rect(10.0, -20.0, 20.0, -10.0));
        let style = attrs(&[("relief", "true"), ("ele-offset", "2")]);

        let meshes = MeshBuilder::new(tile(), &FixedElevation(120.0)).build(&polygon, &style).unwrap();
        assert!(meshes[0].vertices.chunks_exact(3).all(|v| v[2] == 122.0));

        // no data degrades to the base height
        let style = attrs(&[("relief", "true"), ("height", "5")]);
        let meshes = MeshBuilder::new(tile(), &FlatElevation).build(&polygon, &style).unwrap();
        assert!(meshes[0].vertices.chunks_exact(3).all(|v| v[2] == 5.0));
    }

    #[test]
    fn test_degenerate_and_invalid_input() {
        let builder = MeshBuilder::new(tile(), &FlatElevation);
        let flat = record(Geometry::polygon(
            vec![Point::new(10.0, -10.0), Point::new(11.0, -10.0), Point::new(12.0, -10.0)],
            vec![],
        ));
        assert!(matches!(
            builder.build(&flat, &AttributeSet::new()),
            Err(MeshError::Degenerate { .. })
        ));

        let line = record(Geometry::Line(vec![Point::new(10.0, -10.0), Point::new(11.0, -10.0)]));
        assert!(matches!(
            builder.build(&line, &attrs(&[("width", "-1")])),
            Err(MeshError::Style(StyleError::InvalidValue { .. }))
        ));
        assert!(matches!(
            builder.build(&line, &attrs(&[("fill-color", "not-a-color")])),
            Err(MeshError::Style(_))
        ));
    }
}
