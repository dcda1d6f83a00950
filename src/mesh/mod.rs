//! Tessellation of styled geometry into colored triangle meshes
//!
//! # Submodules
//! - `builder` - Per-tile mesh construction from a record and its style
//! - `polygon` - Polygon triangulation using earcut
//! - `polyline` - Polyline stroking with caps and round joins
//! - `shapes` - Circles for point features
//! - `simplify` - Douglas-Peucker ring simplification
//! - `frame` - Local metric plane for widths given in metres

mod builder;
mod frame;
mod polygon;
mod polyline;
mod shapes;
mod simplify;

pub use builder::MeshBuilder;
pub use frame::LocalFrame;
pub use polygon::tessellate_polygon;
pub use polyline::{tessellate_polyline, LineCap};
pub use shapes::tessellate_circle;
pub use simplify::{douglas_peucker, simplify_ring};

/// Triangulated surface ready for a renderer
///
/// `vertices` holds (lon, lat, elevation) triples, `triangles` holds
/// counter-clockwise index triples and `colors` one `0xRRGGBBAA` per vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<f64>,
    pub triangles: Vec<u32>,
    pub colors: Vec<u32>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }

    pub fn color_count(&self) -> usize {
        self.colors.len()
    }
}
