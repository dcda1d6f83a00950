//! Geographic primitives
//!
//! # Submodules
//! - `quadkey` - Tile coordinates, LOD ranges and bounding boxes
//! - `types` - Geometry records, tags and intersection tests
//! - `clip` - Clipping geometry to a tile footprint

mod clip;
mod quadkey;
mod types;

pub use quadkey::{BoundingBox, LodRange, QuadKey, MAX_LAT, MAX_LOD, MIN_LAT};

pub use types::{
    point_in_ring,
    signed_area,
    Geometry,
    GeometryKind,
    GeometryRecord,
    Point,
    Tag,
    TagSet,
};

pub use clip::{clip_geometry, clip_line, clip_ring, clip_segment};

pub(crate) use types::distinct_vertices;
