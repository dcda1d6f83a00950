//! Named builders turning styled records into discrete elements
//!
//! # Submodules
//! - `builders` - Built-in `place` and pass-through builders
//! - `registry` - Name-keyed builder lookup shared across extractions

mod builders;
mod registry;

pub use builders::{GenericBuilder, PlaceBuilder};
pub use registry::ElementBuilderRegistry;

use crate::elevation::ElevationProvider;
use crate::error::ElementError;
use crate::geo::{GeometryRecord, Point, QuadKey, TagSet};
use crate::style::AttributeSet;

/// Non-tessellated output such as a place marker
///
/// `vertices` holds (lon, lat, elevation) triples; `style` holds
/// `key=value` tokens starting with the builder name.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: u64,
    pub tags: TagSet,
    pub vertices: Vec<f64>,
    pub style: Vec<String>,
}

impl Element {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }
}

/// Per-call inputs a builder may need besides the record and its style
pub struct BuildContext<'a> {
    /// Store id of the record, synthetic when the source had none
    pub record_id: u64,
    pub quadkey: QuadKey,
    pub elevation: &'a dyn ElevationProvider,
}

impl BuildContext<'_> {
    /// Sampled height, flat where the provider has no data
    pub fn elevation_at(&self, lon: f64, lat: f64) -> f64 {
        self.elevation.sample(lon, lat).unwrap_or(0.0)
    }

    /// Whether the tile being built is the one that owns `point`
    ///
    /// Every coordinate has exactly one owning tile per LOD, so a point on a
    /// shared tile edge is emitted once.
    pub fn owns(&self, point: &Point) -> bool {
        QuadKey::from_coordinate(point.x, point.y, self.quadkey.lod).is_ok_and(|q| q == self.quadkey)
    }
}

/// Turns a styled record into an element for one tile
///
/// A record spanning several tiles is offered to each of them; `Ok(None)`
/// means it contributes nothing to this one.
pub trait ElementBuilder: Send + Sync {
    fn build(
        &self,
        record: &GeometryRecord,
        style: &AttributeSet,
        ctx: &BuildContext<'_>,
    ) -> Result<Option<Element>, ElementError>;
}
