//! Quadkey-indexed map data store and style-driven tile extraction
//!
//! Source files are parsed into geometry records, indexed per level of
//! detail, and turned into colored triangle meshes and styled elements one
//! tile at a time.
//!
//! # Module Structure
//! - `geo` - Quadkeys, bounding boxes, geometry records and clipping
//! - `formats` - OSM XML, shapefile and GeoJSON readers
//! - `store` - String dictionary and the multi-LOD spatial store
//! - `style` - MapCSS-subset stylesheets and the rule cascade
//! - `elevation` - Elevation providers (flat, SRTM)
//! - `mesh` - Tessellation of styled geometry
//! - `element` - Element builders and their registry
//! - `extract` - Per-tile extraction pipeline
//! - `context` - `MapContext`, the configured entry point
//! - `server` - JSON-RPC front end used by the `map_server` binary

pub mod config;
pub mod context;
pub mod element;
pub mod elevation;
pub mod error;
pub mod extract;
pub mod formats;
pub mod geo;
pub mod logging;
pub mod mesh;
pub mod server;
pub mod store;
pub mod style;

pub use config::Config;
pub use context::{IngestSummary, LoadedTile, MapContext};
pub use element::{BuildContext, Element, ElementBuilder, ElementBuilderRegistry, GenericBuilder, PlaceBuilder};
pub use elevation::{ElevationProvider, FlatElevation, SrtmElevation};
pub use error::{
    ConfigError, ElementError, ExtractionError, IngestError, MapError, MeshError, ParseError, QuadKeyError,
    StyleError,
};
pub use extract::{
    Artifact, ArtifactSink, CallbackSink, CollectingSink, ExtractionStage, ExtractionSummary, TileArtifacts,
    TileExtractor,
};
pub use geo::{BoundingBox, Geometry, GeometryKind, GeometryRecord, LodRange, Point, QuadKey, TagSet, MAX_LOD};
pub use mesh::{Mesh, MeshBuilder};
pub use store::QuadKeyStore;
pub use style::{AttributeSet, Directive, StyleEngine, StyleMatch};
