//! Tile extraction: store query, style matching and artifact dispatch
//!
//! # Submodules
//! - `sink` - Callback-style consumers of the artifact stream
//!
//! A request is validated eagerly; everything after that happens lazily as
//! the returned `TileArtifacts` is advanced, one artifact at a time.

mod sink;

pub use sink::{ArtifactSink, CallbackSink, CollectingSink, ExtractionSummary};

use crate::element::{BuildContext, Element, ElementBuilderRegistry};
use crate::elevation::ElevationProvider;
use crate::error::ExtractionError;
use crate::geo::QuadKey;
use crate::mesh::{Mesh, MeshBuilder};
use crate::store::{QuadKeyStore, StoredRecord};
use crate::style::{Directive, StyleEngine, StyleMatch};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// One renderable output of a tile request
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Mesh(Mesh),
    Element(Element),
}

/// Where a tile request currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    /// Quadkey validated, store not queried yet
    Start,
    /// Records retrieved, none matched yet
    Query,
    /// Style rules evaluated for the current record
    MatchStyle,
    /// Artifacts of the current record being handed out
    Dispatch,
    Complete,
}

/// Everything a tile request reads from
pub struct TileExtractor<'a> {
    store: &'a QuadKeyStore,
    style: Arc<StyleEngine>,
    registry: &'a ElementBuilderRegistry,
    elevation: &'a dyn ElevationProvider,
}

impl<'a> TileExtractor<'a> {
    pub fn new(
        store: &'a QuadKeyStore,
        style: Arc<StyleEngine>,
        registry: &'a ElementBuilderRegistry,
        elevation: &'a dyn ElevationProvider,
    ) -> Self {
        Self {
            store,
            style,
            registry,
            elevation,
        }
    }

    /// Start a request for `quadkey`
    ///
    /// Only an invalid quadkey fails here. Calling again for the same tile
    /// produces the same sequence afresh.
    pub fn extract(&self, quadkey: QuadKey) -> Result<TileArtifacts<'a>, ExtractionError> {
        let quadkey = QuadKey::new(quadkey.x, quadkey.y, quadkey.lod)?;
        Ok(TileArtifacts {
            quadkey,
            stage: ExtractionStage::Start,
            store: self.store,
            style: self.style.clone(),
            registry: self.registry,
            elevation: self.elevation,
            meshes: MeshBuilder::new(quadkey, self.elevation),
            records: Vec::new().into_iter(),
            current: None,
            matches: VecDeque::new(),
            pending: VecDeque::new(),
            summary: ExtractionSummary::default(),
            started: Instant::now(),
        })
    }

    /// Convenience for `extract` with raw coordinates
    pub fn extract_at(&self, x: u32, y: u32, lod: u8) -> Result<TileArtifacts<'a>, ExtractionError> {
        self.extract(QuadKey::new(x, y, lod)?)
    }
}

/// Lazy artifact stream of one tile request
///
/// Items are `Err` for per-record failures only; the stream keeps going
/// after them.
pub struct TileArtifacts<'a> {
    quadkey: QuadKey,
    stage: ExtractionStage,
    store: &'a QuadKeyStore,
    style: Arc<StyleEngine>,
    registry: &'a ElementBuilderRegistry,
    elevation: &'a dyn ElevationProvider,
    meshes: MeshBuilder<'a>,
    records: std::vec::IntoIter<Arc<StoredRecord>>,
    current: Option<Arc<StoredRecord>>,
    matches: VecDeque<StyleMatch>,
    pending: VecDeque<Mesh>,
    summary: ExtractionSummary,
    started: Instant,
}

impl TileArtifacts<'_> {
    pub fn quadkey(&self) -> QuadKey {
        self.quadkey
    }

    pub fn stage(&self) -> ExtractionStage {
        self.stage
    }

    /// Feed every remaining artifact to `sink`
    pub fn drain_into(mut self, sink: &mut dyn ArtifactSink) -> ExtractionSummary {
        let mut summary = ExtractionSummary::default();
        for item in self.by_ref() {
            match item {
                Ok(Artifact::Mesh(mesh)) => {
                    summary.meshes += 1;
                    sink.on_mesh(mesh);
                }
                Ok(Artifact::Element(element)) => {
                    summary.elements += 1;
                    sink.on_element(element);
                }
                Err(e) => {
                    summary.errors += 1;
                    sink.on_error(e);
                }
            }
        }
        summary
    }

    fn dispatch(&mut self, record: &StoredRecord, matched: StyleMatch) -> Option<Result<Artifact, ExtractionError>> {
        let id = record.id();
        match matched.directive {
            Directive::AsMesh => match self.meshes.build(&record.record, &matched.attributes) {
                Ok(meshes) => {
                    self.pending.extend(meshes);
                    None
                }
                Err(source) => {
                    warn!(id, quadkey = %self.quadkey, error = %source, "mesh build failed");
                    Some(Err(ExtractionError::Mesh { id, source }))
                }
            },
            Directive::AsElement(name) => {
                let ctx = BuildContext {
                    record_id: id,
                    quadkey: self.quadkey,
                    elevation: self.elevation,
                };
                match self.registry.build(&name, &record.record, &matched.attributes, &ctx) {
                    Ok(element) => element.map(|e| Ok(Artifact::Element(e))),
                    Err(e) => {
                        warn!(id, builder = %name, quadkey = %self.quadkey, error = %e, "element build failed");
                        Some(Err(e))
                    }
                }
            }
        }
    }

    fn count(&mut self, item: &Result<Artifact, ExtractionError>) {
        match item {
            Ok(Artifact::Mesh(_)) => self.summary.meshes += 1,
            Ok(Artifact::Element(_)) => self.summary.elements += 1,
            Err(_) => self.summary.errors += 1,
        }
    }
}

impl Iterator for TileArtifacts<'_> {
    type Item = Result<Artifact, ExtractionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(mesh) = self.pending.pop_front() {
                self.stage = ExtractionStage::Dispatch;
                let item = Ok(Artifact::Mesh(mesh));
                self.count(&item);
                return Some(item);
            }

            match self.stage {
                ExtractionStage::Complete => return None,
                ExtractionStage::Start => {
                    let records = self.store.query(self.quadkey);
                    debug!(quadkey = %self.quadkey, records = records.len(), "tile query");
                    self.records = records.into_iter();
                    self.stage = ExtractionStage::Query;
                    continue;
                }
                _ => {}
            }

            if let Some(matched) = self.matches.pop_front() {
                let Some(record) = self.current.clone() else {
                    self.matches.clear();
                    continue;
                };
                self.stage = ExtractionStage::Dispatch;
                if let Some(item) = self.dispatch(&record, matched) {
                    self.count(&item);
                    return Some(item);
                }
                continue;
            }

            match self.records.next() {
                Some(record) => {
                    self.stage = ExtractionStage::MatchStyle;
                    self.matches = self.style.match_record(&record.record, self.quadkey.lod).into();
                    self.current = Some(record);
                }
                None => {
                    self.stage = ExtractionStage::Complete;
                    self.current = None;
                    debug!(
                        quadkey = %self.quadkey,
                        meshes = self.summary.meshes,
                        elements = self.summary.elements,
                        errors = self.summary.errors,
                        elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0,
                        "tile extraction complete"
                    );
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::FlatElevation;
    use crate::geo::{Geometry, GeometryRecord, LodRange, Point, TagSet};
    use crate::store::StringTable;

    const STYLE: &str = r#"
        area[natural=water] { builder: mesh; fill-color: #0000ff; mesh-name: water; }
        node[place] { builder: place; label-tag: name; }
        node[amenity] { builder: poi; }
    "#;

    fn store() -> QuadKeyStore {
        QuadKeyStore::new(Arc::new(StringTable::in_memory()))
    }

    fn lake() -> GeometryRecord {
        let ring = vec![
            Point::new(10.0, -20.0),
            Point::new(20.0, -20.0),
            Point::new(20.0, -10.0),
            Point::new(10.0, -10.0),
        ];
        let tags: TagSet = [("natural", "water")].into_iter().collect();
        GeometryRecord::new(Some(1), tags, Geometry::polygon(ring, vec![]))
    }

    fn node(id: u64, tags: &[(&str, &str)]) -> GeometryRecord {
        let tags: TagSet = tags.iter().copied().collect();
        GeometryRecord::new(Some(id), tags, Geometry::Point(Point::new(15.0, -15.0)))
    }

    fn registry() -> ElementBuilderRegistry {
        let registry = ElementBuilderRegistry::new();
        registry.register_named("place");
        registry
    }

    fn engine() -> Arc<StyleEngine> {
        Arc::new(StyleEngine::from_source(STYLE).unwrap())
    }

    #[test]
    fn test_meshes_and_elements_in_record_order() {
        let store = store();
        let registry = registry();
        store.insert_range(
            vec![lake(), node(2, &[("place", "town"), ("name", "Lakeside")])],
            LodRange::single(1).unwrap(),
        );

        let extractor = TileExtractor::new(&store, engine(), &registry, &FlatElevation);
        let artifacts: Vec<Artifact> = extractor
            .extract_at(1, 1, 1)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(artifacts.len(), 2);
        match &artifacts[0] {
            Artifact::Mesh(mesh) => {
                assert_eq!(mesh.name, "water");
                assert!(mesh.triangle_count() > 0);
            }
            other => panic!("expected mesh, got {:?}", other),
        }
        match &artifacts[1] {
            Artifact::Element(element) => {
                assert_eq!(element.id, 2);
                assert!(element.style.contains(&"label=Lakeside".to_string()));
            }
            other => panic!("expected element, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_builder_does_not_stop_extraction() {
        let store = store();
        let registry = registry();
        store.insert_range(
            vec![node(1, &[("amenity", "cafe")]), node(2, &[("place", "village")])],
            LodRange::single(1).unwrap(),
        );

        let extractor = TileExtractor::new(&store, engine(), &registry, &FlatElevation);
        let mut sink = CollectingSink::default();
        let summary = extractor.extract_at(1, 1, 1).unwrap().drain_into(&mut sink);

        assert_eq!(summary, ExtractionSummary { meshes: 0, elements: 1, errors: 1 });
        assert!(matches!(sink.errors[0], ExtractionError::BuilderNotFound { ref name } if name == "poi"));
        assert_eq!(sink.elements[0].id, 2);
    }

    #[test]
    fn test_empty_tile_and_stages() {
        let store = store();
        let registry = registry();
        let extractor = TileExtractor::new(&store, engine(), &registry, &FlatElevation);

        let mut artifacts = extractor.extract_at(0, 0, 1).unwrap();
        assert_eq!(artifacts.stage(), ExtractionStage::Start);
        assert!(artifacts.next().is_none());
        assert_eq!(artifacts.stage(), ExtractionStage::Complete);
        assert!(artifacts.next().is_none());
    }

    #[test]
    fn test_invalid_quadkey_is_structural() {
        let store = store();
        let registry = registry();
        let extractor = TileExtractor::new(&store, engine(), &registry, &FlatElevation);
        let err = extractor.extract_at(2, 0, 1).err().unwrap();
        assert!(err.is_structural());
    }

    #[test]
    fn test_re_extraction_regenerates_sequence() {
        let store = store();
        let registry = registry();
        store.insert_range(vec![lake()], LodRange::single(1).unwrap());
        let extractor = TileExtractor::new(&store, engine(), &registry, &FlatElevation);

        let first: Vec<_> = extractor.extract_at(1, 1, 1).unwrap().collect();
        let second: Vec<_> = extractor.extract_at(1, 1, 1).unwrap().collect();
        assert_eq!(first.len(), 1);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].as_ref().ok(), second[0].as_ref().ok());
    }

    #[test]
    fn test_callback_sink() {
        let store = store();
        let registry = registry();
        store.insert_range(vec![lake()], LodRange::single(1).unwrap());
        let extractor = TileExtractor::new(&store, engine(), &registry, &FlatElevation);

        let mut names = Vec::new();
        let mut errors = 0;
        let mut sink = CallbackSink::new(|mesh: Mesh| names.push(mesh.name), |_| {}, |_| errors += 1);
        extractor.extract_at(1, 1, 1).unwrap().drain_into(&mut sink);
        drop(sink);
        assert_eq!(names, vec!["water"]);
        assert_eq!(errors, 0);
    }
}
