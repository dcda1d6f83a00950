//! The library's export surface as an owned context
//!
//! A `MapContext` exists only after a successful `configure` and releases
//! the store, string table and caches on `cleanup` or drop. Every call that
//! needs configuration is a method on it, so there is no unconfigured state
//! to guard against.

use crate::config::Config;
use crate::element::{Element, ElementBuilder, ElementBuilderRegistry};
use crate::elevation::{ElevationProvider, SrtmElevation};
use crate::error::{ConfigError, ExtractionError, IngestError, MapError};
use crate::extract::{ArtifactSink, CollectingSink, ExtractionSummary, TileArtifacts, TileExtractor};
use crate::formats::parse_file;
use crate::geo::{GeometryRecord, LodRange, QuadKey};
use crate::mesh::Mesh;
use crate::store::{InsertOutcome, QuadKeyStore, StringTable};
use crate::style::StyleEngine;
use rayon::prelude::*;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::info;

/// What one ingestion call did with the parsed records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub parsed: usize,
    /// Dropped because no rule can style them in the target LODs
    pub unstyled: usize,
    /// Outside the target tile (quadkey insertion only)
    pub skipped: usize,
    pub stored: usize,
    pub rejected: usize,
}

/// Artifacts of one tile from a batch request
#[derive(Debug)]
pub struct LoadedTile {
    pub quadkey: QuadKey,
    pub meshes: Vec<Mesh>,
    pub elements: Vec<Element>,
    pub errors: Vec<ExtractionError>,
}

pub struct MapContext {
    config: Config,
    store: QuadKeyStore,
    registry: ElementBuilderRegistry,
    elevation: Box<dyn ElevationProvider>,
    styles: RwLock<HashMap<PathBuf, Arc<StyleEngine>>>,
}

impl MapContext {
    /// Validate `config` and set up an empty store
    pub fn configure(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let strings = if config.persist_strings {
            StringTable::open(&config.strings_dir).map_err(|source| ConfigError::Io {
                path: config.strings_dir.clone(),
                source,
            })?
        } else {
            StringTable::in_memory()
        };

        info!(
            data_dir = %config.data_dir.display(),
            elevation_dir = %config.elevation_dir.display(),
            strings = strings.len(),
            "Map context configured"
        );

        Ok(Self {
            elevation: Box::new(SrtmElevation::new(config.elevation_dir.clone())),
            store: QuadKeyStore::new(Arc::new(strings)),
            registry: ElementBuilderRegistry::new(),
            styles: RwLock::new(HashMap::new()),
            config,
        })
    }

    /// Replace the SRTM provider, e.g. with a flat or synthetic one
    pub fn with_elevation_provider(mut self, provider: Box<dyn ElevationProvider>) -> Self {
        self.elevation = provider;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &QuadKeyStore {
        &self.store
    }

    pub fn registry(&self) -> &ElementBuilderRegistry {
        &self.registry
    }

    /// Register a built-in builder by name
    pub fn register_element_builder(&self, name: &str) {
        self.registry.register_named(name);
    }

    pub fn register_builder(&self, name: &str, builder: Arc<dyn ElementBuilder>) {
        self.registry.register(name, builder);
    }

    /// Parse `data` and store what `stylesheet` can render within [start, end]
    ///
    /// Rejected records go to `on_error`; parse and stylesheet failures
    /// abort the call.
    pub fn add_to_in_memory_store_in_range(
        &self,
        stylesheet: impl AsRef<Path>,
        data: impl AsRef<Path>,
        start_lod: u8,
        end_lod: u8,
        on_error: impl FnMut(IngestError),
    ) -> Result<IngestSummary, MapError> {
        let lods = LodRange::new(start_lod, end_lod)?;
        self.ingest(stylesheet.as_ref(), data.as_ref(), lods, on_error, |store, records| {
            store.insert_range(records, lods)
        })
    }

    /// Parse `data` and store what intersects tile (x, y) at exactly `lod`
    pub fn add_to_in_memory_store_in_quadkey(
        &self,
        stylesheet: impl AsRef<Path>,
        data: impl AsRef<Path>,
        x: u32,
        y: u32,
        lod: u8,
        on_error: impl FnMut(IngestError),
    ) -> Result<IngestSummary, MapError> {
        let quadkey = QuadKey::new(x, y, lod)?;
        self.ingest(
            stylesheet.as_ref(),
            data.as_ref(),
            quadkey.lod_range(),
            on_error,
            |store, records| store.insert_at_quadkey(records, quadkey),
        )
    }

    fn ingest(
        &self,
        stylesheet: &Path,
        data: &Path,
        lods: LodRange,
        mut on_error: impl FnMut(IngestError),
        insert: impl FnOnce(&QuadKeyStore, Vec<GeometryRecord>) -> InsertOutcome,
    ) -> Result<IngestSummary, MapError> {
        let start = Instant::now();
        let style = self.stylesheet(stylesheet)?;
        let data = self.config.resolve(data);
        let records = parse_file(&data)?;
        let parsed = records.len();

        // invalid records are kept so their rejection is reported
        let records: Vec<GeometryRecord> = records
            .into_par_iter()
            .filter(|r| r.validate().is_err() || style.applies_within(r, &lods))
            .collect();
        let unstyled = parsed - records.len();

        let outcome = insert(&self.store, records);
        let summary = IngestSummary {
            parsed,
            unstyled,
            skipped: outcome.skipped,
            stored: outcome.stored,
            rejected: outcome.rejected.len(),
        };
        for e in outcome.rejected {
            on_error(e);
        }

        info!(
            path = %data.display(),
            start_lod = lods.start(),
            end_lod = lods.end(),
            parsed = summary.parsed,
            unstyled = summary.unstyled,
            skipped = summary.skipped,
            stored = summary.stored,
            rejected = summary.rejected,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Ingestion complete"
        );
        Ok(summary)
    }

    pub fn has_data(&self, x: u32, y: u32, lod: u8) -> bool {
        self.store.has_data(x, y, lod)
    }

    /// Lazy artifact stream for one tile
    pub fn tile_artifacts(
        &self,
        stylesheet: impl AsRef<Path>,
        quadkey: QuadKey,
    ) -> Result<TileArtifacts<'_>, MapError> {
        let style = self.stylesheet(stylesheet.as_ref())?;
        Ok(self.extractor(style).extract(quadkey)?)
    }

    /// Extract tile (x, y, lod) and push every artifact into `sink`
    pub fn load_quad_key(
        &self,
        stylesheet: impl AsRef<Path>,
        x: u32,
        y: u32,
        lod: u8,
        sink: &mut dyn ArtifactSink,
    ) -> Result<ExtractionSummary, MapError> {
        let quadkey = QuadKey::new(x, y, lod)?;
        Ok(self.tile_artifacts(stylesheet, quadkey)?.drain_into(sink))
    }

    /// Extract a rectangle of tiles in parallel, one buffer set per tile
    ///
    /// Tiles are returned row by row (y, then x).
    pub fn load_tile_range(
        &self,
        stylesheet: impl AsRef<Path>,
        lod: u8,
        xs: RangeInclusive<u32>,
        ys: RangeInclusive<u32>,
    ) -> Result<Vec<LoadedTile>, MapError> {
        let style = self.stylesheet(stylesheet.as_ref())?;
        let quadkeys = ys
            .flat_map(|y| xs.clone().map(move |x| (x, y)))
            .map(|(x, y)| QuadKey::new(x, y, lod))
            .collect::<Result<Vec<_>, _>>()?;

        let start = Instant::now();
        let extractor = self.extractor(style);
        let tiles: Vec<LoadedTile> = quadkeys
            .par_iter()
            .map(|&quadkey| {
                let mut sink = CollectingSink::default();
                match extractor.extract(quadkey) {
                    Ok(artifacts) => {
                        artifacts.drain_into(&mut sink);
                    }
                    Err(e) => sink.errors.push(e),
                }
                LoadedTile {
                    quadkey,
                    meshes: sink.meshes,
                    elements: sink.elements,
                    errors: sink.errors,
                }
            })
            .collect();

        info!(
            lod,
            tiles = tiles.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Tile range extracted"
        );
        Ok(tiles)
    }

    /// Release the store and caches
    pub fn cleanup(self) {
        let records = self.store.len();
        self.store.clear();
        self.store.strings().clear();
        self.styles.write().unwrap_or_else(PoisonError::into_inner).clear();
        info!(records, "Map context cleaned up");
    }

    fn extractor(&self, style: Arc<StyleEngine>) -> TileExtractor<'_> {
        TileExtractor::new(&self.store, style, &self.registry, self.elevation.as_ref())
    }

    /// Compiled stylesheet for `path`, loaded once and cached
    fn stylesheet(&self, path: &Path) -> Result<Arc<StyleEngine>, MapError> {
        let path = self.config.resolve(path);
        if let Some(engine) = self
            .styles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&path)
        {
            return Ok(engine.clone());
        }

        let engine = Arc::new(StyleEngine::load(&path)?);
        info!(path = %path.display(), rules = engine.stylesheet().len(), "Loaded stylesheet");
        Ok(self
            .styles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path)
            .or_insert(engine)
            .clone())
    }
}
