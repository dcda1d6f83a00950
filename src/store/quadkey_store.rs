//! Multi-LOD in-memory spatial store
//!
//! Each LOD owns one partition behind its own `RwLock`, so tile queries at a
//! LOD never block each other and writers only serialise per partition.
//! A partition holds an R-tree of range-inserted records and a map of
//! records inserted for one exact tile.

use super::spatial::{bbox_envelope, IndexedRecord, StoredRecord};
use super::strings::StringTable;
use crate::error::IngestError;
use crate::geo::{GeometryRecord, LodRange, QuadKey, MAX_LOD};
use rayon::prelude::*;
use rstar::RTree;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// Result of one insertion call
#[derive(Debug, Default)]
pub struct InsertOutcome {
    /// Records added to the store
    pub stored: usize,
    /// Records outside the target tile (quadkey insertion only)
    pub skipped: usize,
    /// Records rejected for empty or malformed geometry
    pub rejected: Vec<IngestError>,
}

#[derive(Default)]
struct LodPartition {
    ranged: RTree<IndexedRecord>,
    tiled: HashMap<(u32, u32), Vec<Arc<StoredRecord>>>,
}

/// Quad-tree keyed store of geometry records
pub struct QuadKeyStore {
    partitions: Vec<RwLock<LodPartition>>,
    strings: Arc<StringTable>,
    next_seq: AtomicU64,
    record_count: AtomicUsize,
}

impl QuadKeyStore {
    pub fn new(strings: Arc<StringTable>) -> Self {
        let partitions = (0..=MAX_LOD).map(|_| RwLock::new(LodPartition::default())).collect();
        Self {
            partitions,
            strings,
            next_seq: AtomicU64::new(0),
            record_count: AtomicUsize::new(0),
        }
    }

    /// Store records visible at every LOD of `lods`
    pub fn insert_range(&self, records: Vec<GeometryRecord>, lods: LodRange) -> InsertOutcome {
        let start = Instant::now();
        let mut outcome = InsertOutcome::default();
        let prepared = self.prepare(records, lods, &mut outcome);
        if prepared.is_empty() {
            return outcome;
        }

        let entries: Vec<IndexedRecord> = prepared.iter().cloned().map(IndexedRecord::new).collect();
        for lod in lods.iter() {
            let mut partition = self.write_partition(lod);
            if partition.ranged.size() == 0 {
                partition.ranged = RTree::bulk_load(entries.clone());
            } else {
                for entry in &entries {
                    partition.ranged.insert(entry.clone());
                }
            }
        }

        outcome.stored = prepared.len();
        self.record_count.fetch_add(prepared.len(), Ordering::Relaxed);
        tracing::debug!(
            start_lod = lods.start(),
            end_lod = lods.end(),
            stored = outcome.stored,
            rejected = outcome.rejected.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "range insertion complete"
        );
        outcome
    }

    /// Store records visible only at `quadkey`'s exact tile and LOD
    ///
    /// Records that do not intersect the tile are skipped. Repeated calls are
    /// additive and never disturb records stored for other tiles.
    pub fn insert_at_quadkey(&self, records: Vec<GeometryRecord>, quadkey: QuadKey) -> InsertOutcome {
        let mut outcome = InsertOutcome::default();
        let bbox = quadkey.bounding_box();
        let total = records.len();
        let inside: Vec<GeometryRecord> = records
            .into_par_iter()
            .filter(|r| r.validate().is_err() || r.geometry.intersects(&bbox))
            .collect();
        outcome.skipped = total - inside.len();

        let prepared = self.prepare(inside, quadkey.lod_range(), &mut outcome);
        if !prepared.is_empty() {
            let mut partition = self.write_partition(quadkey.lod);
            partition
                .tiled
                .entry((quadkey.x, quadkey.y))
                .or_default()
                .extend(prepared.iter().cloned());
        }

        outcome.stored = prepared.len();
        self.record_count.fetch_add(prepared.len(), Ordering::Relaxed);
        tracing::debug!(
            quadkey = %quadkey,
            stored = outcome.stored,
            skipped = outcome.skipped,
            rejected = outcome.rejected.len(),
            "quadkey insertion complete"
        );
        outcome
    }

    /// True iff at least one record is visible at this tile and LOD
    ///
    /// Invalid coordinates simply have no data.
    pub fn has_data(&self, x: u32, y: u32, lod: u8) -> bool {
        let Ok(quadkey) = QuadKey::new(x, y, lod) else {
            return false;
        };
        let partition = self.read_partition(lod);
        if partition.tiled.get(&(x, y)).is_some_and(|records| !records.is_empty()) {
            return true;
        }
        let bbox = quadkey.bounding_box();
        let found = partition
            .ranged
            .locate_in_envelope_intersecting(&bbox_envelope(&bbox))
            .any(|entry| entry.record.geometry.intersects(&bbox));
        found
    }

    /// Records visible at a tile, in insertion order
    pub fn query(&self, quadkey: QuadKey) -> Vec<Arc<StoredRecord>> {
        if quadkey.lod > MAX_LOD {
            return Vec::new();
        }
        let bbox = quadkey.bounding_box();
        let partition = self.read_partition(quadkey.lod);

        let mut records: Vec<Arc<StoredRecord>> = partition
            .tiled
            .get(&(quadkey.x, quadkey.y))
            .map(|records| records.to_vec())
            .unwrap_or_default();

        records.extend(
            partition
                .ranged
                .locate_in_envelope_intersecting(&bbox_envelope(&bbox))
                .filter(|entry| entry.record.geometry.intersects(&bbox))
                .map(|entry| entry.record.clone()),
        );
        drop(partition);

        records.sort_by_key(|r| r.seq);
        records
    }

    /// Number of distinct records stored
    pub fn len(&self) -> usize {
        self.record_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// Drop every stored record
    pub fn clear(&self) {
        for lod in 0..=MAX_LOD {
            *self.write_partition(lod) = LodPartition::default();
        }
        self.record_count.store(0, Ordering::Relaxed);
    }

    fn prepare(
        &self,
        records: Vec<GeometryRecord>,
        lods: LodRange,
        outcome: &mut InsertOutcome,
    ) -> Vec<Arc<StoredRecord>> {
        let checked: Vec<Result<GeometryRecord, IngestError>> = records
            .into_par_iter()
            .map(|record| record.validate().map(|_| record))
            .collect();

        let mut prepared = Vec::with_capacity(checked.len());
        for result in checked {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, "rejected record");
                    outcome.rejected.push(e);
                    continue;
                }
            };
            let Some(bounds) = record.geometry.bounding_box() else {
                outcome.rejected.push(IngestError::EmptyGeometry { id: record.id });
                continue;
            };
            let tags = record.tags.map_strings(|s| self.strings.intern(s).1);
            prepared.push(Arc::new(StoredRecord {
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                lods,
                bounds,
                record: GeometryRecord { tags, ..record },
            }));
        }
        prepared
    }

    fn read_partition(&self, lod: u8) -> RwLockReadGuard<'_, LodPartition> {
        self.partitions[lod as usize].read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_partition(&self, lod: u8) -> RwLockWriteGuard<'_, LodPartition> {
        self.partitions[lod as usize].write().unwrap_or_else(PoisonError::into_inner)
    }
}
