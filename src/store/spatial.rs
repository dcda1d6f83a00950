//! Spatial indexing types for stored records
//!
//! Range-inserted records are kept in one R-tree per LOD keyed by their
//! lon/lat envelope; exact geometry tests run after the envelope query.

use crate::geo::{BoundingBox, GeometryRecord, LodRange};
use rstar::{RTreeObject, AABB};
use std::ops::Deref;
use std::sync::Arc;

/// High bit marks ids the store made up for records without a source id
pub const SYNTHETIC_ID_FLAG: u64 = 1 << 63;

/// A record owned by the store, with its insertion order and visibility
#[derive(Debug)]
pub struct StoredRecord {
    pub seq: u64,
    pub lods: LodRange,
    pub bounds: BoundingBox,
    pub record: GeometryRecord,
}

impl StoredRecord {
    /// Source id, or a synthetic one derived from the insertion sequence
    pub fn id(&self) -> u64 {
        self.record.id.unwrap_or(SYNTHETIC_ID_FLAG | self.seq)
    }

    pub fn is_synthetic_id(&self) -> bool {
        self.record.id.is_none()
    }
}

impl Deref for StoredRecord {
    type Target = GeometryRecord;

    fn deref(&self) -> &GeometryRecord {
        &self.record
    }
}

/// R-tree entry wrapping a shared stored record
#[derive(Clone, Debug)]
pub struct IndexedRecord {
    pub record: Arc<StoredRecord>,
    pub envelope: AABB<[f64; 2]>,
}

impl IndexedRecord {
    pub fn new(record: Arc<StoredRecord>) -> Self {
        let envelope = bbox_envelope(&record.bounds);
        Self { record, envelope }
    }
}

impl RTreeObject for IndexedRecord {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

pub fn bbox_envelope(bbox: &BoundingBox) -> AABB<[f64; 2]> {
    AABB::from_corners([bbox.min_lon, bbox.min_lat], [bbox.max_lon, bbox.max_lat])
}
