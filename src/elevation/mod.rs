//! Terrain elevation sampling
//!
//! Providers are shared across concurrent tile extractions, so sampling
//! takes `&self` and implementations must be `Send + Sync`.

use byteorder::{BigEndian, ByteOrder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Sample value SRTM uses for voids
const SRTM_VOID: i16 = -32768;

pub trait ElevationProvider: Send + Sync {
    /// Height in metres, `None` when the source has no data there
    fn sample(&self, lon: f64, lat: f64) -> Option<f64>;
}

/// Provider with no data anywhere
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatElevation;

impl ElevationProvider for FlatElevation {
    fn sample(&self, _lon: f64, _lat: f64) -> Option<f64> {
        None
    }
}

/// One decoded 1°x1° `.hgt` grid
#[derive(Debug)]
struct HgtTile {
    side: usize,
    samples: Vec<i16>,
}

impl HgtTile {
    fn decode(bytes: &[u8]) -> Option<Self> {
        let count = bytes.len() / 2;
        let side = (count as f64).sqrt().round() as usize;
        if side < 2 || side * side * 2 != bytes.len() {
            return None;
        }
        let mut samples = vec![0i16; count];
        BigEndian::read_i16_into(bytes, &mut samples);
        Some(Self { side, samples })
    }

    fn at(&self, row: usize, col: usize) -> Option<f64> {
        let v = self.samples[row * self.side + col];
        (v != SRTM_VOID).then_some(v as f64)
    }

    /// Bilinear sample; `fx`/`fy` are fractions east of the west edge and
    /// north of the south edge
    fn sample(&self, fx: f64, fy: f64) -> Option<f64> {
        let last = (self.side - 1) as f64;
        let col = (fx * last).clamp(0.0, last);
        let row = ((1.0 - fy) * last).clamp(0.0, last);

        let (c0, r0) = (col.floor() as usize, row.floor() as usize);
        let (c1, r1) = ((c0 + 1).min(self.side - 1), (r0 + 1).min(self.side - 1));
        let (tx, ty) = (col - c0 as f64, row - r0 as f64);

        let top = lerp(self.at(r0, c0)?, self.at(r0, c1)?, tx);
        let bottom = lerp(self.at(r1, c0)?, self.at(r1, c1)?, tx);
        Some(lerp(top, bottom, ty))
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// SRTM `.hgt` tiles read lazily from a directory
///
/// Tiles are named after their south-west corner (`N52E013.hgt`) and hold a
/// square grid of big-endian `i16` metres with row 0 at the north edge.
/// Files that are missing or malformed are remembered as empty.
#[derive(Debug)]
pub struct SrtmElevation {
    dir: PathBuf,
    tiles: RwLock<HashMap<(i32, i32), Option<Arc<HgtTile>>>>,
}

impl SrtmElevation {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tiles: RwLock::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// File name of the tile whose south-west corner is (`lat`, `lon`)
    pub fn tile_file_name(lat: i32, lon: i32) -> String {
        format!(
            "{}{:02}{}{:03}.hgt",
            if lat >= 0 { 'N' } else { 'S' },
            lat.unsigned_abs(),
            if lon >= 0 { 'E' } else { 'W' },
            lon.unsigned_abs()
        )
    }

    fn tile(&self, lat: i32, lon: i32) -> Option<Arc<HgtTile>> {
        if let Some(cached) = self
            .tiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(lat, lon))
        {
            return cached.clone();
        }

        let loaded = self.load(lat, lon).map(Arc::new);
        self.tiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((lat, lon))
            .or_insert(loaded)
            .clone()
    }

    fn load(&self, lat: i32, lon: i32) -> Option<HgtTile> {
        let path = self.dir.join(Self::tile_file_name(lat, lon));
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No elevation tile");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read elevation tile");
                return None;
            }
        };
        let tile = HgtTile::decode(&bytes);
        match &tile {
            Some(t) => debug!(path = %path.display(), side = t.side, "Loaded elevation tile"),
            None => warn!(path = %path.display(), len = bytes.len(), "Elevation tile is not a square grid"),
        }
        tile
    }
}

impl ElevationProvider for SrtmElevation {
    fn sample(&self, lon: f64, lat: f64) -> Option<f64> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        let (lat0, lon0) = (lat.floor(), lon.floor());
        let tile = self.tile(lat0 as i32, lon0 as i32)?;
        tile.sample(lon - lon0, lat - lat0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    /// 3x3 grid, rows north to south
    fn write_tile(dir: &Path, name: &str, rows: [[i16; 3]; 3]) {
        let mut bytes = Vec::new();
        for row in rows {
            for v in row {
                bytes.write_i16::<BigEndian>(v).unwrap();
            }
        }
        std::fs::File::create(dir.join(name))
            .unwrap()
            .write_all(&bytes)
            .unwrap();
    }

    #[test]
    fn test_tile_file_names() {
        assert_eq!(SrtmElevation::tile_file_name(52, 13), "N52E013.hgt");
        assert_eq!(SrtmElevation::tile_file_name(-34, -71), "S34W071.hgt");
    }

    #[test]
    fn test_corner_and_bilinear_samples() {
        let dir = tempfile::tempdir().unwrap();
        write_tile(
            dir.path(),
            "N52E013.hgt",
            [[100, 200, 300], [100, 200, 300], [0, 0, 0]],
        );
        let srtm = SrtmElevation::new(dir.path());

        // north-west corner
        assert_eq!(srtm.sample(13.0, 52.999999).map(f64::round), Some(100.0));
        // south-west corner
        assert_eq!(srtm.sample(13.0, 52.0), Some(0.0));
        // halfway between the first two columns on the top row
        let v = srtm.sample(13.25, 53.0 - 1e-9).unwrap();
        assert!((v - 150.0).abs() < 1e-3);
    }

    #[test]
    fn test_voids_and_missing_tiles() {
        let dir = tempfile::tempdir().unwrap();
        write_tile(
            dir.path(),
            "N52E013.hgt",
            [[SRTM_VOID, 10, 10], [10, 10, 10], [10, 10, 10]],
        );
        let srtm = SrtmElevation::new(dir.path());

        assert_eq!(srtm.sample(13.0, 52.999999), None);
        assert_eq!(srtm.sample(13.9, 52.1), Some(10.0));
        assert_eq!(srtm.sample(20.5, 40.5), None);
        // cached as missing
        assert!(srtm.tiles.read().unwrap().get(&(40, 20)).unwrap().is_none());
    }

    #[test]
    fn test_malformed_tile_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("N00E000.hgt"), [0u8; 7]).unwrap();
        let srtm = SrtmElevation::new(dir.path());
        assert_eq!(srtm.sample(0.5, 0.5), None);
    }

    #[test]
    fn test_flat_has_no_data() {
        assert_eq!(FlatElevation.sample(13.4, 52.5), None);
    }
}
