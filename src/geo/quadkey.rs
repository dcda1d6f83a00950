//! Quad-tree tile coordinates over the Web Mercator square

use crate::error::QuadKeyError;
use std::f64::consts::PI;
use std::fmt;

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

/// Deepest level of detail the store indexes
pub const MAX_LOD: u8 = 24;

/// Closed lon/lat rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self { min_lon, min_lat, max_lon, max_lat }
    }

    /// Smallest box containing all points, `None` for an empty iterator
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a super::Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = BoundingBox::new(first.x, first.y, first.x, first.y);
        for p in iter {
            bbox.expand(p);
        }
        Some(bbox)
    }

    pub fn expand(&mut self, p: &super::Point) {
        self.min_lon = self.min_lon.min(p.x);
        self.min_lat = self.min_lat.min(p.y);
        self.max_lon = self.max_lon.max(p.x);
        self.max_lat = self.max_lat.max(p.y);
    }

    pub fn contains(&self, p: &super::Point) -> bool {
        p.x >= self.min_lon && p.x <= self.max_lon && p.y >= self.min_lat && p.y <= self.max_lat
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn center(&self) -> super::Point {
        super::Point::new(
            (self.min_lon + self.max_lon) * 0.5,
            (self.min_lat + self.max_lat) * 0.5,
        )
    }
}

/// Inclusive span of levels of detail a record is visible at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LodRange {
    start: u8,
    end: u8,
}

impl LodRange {
    pub fn new(start: u8, end: u8) -> Result<Self, QuadKeyError> {
        if start > end || end > MAX_LOD {
            return Err(QuadKeyError::InvalidLodRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Range covering exactly one LOD
    pub fn single(lod: u8) -> Result<Self, QuadKeyError> {
        Self::new(lod, lod)
    }

    /// Every LOD the store knows about
    pub fn full() -> Self {
        Self { start: 0, end: MAX_LOD }
    }

    pub fn start(&self) -> u8 {
        self.start
    }

    pub fn end(&self) -> u8 {
        self.end
    }

    pub fn contains(&self, lod: u8) -> bool {
        lod >= self.start && lod <= self.end
    }

    pub fn overlaps(&self, other: &LodRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<u8> {
        self.start..=self.end
    }
}

/// A tile (x, y) at a level of detail
///
/// `x` grows east and `y` grows south; at lod 0 the single tile covers
/// the whole Mercator square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuadKey {
    pub x: u32,
    pub y: u32,
    pub lod: u8,
}

impl QuadKey {
    pub fn new(x: u32, y: u32, lod: u8) -> Result<Self, QuadKeyError> {
        if lod > MAX_LOD || x >= tiles_per_side(lod) || y >= tiles_per_side(lod) {
            return Err(QuadKeyError::OutOfRange { x, y, lod });
        }
        Ok(Self { x, y, lod })
    }

    /// Tile containing a coordinate; latitude is clamped to the Mercator limits
    pub fn from_coordinate(lon: f64, lat: f64, lod: u8) -> Result<Self, QuadKeyError> {
        let n = tiles_per_side(lod.min(MAX_LOD)) as f64;
        let lat = lat.clamp(MIN_LAT, MAX_LAT);
        let lat_rad = lat.to_radians();

        let x = ((lon + 180.0) / 360.0 * n).floor().clamp(0.0, n - 1.0) as u32;
        let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n)
            .floor()
            .clamp(0.0, n - 1.0) as u32;

        QuadKey::new(x, y, lod)
    }

    /// Closed lon/lat footprint of the tile
    pub fn bounding_box(&self) -> BoundingBox {
        let n = tiles_per_side(self.lod) as f64;
        let min_lon = self.x as f64 / n * 360.0 - 180.0;
        let max_lon = (self.x + 1) as f64 / n * 360.0 - 180.0;
        let max_lat = tile_y_to_lat(self.y as f64, n);
        let min_lat = tile_y_to_lat((self.y + 1) as f64, n);
        BoundingBox::new(min_lon, min_lat, max_lon, max_lat)
    }

    /// The single-LOD range this tile lives at
    pub fn lod_range(&self) -> LodRange {
        LodRange { start: self.lod, end: self.lod }
    }

    pub fn parent(&self) -> Option<QuadKey> {
        if self.lod == 0 {
            return None;
        }
        Some(QuadKey { x: self.x / 2, y: self.y / 2, lod: self.lod - 1 })
    }

    pub fn children(&self) -> Option<[QuadKey; 4]> {
        if self.lod >= MAX_LOD {
            return None;
        }
        let (x, y, lod) = (self.x * 2, self.y * 2, self.lod + 1);
        Some([
            QuadKey { x, y, lod },
            QuadKey { x: x + 1, y, lod },
            QuadKey { x, y: y + 1, lod },
            QuadKey { x: x + 1, y: y + 1, lod },
        ])
    }

    /// Bing-style base-4 key, one digit per level
    pub fn to_quadkey_string(&self) -> String {
        let mut key = String::with_capacity(self.lod as usize);
        for i in (1..=self.lod).rev() {
            let mask = 1u32 << (i - 1);
            let mut digit = b'0';
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            key.push(digit as char);
        }
        key
    }
}

impl fmt::Display for QuadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.lod, self.x, self.y)
    }
}

fn tiles_per_side(lod: u8) -> u32 {
    1u32 << lod
}

fn tile_y_to_lat(y: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadkey_validation() {
        assert!(QuadKey::new(0, 0, 0).is_ok());
        assert!(QuadKey::new(1, 1, 1).is_ok());
        assert_eq!(
            QuadKey::new(2, 0, 1),
            Err(QuadKeyError::OutOfRange { x: 2, y: 0, lod: 1 })
        );
        assert!(QuadKey::new(0, 0, MAX_LOD + 1).is_err());
    }

    #[test]
    fn test_berlin_tile_bounding_box() {
        let qk = QuadKey::new(35205, 21489, 16).unwrap();
        let bbox = qk.bounding_box();
        assert!((bbox.min_lon - 13.38684).abs() < 1e-4);
        assert!((bbox.max_lon - 13.39233).abs() < 1e-4);
        assert!((bbox.min_lat - 52.52959).abs() < 1e-4);
        assert!((bbox.max_lat - 52.53293).abs() < 1e-4);
    }

    #[test]
    fn test_from_coordinate_roundtrip() {
        let qk = QuadKey::from_coordinate(13.389, 52.531, 16).unwrap();
        assert_eq!((qk.x, qk.y), (35205, 21489));
        assert!(qk.bounding_box().contains(&crate::geo::Point::new(13.389, 52.531)));
    }

    #[test]
    fn test_lod_one_quadrants() {
        let nw = QuadKey::new(0, 0, 1).unwrap().bounding_box();
        assert_eq!(nw.min_lon, -180.0);
        assert_eq!(nw.max_lon, 0.0);
        assert!(nw.min_lat.abs() < 1e-9);
        assert!((nw.max_lat - MAX_LAT).abs() < 1e-6);
    }

    #[test]
    fn test_parent_and_children() {
        let qk = QuadKey::new(35205, 21489, 16).unwrap();
        let parent = qk.parent().unwrap();
        assert_eq!(parent, QuadKey { x: 17602, y: 10744, lod: 15 });
        assert!(parent.children().unwrap().contains(&qk));
        assert!(QuadKey::new(0, 0, 0).unwrap().parent().is_none());
    }

    #[test]
    fn test_quadkey_string() {
        assert_eq!(QuadKey::new(3, 5, 3).unwrap().to_quadkey_string(), "213");
        assert_eq!(QuadKey::new(0, 0, 0).unwrap().to_quadkey_string(), "");
    }

    #[test]
    fn test_lod_range() {
        let range = LodRange::new(1, 3).unwrap();
        assert!(range.contains(1) && range.contains(3));
        assert!(!range.contains(4));
        assert!(range.overlaps(&LodRange::single(3).unwrap()));
        assert!(!range.overlaps(&LodRange::single(4).unwrap()));
        assert!(LodRange::new(4, 2).is_err());
        assert_eq!(range.iter().count(), 3);
    }
}
