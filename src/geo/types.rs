//! Core geometry types for ingested map features
//!
//! A `GeometryRecord` is the normalized form every format parser produces:
//! an optional source id, a tag set and one geometry in WGS84 degrees.

use super::quadkey::BoundingBox;
use crate::error::IngestError;
use std::sync::Arc;

/// A 2D coordinate, `x` is longitude and `y` is latitude
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Shape category used by selectors and builders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

impl GeometryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "point",
            GeometryKind::Line => "line",
            GeometryKind::Polygon => "area",
        }
    }
}

/// Feature geometry; polygon rings are stored open
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point),
    Line(Vec<Point>),
    Polygon {
        outer: Vec<Point>,
        holes: Vec<Vec<Point>>,
    },
}

impl Geometry {
    /// Build a polygon, dropping the repeated closing vertex of each ring
    pub fn polygon(outer: Vec<Point>, holes: Vec<Vec<Point>>) -> Self {
        Geometry::Polygon {
            outer: open_ring(outer),
            holes: holes.into_iter().map(open_ring).collect(),
        }
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::Line(_) => GeometryKind::Line,
            Geometry::Polygon { .. } => GeometryKind::Polygon,
        }
    }

    /// All vertices in storage order (outer ring before holes)
    pub fn vertices(&self) -> Box<dyn Iterator<Item = &Point> + '_> {
        match self {
            Geometry::Point(p) => Box::new(std::iter::once(p)),
            Geometry::Line(points) => Box::new(points.iter()),
            Geometry::Polygon { outer, holes } => {
                Box::new(outer.iter().chain(holes.iter().flatten()))
            }
        }
    }

    pub fn vertex_count(&self) -> usize {
        match self {
            Geometry::Point(_) => 1,
            Geometry::Line(points) => points.len(),
            Geometry::Polygon { outer, holes } => {
                outer.len() + holes.iter().map(Vec::len).sum::<usize>()
            }
        }
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.vertices())
    }

    /// Exact intersection test against a closed box
    pub fn intersects(&self, bbox: &BoundingBox) -> bool {
        match self {
            Geometry::Point(p) => bbox.contains(p),
            Geometry::Line(points) => {
                if points.len() == 1 {
                    return bbox.contains(&points[0]);
                }
                points.windows(2).any(|w| segment_intersects_box(w[0], w[1], bbox))
            }
            Geometry::Polygon { outer, holes } => {
                if !self.bounding_box().is_some_and(|b| b.intersects(bbox)) {
                    return false;
                }
                if outer.iter().any(|p| bbox.contains(p)) {
                    return true;
                }
                let edges_touch = |ring: &Vec<Point>| {
                    ring.iter()
                        .zip(ring.iter().cycle().skip(1))
                        .any(|(a, b)| segment_intersects_box(*a, *b, bbox))
                };
                if edges_touch(outer) || holes.iter().any(edges_touch) {
                    return true;
                }
                // No edge crosses the box, so it is either fully inside the
                // polygon or fully outside it.
                let center = bbox.center();
                point_in_ring(&center, outer) && !holes.iter().any(|h| point_in_ring(&center, h))
            }
        }
    }

    fn validate(&self, id: Option<u64>) -> Result<(), IngestError> {
        if self.vertex_count() == 0 {
            return Err(IngestError::EmptyGeometry { id });
        }
        let malformed = |reason: String| IngestError::Malformed { id, reason };

        for p in self.vertices() {
            if !p.is_finite() {
                return Err(malformed("non-finite coordinate".to_string()));
            }
            if !(-180.0..=180.0).contains(&p.x) || !(-90.0..=90.0).contains(&p.y) {
                return Err(malformed(format!("coordinate ({}, {}) out of range", p.x, p.y)));
            }
        }

        match self {
            Geometry::Point(_) => Ok(()),
            Geometry::Line(points) => {
                if points.len() < 2 {
                    return Err(malformed(format!("line has {} vertices", points.len())));
                }
                Ok(())
            }
            Geometry::Polygon { outer, holes } => {
                if distinct_vertices(outer) < 3 {
                    return Err(malformed("outer ring has fewer than 3 distinct vertices".to_string()));
                }
                if let Some(hole) = holes.iter().find(|h| distinct_vertices(h) < 3) {
                    return Err(malformed(format!("hole has {} vertices", hole.len())));
                }
                Ok(())
            }
        }
    }
}

/// A single key/value tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: Arc<str>,
    pub value: Arc<str>,
}

/// Unordered tag mapping stored sorted by key for binary-search lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tag
    pub fn insert(&mut self, key: impl Into<Arc<str>>, value: impl Into<Arc<str>>) {
        let tag = Tag { key: key.into(), value: value.into() };
        match self.tags.binary_search_by(|t| t.key.as_ref().cmp(tag.key.as_ref())) {
            Ok(idx) => self.tags[idx] = tag,
            Err(idx) => self.tags.insert(idx, tag),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .binary_search_by(|t| t.key.as_ref().cmp(key))
            .ok()
            .map(|idx| self.tags[idx].value.as_ref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Rebuild every key/value through `intern`, keeping the sort order
    pub fn map_strings(&self, mut intern: impl FnMut(&str) -> Arc<str>) -> TagSet {
        TagSet {
            tags: self
                .tags
                .iter()
                .map(|t| Tag { key: intern(&t.key), value: intern(&t.value) })
                .collect(),
        }
    }
}

impl<K: Into<Arc<str>>, V: Into<Arc<str>>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// One source feature as produced by a format parser
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    pub id: Option<u64>,
    pub tags: TagSet,
    pub geometry: Geometry,
}

impl GeometryRecord {
    pub fn new(id: Option<u64>, tags: TagSet, geometry: Geometry) -> Self {
        Self { id, tags, geometry }
    }

    pub fn kind(&self) -> GeometryKind {
        self.geometry.kind()
    }

    /// Reject empty or malformed geometry before it reaches the store
    pub fn validate(&self) -> Result<(), IngestError> {
        self.geometry.validate(self.id)
    }
}

/// Signed area of a ring via the shoelace formula, positive when counter-clockwise
pub fn signed_area(ring: &[Point]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (a, b) in ring.iter().zip(ring.iter().cycle().skip(1)) {
        sum += a.x * b.y - b.x * a.y;
    }
    sum * 0.5
}

/// Even-odd point-in-ring test
pub fn point_in_ring(p: &Point, ring: &[Point]) -> bool {
    let mut inside = false;
    let n = ring.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (a, b) = (ring[i], ring[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn open_ring(mut ring: Vec<Point>) -> Vec<Point> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

pub(crate) fn distinct_vertices(ring: &[Point]) -> usize {
    let mut distinct: Vec<Point> = Vec::with_capacity(ring.len());
    for p in ring {
        if !distinct.contains(p) {
            distinct.push(*p);
            if distinct.len() >= 3 {
                break;
            }
        }
    }
    distinct.len()
}

/// Liang-Barsky style overlap test between a segment and a closed box
fn segment_intersects_box(a: Point, b: Point, bbox: &BoundingBox) -> bool {
    super::clip::clip_segment(a, b, bbox).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x0 + size, y0),
            Point::new(x0 + size, y0 + size),
            Point::new(x0, y0 + size),
        ]
    }

    #[test]
    fn test_polygon_drops_closing_vertex() {
        let mut ring = square(0.0, 0.0, 1.0);
        ring.push(Point::new(0.0, 0.0));
        let geometry = Geometry::polygon(ring, vec![]);
        assert_eq!(geometry.vertex_count(), 4);
    }

    #[test]
    fn test_validation() {
        let empty = GeometryRecord::new(Some(1), TagSet::new(), Geometry::Line(vec![]));
        assert_eq!(empty.validate(), Err(IngestError::EmptyGeometry { id: Some(1) }));

        let short = GeometryRecord::new(None, TagSet::new(), Geometry::Line(vec![Point::new(0.0, 0.0)]));
        assert!(matches!(short.validate(), Err(IngestError::Malformed { .. })));

        let nan = GeometryRecord::new(None, TagSet::new(), Geometry::Point(Point::new(f64::NAN, 0.0)));
        assert!(matches!(nan.validate(), Err(IngestError::Malformed { .. })));

        let flat = Geometry::polygon(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(1.0, 1.0)], vec![]);
        let flat = GeometryRecord::new(None, TagSet::new(), flat);
        assert!(matches!(flat.validate(), Err(IngestError::Malformed { .. })));

        let ok = GeometryRecord::new(None, TagSet::new(), Geometry::polygon(square(0.0, 0.0, 1.0), vec![]));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_tag_set_lookup_and_replace() {
        let mut tags: TagSet = [("name", "Berlin"), ("place", "city")].into_iter().collect();
        assert_eq!(tags.get("place"), Some("city"));
        tags.insert("place", "town");
        assert_eq!(tags.get("place"), Some("town"));
        assert_eq!(tags.len(), 2);
        assert!(!tags.contains_key("population"));
        let keys: Vec<&str> = tags.iter().map(|t| t.key.as_ref()).collect();
        assert_eq!(keys, vec!["name", "place"]);
    }

    #[test]
    fn test_polygon_intersection_cases() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);

        // Box fully inside a large polygon: no vertex or edge inside the box
        let big = Geometry::polygon(square(-10.0, -10.0, 20.0), vec![]);
        assert!(big.intersects(&bbox));

        // Box inside the hole of a polygon
        let holed = Geometry::polygon(square(-10.0, -10.0, 20.0), vec![square(-5.0, -5.0, 10.0)]);
        assert!(!holed.intersects(&bbox));

        let far = Geometry::polygon(square(5.0, 5.0, 1.0), vec![]);
        assert!(!far.intersects(&bbox));

        let line = Geometry::Line(vec![Point::new(-1.0, 0.5), Point::new(2.0, 0.5)]);
        assert!(line.intersects(&bbox));
        assert!(Geometry::Point(Point::new(1.0, 1.0)).intersects(&bbox));
    }

    #[test]
    fn test_signed_area_orientation() {
        let ccw = square(0.0, 0.0, 2.0);
        assert!((signed_area(&ccw) - 4.0).abs() < 1e-12);
        let cw: Vec<Point> = ccw.into_iter().rev().collect();
        assert!(signed_area(&cw) < 0.0);
    }
}
