//! Built-in element builders

use super::{BuildContext, Element, ElementBuilder};
use crate::error::ElementError;
use crate::geo::{clip_geometry, signed_area, Geometry, GeometryRecord, Point};
use crate::style::AttributeSet;

/// Style tokens led by the builder name so an element always carries one
fn style_tokens(builder: &str, style: &AttributeSet) -> Vec<String> {
    let mut tokens = Vec::with_capacity(style.len() + 1);
    tokens.push(format!("builder={}", builder));
    tokens.extend(style.to_tokens());
    tokens
}

fn element(record: &GeometryRecord, ctx: &BuildContext<'_>, points: &[Point], style: Vec<String>) -> Element {
    let mut vertices = Vec::with_capacity(points.len() * 3);
    for p in points {
        vertices.extend_from_slice(&[p.x, p.y, ctx.elevation_at(p.x, p.y)]);
    }
    Element {
        id: ctx.record_id,
        tags: record.tags.clone(),
        vertices,
        style,
    }
}

/// Single anchor point per record, labelled from the tag named by `label-tag`
///
/// Points anchor on themselves, lines on their midpoint by length and
/// polygons on the centroid of the outer ring. Only the tile owning the
/// anchor emits the element.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceBuilder;

impl PlaceBuilder {
    pub const NAME: &'static str = "place";

    fn anchor(geometry: &Geometry) -> Option<Point> {
        match geometry {
            Geometry::Point(p) => Some(*p),
            Geometry::Line(points) => line_midpoint(points),
            Geometry::Polygon { outer, .. } => {
                ring_centroid(outer).or_else(|| geometry.bounding_box().map(|b| b.center()))
            }
        }
    }
}

impl ElementBuilder for PlaceBuilder {
    fn build(
        &self,
        record: &GeometryRecord,
        style: &AttributeSet,
        ctx: &BuildContext<'_>,
    ) -> Result<Option<Element>, ElementError> {
        let anchor = Self::anchor(&record.geometry).ok_or_else(|| ElementError::Unsupported {
            builder: Self::NAME.to_string(),
            reason: "record has no vertices".to_string(),
        })?;
        if !ctx.owns(&anchor) {
            return Ok(None);
        }

        let mut tokens = style_tokens(Self::NAME, style);
        if let Some(label) = style.get("label-tag").and_then(|key| record.tags.get(key)) {
            tokens.push(format!("label={}", label));
        }
        Ok(Some(element(record, ctx, &[anchor], tokens)))
    }
}

fn line_midpoint(points: &[Point]) -> Option<Point> {
    let first = *points.first()?;
    let length: f64 = points.windows(2).map(|w| distance(w[0], w[1])).sum();
    if length == 0.0 {
        return Some(first);
    }

    let mut remaining = length / 2.0;
    for w in points.windows(2) {
        let d = distance(w[0], w[1]);
        if d >= remaining && d > 0.0 {
            let t = remaining / d;
            return Some(Point::new(w[0].x + (w[1].x - w[0].x) * t, w[0].y + (w[1].y - w[0].y) * t));
        }
        remaining -= d;
    }
    points.last().copied()
}

fn distance(a: Point, b: Point) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}

fn ring_centroid(ring: &[Point]) -> Option<Point> {
    let area = signed_area(ring);
    if area == 0.0 {
        return None;
    }
    let (mut cx, mut cy) = (0.0, 0.0);
    for (a, b) in ring.iter().zip(ring.iter().cycle().skip(1)) {
        let cross = a.x * b.y - b.x * a.y;
        cx += (a.x + b.x) * cross;
        cy += (a.y + b.y) * cross;
    }
    Some(Point::new(cx / (6.0 * area), cy / (6.0 * area)))
}

/// Passes the record's vertices through, clipped to the tile
///
/// Points are emitted by their owning tile only.
#[derive(Debug, Clone)]
pub struct GenericBuilder {
    name: String,
}

impl GenericBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ElementBuilder for GenericBuilder {
    fn build(
        &self,
        record: &GeometryRecord,
        style: &AttributeSet,
        ctx: &BuildContext<'_>,
    ) -> Result<Option<Element>, ElementError> {
        if record.geometry.vertex_count() == 0 {
            return Err(ElementError::Unsupported {
                builder: self.name.clone(),
                reason: "record has no vertices".to_string(),
            });
        }
        let points: Vec<Point> = match &record.geometry {
            Geometry::Point(p) if ctx.owns(p) => vec![*p],
            Geometry::Point(_) => Vec::new(),
            geometry => clip_geometry(geometry, &ctx.quadkey.bounding_box())
                .iter()
                .flat_map(|part| part.vertices().copied().collect::<Vec<_>>())
                .collect(),
        };
        if points.is_empty() {
            return Ok(None);
        }
        Ok(Some(element(record, ctx, &points, style_tokens(&self.name, style))))
    }
}
