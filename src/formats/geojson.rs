//! GeoJSON (`.geojson`/`.json`) reader
//!
//! Accepts a `FeatureCollection` or a single `Feature`. Multi-geometries
//! are split into one record per member, all sharing the feature's id and
//! properties. Altitudes in coordinates are ignored.

use crate::error::ParseError;
use crate::geo::{Geometry, GeometryRecord, Point, TagSet};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Document {
    FeatureCollection { features: Vec<Feature> },
    Feature(Feature),
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    geometry: Option<GeoJsonGeometry>,
}

type Position = Vec<f64>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonGeometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    GeometryCollection { geometries: Vec<GeoJsonGeometry> },
}

pub fn parse_geojson_file(path: &Path) -> Result<Vec<GeometryRecord>, ParseError> {
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_geojson_str(&text, path)
}

/// Parse GeoJSON text; `path` labels errors
pub fn parse_geojson_str(text: &str, path: &Path) -> Result<Vec<GeometryRecord>, ParseError> {
    let document: Document =
        serde_json::from_str(text).map_err(|e| ParseError::format(path, e.to_string()))?;
    let features = match document {
        Document::FeatureCollection { features } => features,
        Document::Feature(feature) => vec![feature],
    };

    let mut records = Vec::new();
    for (index, feature) in features.into_iter().enumerate() {
        let id = feature.id.as_ref().and_then(feature_id);
        let tags = feature.properties.as_ref().map(properties_to_tags).unwrap_or_default();
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let mut geometries = Vec::new();
        convert(geometry, &mut geometries)
            .map_err(|m| ParseError::format(path, format!("feature {}: {}", index, m)))?;
        records.extend(
            geometries
                .into_iter()
                .map(|g| GeometryRecord::new(id, tags.clone(), g)),
        );
    }
    Ok(records)
}

fn feature_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn properties_to_tags(properties: &Map<String, Value>) -> TagSet {
    properties
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.as_str(), value))
        })
        .collect()
}

fn position(p: &Position) -> Result<Point, String> {
    match p.as_slice() {
        [x, y, ..] => Ok(Point::new(*x, *y)),
        _ => Err(format!("position needs two coordinates, got {}", p.len())),
    }
}

fn positions(ps: &[Position]) -> Result<Vec<Point>, String> {
    ps.iter().map(position).collect()
}

fn polygon(rings: &[Vec<Position>]) -> Result<Geometry, String> {
    let (outer, holes) = rings.split_first().ok_or("polygon without rings")?;
    let holes: Vec<Vec<Point>> = holes.iter().map(|h| positions(h)).collect::<Result<_, _>>()?;
    Ok(Geometry::polygon(positions(outer)?, holes))
}

fn convert(geometry: GeoJsonGeometry, out: &mut Vec<Geometry>) -> Result<(), String> {
    match geometry {
        GeoJsonGeometry::Point { coordinates } => out.push(Geometry::Point(position(&coordinates)?)),
        GeoJsonGeometry::MultiPoint { coordinates } => {
            for p in &coordinates {
                out.push(Geometry::Point(position(p)?));
            }
        }
        GeoJsonGeometry::LineString { coordinates } => out.push(Geometry::Line(positions(&coordinates)?)),
        GeoJsonGeometry::MultiLineString { coordinates } => {
            for line in &coordinates {
                out.push(Geometry::Line(positions(line)?));
            }
        }
        GeoJsonGeometry::Polygon { coordinates } => out.push(polygon(&coordinates)?),
        GeoJsonGeometry::MultiPolygon { coordinates } => {
            for rings in &coordinates {
                out.push(polygon(rings)?);
            }
        }
        GeoJsonGeometry::GeometryCollection { geometries } => {
            for g in geometries {
                convert(g, out)?;
            }
        }
    }
    Ok(())
}
