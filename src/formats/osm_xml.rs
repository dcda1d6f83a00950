//! OSM XML (`.osm`/`.xml`) reader
//!
//! Tagged nodes become points, ways become lines or polygons, and
//! `type=multipolygon` relations become polygons assembled from their
//! member ways. Untagged nodes only supply way coordinates.

use crate::error::ParseError;
use crate::geo::{Geometry, GeometryRecord, Point, TagSet};
use quick_xml::events::attributes::Attributes;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Keys whose presence makes a closed way an area
const AREA_KEYS: &[&str] = &["building", "landuse", "natural", "leisure", "amenity", "water"];

pub fn parse_osm_file(path: &Path) -> Result<Vec<GeometryRecord>, ParseError> {
    let file = File::open(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_osm_reader(BufReader::new(file), path)
}

struct OsmWay {
    id: u64,
    refs: Vec<u64>,
    tags: Vec<(String, String)>,
}

struct OsmRelation {
    id: u64,
    members: Vec<(u64, String)>,
    tags: Vec<(String, String)>,
}

enum Open {
    Node { id: u64, point: Point, tags: Vec<(String, String)> },
    Way(OsmWay),
    Relation(OsmRelation),
}

#[derive(Default)]
struct OsmDocument {
    nodes: HashMap<u64, Point>,
    tagged_nodes: Vec<(u64, Point, Vec<(String, String)>)>,
    ways: Vec<OsmWay>,
    relations: Vec<OsmRelation>,
}

/// Parse OSM XML from any buffered reader; `path` labels errors
pub fn parse_osm_reader<R: BufRead>(source: R, path: &Path) -> Result<Vec<GeometryRecord>, ParseError> {
    let mut reader = Reader::from_reader(source);
    reader.trim_text(true);

    let fail = |reader: &Reader<R>, message: String| {
        ParseError::format(path, format!("{} (at byte {})", message, reader.buffer_position()))
    };

    let mut doc = OsmDocument::default();
    let mut current: Option<Open> = None;
    let mut saw_root = false;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| fail(&reader, e.to_string()))?;
        match event {
            Event::Start(start) | Event::Empty(start) if !saw_root => {
                if start.name().as_ref() != b"osm" {
                    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                    return Err(fail(&reader, format!("expected <osm> root, found <{}>", name)));
                }
                saw_root = true;
            }
            Event::Start(start) => {
                if let Some(open) = open_element(&start).map_err(|m| fail(&reader, m))? {
                    current = Some(open);
                }
            }
            Event::Empty(start) => match start.name().as_ref() {
                b"tag" | b"nd" | b"member" => {
                    child_element(&start, current.as_mut()).map_err(|m| fail(&reader, m))?
                }
                _ => {
                    if let Some(open) = open_element(&start).map_err(|m| fail(&reader, m))? {
                        doc.close(open);
                    }
                }
            },
            Event::End(end) => {
                if matches!(end.name().as_ref(), b"node" | b"way" | b"relation") {
                    if let Some(open) = current.take() {
                        doc.close(open);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(ParseError::format(path, "document has no <osm> element"));
    }
    Ok(doc.into_records())
}

fn open_element(start: &BytesStart<'_>) -> Result<Option<Open>, String> {
    let attrs = attribute_map(start.attributes())?;
    let id = || -> Result<u64, String> {
        attrs
            .get("id")
            .ok_or_else(|| "element without id".to_string())?
            .parse::<i64>()
            .map(|v| v.unsigned_abs())
            .map_err(|e| format!("bad id: {}", e))
    };
    let coord = |key: &str| -> Result<f64, String> {
        attrs
            .get(key)
            .ok_or_else(|| format!("node without {}", key))?
            .parse::<f64>()
            .map_err(|e| format!("bad {}: {}", key, e))
    };

    Ok(match start.name().as_ref() {
        b"node" => Some(Open::Node {
            id: id()?,
            point: Point::new(coord("lon")?, coord("lat")?),
            tags: Vec::new(),
        }),
        b"way" => Some(Open::Way(OsmWay { id: id()?, refs: Vec::new(), tags: Vec::new() })),
        b"relation" => Some(Open::Relation(OsmRelation {
            id: id()?,
            members: Vec::new(),
            tags: Vec::new(),
        })),
        _ => None,
    })
}

fn child_element(start: &BytesStart<'_>, parent: Option<&mut Open>) -> Result<(), String> {
    let Some(parent) = parent else {
        return Ok(());
    };
    let mut attrs = attribute_map(start.attributes())?;
    match (start.name().as_ref(), parent) {
        (b"tag", Open::Node { tags, .. })
        | (b"tag", Open::Way(OsmWay { tags, .. }))
        | (b"tag", Open::Relation(OsmRelation { tags, .. })) => {
            if let (Some(k), Some(v)) = (attrs.remove("k"), attrs.remove("v")) {
                tags.push((k, v));
            }
        }
        (b"nd", Open::Way(way)) => {
            let node: u64 = attrs
                .get("ref")
                .ok_or("nd without ref")?
                .parse()
                .map_err(|e| format!("bad nd ref: {}", e))?;
            way.refs.push(node);
        }
        (b"member", Open::Relation(rel)) => {
            if attrs.get("type").map(String::as_str) == Some("way") {
                let member: u64 = attrs
                    .get("ref")
                    .ok_or("member without ref")?
                    .parse()
                    .map_err(|e| format!("bad member ref: {}", e))?;
                let role = attrs.remove("role").unwrap_or_default();
                rel.members.push((member, role));
            }
        }
        _ => {}
    }
    Ok(())
}

fn attribute_map(attributes: Attributes<'_>) -> Result<HashMap<String, String>, String> {
    let mut map = HashMap::new();
    for attr in attributes {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

impl OsmDocument {
    fn close(&mut self, open: Open) {
        match open {
            Open::Node { id, point, tags } => {
                self.nodes.insert(id, point);
                if !tags.is_empty() {
                    self.tagged_nodes.push((id, point, tags));
                }
            }
            Open::Way(way) => self.ways.push(way),
            Open::Relation(rel) => self.relations.push(rel),
        }
    }

    fn resolve(&self, refs: &[u64]) -> Vec<Point> {
        refs.iter().filter_map(|r| self.nodes.get(r).copied()).collect()
    }

    fn into_records(self) -> Vec<GeometryRecord> {
        let mut records = Vec::new();

        for (id, point, tags) in &self.tagged_nodes {
            records.push(GeometryRecord::new(Some(*id), to_tags(tags), Geometry::Point(*point)));
        }

        for way in self.ways.iter().filter(|w| !w.tags.is_empty()) {
            let points = self.resolve(&way.refs);
            if points.len() < way.refs.len() {
                debug!(way = way.id, missing = way.refs.len() - points.len(), "Way references unknown nodes");
            }
            let closed = way.refs.len() >= 4 && way.refs.first() == way.refs.last();
            let geometry = if closed && is_area(&way.tags) {
                Geometry::polygon(points, vec![])
            } else {
                Geometry::Line(points)
            };
            records.push(GeometryRecord::new(Some(way.id), to_tags(&way.tags), geometry));
        }

        let ways_by_id: HashMap<u64, &OsmWay> = self.ways.iter().map(|w| (w.id, w)).collect();
        for rel in &self.relations {
            let multipolygon = rel.tags.iter().any(|(k, v)| k == "type" && v == "multipolygon");
            if !multipolygon {
                continue;
            }
            let chains = |role: &str| -> Vec<Vec<u64>> {
                let parts = rel
                    .members
                    .iter()
                    .filter(|(_, r)| r == role || (role == "outer" && r.is_empty()))
                    .filter_map(|(id, _)| ways_by_id.get(id).map(|w| w.refs.clone()))
                    .collect();
                join_rings(parts)
            };
            let holes: Vec<Vec<Point>> = chains("inner").iter().map(|r| self.resolve(r)).collect();
            let tags: Vec<(String, String)> =
                rel.tags.iter().filter(|(k, _)| k != "type").cloned().collect();

            // one record per outer ring; every hole goes with each outer it falls inside
            for outer in chains("outer") {
                let outer = self.resolve(&outer);
                let own_holes = holes
                    .iter()
                    .filter(|h| h.first().is_some_and(|p| crate::geo::point_in_ring(p, &outer)))
                    .cloned()
                    .collect();
                records.push(GeometryRecord::new(
                    Some(rel.id),
                    to_tags(&tags),
                    Geometry::polygon(outer, own_holes),
                ));
            }
        }

        records
    }
}

/// `area=yes` forces an area and `area=no` forbids one; otherwise an area key
/// decides, except for `natural=coastline`
fn is_area(tags: &[(String, String)]) -> bool {
    match tags.iter().find(|(k, _)| k == "area").map(|(_, v)| v.as_str()) {
        Some("yes") => return true,
        Some("no") => return false,
        _ => {}
    }
    tags.iter()
        .any(|(k, v)| AREA_KEYS.contains(&k.as_str()) && !(k == "natural" && v == "coastline"))
}

fn to_tags(tags: &[(String, String)]) -> TagSet {
    tags.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

/// Join open way chains end to end into closed rings
fn join_rings(mut parts: Vec<Vec<u64>>) -> Vec<Vec<u64>> {
    let mut rings = Vec::new();
    while let Some(mut ring) = parts.pop() {
        while ring.len() > 1 && ring.first() != ring.last() {
            let Some(tail) = ring.last().copied() else { break };
            let Some(pos) = parts
                .iter()
                .position(|p| p.first() == Some(&tail) || p.last() == Some(&tail))
            else {
                break;
            };
            let mut next = parts.swap_remove(pos);
            if next.first() != Some(&tail) {
                next.reverse();
            }
            ring.extend(next.into_iter().skip(1));
        }
        if ring.len() >= 4 && ring.first() == ring.last() {
            rings.push(ring);
        }
    }
    rings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeometryKind;

    fn parse(xml: &str) -> Result<Vec<GeometryRecord>, ParseError> {
        parse_osm_reader(xml.as_bytes(), Path::new("test.osm"))
    }

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6">
  <node id="1" lat="52.530" lon="13.387"/>
  <node id="2" lat="52.530" lon="13.390"/>
  <node id="3" lat="52.532" lon="13.390"/>
  <node id="4" lat="52.532" lon="13.387"/>
  <node id="5" lat="52.531" lon="13.389">
    <tag k="amenity" v="cafe"/>
    <tag k="name" v="Caf&#233; Berlin"/>
  </node>
  <way id="10">
    <nd ref="1"/><nd ref="2"/><nd ref="3"/><nd ref="4"/><nd ref="1"/>
    <tag k="building" v="yes"/>
  </way>
  <way id="11">
    <nd ref="1"/><nd ref="3"/>
    <tag k="highway" v="residential"/>
  </way>
  <way id="12">
    <nd ref="1"/><nd ref="2"/>
  </way>
</osm>"#;

    #[test]
    fn test_nodes_ways_and_areas() {
        let records = parse(SAMPLE).unwrap();
        assert_eq!(records.len(), 3);

        let cafe = &records[0];
        assert_eq!(cafe.id, Some(5));
        assert_eq!(cafe.kind(), GeometryKind::Point);
        assert_eq!(cafe.tags.get("name"), Some("Café Berlin"));

        let building = records.iter().find(|r| r.id == Some(10)).unwrap();
        assert_eq!(building.kind(), GeometryKind::Polygon);
        assert_eq!(building.geometry.vertex_count(), 4);

        let road = records.iter().find(|r| r.id == Some(11)).unwrap();
        assert_eq!(road.kind(), GeometryKind::Line);
    }

    #[test]
    fn test_area_detection_for_closed_ways() {
        let area = |tags: &[(&str, &str)]| {
            let tags: Vec<(String, String)> =
                tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            is_area(&tags)
        };
        assert!(area(&[("area", "yes"), ("highway", "pedestrian")]));
        assert!(area(&[("landuse", "forest")]));
        assert!(!area(&[("building", "yes"), ("area", "no")]));
        assert!(!area(&[("natural", "coastline")]));
        assert!(!area(&[("place", "island")]));
        assert!(!area(&[("boundary", "administrative")]));
        assert!(!area(&[("area", "maybe"), ("highway", "service")]));
    }

    #[test]
    fn test_multipolygon_relation() {
        let xml = r#"<osm>
  <node id="1" lat="0" lon="0"/><node id="2" lat="0" lon="4"/>
  <node id="3" lat="4" lon="4"/><node id="4" lat="4" lon="0"/>
  <node id="5" lat="1" lon="1"/><node id="6" lat="1" lon="2"/><node id="7" lat="2" lon="2"/>
  <way id="20"><nd ref="1"/><nd ref="2"/><nd ref="3"/></way>
  <way id="21"><nd ref="3"/><nd ref="4"/><nd ref="1"/></way>
  <way id="22"><nd ref="5"/><nd ref="6"/><nd ref="7"/><nd ref="5"/></way>
  <relation id="30">
    <member type="way" ref="20" role="outer"/>
    <member type="way" ref="21" role="outer"/>
    <member type="way" ref="22" role="inner"/>
    <tag k="type" v="multipolygon"/>
    <tag k="natural" v="water"/>
  </relation>
</osm>"#;
        let records = parse(xml).unwrap();
        assert_eq!(records.len(), 1);
        match &records[0].geometry {
            Geometry::Polygon { outer, holes } => {
                assert_eq!(outer.len(), 4);
                assert_eq!(holes.len(), 1);
            }
            other => panic!("expected polygon, got {:?}", other),
        }
        assert!(!records[0].tags.contains_key("type"));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(parse("<gpx></gpx>"), Err(ParseError::Format { .. })));
        assert!(matches!(parse(""), Err(ParseError::Format { .. })));
        assert!(parse(r#"<osm><node id="x" lat="1" lon="2"/></osm>"#).is_err());
        assert!(parse(r#"<osm><node id="1" lat="1"/></osm>"#).is_err());
    }
}
