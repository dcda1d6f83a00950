//! Source file readers producing `GeometryRecord`s
//!
//! # Submodules
//! - `osm_xml` - OSM XML nodes, ways and multipolygon relations
//! - `shapefile` - ESRI shapefiles with their dBASE attribute tables
//! - `geojson` - GeoJSON features

mod geojson;
mod osm_xml;
mod shapefile;

pub use geojson::{parse_geojson_file, parse_geojson_str};
pub use osm_xml::{parse_osm_file, parse_osm_reader};
pub use shapefile::parse_shapefile;

use crate::error::ParseError;
use crate::geo::GeometryRecord;
use std::path::Path;
use tracing::info;

/// Pick a reader by file extension and parse the whole file
pub fn parse_file(path: &Path) -> Result<Vec<GeometryRecord>, ParseError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let records = match extension.as_str() {
        "osm" | "xml" => parse_osm_file(path)?,
        "shp" => parse_shapefile(path)?,
        "geojson" | "json" => parse_geojson_file(path)?,
        _ => {
            return Err(ParseError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };
    info!(path = %path.display(), records = records.len(), "Parsed source file");
    Ok(records)
}
