//! ESRI shapefile (`.shp` + sibling `.dbf`) reader
//!
//! Only the XY part of each shape is kept; Z and M values are skipped.
//! Shapefiles carry no feature ids, so each record is identified by its
//! 1-based record number. Counts read from the file are checked against the
//! record length before anything is allocated.

use crate::error::ParseError;
use crate::geo::{point_in_ring, signed_area, Geometry, GeometryRecord, Point, TagSet};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};

const SHP_FILE_CODE: i32 = 9994;
const SHP_HEADER_LEN: u64 = 100;
const DBF_TERMINATOR: u8 = 0x0D;

/// Base shape categories after folding Z/M variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeType {
    Null,
    Point,
    PolyLine,
    Polygon,
    MultiPoint,
}

impl ShapeType {
    fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => ShapeType::Null,
            1 | 11 | 21 => ShapeType::Point,
            3 | 13 | 23 => ShapeType::PolyLine,
            5 | 15 | 25 => ShapeType::Polygon,
            8 | 18 | 28 => ShapeType::MultiPoint,
            _ => return None,
        })
    }
}

pub fn parse_shapefile(path: &Path) -> Result<Vec<GeometryRecord>, ParseError> {
    let shp = read_file(path)?;
    let dbf_path = path.with_extension("dbf");
    let attributes = if dbf_path.exists() {
        let dbf = read_file(&dbf_path)?;
        parse_dbf(&dbf).map_err(|m| ParseError::format(&dbf_path, m))?
    } else {
        debug!(path = %path.display(), "No attribute table next to shapefile");
        Vec::new()
    };
    let shapes = parse_shp(&shp).map_err(|m| ParseError::format(path, m))?;

    if !attributes.is_empty() && attributes.len() != shapes.len() {
        warn!(
            shapes = shapes.len(),
            rows = attributes.len(),
            "Shapefile and attribute table disagree on record count"
        );
    }

    let mut records = Vec::new();
    for (index, (number, geometries)) in shapes.into_iter().enumerate() {
        let tags = attributes.get(index).cloned().unwrap_or_default();
        for geometry in geometries {
            records.push(GeometryRecord::new(Some(number), tags.clone(), geometry));
        }
    }
    Ok(records)
}

fn read_file(path: &Path) -> Result<Vec<u8>, ParseError> {
    std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode every shape record into its record number and geometries
fn parse_shp(bytes: &[u8]) -> Result<Vec<(u64, Vec<Geometry>)>, String> {
    let mut cursor = Cursor::new(bytes);
    let io = |e: std::io::Error| format!("truncated shapefile: {}", e);

    let code = cursor.read_i32::<BigEndian>().map_err(io)?;
    if code != SHP_FILE_CODE {
        return Err(format!("bad file code {}", code));
    }
    cursor.seek(SeekFrom::Start(32)).map_err(io)?;
    let file_type = cursor.read_i32::<LittleEndian>().map_err(io)?;
    if ShapeType::from_code(file_type).is_none() {
        return Err(format!("unsupported shape type {}", file_type));
    }
    cursor.seek(SeekFrom::Start(SHP_HEADER_LEN)).map_err(io)?;

    let mut shapes = Vec::new();
    while (cursor.position() as usize) + 8 <= bytes.len() {
        let number = cursor.read_i32::<BigEndian>().map_err(io)?;
        let content_words = cursor.read_i32::<BigEndian>().map_err(io)?;
        let start = cursor.position();
        let end = start + (content_words.max(0) as u64) * 2;
        if end as usize > bytes.len() {
            return Err(format!("record {} runs past end of file", number));
        }
        if end < start + 4 {
            return Err(format!("record {} is too short for a shape type", number));
        }
        let number = u64::try_from(number)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| format!("invalid record number {}", number))?;

        let code = cursor.read_i32::<LittleEndian>().map_err(io)?;
        let shape = ShapeType::from_code(code)
            .ok_or_else(|| format!("record {} has unsupported shape type {}", number, code))?;
        let content = &bytes[cursor.position() as usize..end as usize];
        let geometries = read_shape(&mut Cursor::new(content), shape)
            .map_err(|e| format!("record {}: {}", number, e))?;
        shapes.push((number, geometries));
        cursor.seek(SeekFrom::Start(end)).map_err(io)?;
    }
    Ok(shapes)
}

fn read_point(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Point> {
    let x = cursor.read_f64::<LittleEndian>()?;
    let y = cursor.read_f64::<LittleEndian>()?;
    Ok(Point::new(x, y))
}

/// Fail unless `needed` bytes remain in the record content
fn ensure_remaining(cursor: &Cursor<&[u8]>, needed: u64) -> Result<(), String> {
    let remaining = (cursor.get_ref().len() as u64).saturating_sub(cursor.position());
    if needed > remaining {
        return Err(format!("needs {} bytes but only {} remain in the record", needed, remaining));
    }
    Ok(())
}

fn read_count(cursor: &mut Cursor<&[u8]>) -> Result<u64, String> {
    let value = cursor
        .read_i32::<LittleEndian>()
        .map_err(|e| format!("truncated shape: {}", e))?;
    u64::try_from(value).map_err(|_| format!("negative count {}", value))
}

/// Decode one shape from its record content (after the shape type)
fn read_shape(cursor: &mut Cursor<&[u8]>, shape: ShapeType) -> Result<Vec<Geometry>, String> {
    let io = |e: std::io::Error| format!("truncated shape: {}", e);
    match shape {
        ShapeType::Null => Ok(Vec::new()),
        ShapeType::Point => Ok(vec![Geometry::Point(read_point(cursor).map_err(io)?)]),
        ShapeType::MultiPoint => {
            cursor.seek(SeekFrom::Current(32)).map_err(io)?;
            let num_points = read_count(cursor)?;
            ensure_remaining(cursor, num_points * 16)?;
            (0..num_points)
                .map(|_| read_point(cursor).map(Geometry::Point).map_err(io))
                .collect()
        }
        ShapeType::PolyLine | ShapeType::Polygon => {
            cursor.seek(SeekFrom::Current(32)).map_err(io)?;
            let num_parts = read_count(cursor)?;
            let num_points = read_count(cursor)?;
            ensure_remaining(cursor, num_parts * 4 + num_points * 16)?;
            let (num_parts, num_points) = (num_parts as usize, num_points as usize);
            let mut starts = Vec::with_capacity(num_parts);
            for _ in 0..num_parts {
                starts.push(cursor.read_i32::<LittleEndian>().map_err(io)?.max(0) as usize);
            }
            let mut points = Vec::with_capacity(num_points);
            for _ in 0..num_points {
                points.push(read_point(cursor).map_err(io)?);
            }

            let parts: Vec<Vec<Point>> = starts
                .iter()
                .enumerate()
                .map(|(i, &s)| {
                    let e = starts.get(i + 1).copied().unwrap_or(num_points).min(num_points);
                    points[s.min(e)..e].to_vec()
                })
                .collect();

            Ok(if shape == ShapeType::PolyLine {
                parts.into_iter().map(Geometry::Line).collect()
            } else {
                assemble_polygons(parts)
            })
        }
    }
}

/// Clockwise rings are outers and counter-clockwise rings are holes of the
/// outer that contains them
fn assemble_polygons(rings: Vec<Vec<Point>>) -> Vec<Geometry> {
    let mut outers: Vec<(Vec<Point>, Vec<Vec<Point>>)> = Vec::new();
    let mut holes = Vec::new();
    for ring in rings {
        if signed_area(&ring) <= 0.0 {
            outers.push((ring, Vec::new()));
        } else {
            holes.push(ring);
        }
    }

    for hole in holes {
        let owner = hole
            .first()
            .and_then(|p| outers.iter_mut().find(|(outer, _)| point_in_ring(p, outer)));
        match owner {
            Some((_, own)) => own.push(hole),
            // unowned counter-clockwise ring; keep it as a shape of its own
            None => outers.push((hole, Vec::new())),
        }
    }

    outers
        .into_iter()
        .map(|(outer, holes)| Geometry::polygon(outer, holes))
        .collect()
}

/// Decode dBASE rows into tag sets; keys are lowercased field names
fn parse_dbf(bytes: &[u8]) -> Result<Vec<TagSet>, String> {
    let mut cursor = Cursor::new(bytes);
    let io = |e: std::io::Error| format!("truncated attribute table: {}", e);

    cursor.seek(SeekFrom::Start(4)).map_err(io)?;
    let num_records = cursor.read_u32::<LittleEndian>().map_err(io)? as usize;
    let header_len = cursor.read_u16::<LittleEndian>().map_err(io)? as u64;
    let record_len = cursor.read_u16::<LittleEndian>().map_err(io)? as usize;
    let table_len = (bytes.len() as u64).saturating_sub(header_len);
    if num_records as u64 * record_len as u64 > table_len {
        return Err(format!(
            "{} rows of {} bytes do not fit in {} bytes",
            num_records, record_len, table_len
        ));
    }

    let mut fields: Vec<(String, usize)> = Vec::new();
    let mut offset = 32u64;
    while offset + 32 <= header_len {
        cursor.seek(SeekFrom::Start(offset)).map_err(io)?;
        let mut descriptor = [0u8; 32];
        cursor.read_exact(&mut descriptor[..1]).map_err(io)?;
        if descriptor[0] == DBF_TERMINATOR {
            break;
        }
        cursor.read_exact(&mut descriptor[1..]).map_err(io)?;
        let name_end = descriptor[..11].iter().position(|&b| b == 0).unwrap_or(11);
        let name = String::from_utf8_lossy(&descriptor[..name_end]).trim().to_lowercase();
        fields.push((name, descriptor[16] as usize));
        offset += 32;
    }

    let mut rows = Vec::with_capacity(num_records);
    for index in 0..num_records {
        let start = header_len as usize + index * record_len;
        let row = bytes
            .get(start..start + record_len)
            .ok_or_else(|| format!("row {} runs past end of file", index))?;
        if row.first() == Some(&b'*') {
            rows.push(TagSet::new());
            continue;
        }

        let mut tags = TagSet::new();
        let mut pos = 1;
        for (name, len) in &fields {
            let value = row
                .get(pos..pos + len)
                .ok_or_else(|| format!("row {} is shorter than its fields", index))?;
            let value = String::from_utf8_lossy(value).trim().to_string();
            if !value.is_empty() {
                tags.insert(name.as_str(), value);
            }
            pos += len;
        }
        rows.push(tags);
    }
    Ok(rows)
}
