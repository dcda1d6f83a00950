//! Wire form of mesh and element buffers
//!
//! Numeric buffers travel as base64 of their little-endian bytes, so a
//! client can view them directly as `Float64Array` / `Uint32Array`.

use crate::context::LoadedTile;
use crate::element::Element;
use crate::mesh::Mesh;
use base64::{engine::general_purpose, Engine as _};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

pub fn encode_f64s(data: &[f64]) -> String {
    let mut bytes = vec![0u8; data.len() * 8];
    LittleEndian::write_f64_into(data, &mut bytes);
    general_purpose::STANDARD.encode(bytes)
}

pub fn encode_u32s(data: &[u32]) -> String {
    let mut bytes = vec![0u8; data.len() * 4];
    LittleEndian::write_u32_into(data, &mut bytes);
    general_purpose::STANDARD.encode(bytes)
}

fn serialize_f64_base64<S: Serializer>(data: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&encode_f64s(data))
}

fn serialize_u32_base64<S: Serializer>(data: &[u32], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&encode_u32s(data))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshPayload<'a> {
    pub name: &'a str,
    #[serde(serialize_with = "serialize_f64_base64")]
    pub vertex_data: &'a [f64],
    pub vertex_count: usize,
    #[serde(serialize_with = "serialize_u32_base64")]
    pub index_data: &'a [u32],
    pub triangle_count: usize,
    #[serde(serialize_with = "serialize_u32_base64")]
    pub color_data: &'a [u32],
    pub color_count: usize,
}

impl<'a> From<&'a Mesh> for MeshPayload<'a> {
    fn from(mesh: &'a Mesh) -> Self {
        Self {
            name: &mesh.name,
            vertex_data: &mesh.vertices,
            vertex_count: mesh.vertex_count(),
            index_data: &mesh.triangles,
            triangle_count: mesh.triangle_count(),
            color_data: &mesh.colors,
            color_count: mesh.color_count(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementPayload<'a> {
    pub id: u64,
    pub tags: BTreeMap<&'a str, &'a str>,
    pub tag_count: usize,
    #[serde(serialize_with = "serialize_f64_base64")]
    pub vertex_data: &'a [f64],
    pub vertex_count: usize,
    pub style: &'a [String],
    pub style_count: usize,
}

impl<'a> From<&'a Element> for ElementPayload<'a> {
    fn from(element: &'a Element) -> Self {
        Self {
            id: element.id,
            tags: element.tags.iter().map(|t| (&*t.key, &*t.value)).collect(),
            tag_count: element.tags.len(),
            vertex_data: &element.vertices,
            vertex_count: element.vertex_count(),
            style: &element.style,
            style_count: element.style.len(),
        }
    }
}

/// Everything one tile produced, errors as messages
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TilePayload<'a> {
    pub x: u32,
    pub y: u32,
    pub lod: u8,
    pub meshes: Vec<MeshPayload<'a>>,
    pub elements: Vec<ElementPayload<'a>>,
    pub errors: Vec<String>,
}

impl<'a> From<&'a LoadedTile> for TilePayload<'a> {
    fn from(tile: &'a LoadedTile) -> Self {
        Self {
            x: tile.quadkey.x,
            y: tile.quadkey.y,
            lod: tile.quadkey.lod,
            meshes: tile.meshes.iter().map(MeshPayload::from).collect(),
            elements: tile.elements.iter().map(ElementPayload::from).collect(),
            errors: tile.errors.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::TagSet;

    fn decode(text: &str) -> Vec<u8> {
        general_purpose::STANDARD.decode(text).unwrap()
    }

    #[test]
    fn test_buffers_are_little_endian() {
        let bytes = decode(&encode_u32s(&[1, 0xAABBCCDD]));
        assert_eq!(bytes, vec![1, 0, 0, 0, 0xDD, 0xCC, 0xBB, 0xAA]);

        let bytes = decode(&encode_f64s(&[1.5]));
        assert_eq!(bytes, 1.5f64.to_le_bytes().to_vec());
    }

    #[test]
    fn test_mesh_payload_json() {
        let mesh = Mesh {
            name: "water".into(),
            vertices: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            triangles: vec![0, 1, 2],
            colors: vec![0x0000FFFF; 3],
        };
        let json = serde_json::to_value(MeshPayload::from(&mesh)).unwrap();
        assert_eq!(json["name"], "water");
        assert_eq!(json["vertexCount"], 3);
        assert_eq!(json["triangleCount"], 1);
        assert_eq!(json["colorCount"], 3);
        assert_eq!(decode(json["indexData"].as_str().unwrap()).len(), 12);
        assert_eq!(decode(json["vertexData"].as_str().unwrap()).len(), 72);
    }

    #[test]
    fn test_element_payload_json() {
        let tags: TagSet = [("place", "city"), ("name", "Berlin")].into_iter().collect();
        let element = Element {
            id: 7,
            tags,
            vertices: vec![13.4, 52.5, 34.0],
            style: vec!["builder=place".into(), "label=Berlin".into()],
        };
        let json = serde_json::to_value(ElementPayload::from(&element)).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["tags"]["name"], "Berlin");
        assert_eq!(json["tagCount"], 2);
        assert_eq!(json["vertexCount"], 1);
        assert_eq!(json["styleCount"], 2);
    }
}
