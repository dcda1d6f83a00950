//! Error taxonomy for ingestion, styling and tile extraction
//!
//! Structural errors (`ConfigError`, `ParseError`, `StyleError`, an invalid
//! quadkey) abort the call that raised them. Per-record errors (`IngestError`,
//! `MeshError`, `ElementError`, a missing builder) are reported through the
//! caller's error channel and only skip the offending record or match.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal start-up errors; the context is never created
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{kind} directory does not exist: {}", path.display())]
    MissingDirectory { kind: &'static str, path: PathBuf },

    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A single record rejected during ingestion
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IngestError {
    #[error("record {} has empty geometry", display_id(*id))]
    EmptyGeometry { id: Option<u64> },

    #[error("record {} has malformed geometry: {reason}", display_id(*id))]
    Malformed { id: Option<u64>, reason: String },
}

fn display_id(id: Option<u64>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "<no id>".to_string())
}

/// Source file could not be turned into geometry records
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error("unsupported data format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },
}

impl ParseError {
    pub(crate) fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ParseError::Format {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Malformed stylesheet or style value
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("failed to read stylesheet {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stylesheet syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("invalid value for '{key}': '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Invalid tile coordinate or LOD span
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QuadKeyError {
    #[error("quadkey ({x}, {y}) is outside lod {lod}")]
    OutOfRange { x: u32, y: u32, lod: u8 },

    #[error("invalid lod range [{start}, {end}]")]
    InvalidLodRange { start: u8, end: u8 },
}

/// Failure to tessellate one record
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("degenerate geometry: {reason}")]
    Degenerate { reason: String },

    #[error("triangulation produced no triangles")]
    EmptyTriangulation,

    #[error(transparent)]
    Style(#[from] StyleError),
}

/// Failure inside an element builder
#[derive(Debug, Error)]
pub enum ElementError {
    #[error("builder '{builder}' cannot handle record: {reason}")]
    Unsupported { builder: String, reason: String },
}

/// Errors surfaced while extracting one tile
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    InvalidQuadKey(#[from] QuadKeyError),

    #[error("no element builder registered for '{name}'")]
    BuilderNotFound { name: String },

    #[error("mesh for record {id} failed: {source}")]
    Mesh {
        id: u64,
        #[source]
        source: MeshError,
    },

    #[error("element for record {id} failed: {source}")]
    Element {
        id: u64,
        #[source]
        source: ElementError,
    },
}

impl ExtractionError {
    /// True when the whole tile request failed, not just one record
    pub fn is_structural(&self) -> bool {
        matches!(self, ExtractionError::InvalidQuadKey(_))
    }
}

/// Structural failure of a `MapContext` call
#[derive(Debug, Error)]
pub enum MapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Style(#[from] StyleError),

    #[error(transparent)]
    QuadKey(#[from] QuadKeyError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_error_messages() {
        let err = IngestError::EmptyGeometry { id: Some(7) };
        assert_eq!(err.to_string(), "record 7 has empty geometry");

        let err = IngestError::Malformed { id: None, reason: "nan".into() };
        assert_eq!(err.to_string(), "record <no id> has malformed geometry: nan");
    }

    #[test]
    fn test_structural_classification() {
        let err = ExtractionError::from(QuadKeyError::OutOfRange { x: 4, y: 0, lod: 1 });
        assert!(err.is_structural());

        let err = ExtractionError::BuilderNotFound { name: "place".into() };
        assert!(!err.is_structural());
        assert_eq!(err.to_string(), "no element builder registered for 'place'");
    }
}
