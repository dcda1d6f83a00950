//! Push-style consumers of tile artifacts

use crate::element::Element;
use crate::error::ExtractionError;
use crate::mesh::Mesh;

/// Receives artifacts as a tile request produces them
///
/// Each artifact is handed over once and owned by the sink from then on.
pub trait ArtifactSink {
    fn on_mesh(&mut self, mesh: Mesh);
    fn on_element(&mut self, element: Element);
    fn on_error(&mut self, error: ExtractionError);
}

/// Sink built from three closures, the shape of the callback interface
pub struct CallbackSink<M, E, R>
where
    M: FnMut(Mesh),
    E: FnMut(Element),
    R: FnMut(ExtractionError),
{
    on_mesh: M,
    on_element: E,
    on_error: R,
}

impl<M, E, R> CallbackSink<M, E, R>
where
    M: FnMut(Mesh),
    E: FnMut(Element),
    R: FnMut(ExtractionError),
{
    pub fn new(on_mesh: M, on_element: E, on_error: R) -> Self {
        Self {
            on_mesh,
            on_element,
            on_error,
        }
    }
}

impl<M, E, R> ArtifactSink for CallbackSink<M, E, R>
where
    M: FnMut(Mesh),
    E: FnMut(Element),
    R: FnMut(ExtractionError),
{
    fn on_mesh(&mut self, mesh: Mesh) {
        (self.on_mesh)(mesh)
    }

    fn on_element(&mut self, element: Element) {
        (self.on_element)(element)
    }

    fn on_error(&mut self, error: ExtractionError) {
        (self.on_error)(error)
    }
}

/// Collects everything in memory; used where a caller needs the whole tile
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub meshes: Vec<Mesh>,
    pub elements: Vec<Element>,
    pub errors: Vec<ExtractionError>,
}

impl ArtifactSink for CollectingSink {
    fn on_mesh(&mut self, mesh: Mesh) {
        self.meshes.push(mesh);
    }

    fn on_element(&mut self, element: Element) {
        self.elements.push(element);
    }

    fn on_error(&mut self, error: ExtractionError) {
        self.errors.push(error);
    }
}

/// Counts of what one tile request delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub meshes: usize,
    pub elements: usize,
    pub errors: usize,
}

impl ExtractionSummary {
    pub fn is_empty(&self) -> bool {
        self.meshes == 0 && self.elements == 0
    }
}
