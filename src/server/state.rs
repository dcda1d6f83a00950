//! Server state

use crate::context::MapContext;

/// The configured context, if any; `Configure` replaces it and `Cleanup`
/// releases it
#[derive(Default)]
pub struct ServerState {
    pub context: Option<MapContext>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        self.context.is_some()
    }
}
