//! JSON-RPC server over stdio exposing a `MapContext`
//!
//! # Module Structure
//! - `protocol` - JSON-RPC request/response types and error codes
//! - `state` - The configured context owned by the server
//! - `encoding` - Base64 little-endian mesh and element buffers
//! - `handlers` - One handler per method

pub mod encoding;
pub mod handlers;
pub mod protocol;
pub mod state;

pub use handlers::{handle_line, handle_request};
pub use protocol::{error_codes, ErrorResponse, Request, Response};
pub use state::ServerState;
