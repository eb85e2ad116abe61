//! MCP server: the gateway's outward surface.
//!
//! - [`types`]: JSON-RPC 2.0 and MCP message types
//! - [`transport`]: line-delimited stdio serve loop
//! - [`tools`]: the seven tools and shared [`GatewayState`]

pub mod errors;
pub mod tools;
pub mod transport;
pub mod types;

pub use errors::{ToolError, TransportError};
pub use tools::GatewayState;
pub use transport::{serve_stdio, StdioServer};
