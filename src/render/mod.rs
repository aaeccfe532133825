//! Output renderers for CLI and MCP responses.

pub(crate) mod json;
pub(crate) mod markdown;
