//! MCP server entrypoints for stdio and HTTP transports.

mod server;

/// Runs the ClinicalTrials.gov MCP server over stdio.
///
/// `timeout` overrides the per-request timeout in seconds.
///
/// # Errors
///
/// Returns an error when the HTTP client cannot be built or MCP server startup fails.
pub async fn run_stdio(timeout: Option<u64>) -> anyhow::Result<()> {
    let client = crate::cli::client_from_settings(timeout)?;
    server::run_stdio(client).await
}

/// Runs the ClinicalTrials.gov MCP server over HTTP with SSE transport.
///
/// Starts an HTTP server on `host:port` with:
/// - `GET /sse` for server-to-client messages
/// - `POST /message?sessionId=<id>` for client-to-server JSON-RPC messages
///
/// # Errors
///
/// Returns an error when TCP bind or server startup fails.
pub async fn run_http(host: &str, port: u16, timeout: Option<u64>) -> anyhow::Result<()> {
    let client = crate::cli::client_from_settings(timeout)?;
    server::run_http(client, host, port).await
}
