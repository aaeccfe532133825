//! Trial query and retrieval workflows used by the CLI and MCP tools.

pub(crate) mod trial;

/// One page of search results plus the service's continuation cursor.
#[derive(Debug, Clone, serde::Serialize)]
pub(crate) struct SearchPage<T> {
    pub results: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl<T> SearchPage<T> {
    pub(crate) fn cursor(
        results: Vec<T>,
        total: Option<usize>,
        next_page_token: Option<String>,
    ) -> Self {
        Self {
            results,
            total,
            next_page_token,
        }
    }
}
