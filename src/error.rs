/// Coarse classification of a [`CtGovError`], for callers that branch on
/// failure type rather than on the concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected locally before any network call.
    InvalidInput,
    /// DNS, connect, or timeout failure. The caller may retry.
    Transport,
    /// Non-2xx status, JSON error envelope, or unexpected response shape.
    Remote,
    /// Lookup of an identifier the service does not know.
    NotFound,
    /// Local rendering or serialization failure.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Transport => "transport",
            Self::Remote => "remote",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum CtGovError {
    #[error("HTTP client initialization failed: {0}")]
    HttpClientInit(reqwest::Error),

    #[error("Request to {api} timed out")]
    Timeout { api: String },

    #[error("Transport error contacting {api}: {source}")]
    Transport {
        api: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    #[error("API error from {api}: {message}")]
    Api {
        api: String,
        status: Option<u16>,
        message: String,
    },

    #[error("API JSON error from {api}: {source}")]
    ApiJson {
        api: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{entity} '{id}' not found.\n\n{suggestion}")]
    NotFound {
        entity: String,
        id: String,
        suggestion: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CtGovError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidInput,
            Self::HttpClientInit(_)
            | Self::Timeout { .. }
            | Self::Transport { .. }
            | Self::Http(_)
            | Self::HttpMiddleware(_) => ErrorKind::Transport,
            Self::Api { .. } | Self::ApiJson { .. } => ErrorKind::Remote,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Template(_) | Self::Json(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status reported by the remote service, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            Self::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
