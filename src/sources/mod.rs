//! Source client and shared HTTP utilities for the ClinicalTrials.gov API.

use std::borrow::Cow;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use tracing::warn;

use crate::error::CtGovError;

pub(crate) mod clinicaltrials;
pub(crate) mod rate_limit;

const ERROR_BODY_MAX_BYTES: usize = 2048;
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_PAGE_SIZE: usize = 20;
pub(crate) const MAX_PAGE_SIZE: usize = 1000;

pub(crate) const CTGOV_BASE: &str = "https://clinicaltrials.gov/api/v2";
pub(crate) const CTGOV_BASE_ENV: &str = "CTGOV_BASE";
const CTGOV_TIMEOUT_ENV: &str = "CTGOV_TIMEOUT_SECS";
const CTGOV_PAGE_SIZE_ENV: &str = "CTGOV_PAGE_SIZE";

static HTTP_CLIENT: OnceLock<ClientWithMiddleware> = OnceLock::new();

/// Scalar overrides for the API client.
#[derive(Debug, Clone)]
pub(crate) struct ClientSettings {
    pub base: Cow<'static, str>,
    pub timeout: Duration,
    pub default_page_size: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base: Cow::Borrowed(CTGOV_BASE),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ClientSettings {
    /// Reads `CTGOV_BASE`, `CTGOV_TIMEOUT_SECS`, and `CTGOV_PAGE_SIZE`.
    pub(crate) fn from_env() -> Self {
        let timeout = env_number::<u64>(CTGOV_TIMEOUT_ENV)
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let default_page_size = env_number::<usize>(CTGOV_PAGE_SIZE_ENV)
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        Self {
            base: env_base(CTGOV_BASE, CTGOV_BASE_ENV),
            timeout: Duration::from_secs(timeout),
            default_page_size,
        }
    }

    /// Applies a command-line timeout override, ignoring zero.
    pub(crate) fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs.filter(|s| *s > 0) {
            self.timeout = Duration::from_secs(secs);
        }
        self
    }
}

pub(crate) fn env_base(default: &'static str, env_var: &str) -> Cow<'static, str> {
    std::env::var(env_var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(Cow::Owned)
        .unwrap_or_else(|| Cow::Borrowed(default))
}

fn env_number<T: FromStr>(env_var: &str) -> Option<T> {
    let raw = std::env::var(env_var).ok()?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(env_var, value = raw, "Ignoring non-numeric environment override");
            None
        }
    }
}

fn build_client(timeout: Duration) -> Result<ClientWithMiddleware, CtGovError> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let base_client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .user_agent(concat!("ctgov-mcp/", env!("CARGO_PKG_VERSION")))
        .default_headers(default_headers)
        .build()
        .map_err(CtGovError::HttpClientInit)?;

    Ok(ClientBuilder::new(base_client)
        .with(rate_limit::RateLimitMiddleware::new())
        .build())
}

/// Returns an HTTP client with the politeness rate limiter and no retry layer.
///
/// Clients using the default timeout share one connection pool; any other
/// timeout gets its own client.
pub(crate) fn http_client(timeout: Duration) -> Result<ClientWithMiddleware, CtGovError> {
    if timeout != Duration::from_secs(DEFAULT_TIMEOUT_SECS) {
        return build_client(timeout);
    }

    if let Some(client) = HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    let client = build_client(timeout)?;
    match HTTP_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => HTTP_CLIENT.get().cloned().ok_or_else(|| CtGovError::Api {
            api: "http-client".into(),
            status: None,
            message: "Shared HTTP client initialization race".into(),
        }),
    }
}

/// Maps a low-level reqwest failure onto the transport taxonomy.
pub(crate) fn classify_reqwest_error(api: &str, err: reqwest::Error) -> CtGovError {
    if err.is_timeout() {
        return CtGovError::Timeout {
            api: api.to_string(),
        };
    }
    if err.is_connect() || err.is_request() || err.is_body() {
        return CtGovError::Transport {
            api: api.to_string(),
            source: err,
        };
    }
    CtGovError::Http(err)
}

pub(crate) fn classify_send_error(api: &str, err: reqwest_middleware::Error) -> CtGovError {
    match err {
        reqwest_middleware::Error::Reqwest(err) => classify_reqwest_error(api, err),
        other => CtGovError::HttpMiddleware(other),
    }
}

pub(crate) fn body_excerpt(bytes: &[u8]) -> String {
    let full = String::from_utf8_lossy(bytes);

    let truncated: &str = if full.len() > ERROR_BODY_MAX_BYTES {
        let mut end = ERROR_BODY_MAX_BYTES;
        while end > 0 && !full.is_char_boundary(end) {
            end -= 1;
        }
        &full[..end]
    } else {
        full.as_ref()
    };

    let mut s = truncated.trim().replace(['\n', '\r', '\t'], " ");
    if full.len() > ERROR_BODY_MAX_BYTES {
        s.push_str(" …");
    }
    s
}

/// Extracts the service's own error message from a JSON error envelope.
fn envelope_message(bytes: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    ["message", "error", "detail"].iter().find_map(|key| {
        value
            .get(*key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

/// Builds the classified error for a non-2xx response.
pub(crate) fn remote_error(api: &str, status: reqwest::StatusCode, body: &[u8]) -> CtGovError {
    let detail = envelope_message(body).unwrap_or_else(|| body_excerpt(body));
    let message = if detail.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {detail}")
    };
    CtGovError::Api {
        api: api.to_string(),
        status: Some(status.as_u16()),
        message,
    }
}

pub(crate) fn ensure_json_content_type(
    api: &str,
    content_type: Option<&HeaderValue>,
    body: &[u8],
) -> Result<(), CtGovError> {
    let Some(content_type) = content_type else {
        return Ok(());
    };

    let raw = match content_type.to_str() {
        Ok(v) => v.trim(),
        Err(_) => {
            warn!(
                source = api,
                "Response content-type header was not valid UTF-8; attempting JSON parse"
            );
            return Ok(());
        }
    };
    if raw.is_empty() {
        return Ok(());
    }

    let media_type = raw
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_ascii_lowercase();
    let is_html = matches!(media_type.as_str(), "text/html" | "application/xhtml+xml");
    if is_html {
        return Err(CtGovError::Api {
            api: api.to_string(),
            status: None,
            message: format!(
                "Unexpected HTML response (content-type: {raw}): {}",
                body_excerpt(body)
            ),
        });
    }

    let is_json = media_type == "application/json"
        || media_type == "text/json"
        || media_type.ends_with("+json");
    if !is_json {
        warn!(
            source = api,
            content_type = raw,
            "Unexpected non-JSON content type; attempting JSON parse for compatibility"
        );
    }

    Ok(())
}

pub(crate) async fn read_limited_body(
    mut resp: reqwest::Response,
    api: &str,
) -> Result<Vec<u8>, CtGovError> {
    let mut body: Vec<u8> = Vec::new();

    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|err| classify_reqwest_error(api, err))?
    {
        let next_len = body.len().saturating_add(chunk.len());
        if next_len > DEFAULT_MAX_BODY_BYTES {
            return Err(CtGovError::Api {
                api: api.to_string(),
                status: None,
                message: format!("Response body exceeded {DEFAULT_MAX_BODY_BYTES} bytes"),
            });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_json_content_type_rejects_html() {
        let err = ensure_json_content_type(
            "clinicaltrials.gov",
            Some(&HeaderValue::from_static("text/html; charset=utf-8")),
            b"<html><body>maintenance</body></html>",
        )
        .expect_err("html should be rejected");
        let msg = err.to_string();
        assert!(msg.contains("clinicaltrials.gov"));
        assert!(msg.contains("HTML"));
    }

    #[test]
    fn ensure_json_content_type_accepts_json() {
        let ok = ensure_json_content_type(
            "clinicaltrials.gov",
            Some(&HeaderValue::from_static("application/json; charset=utf-8")),
            b"{\"studies\":[]}",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn ensure_json_content_type_allows_non_json_compat_mode() {
        let ok = ensure_json_content_type(
            "clinicaltrials.gov",
            Some(&HeaderValue::from_static("text/plain")),
            b"{\"studies\":[]}",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn remote_error_prefers_envelope_message() {
        let err = remote_error(
            "clinicaltrials.gov",
            reqwest::StatusCode::BAD_REQUEST,
            br#"{"message":"unknown field 'foo'"}"#,
        );
        assert_eq!(err.status(), Some(400));
        let msg = err.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("unknown field 'foo'"));
    }

    #[test]
    fn remote_error_falls_back_to_body_excerpt() {
        let err = remote_error(
            "clinicaltrials.gov",
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
            b"upstream\nunavailable",
        );
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[test]
    fn body_excerpt_truncates_long_bodies() {
        let long = "x".repeat(ERROR_BODY_MAX_BYTES + 10);
        let excerpt = body_excerpt(long.as_bytes());
        assert!(excerpt.ends_with(" …"));
        assert!(excerpt.len() < long.len());
    }

    #[test]
    fn with_timeout_secs_ignores_zero() {
        let settings = ClientSettings::default().with_timeout_secs(Some(0));
        assert_eq!(settings.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let settings = ClientSettings::default().with_timeout_secs(Some(5));
        assert_eq!(settings.timeout, Duration::from_secs(5));
    }
}
