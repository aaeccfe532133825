use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::error::CtGovError;

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthRow {
    pub api: String,
    pub status: String,
    pub latency: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub healthy: usize,
    pub total: usize,
    pub rows: Vec<HealthRow>,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.healthy == self.total
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# ClinicalTrials.gov Health Check\n\n");
        out.push_str("| API | Status | Latency |\n");
        out.push_str("|-----|--------|---------|\n");
        for row in &self.rows {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                row.api, row.status, row.latency
            ));
        }
        out.push_str(&format!(
            "\nStatus: {}/{} endpoints healthy\n",
            self.healthy, self.total
        ));
        out
    }
}

async fn check_one(client: reqwest::Client, api: &str, url: &str) -> HealthRow {
    let start = Instant::now();
    let resp = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await;

    match resp {
        Ok(resp) => {
            let status = resp.status();
            let elapsed = start.elapsed().as_millis();
            if status.is_success() {
                HealthRow {
                    api: api.to_string(),
                    status: "ok".into(),
                    latency: format!("{elapsed}ms"),
                }
            } else {
                HealthRow {
                    api: api.to_string(),
                    status: "error".into(),
                    latency: format!("{elapsed}ms (HTTP {})", status.as_u16()),
                }
            }
        }
        Err(err) => {
            let reason = if err.is_timeout() {
                "timeout"
            } else if err.is_connect() {
                "connect"
            } else {
                "error"
            };
            HealthRow {
                api: api.to_string(),
                status: "error".into(),
                latency: reason.into(),
            }
        }
    }
}

fn health_http_client() -> Result<reqwest::Client, CtGovError> {
    static HEALTH_HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

    if let Some(client) = HEALTH_HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("ctgov-mcp/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(CtGovError::HttpClientInit)?;

    match HEALTH_HTTP_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => HEALTH_HTTP_CLIENT
            .get()
            .cloned()
            .ok_or_else(|| CtGovError::Api {
                api: "health".into(),
                status: None,
                message: "Health HTTP client initialization race".into(),
            }),
    }
}

async fn check_base(base: &str) -> Result<HealthReport, CtGovError> {
    let client = health_http_client()?;
    let base = base.trim_end_matches('/');

    let version_url = format!("{base}/version");
    let search_url = format!("{base}/studies?query.term=cancer&pageSize=1");
    let (version, search) = tokio::join!(
        check_one(client.clone(), "API version", &version_url),
        check_one(client.clone(), "Study search", &search_url),
    );

    let rows = vec![version, search];
    let healthy = rows.iter().filter(|r| r.status == "ok").count();
    Ok(HealthReport {
        healthy,
        total: rows.len(),
        rows,
    })
}

/// Runs connectivity checks against the configured ClinicalTrials.gov base URL.
///
/// # Errors
///
/// Returns an error when the health HTTP client cannot be created.
pub async fn check() -> Result<HealthReport, CtGovError> {
    let base =
        crate::sources::env_base(crate::sources::CTGOV_BASE, crate::sources::CTGOV_BASE_ENV);
    check_base(&base).await
}
