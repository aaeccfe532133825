use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use http::Extensions;
use reqwest::Url;
use reqwest_middleware::{Middleware, Next};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

// ClinicalTrials.gov asks clients to stay around 50 requests per minute.
const CTGOV_MIN_INTERVAL: Duration = Duration::from_millis(1200);
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub(crate) struct RateLimitPolicy {
    pub key: &'static str,
    pub prefix: Cow<'static, str>,
    pub min_interval: Duration,
}

/// Spaces out request starts per API prefix. Requests are delayed, never
/// retried; the wait counts against the caller's request timeout.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    policies: Vec<RateLimitPolicy>,
    default_min_interval: Duration,
    last_seen: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub(crate) fn from_env() -> Self {
        let policies = vec![RateLimitPolicy {
            key: "clinicaltrials",
            prefix: crate::sources::env_base(
                crate::sources::CTGOV_BASE,
                crate::sources::CTGOV_BASE_ENV,
            ),
            min_interval: CTGOV_MIN_INTERVAL,
        }];
        Self::new(policies, DEFAULT_MIN_INTERVAL)
    }

    pub(crate) fn new(policies: Vec<RateLimitPolicy>, default_min_interval: Duration) -> Self {
        Self {
            policies,
            default_min_interval,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    fn resolve_key_and_interval(&self, url: &Url) -> (String, Duration) {
        let full = url.as_str();

        if let Some(policy) = self
            .policies
            .iter()
            .filter(|p| full.starts_with(p.prefix.as_ref()))
            .max_by_key(|p| p.prefix.len())
        {
            return (format!("policy:{}", policy.key), policy.min_interval);
        }

        let origin = match url.port() {
            Some(port) => format!(
                "{}://{}:{port}",
                url.scheme(),
                url.host_str().unwrap_or("unknown-host")
            ),
            None => format!(
                "{}://{}",
                url.scheme(),
                url.host_str().unwrap_or("unknown-host")
            ),
        };
        (format!("default:{origin}"), self.default_min_interval)
    }

    pub(crate) async fn wait_for_url(&self, url: &Url) {
        let (key, min_interval) = self.resolve_key_and_interval(url);
        loop {
            let now = Instant::now();
            let mut map = self.last_seen.lock().await;
            let wait_until = map.get(&key).map(|last| *last + min_interval);

            match wait_until {
                Some(target) if target > now => {
                    drop(map);
                    sleep_until(target).await;
                }
                _ => {
                    map.insert(key, now);
                    return;
                }
            }
        }
    }

    #[cfg(test)]
    fn resolve_key_for_str(&self, raw: &str) -> Option<String> {
        let url = Url::parse(raw).ok()?;
        Some(self.resolve_key_and_interval(&url).0)
    }
}

static GLOBAL_RATE_LIMITER: OnceLock<Arc<RateLimiter>> = OnceLock::new();

pub(crate) fn global_limiter() -> Arc<RateLimiter> {
    GLOBAL_RATE_LIMITER
        .get_or_init(|| Arc::new(RateLimiter::from_env()))
        .clone()
}

#[derive(Clone, Debug)]
pub(crate) struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub(crate) fn new() -> Self {
        Self {
            limiter: global_limiter(),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        self.limiter.wait_for_url(req.url()).await;
        next.run(req, extensions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_policy(key: &'static str, prefix: &str, ms: u64) -> RateLimitPolicy {
        RateLimitPolicy {
            key,
            prefix: Cow::Owned(prefix.to_string()),
            min_interval: Duration::from_millis(ms),
        }
    }

    #[tokio::test]
    async fn rate_limit_blocks_second_request_for_same_prefix() {
        let limiter = RateLimiter::new(
            vec![test_policy("strict", "https://clinicaltrials.gov/api/v2", 120)],
            Duration::from_millis(1),
        );

        let url = Url::parse("https://clinicaltrials.gov/api/v2/studies").unwrap();
        let start = Instant::now();
        limiter.wait_for_url(&url).await;
        limiter.wait_for_url(&url).await;

        assert!(
            start.elapsed() >= Duration::from_millis(100),
            "second request should be throttled for strict prefix"
        );
    }

    #[tokio::test]
    async fn rate_limit_keeps_local_ports_independent() {
        let limiter = RateLimiter::new(Vec::new(), Duration::from_millis(200));

        let url_a = Url::parse("http://127.0.0.1:4001/studies").unwrap();
        let url_b = Url::parse("http://127.0.0.1:4002/studies").unwrap();

        let start = Instant::now();
        limiter.wait_for_url(&url_a).await;
        limiter.wait_for_url(&url_b).await;

        assert!(
            start.elapsed() < Duration::from_millis(150),
            "different origins should not block each other"
        );
    }

    #[test]
    fn rate_limit_uses_longest_matching_prefix() {
        let limiter = RateLimiter::new(
            vec![
                test_policy("short", "https://clinicaltrials.gov/api", 10),
                test_policy("long", "https://clinicaltrials.gov/api/v2", 10),
            ],
            Duration::from_millis(1),
        );

        let key = limiter
            .resolve_key_for_str("https://clinicaltrials.gov/api/v2/stats/size")
            .unwrap();
        assert_eq!(key, "policy:long");
    }

    #[test]
    fn rate_limit_falls_back_to_origin_key() {
        let limiter = RateLimiter::new(Vec::new(), Duration::from_millis(1));
        let key = limiter
            .resolve_key_for_str("http://127.0.0.1:8080/studies")
            .unwrap();
        assert_eq!(key, "default:http://127.0.0.1:8080");
    }
}
