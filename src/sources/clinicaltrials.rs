use std::borrow::Cow;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::CtGovError;
use crate::sources::ClientSettings;

pub(crate) const CTGOV_API: &str = "clinicaltrials.gov";

#[derive(Clone)]
pub struct CtGovClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    timeout: Duration,
    default_page_size: usize,
}

/// Query parameters for `GET /studies`, already validated and normalized.
///
/// Every `Some` field becomes exactly one query parameter; list values are
/// pipe-joined in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudySearchParams {
    pub query_cond: Option<String>,
    pub query_term: Option<String>,
    pub query_intr: Option<String>,
    pub query_titles: Option<String>,
    pub query_outc: Option<String>,
    pub query_spons: Option<String>,
    pub query_lead: Option<String>,
    pub query_id: Option<String>,
    pub query_patient: Option<String>,
    pub query_locn: Option<String>,
    pub filter_overall_status: Vec<String>,
    pub filter_geo: Option<String>,
    pub filter_ids: Vec<String>,
    pub filter_advanced: Option<String>,
    pub post_filter_overall_status: Vec<String>,
    pub post_filter_geo: Option<String>,
    pub agg_filters: Option<String>,
    pub geo_decay: Option<String>,
    pub fields: Vec<String>,
    pub sort: Vec<String>,
    pub page_size: usize,
    pub page_token: Option<String>,
    pub count_total: bool,
}

impl StudySearchParams {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let text = [
            ("query.cond", &self.query_cond),
            ("query.term", &self.query_term),
            ("query.intr", &self.query_intr),
            ("query.titles", &self.query_titles),
            ("query.outc", &self.query_outc),
            ("query.spons", &self.query_spons),
            ("query.lead", &self.query_lead),
            ("query.id", &self.query_id),
            ("query.patient", &self.query_patient),
            ("query.locn", &self.query_locn),
        ];
        for (key, value) in text {
            push_opt(&mut out, key, value.as_deref());
        }

        push_list(&mut out, "filter.overallStatus", &self.filter_overall_status);
        push_opt(&mut out, "filter.geo", self.filter_geo.as_deref());
        push_list(&mut out, "filter.ids", &self.filter_ids);
        push_opt(&mut out, "filter.advanced", self.filter_advanced.as_deref());
        push_list(
            &mut out,
            "postFilter.overallStatus",
            &self.post_filter_overall_status,
        );
        push_opt(&mut out, "postFilter.geo", self.post_filter_geo.as_deref());
        push_opt(&mut out, "aggFilters", self.agg_filters.as_deref());
        push_opt(&mut out, "geoDecay", self.geo_decay.as_deref());
        push_list(&mut out, "fields", &self.fields);
        push_list(&mut out, "sort", &self.sort);

        out.push(("pageSize", self.page_size.to_string()));
        push_opt(&mut out, "pageToken", self.page_token.as_deref());
        if self.count_total {
            out.push(("countTotal", "true".to_string()));
        }
        out.push(("format", "json".to_string()));
        out
    }
}

/// Which statistics endpoint to query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatsView {
    /// `GET /stats` with status, geo and aggregation filters.
    #[default]
    Overview,
    /// `GET /stats/size`
    Size,
    /// `GET /stats/field/values`
    FieldValues,
    /// `GET /stats/field/sizes`
    FieldSizes,
}

impl StatsView {
    fn path(self) -> &'static str {
        match self {
            Self::Overview => "stats",
            Self::Size => "stats/size",
            Self::FieldValues => "stats/field/values",
            Self::FieldSizes => "stats/field/sizes",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsParams {
    pub view: StatsView,
    pub filter_overall_status: Vec<String>,
    pub filter_geo: Option<String>,
    pub agg_filters: Option<String>,
    pub fields: Vec<String>,
}

impl StatsParams {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        push_list(&mut out, "filter.overallStatus", &self.filter_overall_status);
        push_opt(&mut out, "filter.geo", self.filter_geo.as_deref());
        push_opt(&mut out, "aggFilters", self.agg_filters.as_deref());
        push_list(&mut out, "fields", &self.fields);
        out
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySearchResponse {
    pub studies: Vec<serde_json::Value>,
    #[serde(default)]
    pub total_count: Option<usize>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiVersion {
    pub api_version: String,
    #[serde(default)]
    pub data_timestamp: Option<String>,
}

fn push_opt(out: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        out.push((key, v.to_string()));
    }
}

fn push_list(out: &mut Vec<(&'static str, String)>, key: &'static str, values: &[String]) {
    let joined = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join("|");
    if !joined.is_empty() {
        out.push((key, joined));
    }
}

impl CtGovClient {
    pub(crate) fn with_settings(settings: &ClientSettings) -> Result<Self, CtGovError> {
        Ok(Self {
            client: crate::sources::http_client(settings.timeout)?,
            base: settings.base.clone(),
            timeout: settings.timeout,
            default_page_size: settings.default_page_size,
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base: String, timeout: Duration) -> Result<Self, CtGovError> {
        Self::with_settings(&ClientSettings {
            base: Cow::Owned(base),
            timeout,
            ..ClientSettings::default()
        })
    }

    pub(crate) fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.as_ref().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// One GET, bounded end to end by the client timeout. The bound covers
    /// the rate-limiter wait and the body read, not just the socket.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, CtGovError> {
        debug!(url, params = query.len(), "GET");
        let exchange = async {
            let resp = self
                .client
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(|err| crate::sources::classify_send_error(CTGOV_API, err))?;
            let status = resp.status();
            let content_type = resp.headers().get(CONTENT_TYPE).cloned();
            let bytes = crate::sources::read_limited_body(resp, CTGOV_API).await?;
            Ok::<_, CtGovError>((status, content_type, bytes))
        };
        let (status, content_type, bytes) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| CtGovError::Timeout {
                api: CTGOV_API.to_string(),
            })??;
        if !status.is_success() {
            return Err(crate::sources::remote_error(CTGOV_API, status, &bytes));
        }
        crate::sources::ensure_json_content_type(CTGOV_API, content_type.as_ref(), &bytes)?;
        serde_json::from_slice(&bytes).map_err(|source| CtGovError::ApiJson {
            api: CTGOV_API.to_string(),
            source,
        })
    }

    pub async fn search_studies(
        &self,
        params: &StudySearchParams,
    ) -> Result<StudySearchResponse, CtGovError> {
        let url = self.endpoint("studies");
        self.get_json(&url, &params.query_pairs()).await
    }

    /// Fetches one study. The identifier must already be validated.
    pub async fn get_study(
        &self,
        nct_id: &str,
        fields: &[String],
    ) -> Result<serde_json::Value, CtGovError> {
        let url = self.endpoint(&format!("studies/{nct_id}"));
        let mut query = Vec::new();
        push_list(&mut query, "fields", fields);
        query.push(("format", "json".to_string()));

        match self.get_json(&url, &query).await {
            Err(CtGovError::Api {
                status: Some(404), ..
            }) => Err(CtGovError::NotFound {
                entity: "trial".into(),
                id: nct_id.to_string(),
                suggestion: format!("Try searching: ctgov-mcp search --id {nct_id}"),
            }),
            other => other,
        }
    }

    pub async fn stats(&self, params: &StatsParams) -> Result<serde_json::Value, CtGovError> {
        let url = self.endpoint(params.view.path());
        self.get_json(&url, &params.query_pairs()).await
    }

    pub async fn version(&self) -> Result<ApiVersion, CtGovError> {
        let url = self.endpoint("version");
        self.get_json(&url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CtGovClient {
        CtGovClient::new_for_test(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn query_pairs_only_include_populated_fields() {
        let params = StudySearchParams {
            query_cond: Some("Depression".into()),
            query_intr: Some("   ".into()),
            filter_overall_status: vec!["RECRUITING".into(), "COMPLETED".into()],
            page_size: 5,
            ..StudySearchParams::default()
        };

        let pairs = params.query_pairs();
        let keys = pairs.iter().map(|(k, _)| *k).collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec!["query.cond", "filter.overallStatus", "pageSize", "format"]
        );
        assert!(pairs.contains(&("filter.overallStatus", "RECRUITING|COMPLETED".into())));
        assert!(pairs.contains(&("pageSize", "5".into())));
    }

    #[test]
    fn query_pairs_map_every_field_once() {
        let params = StudySearchParams {
            query_cond: Some("c".into()),
            query_term: Some("t".into()),
            query_intr: Some("i".into()),
            query_titles: Some("ti".into()),
            query_outc: Some("o".into()),
            query_spons: Some("s".into()),
            query_lead: Some("l".into()),
            query_id: Some("NCT04267848".into()),
            query_patient: Some("p".into()),
            query_locn: Some("Boston".into()),
            filter_overall_status: vec!["RECRUITING".into()],
            filter_geo: Some("distance(40.7,-74,50mi)".into()),
            filter_ids: vec!["NCT04267848".into(), "NCT00000102".into()],
            filter_advanced: Some("AREA[Phase]PHASE3".into()),
            post_filter_overall_status: vec!["COMPLETED".into()],
            post_filter_geo: Some("distance(0,0,1km)".into()),
            agg_filters: Some("phase:3".into()),
            geo_decay: Some("func:exp,scale:300mi".into()),
            fields: vec!["NCTId".into(), "BriefTitle".into()],
            sort: vec!["LastUpdatePostDate:desc".into()],
            page_size: 1000,
            page_token: Some("tok".into()),
            count_total: true,
        };

        let pairs = params.query_pairs();
        let mut keys = pairs.iter().map(|(k, _)| *k).collect::<Vec<_>>();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total, "no parameter may repeat");
        assert_eq!(total, 24);
        assert!(pairs.contains(&("fields", "NCTId|BriefTitle".into())));
        assert!(pairs.contains(&("filter.ids", "NCT04267848|NCT00000102".into())));
        assert!(pairs.contains(&("countTotal", "true".into())));
    }

    #[tokio::test]
    async fn search_sends_params_and_reads_cursor() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/studies"))
            .and(query_param("query.cond", "Depression"))
            .and(query_param("filter.overallStatus", "RECRUITING"))
            .and(query_param("pageSize", "5"))
            .and(query_param("format", "json"))
            .and(query_param_is_missing("countTotal"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "studies": [{"protocolSection": {"identificationModule": {"nctId": "NCT00000001"}}}],
                "nextPageToken": "NF0g5JGBlPMuwQY"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client_for(&server)
            .search_studies(&StudySearchParams {
                query_cond: Some("Depression".into()),
                filter_overall_status: vec!["RECRUITING".into()],
                page_size: 5,
                ..StudySearchParams::default()
            })
            .await
            .unwrap();

        assert_eq!(resp.studies.len(), 1);
        assert_eq!(resp.total_count, None);
        assert_eq!(resp.next_page_token.as_deref(), Some("NF0g5JGBlPMuwQY"));
    }

    #[tokio::test]
    async fn search_rejects_body_without_studies_key() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/studies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "unexpected": true
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .search_studies(&StudySearchParams {
                page_size: 20,
                ..StudySearchParams::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CtGovError::ApiJson { .. }));
        assert_eq!(err.kind(), ErrorKind::Remote);
    }

    #[tokio::test]
    async fn search_surfaces_http_error_context() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/studies"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream failure"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .search_studies(&StudySearchParams {
                query_cond: Some("melanoma".into()),
                page_size: 2,
                ..StudySearchParams::default()
            })
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("clinicaltrials.gov"));
        assert!(msg.contains("500"));
        assert!(msg.contains("upstream failure"));
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn get_study_maps_404_to_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/studies/NCT99999999"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "message": "Study not found"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get_study("NCT99999999", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("NCT99999999"));
    }

    #[tokio::test]
    async fn get_study_passes_fields() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/studies/NCT04267848"))
            .and(query_param("fields", "NCTId|BriefTitle"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "protocolSection": {"identificationModule": {"nctId": "NCT04267848"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let study = client_for(&server)
            .get_study("NCT04267848", &["NCTId".into(), "BriefTitle".into()])
            .await
            .unwrap();
        assert_eq!(
            study["protocolSection"]["identificationModule"]["nctId"],
            "NCT04267848"
        );
    }

    #[tokio::test]
    async fn stats_views_route_to_endpoints() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/stats/field/values"))
            .and(query_param("fields", "Phase"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{"field": "Phase"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stats = client_for(&server)
            .stats(&StatsParams {
                view: StatsView::FieldValues,
                fields: vec!["Phase".into()],
                ..StatsParams::default()
            })
            .await
            .unwrap();
        assert_eq!(stats[0]["field"], "Phase");
    }

    #[tokio::test]
    async fn version_reads_api_version() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "apiVersion": "2.0.3",
                "dataTimestamp": "2026-10-15T09:00:05"
            })))
            .mount(&server)
            .await;

        let version = client_for(&server).version().await.unwrap();
        assert_eq!(version.api_version, "2.0.3");
        assert_eq!(version.data_timestamp.as_deref(), Some("2026-10-15T09:00:05"));
    }

    #[tokio::test]
    async fn concurrent_calls_never_outlive_the_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/studies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "studies": []
            })))
            .mount(&server)
            .await;

        // Local origins are spaced 100ms apart, so the fourth and fifth calls
        // queue behind the limiter for longer than the 250ms budget.
        let timeout = Duration::from_millis(250);
        let client = CtGovClient::new_for_test(server.uri(), timeout).unwrap();
        let params = StudySearchParams {
            page_size: 20,
            ..StudySearchParams::default()
        };

        let handles = (0..5)
            .map(|_| {
                let client = client.clone();
                let params = params.clone();
                tokio::spawn(async move {
                    let start = std::time::Instant::now();
                    let result = client.search_studies(&params).await;
                    (start.elapsed(), result)
                })
            })
            .collect::<Vec<_>>();

        let mut timed_out = 0;
        for handle in handles {
            let (elapsed, result) = handle.await.unwrap();
            assert!(
                elapsed < timeout + Duration::from_millis(150),
                "call took {elapsed:?}"
            );
            match result {
                Ok(resp) => assert!(resp.studies.is_empty()),
                Err(err) => {
                    assert!(err.is_timeout(), "unexpected error: {err}");
                    assert_eq!(err.kind(), ErrorKind::Transport);
                    timed_out += 1;
                }
            }
        }
        assert!(timed_out >= 1, "queued calls should hit the timeout");
    }
}
