use serde::Serialize;
use tracing::{debug, warn};

use crate::entities::SearchPage;
use crate::error::CtGovError;
use crate::sources::clinicaltrials::{CtGovClient, StatsParams, StatsView, StudySearchParams};
use crate::sources::MAX_PAGE_SIZE;
use crate::utils::geo::parse_geo_filter;
use crate::utils::nct::normalize_nct_id;

/// Overall-status values documented by ClinicalTrials.gov. The service stays
/// the source of truth; values outside this list are forwarded with a warning.
pub const KNOWN_STATUSES: &[&str] = &[
    "ACTIVE_NOT_RECRUITING",
    "COMPLETED",
    "ENROLLING_BY_INVITATION",
    "NOT_YET_RECRUITING",
    "RECRUITING",
    "SUSPENDED",
    "TERMINATED",
    "WITHDRAWN",
    "AVAILABLE",
    "NO_LONGER_AVAILABLE",
    "TEMPORARILY_NOT_AVAILABLE",
    "APPROVED_FOR_MARKETING",
    "WITHHELD",
    "UNKNOWN",
];

/// Search terms and filters for `GET /studies`.
///
/// Empty strings and empty lists count as absent. A filter set with nothing
/// populated is forwarded as match-all.
#[derive(Debug, Clone, Default)]
pub struct TrialSearchFilters {
    pub condition: Option<String>,
    pub term: Option<String>,
    pub intervention: Option<String>,
    pub title: Option<String>,
    pub outcome: Option<String>,
    pub sponsor: Option<String>,
    pub lead_sponsor: Option<String>,
    pub identifier: Option<String>,
    pub patient: Option<String>,
    pub location: Option<String>,
    pub statuses: Vec<String>,
    pub geo: Option<String>,
    pub ids: Vec<String>,
    pub advanced: Option<String>,
    pub post_filter_statuses: Vec<String>,
    pub post_filter_geo: Option<String>,
    pub agg_filters: Option<String>,
    pub geo_decay: Option<String>,
    pub fields: Vec<String>,
    pub sort: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TrialPaging {
    /// `None` uses the configured default page size.
    pub page_size: Option<i64>,
    pub page_token: Option<String>,
    pub count_total: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TrialStatsFilters {
    pub view: StatsView,
    pub statuses: Vec<String>,
    pub geo: Option<String>,
    pub agg_filters: Option<String>,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialLocationSummary {
    pub facility: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub country: String,
}

/// Display projection of a study record. The record itself is never reshaped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrialSummary {
    pub nct_id: Option<String>,
    pub title: Option<String>,
    pub official_title: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub completion_date: Option<String>,
    pub summary: Option<String>,
    pub conditions: Vec<String>,
    pub interventions: Vec<String>,
    pub eligibility: Option<String>,
    pub location_count: usize,
    pub locations: Vec<TrialLocationSummary>,
}

fn clean_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolves the outbound page size: absent uses the default, anything above
/// the ceiling is clamped, zero and negatives are rejected.
pub(crate) fn resolve_page_size(
    requested: Option<i64>,
    default: usize,
) -> Result<usize, CtGovError> {
    let Some(requested) = requested else {
        return Ok(default.clamp(1, MAX_PAGE_SIZE));
    };
    if requested < 1 {
        return Err(CtGovError::InvalidArgument(format!(
            "page size must be between 1 and {MAX_PAGE_SIZE}, got {requested}"
        )));
    }
    let size = usize::try_from(requested).unwrap_or(MAX_PAGE_SIZE);
    if size > MAX_PAGE_SIZE {
        debug!(requested = size, "Clamping page size to {MAX_PAGE_SIZE}");
        return Ok(MAX_PAGE_SIZE);
    }
    Ok(size)
}

fn normalize_status(value: &str) -> Result<Option<String>, CtGovError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let normalized = trimmed
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect::<String>();
    if !normalized.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
        return Err(CtGovError::InvalidArgument(format!(
            "Invalid overall status {trimmed:?}. Expected one of: {}",
            KNOWN_STATUSES.join(", ")
        )));
    }
    if !KNOWN_STATUSES.contains(&normalized.as_str()) {
        warn!(status = %normalized, "Unrecognized overall status; forwarding as-is");
    }
    Ok(Some(normalized))
}

pub(crate) fn normalize_statuses(values: &[String]) -> Result<Vec<String>, CtGovError> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        if let Some(status) = normalize_status(value)? {
            out.push(status);
        }
    }
    Ok(out)
}

fn normalize_geo(value: Option<&str>) -> Result<Option<String>, CtGovError> {
    match clean_opt(value) {
        Some(raw) => Ok(Some(parse_geo_filter(&raw)?.to_string())),
        None => Ok(None),
    }
}

fn normalize_ids(values: &[String]) -> Result<Vec<String>, CtGovError> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(normalize_nct_id)
        .collect()
}

/// Validates filters and paging and builds the outbound search parameters.
pub(crate) fn build_search_params(
    filters: &TrialSearchFilters,
    paging: &TrialPaging,
    default_page_size: usize,
) -> Result<StudySearchParams, CtGovError> {
    Ok(StudySearchParams {
        query_cond: clean_opt(filters.condition.as_deref()),
        query_term: clean_opt(filters.term.as_deref()),
        query_intr: clean_opt(filters.intervention.as_deref()),
        query_titles: clean_opt(filters.title.as_deref()),
        query_outc: clean_opt(filters.outcome.as_deref()),
        query_spons: clean_opt(filters.sponsor.as_deref()),
        query_lead: clean_opt(filters.lead_sponsor.as_deref()),
        query_id: clean_opt(filters.identifier.as_deref()),
        query_patient: clean_opt(filters.patient.as_deref()),
        query_locn: clean_opt(filters.location.as_deref()),
        filter_overall_status: normalize_statuses(&filters.statuses)?,
        filter_geo: normalize_geo(filters.geo.as_deref())?,
        filter_ids: normalize_ids(&filters.ids)?,
        filter_advanced: clean_opt(filters.advanced.as_deref()),
        post_filter_overall_status: normalize_statuses(&filters.post_filter_statuses)?,
        post_filter_geo: normalize_geo(filters.post_filter_geo.as_deref())?,
        agg_filters: clean_opt(filters.agg_filters.as_deref()),
        geo_decay: clean_opt(filters.geo_decay.as_deref()),
        fields: clean_list(&filters.fields),
        sort: clean_list(&filters.sort),
        page_size: resolve_page_size(paging.page_size, default_page_size)?,
        // Tokens are opaque; only surrounding whitespace is dropped.
        page_token: clean_opt(paging.page_token.as_deref()),
        count_total: paging.count_total,
    })
}

pub(crate) fn build_stats_params(filters: &TrialStatsFilters) -> Result<StatsParams, CtGovError> {
    Ok(StatsParams {
        view: filters.view,
        filter_overall_status: normalize_statuses(&filters.statuses)?,
        filter_geo: normalize_geo(filters.geo.as_deref())?,
        agg_filters: clean_opt(filters.agg_filters.as_deref()),
        fields: clean_list(&filters.fields),
    })
}

pub(crate) fn parse_stats_view(value: &str) -> Result<StatsView, CtGovError> {
    match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "" | "overview" => Ok(StatsView::Overview),
        "size" | "sizes" => Ok(StatsView::Size),
        "field-values" | "values" => Ok(StatsView::FieldValues),
        "field-sizes" => Ok(StatsView::FieldSizes),
        other => Err(CtGovError::InvalidArgument(format!(
            "Unknown statistics view {other:?}. Expected overview, size, field-values, or field-sizes"
        ))),
    }
}

/// Accepts a bare study record, or the legacy `{"studies": [...]}` envelope.
fn unwrap_study(nct_id: &str, value: serde_json::Value) -> Result<serde_json::Value, CtGovError> {
    match value {
        serde_json::Value::Object(mut map)
            if !map.contains_key("protocolSection") && map.contains_key("studies") =>
        {
            let first = match map.remove("studies") {
                Some(serde_json::Value::Array(studies)) => studies.into_iter().next(),
                _ => None,
            };
            first.ok_or_else(|| CtGovError::NotFound {
                entity: "trial".into(),
                id: nct_id.to_string(),
                suggestion: format!("Try searching: ctgov-mcp search --id {nct_id}"),
            })
        }
        serde_json::Value::Object(_) => Ok(value),
        other => Err(CtGovError::Api {
            api: crate::sources::clinicaltrials::CTGOV_API.to_string(),
            status: None,
            message: format!(
                "Expected a study object for {nct_id}, got {}",
                json_type_name(&other)
            ),
        }),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

pub fn search_query_summary(filters: &TrialSearchFilters) -> String {
    let mut parts: Vec<String> = Vec::new();
    let labeled = [
        ("condition", &filters.condition),
        ("term", &filters.term),
        ("intervention", &filters.intervention),
        ("title", &filters.title),
        ("outcome", &filters.outcome),
        ("sponsor", &filters.sponsor),
        ("lead_sponsor", &filters.lead_sponsor),
        ("id", &filters.identifier),
        ("patient", &filters.patient),
        ("location", &filters.location),
        ("geo", &filters.geo),
        ("advanced", &filters.advanced),
    ];
    for (label, value) in labeled {
        if let Some(v) = clean_opt(value.as_deref()) {
            parts.push(format!("{label}={v}"));
        }
    }
    let statuses = clean_list(&filters.statuses);
    if !statuses.is_empty() {
        parts.push(format!("status={}", statuses.join(",")));
    }
    if parts.is_empty() {
        "all studies".to_string()
    } else {
        parts.join(", ")
    }
}

pub fn stats_filter_summary(filters: &TrialStatsFilters) -> String {
    let mut parts = Vec::new();
    if !filters.statuses.is_empty() {
        parts.push(format!("status={}", filters.statuses.join(",")));
    }
    if let Some(geo) = filters.geo.as_deref().filter(|v| !v.trim().is_empty()) {
        parts.push(format!("geo={}", geo.trim()));
    }
    if let Some(agg) = filters
        .agg_filters
        .as_deref()
        .filter(|v| !v.trim().is_empty())
    {
        parts.push(format!("aggFilters={}", agg.trim()));
    }
    if !filters.fields.is_empty() {
        parts.push(format!("fields={}", filters.fields.join(",")));
    }
    parts.join(", ")
}

/// Runs one search page. Zero matches is a successful empty page.
pub async fn search(
    client: &CtGovClient,
    filters: &TrialSearchFilters,
    paging: &TrialPaging,
) -> Result<SearchPage<serde_json::Value>, CtGovError> {
    let params = build_search_params(filters, paging, client.default_page_size())?;
    let resp = client.search_studies(&params).await?;
    let next_page_token = resp
        .next_page_token
        .filter(|token| !token.trim().is_empty());
    Ok(SearchPage::cursor(
        resp.studies,
        resp.total_count,
        next_page_token,
    ))
}

/// Fetches one study record by NCT ID, returned exactly as the service sent it.
pub async fn get(
    client: &CtGovClient,
    nct_id: &str,
    fields: &[String],
) -> Result<serde_json::Value, CtGovError> {
    let nct_id = normalize_nct_id(nct_id)?;
    let study = client.get_study(&nct_id, &clean_list(fields)).await?;
    unwrap_study(&nct_id, study)
}

pub async fn stats(
    client: &CtGovClient,
    filters: &TrialStatsFilters,
) -> Result<serde_json::Value, CtGovError> {
    let params = build_stats_params(filters)?;
    client.stats(&params).await
}
