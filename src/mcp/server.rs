use std::borrow::Cow;
use std::future::Future;

use rmcp::model::{
    AnnotateAble, Implementation, ListResourcesResult, PaginatedRequestParam, RawResource,
    ReadResourceRequestParam, ReadResourceResult, ResourceContents, ServerCapabilities, ServerInfo,
};
use rmcp::schemars;
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{Error as McpError, ServerHandler, ServiceExt, tool};
use rust_embed::RustEmbed;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::entities::trial::{self, TrialPaging, TrialSearchFilters, TrialStatsFilters};
use crate::error::CtGovError;
use crate::sources::clinicaltrials::CtGovClient;
use crate::utils::serde::StringOrVec;

#[derive(RustEmbed)]
#[folder = "resources/"]
struct EmbeddedResources;

const RESOURCE_HELP_URI: &str = "ctgov://help";
const RESOURCE_STATUS_URI: &str = "ctgov://fields/status";

/// (uri, embedded file, display name)
const RESOURCES: &[(&str, &str, &str)] = &[
    (RESOURCE_HELP_URI, "help.md", "ClinicalTrials.gov MCP Overview"),
    (RESOURCE_STATUS_URI, "status.md", "Overall Status Reference"),
];

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct SearchTrialsArgs {
    /// Conditions or diseases, e.g. "Depression", "Type 2 Diabetes"
    pub query_cond: Option<String>,
    /// Keywords searched across all study fields
    pub query_term: Option<String>,
    /// Interventions or treatments, e.g. "Pembrolizumab"
    pub query_intr: Option<String>,
    /// Words in the study title
    pub query_titles: Option<String>,
    /// Words in outcome measures
    pub query_outc: Option<String>,
    /// Sponsors or collaborators, e.g. "Pfizer"
    pub query_spons: Option<String>,
    /// Lead sponsor
    pub query_lead: Option<String>,
    /// Study identifiers such as NCT IDs
    pub query_id: Option<String>,
    /// Conditions in patient-friendly language
    pub query_patient: Option<String>,
    /// Location or facility, e.g. "New York", "Mayo Clinic"
    pub query_locn: Option<String>,
    /// Recruitment status filter, e.g. ["RECRUITING"]. Options: RECRUITING, NOT_YET_RECRUITING,
    /// ACTIVE_NOT_RECRUITING, COMPLETED, SUSPENDED, TERMINATED, WITHDRAWN, ENROLLING_BY_INVITATION,
    /// AVAILABLE, NO_LONGER_AVAILABLE, APPROVED_FOR_MARKETING, WITHHELD, TEMPORARILY_NOT_AVAILABLE
    #[serde(default, rename = "filter_overallStatus")]
    pub filter_overall_status: StringOrVec,
    /// Geographic filter, e.g. "distance(40.7,-74,50mi)" for studies within 50 miles of NYC
    pub filter_geo: Option<String>,
    /// Restrict results to these NCT IDs
    #[serde(default)]
    pub filter_ids: StringOrVec,
    /// Advanced filter expression, e.g. "AREA[Phase]PHASE3"
    pub filter_advanced: Option<String>,
    /// Results per page (default 20, max 1000)
    pub page_size: Option<i64>,
    /// Token from a previous page; pass it back unchanged with the same filters
    pub page_token: Option<String>,
    /// Include the total number of matching studies
    #[serde(default)]
    pub count_total: bool,
    /// Sort order, e.g. ["@relevance"] or ["LastUpdatePostDate:desc"]
    #[serde(default)]
    pub sort: StringOrVec,
    /// Only return these fields, e.g. ["NCTId", "BriefTitle", "OverallStatus"]
    #[serde(default)]
    pub fields: StringOrVec,
    /// Return the raw JSON page instead of markdown summaries
    #[serde(default)]
    pub raw_json: bool,
}

impl SearchTrialsArgs {
    fn into_parts(self) -> (TrialSearchFilters, TrialPaging) {
        let filters = TrialSearchFilters {
            condition: self.query_cond,
            term: self.query_term,
            intervention: self.query_intr,
            title: self.query_titles,
            outcome: self.query_outc,
            sponsor: self.query_spons,
            lead_sponsor: self.query_lead,
            identifier: self.query_id,
            patient: self.query_patient,
            location: self.query_locn,
            statuses: self.filter_overall_status.into_vec(),
            geo: self.filter_geo,
            ids: self.filter_ids.into_vec(),
            advanced: self.filter_advanced,
            fields: self.fields.into_vec(),
            sort: self.sort.into_vec(),
            ..TrialSearchFilters::default()
        };
        let paging = TrialPaging {
            page_size: self.page_size,
            page_token: self.page_token,
            count_total: self.count_total,
        };
        (filters, paging)
    }
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct GetTrialArgs {
    /// NCT ID of the study, e.g. "NCT04267848"
    pub nct_id: String,
    /// Only return these fields (default: all fields)
    #[serde(default)]
    pub fields: StringOrVec,
    /// Return the raw JSON record instead of a summary followed by the record
    #[serde(default)]
    pub raw_json: bool,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct TrialStatisticsArgs {
    /// Filter statistics by recruitment status
    #[serde(default, rename = "filter_overallStatus")]
    pub filter_overall_status: StringOrVec,
    /// Geographic filter, e.g. "distance(40.7,-74,50mi)"
    pub filter_geo: Option<String>,
    /// Aggregation filter expression, e.g. "phase:2 3,status:rec"
    pub agg_filters: Option<String>,
}

fn tool_error(err: CtGovError) -> String {
    format!("Error [{}]: {err}", err.kind().as_str())
}

#[derive(Clone)]
pub struct CtGovServer {
    client: CtGovClient,
}

impl CtGovServer {
    pub(crate) fn new(client: CtGovClient) -> Self {
        Self { client }
    }

    async fn search(&self, args: SearchTrialsArgs) -> Result<String, CtGovError> {
        let raw_json = args.raw_json;
        let (filters, paging) = args.into_parts();
        let page = trial::search(&self.client, &filters, &paging).await?;
        if raw_json {
            return crate::render::json::to_pretty(&page);
        }
        crate::render::markdown::trial_search_markdown(
            &trial::search_query_summary(&filters),
            &page,
        )
    }

    async fn get(&self, args: GetTrialArgs) -> Result<String, CtGovError> {
        let study = trial::get(&self.client, &args.nct_id, &args.fields.into_vec()).await?;
        if args.raw_json {
            return crate::render::json::to_pretty(&study);
        }
        crate::render::markdown::trial_markdown(&study)
    }

    async fn statistics(&self, args: TrialStatisticsArgs) -> Result<String, CtGovError> {
        let filters = TrialStatsFilters {
            statuses: args.filter_overall_status.into_vec(),
            geo: args.filter_geo,
            agg_filters: args.agg_filters,
            ..TrialStatsFilters::default()
        };
        let stats = trial::stats(&self.client, &filters).await?;
        crate::render::markdown::stats_markdown(
            "overview",
            &trial::stats_filter_summary(&filters),
            &stats,
        )
    }
}

#[tool(tool_box)]
impl CtGovServer {
    #[tool(
        description = "Search for clinical trials in the ClinicalTrials.gov database. Combine \
                       query_cond (condition), query_intr (intervention), query_spons (sponsor), \
                       query_locn (location) or query_term (all fields) with filter_overallStatus \
                       (e.g. [\"RECRUITING\"]) and filter_geo. Results list NCT ID, title, status, \
                       conditions, interventions, eligibility and locations. When more results \
                       exist a page token is returned; pass it as page_token with the same filters."
    )]
    async fn search_clinical_trials(
        &self,
        #[tool(aggr)] args: SearchTrialsArgs,
    ) -> Result<String, String> {
        self.search(args).await.map_err(tool_error)
    }

    #[tool(
        description = "Get the complete record of one clinical trial by NCT ID (e.g. NCT04267848): \
                       protocol, eligibility, interventions, outcomes, contacts, locations, design \
                       and results when available. Use after finding a study via search."
    )]
    async fn get_clinical_trial(&self, #[tool(aggr)] args: GetTrialArgs) -> Result<String, String> {
        self.get(args).await.map_err(tool_error)
    }

    #[tool(
        description = "Get aggregate statistics about clinical trials, optionally filtered by \
                       recruitment status, geography, or an aggregation filter expression. The \
                       statistics document is returned as provided by ClinicalTrials.gov."
    )]
    async fn get_trial_statistics(
        &self,
        #[tool(aggr)] args: TrialStatisticsArgs,
    ) -> Result<String, String> {
        self.statistics(args).await.map_err(tool_error)
    }
}

#[tool(tool_box)]
impl ServerHandler for CtGovServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "clinicaltrials-gov".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Searches and retrieves clinical trial records from the ClinicalTrials.gov API v2. \
                 Use `search_clinical_trials` to find studies, `get_clinical_trial` for one study \
                 by NCT ID, and `get_trial_statistics` for aggregate counts. \
                 Read `ctgov://help` for paging and error conventions."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    fn list_resources(
        &self,
        _request: PaginatedRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListResourcesResult {
            next_cursor: None,
            resources: build_resource_list()
                .into_iter()
                .map(|r| r.no_annotation())
                .collect(),
        }))
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        std::future::ready(read_resource_markdown(&request.uri))
    }
}

fn embedded_text(path: &str) -> Option<String> {
    let asset = EmbeddedResources::get(path)?;
    let bytes: Cow<'static, [u8]> = asset.data;
    String::from_utf8(bytes.into_owned()).ok()
}

fn read_resource_markdown(uri: &str) -> Result<ReadResourceResult, McpError> {
    let Some((_, file, _)) = RESOURCES.iter().find(|(u, _, _)| *u == uri) else {
        return Err(McpError::resource_not_found(
            format!("Unknown resource: {uri}"),
            None,
        ));
    };
    let content = embedded_text(file)
        .ok_or_else(|| McpError::internal_error(format!("Failed to load {uri}"), None))?;
    Ok(to_resource_result(uri, content))
}

fn build_resource_list() -> Vec<RawResource> {
    RESOURCES
        .iter()
        .map(|(uri, _, name)| RawResource {
            uri: uri.to_string(),
            name: name.to_string(),
            description: None,
            mime_type: Some("text/markdown".to_string()),
            size: None,
        })
        .collect()
}

fn to_resource_result(uri: &str, content: String) -> ReadResourceResult {
    ReadResourceResult {
        contents: vec![ResourceContents::TextResourceContents {
            uri: uri.to_string(),
            mime_type: Some("text/markdown".to_string()),
            text: content,
        }],
    }
}

pub async fn run_stdio(client: CtGovClient) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let cancel = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let running = CtGovServer::new(client)
        .serve_with_ct(rmcp::transport::stdio(), shutdown)
        .await?;
    let _reason = running.waiting().await?;
    Ok(())
}

pub async fn run_http(client: CtGovClient, host: &str, port: u16) -> anyhow::Result<()> {
    use rmcp::transport::sse_server::SseServer;

    let ip: std::net::IpAddr = host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid host address: {e}"))?;
    let bind = std::net::SocketAddr::new(ip, port);

    info!("ClinicalTrials.gov MCP server listening on http://{bind}");
    info!("  SSE endpoint:  GET  http://{bind}/sse");
    info!("  Post endpoint: POST http://{bind}/message");

    let ct = SseServer::serve(bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP server: {e}"))?
        .with_service(move || CtGovServer::new(client.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down…");
    ct.cancel();
    Ok(())
}
