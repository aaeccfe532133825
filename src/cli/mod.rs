//! Command-line interface: one-shot search/get/stats commands plus MCP server entrypoints.

use clap::{Args, Parser, Subcommand};

use crate::entities::trial::{self, TrialPaging, TrialSearchFilters, TrialStatsFilters};
use crate::sources::ClientSettings;
use crate::sources::clinicaltrials::CtGovClient;

pub mod health;

#[derive(Parser, Debug)]
#[command(
    name = "ctgov-mcp",
    version,
    about = "Search and fetch ClinicalTrials.gov studies from the command line or over MCP"
)]
pub struct Cli {
    /// Print raw JSON instead of markdown
    #[arg(long, global = true)]
    pub json: bool,

    /// Request timeout in seconds (default: CTGOV_TIMEOUT_SECS or 30)
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search studies
    Search(SearchArgs),
    /// Get one study by NCT ID
    Get {
        /// NCT identifier, e.g. NCT04267848
        nct_id: String,
        /// Return only these fields (repeat or comma-separate)
        #[arg(long = "field", value_delimiter = ',')]
        fields: Vec<String>,
    },
    /// Aggregate statistics, relayed as returned by the service
    Stats(StatsArgs),
    /// Check connectivity to the ClinicalTrials.gov API
    Health,
    /// Print version information
    Version,
    /// Run the MCP server over stdio
    Mcp,
    /// Alias for `mcp`
    Serve,
    /// Run the MCP server over HTTP (SSE transport)
    ServeHttp {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Condition or disease (query.cond)
    #[arg(short = 'c', long)]
    pub condition: Option<String>,
    /// Free text across all study fields (query.term)
    #[arg(short = 't', long)]
    pub term: Option<String>,
    /// Intervention or treatment (query.intr)
    #[arg(short = 'i', long)]
    pub intervention: Option<String>,
    /// Study title (query.titles)
    #[arg(long)]
    pub title: Option<String>,
    /// Outcome measure (query.outc)
    #[arg(long)]
    pub outcome: Option<String>,
    /// Sponsor or collaborator (query.spons)
    #[arg(long)]
    pub sponsor: Option<String>,
    /// Lead sponsor (query.lead)
    #[arg(long)]
    pub lead_sponsor: Option<String>,
    /// Study identifiers (query.id)
    #[arg(long = "id")]
    pub identifier: Option<String>,
    /// Condition in patient-friendly language (query.patient)
    #[arg(long)]
    pub patient: Option<String>,
    /// Location or facility (query.locn)
    #[arg(long)]
    pub location: Option<String>,
    /// Overall status filter, e.g. RECRUITING (repeat or comma-separate)
    #[arg(short = 's', long = "status", value_delimiter = ',')]
    pub statuses: Vec<String>,
    /// Geographic filter, e.g. "distance(40.7,-74,50mi)"
    #[arg(long, allow_hyphen_values = true)]
    pub geo: Option<String>,
    /// Restrict to these NCT IDs (filter.ids)
    #[arg(long = "ids", value_delimiter = ',')]
    pub ids: Vec<String>,
    /// Advanced filter expression, e.g. "AREA[Phase]PHASE3"
    #[arg(long)]
    pub advanced: Option<String>,
    /// Post-filter on overall status (postFilter.overallStatus)
    #[arg(long = "post-status", value_delimiter = ',')]
    pub post_filter_statuses: Vec<String>,
    /// Post-filter geographic expression (postFilter.geo)
    #[arg(long = "post-geo", allow_hyphen_values = true)]
    pub post_filter_geo: Option<String>,
    /// Aggregation filters, e.g. "phase:2 3,status:rec"
    #[arg(long)]
    pub agg_filters: Option<String>,
    /// Geo-decay ranking function (geoDecay)
    #[arg(long)]
    pub geo_decay: Option<String>,
    /// Return only these fields (repeat or comma-separate)
    #[arg(long = "field", value_delimiter = ',')]
    pub fields: Vec<String>,
    /// Sort keys, e.g. LastUpdatePostDate:desc (repeat or comma-separate)
    #[arg(long, value_delimiter = ',')]
    pub sort: Vec<String>,
    /// Page size (default 20, values above 1000 are clamped)
    #[arg(short = 'l', long = "limit", allow_negative_numbers = true)]
    pub page_size: Option<i64>,
    /// Continuation token from a previous page
    #[arg(long = "page-token", alias = "next-page")]
    pub page_token: Option<String>,
    /// Ask the service for the total match count
    #[arg(long)]
    pub count_total: bool,
}

impl SearchArgs {
    pub(crate) fn into_parts(self) -> (TrialSearchFilters, TrialPaging) {
        let filters = TrialSearchFilters {
            condition: self.condition,
            term: self.term,
            intervention: self.intervention,
            title: self.title,
            outcome: self.outcome,
            sponsor: self.sponsor,
            lead_sponsor: self.lead_sponsor,
            identifier: self.identifier,
            patient: self.patient,
            location: self.location,
            statuses: self.statuses,
            geo: self.geo,
            ids: self.ids,
            advanced: self.advanced,
            post_filter_statuses: self.post_filter_statuses,
            post_filter_geo: self.post_filter_geo,
            agg_filters: self.agg_filters,
            geo_decay: self.geo_decay,
            fields: self.fields,
            sort: self.sort,
        };
        let paging = TrialPaging {
            page_size: self.page_size,
            page_token: self.page_token,
            count_total: self.count_total,
        };
        (filters, paging)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct StatsArgs {
    /// overview (default), size, field-values, or field-sizes
    #[arg(long, default_value = "overview")]
    pub view: String,
    /// Overall status filter (repeat or comma-separate)
    #[arg(short = 's', long = "status", value_delimiter = ',')]
    pub statuses: Vec<String>,
    /// Geographic filter, e.g. "distance(40.7,-74,50mi)"
    #[arg(long, allow_hyphen_values = true)]
    pub geo: Option<String>,
    /// Aggregation filter expression
    #[arg(long)]
    pub agg_filters: Option<String>,
    /// Fields for field-values / field-sizes views
    #[arg(long = "field", value_delimiter = ',')]
    pub fields: Vec<String>,
}

impl StatsArgs {
    pub(crate) fn into_filters(self) -> Result<TrialStatsFilters, crate::error::CtGovError> {
        Ok(TrialStatsFilters {
            view: trial::parse_stats_view(&self.view)?,
            statuses: self.statuses,
            geo: self.geo,
            agg_filters: self.agg_filters,
            fields: self.fields,
        })
    }
}

fn stats_view_label(filters: &TrialStatsFilters) -> &'static str {
    use crate::sources::clinicaltrials::StatsView;
    match filters.view {
        StatsView::Overview => "overview",
        StatsView::Size => "size",
        StatsView::FieldValues => "field values",
        StatsView::FieldSizes => "field sizes",
    }
}

pub(crate) fn client_from_settings(timeout: Option<u64>) -> anyhow::Result<CtGovClient> {
    let settings = ClientSettings::from_env().with_timeout_secs(timeout);
    Ok(CtGovClient::with_settings(&settings)?)
}

/// Runs a one-shot command and returns its rendered output.
///
/// # Errors
///
/// Returns the classified adapter error, or an error for MCP server commands,
/// which the binary entrypoint runs directly.
pub async fn run(cli: Cli) -> anyhow::Result<String> {
    let json = cli.json;
    match cli.command {
        Commands::Search(args) => {
            let client = client_from_settings(cli.timeout)?;
            let (filters, paging) = args.into_parts();
            let page = trial::search(&client, &filters, &paging).await?;
            if json {
                return Ok(crate::render::json::to_pretty(&page)?);
            }
            Ok(crate::render::markdown::trial_search_markdown(
                &trial::search_query_summary(&filters),
                &page,
            )?)
        }
        Commands::Get { nct_id, fields } => {
            let client = client_from_settings(cli.timeout)?;
            let study = trial::get(&client, &nct_id, &fields).await?;
            if json {
                return Ok(crate::render::json::to_pretty(&study)?);
            }
            Ok(crate::render::markdown::trial_markdown(&study)?)
        }
        Commands::Stats(args) => {
            let client = client_from_settings(cli.timeout)?;
            let filters = args.into_filters()?;
            let stats = trial::stats(&client, &filters).await?;
            if json {
                return Ok(crate::render::json::to_pretty(&stats)?);
            }
            Ok(crate::render::markdown::stats_markdown(
                stats_view_label(&filters),
                &trial::stats_filter_summary(&filters),
                &stats,
            )?)
        }
        Commands::Health => {
            let report = health::check().await?;
            if json {
                return Ok(crate::render::json::to_pretty(&report)?);
            }
            Ok(report.to_markdown())
        }
        Commands::Version => {
            let mut out = format!("ctgov-mcp {}", env!("CARGO_PKG_VERSION"));
            let client = client_from_settings(cli.timeout)?;
            match client.version().await {
                Ok(api) => {
                    out.push_str(&format!("\nClinicalTrials.gov API {}", api.api_version));
                    if let Some(ts) = api.data_timestamp {
                        out.push_str(&format!(" (data as of {ts})"));
                    }
                }
                Err(err) => tracing::warn!("Could not read API version: {err}"),
            }
            Ok(out)
        }
        Commands::Mcp | Commands::Serve | Commands::ServeHttp { .. } => {
            anyhow::bail!("MCP server commands are started by the ctgov-mcp binary entrypoint")
        }
    }
}
