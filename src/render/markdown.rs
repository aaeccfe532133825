use std::sync::OnceLock;

use minijinja::{Environment, context};

use crate::entities::SearchPage;
use crate::entities::trial::TrialSummary;
use crate::error::CtGovError;
use crate::transform::trial::summarize;

static ENV: OnceLock<Environment<'static>> = OnceLock::new();

fn env() -> Result<&'static Environment<'static>, CtGovError> {
    if let Some(env) = ENV.get() {
        return Ok(env);
    }

    let mut env = Environment::new();
    env.add_filter("truncate", |s: String, max_bytes: usize| -> String {
        if s.len() <= max_bytes {
            return s;
        }
        if max_bytes == 0 {
            return "…".to_string();
        }
        let mut boundary = max_bytes;
        while boundary > 0 && !s.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let mut out = s[..boundary].trim_end().to_string();
        out.push('…');
        out
    });
    env.add_template(
        "trial_summary.md.j2",
        include_str!("../../templates/trial_summary.md.j2"),
    )?;
    env.add_template("trial.md.j2", include_str!("../../templates/trial.md.j2"))?;
    env.add_template(
        "trial_search.md.j2",
        include_str!("../../templates/trial_search.md.j2"),
    )?;
    env.add_template("stats.md.j2", include_str!("../../templates/stats.md.j2"))?;

    let _ = ENV.set(env);
    ENV.get().ok_or_else(|| CtGovError::Api {
        api: "render".into(),
        status: None,
        message: "Template environment initialization failed".into(),
    })
}

fn with_pagination_footer(mut body: String, next_page_token: Option<&str>) -> String {
    let Some(token) = next_page_token.map(str::trim).filter(|t| !t.is_empty()) else {
        return body;
    };
    if !body.ends_with('\n') {
        body.push('\n');
    }
    body.push_str(&format!(
        "\nNext page token: {token}\nPass it unchanged as page_token, with the same filters, to fetch the next page.\n"
    ));
    body
}

fn study_url(summary: &TrialSummary) -> Option<String> {
    summary
        .nct_id
        .as_deref()
        .map(|id| format!("https://clinicaltrials.gov/study/{id}"))
}

/// Renders one study: a readable summary followed by the full record as JSON.
pub fn trial_markdown(study: &serde_json::Value) -> Result<String, CtGovError> {
    let tmpl = env()?.get_template("trial.md.j2")?;
    let summary = summarize(study);
    Ok(tmpl.render(context! {
        s => &summary,
        nct_id => summary.nct_id.as_deref().unwrap_or("N/A"),
        evidence_url => study_url(&summary),
        record_json => serde_json::to_string_pretty(study)?,
    })?)
}

pub fn trial_search_markdown(
    query: &str,
    page: &SearchPage<serde_json::Value>,
) -> Result<String, CtGovError> {
    let tmpl = env()?.get_template("trial_search.md.j2")?;
    let results = page.results.iter().map(summarize).collect::<Vec<_>>();
    let body = tmpl.render(context! {
        query => query,
        count => results.len(),
        total => page.total,
        results => results,
    })?;
    Ok(with_pagination_footer(
        body,
        page.next_page_token.as_deref(),
    ))
}

pub fn stats_markdown(
    view: &str,
    filters: &str,
    stats: &serde_json::Value,
) -> Result<String, CtGovError> {
    let tmpl = env()?.get_template("stats.md.j2")?;
    Ok(tmpl.render(context! {
        view => view,
        filters => filters,
        stats_json => serde_json::to_string_pretty(stats)?,
    })?)
}
