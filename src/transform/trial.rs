use serde_json::Value;

use crate::entities::trial::{TrialLocationSummary, TrialSummary};

const MAX_INTERVENTIONS: usize = 5;
const MAX_LOCATIONS: usize = 3;
const MAX_ELIGIBILITY_BYTES: usize = 500;

fn truncate_utf8(s: &str, max_bytes: usize, suffix: &str) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    let mut out = s[..boundary].to_string();
    out.push_str(suffix);
    out
}

fn text_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn strings_at(value: &Value, pointer: &str) -> Vec<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn extract_interventions(study: &Value) -> Vec<String> {
    study
        .pointer("/protocolSection/armsInterventionsModule/interventions")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .take(MAX_INTERVENTIONS)
                .filter_map(|row| {
                    let name = text_at(row, "/name")?;
                    Some(match text_at(row, "/type") {
                        Some(kind) => format!("{kind}: {name}"),
                        None => name,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn extract_locations(study: &Value) -> (usize, Vec<TrialLocationSummary>) {
    let Some(rows) = study
        .pointer("/protocolSection/contactsLocationsModule/locations")
        .and_then(Value::as_array)
    else {
        return (0, Vec::new());
    };

    let shown = rows
        .iter()
        .take(MAX_LOCATIONS)
        .map(|row| TrialLocationSummary {
            facility: text_at(row, "/facility").unwrap_or_else(|| "N/A".into()),
            city: text_at(row, "/city").unwrap_or_else(|| "N/A".into()),
            state: text_at(row, "/state"),
            country: text_at(row, "/country").unwrap_or_else(|| "N/A".into()),
        })
        .collect();
    (rows.len(), shown)
}

/// Projects the commonly read fields of a study into a display summary.
///
/// Missing modules (e.g. after a `fields` selection) leave the matching
/// summary fields empty.
pub(crate) fn summarize(study: &Value) -> TrialSummary {
    let (location_count, locations) = extract_locations(study);
    TrialSummary {
        nct_id: text_at(study, "/protocolSection/identificationModule/nctId"),
        title: text_at(study, "/protocolSection/identificationModule/briefTitle"),
        official_title: text_at(study, "/protocolSection/identificationModule/officialTitle"),
        status: text_at(study, "/protocolSection/statusModule/overallStatus"),
        start_date: text_at(study, "/protocolSection/statusModule/startDateStruct/date"),
        completion_date: text_at(
            study,
            "/protocolSection/statusModule/completionDateStruct/date",
        ),
        summary: text_at(study, "/protocolSection/descriptionModule/briefSummary"),
        conditions: strings_at(study, "/protocolSection/conditionsModule/conditions"),
        interventions: extract_interventions(study),
        eligibility: text_at(
            study,
            "/protocolSection/eligibilityModule/eligibilityCriteria",
        )
        .map(|text| truncate_utf8(&text, MAX_ELIGIBILITY_BYTES, "...")),
        location_count,
        locations,
    }
}
