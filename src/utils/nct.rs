use std::sync::OnceLock;

use regex::Regex;

use crate::error::CtGovError;

fn nct_pattern() -> &'static Regex {
    static NCT_RE: OnceLock<Regex> = OnceLock::new();
    NCT_RE.get_or_init(|| Regex::new(r"^NCT[0-9]{8}$").expect("valid NCT regex"))
}

/// Normalizes a ClinicalTrials.gov identifier to `NCT` + 8 digits.
///
/// Surrounding whitespace is trimmed and the prefix is upper-cased; anything
/// else that does not match the fixed pattern is rejected.
pub(crate) fn normalize_nct_id(value: &str) -> Result<String, CtGovError> {
    let candidate = value.trim().to_ascii_uppercase();
    if nct_pattern().is_match(&candidate) {
        return Ok(candidate);
    }
    Err(CtGovError::InvalidArgument(format!(
        "NCT ID must be \"NCT\" followed by exactly 8 digits (e.g. NCT04267848), got {:?}",
        value.trim()
    )))
}
