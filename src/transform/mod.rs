//! Display projections over raw ClinicalTrials.gov study documents.

pub(crate) mod trial;
