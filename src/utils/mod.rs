//! Internal utility helpers for identifier and geographic-filter validation and serde helpers.

pub(crate) mod geo;
pub(crate) mod nct;
pub(crate) mod serde;
