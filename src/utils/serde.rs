use rmcp::schemars;
use serde::{Deserialize, Serialize};

/// Tool argument that accepts either a single string or a list of strings.
#[derive(Debug, Default, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum StringOrVec {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl StringOrVec {
    /// Flattens into a list; a single string is also split on `,` and `|`.
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::Single(value) => value
                .split([',', '|'])
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect(),
            Self::Multiple(values) => values,
        }
    }
}
