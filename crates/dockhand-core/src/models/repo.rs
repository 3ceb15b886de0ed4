//! Repository model definition.

use serde::{Deserialize, Serialize};

/// A Backrest repository entry.
///
/// Repositories are externally managed; the sidecar only reads their
/// ids to validate plan references. Unmodeled fields survive on disk
/// because the loaded `repos` value is re-emitted verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Repo {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}
