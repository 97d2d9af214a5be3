use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::Extraction;

/// One page request against a source endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Field-qualified search parameters rendered by [`super::Protocol`].
    pub params: Vec<(String, String)>,
    pub offset: usize,
    pub limit: usize,
    pub page_token: Option<String>,
}

/// One page of opaque upstream records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    pub total: Option<u64>,
    pub next_token: Option<String>,
    /// Upstream ids this page covered, when some of them yielded no record.
    pub listed: Option<usize>,
}

impl Page {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Normalized envelope around one upstream record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: String,
    pub external_id: String,
    pub display_name: String,
    pub raw: Value,
    #[serde(default, skip_serializing_if = "Extraction::is_empty")]
    pub facts: Extraction,
}

// openFDA envelope: {"meta": {"results": {"total": N}}, "results": [...]}
#[derive(Debug, Deserialize)]
pub(crate) struct OpenFdaResponse {
    #[serde(default)]
    pub meta: Option<OpenFdaMeta>,
    #[serde(default)]
    pub results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenFdaMeta {
    pub results: Option<OpenFdaCounts>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenFdaCounts {
    pub total: Option<u64>,
}

// E-utilities esearch: counts arrive as strings.
#[derive(Debug, Deserialize)]
pub(crate) struct ESearchResponse {
    pub esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ESearchResult {
    #[serde(default)]
    pub count: Option<String>,
    #[serde(default)]
    pub idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ESummaryResponse {
    #[serde(default)]
    pub result: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StudiesResponse {
    #[serde(default)]
    pub studies: Vec<Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub total_count: Option<u64>,
}
