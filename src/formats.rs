use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub url: String,
    pub title: String,
    pub authors: Vec<String>,
    pub description: String,
    pub date: String,
    pub categories: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub title: String,
    pub url: String,
}

impl LinkEntry {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgroupLink {
    pub title: String,
    pub url: String,
}

/// On-disk shape of the download ledger: `{"downloads": {<url key>: entry}}`.
///
/// Entries are kept as raw JSON so that a malformed or foreign entry is
/// written back unchanged instead of failing the whole file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerFile {
    #[serde(default)]
    pub downloads: BTreeMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerEntry {
    pub url: String,
    pub filename: String,
    pub title: String,
    pub downloaded_at: String,
}
