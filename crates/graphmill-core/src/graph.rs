use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{NodeLabel, RelationType};

pub type Properties = BTreeMap<String, serde_json::Value>;

/// Metadata key a loader uses for the file a document came from.
pub const SOURCE_FILE_KEY: &str = "source_file";
/// Metadata key a loader uses for the row number within the source file.
pub const SOURCE_ROW_KEY: &str = "row";

/// One unit of source material, usually a single spreadsheet row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Properties,
}

impl Document {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Properties::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: NodeLabel,
    pub properties: Properties,
    #[serde(default)]
    pub source_metadata: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    pub properties: Properties,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_label: Option<NodeLabel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_label: Option<NodeLabel>,
    #[serde(default)]
    pub source_metadata: Properties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl ExtractedGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Concatenates another fragment; duplicate ids are left for the store to reconcile.
    pub fn merge(&mut self, other: Self) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }
}

/// Where a stored record was last derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<i64>,
}

impl Provenance {
    #[must_use]
    pub fn from_metadata(metadata: &Properties) -> Self {
        let source_file = metadata
            .get(SOURCE_FILE_KEY)
            .and_then(serde_json::Value::as_str)
            .map(String::from);

        let row = metadata.get(SOURCE_ROW_KEY).and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        Self { source_file, row }
    }
}
