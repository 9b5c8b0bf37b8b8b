use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::oracle::{ExtractionOracle, OracleError, RawEdge, RawGraph};
use crate::config::ExtractorConfig;
use crate::graph::{Document, Edge, ExtractedGraph, Node, Properties};
use crate::identity::IdentityResolver;
use crate::schema::{NodeLabel, RelationType};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Oracle failed: {0}")]
    Oracle(#[from] OracleError),
    #[error("Oracle returned an empty graph")]
    EmptyOutput,
    #[error("Extraction task failed: {0}")]
    Task(String),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Why a piece of oracle output was discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    UnknownLabel(String),
    LowConfidence(Option<f64>),
    DanglingReference(String),
    UnknownRelation(String),
    SchemaMismatch {
        relation: RelationType,
        source: NodeLabel,
        target: NodeLabel,
    },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLabel(label) => write!(f, "unknown node label {label:?}"),
            Self::LowConfidence(Some(c)) => write!(f, "confidence {c} below threshold"),
            Self::LowConfidence(None) => f.write_str("missing confidence"),
            Self::DanglingReference(id) => write!(f, "endpoint {id:?} not in extraction"),
            Self::UnknownRelation(rel) => write!(f, "unknown relation type {rel:?}"),
            Self::SchemaMismatch {
                relation,
                source,
                target,
            } => {
                let (want_source, want_target) = relation.endpoints();
                write!(
                    f,
                    "{relation} expects ({want_source})->({want_target}), got ({source})->({target})"
                )
            }
        }
    }
}

/// Calls the oracle for one document and keeps only output that fits the schema.
pub struct Extractor {
    oracle: Arc<dyn ExtractionOracle>,
    resolver: IdentityResolver,
    confidence_threshold: f64,
}

impl Extractor {
    #[must_use]
    pub fn new(oracle: Arc<dyn ExtractionOracle>, config: &ExtractorConfig) -> Self {
        Self {
            oracle,
            resolver: IdentityResolver::new(&config.identity_namespace),
            confidence_threshold: config.confidence_threshold,
        }
    }

    #[must_use]
    pub const fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Extracts and validates, reporting oracle failures to the caller.
    pub async fn try_extract(&self, document: &Document) -> ExtractionResult<ExtractedGraph> {
        let raw = self.oracle.extract_raw(&document.content).await?;
        if raw.is_empty() {
            return Err(ExtractionError::EmptyOutput);
        }
        Ok(self.validate(raw, &document.metadata))
    }

    /// Like [`Self::try_extract`], but a failure is logged and yields an empty graph.
    pub async fn extract(&self, document: &Document) -> ExtractedGraph {
        match self.try_extract(document).await {
            Ok(graph) => graph,
            Err(e) => {
                warn!(error = %e, metadata = ?document.metadata, "Extraction failed");
                ExtractedGraph::new()
            }
        }
    }

    #[must_use]
    pub fn validate(&self, raw: RawGraph, metadata: &Properties) -> ExtractedGraph {
        self.validate_with_report(raw, metadata).0
    }

    pub fn validate_with_report(
        &self,
        raw: RawGraph,
        metadata: &Properties,
    ) -> (ExtractedGraph, Vec<Rejection>) {
        let mut rejections = Vec::new();
        let mut id_map: HashMap<String, String> = HashMap::new();
        let mut nodes: BTreeMap<String, Node> = BTreeMap::new();

        for raw_node in raw.nodes {
            let Ok(label) = raw_node.label.parse::<NodeLabel>() else {
                debug!(label = %raw_node.label, "Dropping node with unknown label");
                rejections.push(Rejection::UnknownLabel(raw_node.label));
                continue;
            };

            let id = self.resolver.entity_id(label, &raw_node.properties);
            id_map.insert(raw_node.id, id.clone());
            nodes.insert(
                id.clone(),
                Node {
                    id,
                    label,
                    properties: raw_node.properties,
                    source_metadata: metadata.clone(),
                },
            );
        }

        let mut edges = Vec::new();
        for raw_edge in raw.edges {
            match self.check_edge(&raw_edge, &id_map, &nodes) {
                Ok(checked) => edges.push(Edge {
                    source_id: checked.source_id,
                    target_id: checked.target_id,
                    relation_type: checked.relation,
                    properties: raw_edge.properties,
                    confidence: checked.confidence,
                    source_label: Some(checked.source_label),
                    target_label: Some(checked.target_label),
                    source_metadata: metadata.clone(),
                }),
                Err(rejection) => {
                    debug!(
                        relation = %raw_edge.relation_type,
                        source = %raw_edge.source_id,
                        target = %raw_edge.target_id,
                        reason = %rejection,
                        "Dropping edge"
                    );
                    rejections.push(rejection);
                }
            }
        }

        if !rejections.is_empty() {
            debug!(
                nodes = nodes.len(),
                edges = edges.len(),
                rejected = rejections.len(),
                "Validation discarded oracle output"
            );
        }

        let graph = ExtractedGraph {
            nodes: nodes.into_values().collect(),
            edges,
        };
        (graph, rejections)
    }

    fn check_edge(
        &self,
        edge: &RawEdge,
        id_map: &HashMap<String, String>,
        nodes: &BTreeMap<String, Node>,
    ) -> Result<CheckedEdge, Rejection> {
        let confidence = match edge.confidence {
            Some(c) if (self.confidence_threshold..=1.0).contains(&c) => c,
            other => return Err(Rejection::LowConfidence(other)),
        };

        let source_id = id_map
            .get(&edge.source_id)
            .ok_or_else(|| Rejection::DanglingReference(edge.source_id.clone()))?;
        let target_id = id_map
            .get(&edge.target_id)
            .ok_or_else(|| Rejection::DanglingReference(edge.target_id.clone()))?;

        let relation: RelationType = edge
            .relation_type
            .parse()
            .map_err(|_| Rejection::UnknownRelation(edge.relation_type.clone()))?;

        // Both ids were minted from this node set, so the lookups cannot miss.
        let source_label = nodes
            .get(source_id)
            .map(|n| n.label)
            .ok_or_else(|| Rejection::DanglingReference(edge.source_id.clone()))?;
        let target_label = nodes
            .get(target_id)
            .map(|n| n.label)
            .ok_or_else(|| Rejection::DanglingReference(edge.target_id.clone()))?;

        if !relation.accepts(source_label, target_label) {
            return Err(Rejection::SchemaMismatch {
                relation,
                source: source_label,
                target: target_label,
            });
        }

        Ok(CheckedEdge {
            source_id: source_id.clone(),
            target_id: target_id.clone(),
            relation,
            source_label,
            target_label,
            confidence,
        })
    }
}

struct CheckedEdge {
    source_id: String,
    target_id: String,
    relation: RelationType,
    source_label: NodeLabel,
    target_label: NodeLabel,
    confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SOURCE_ROW_KEY;
    use crate::ingest::oracle::{OracleResult, RawNode};
    use serde_json::json;

    struct FixedOracle(OracleResult<RawGraph>);

    #[async_trait::async_trait]
    impl ExtractionOracle for FixedOracle {
        async fn extract_raw(&self, _text: &str) -> OracleResult<RawGraph> {
            match &self.0 {
                Ok(graph) => Ok(graph.clone()),
                Err(e) => Err(OracleError::Malformed(e.to_string())),
            }
        }
    }

    fn extractor_with(result: OracleResult<RawGraph>) -> Extractor {
        Extractor::new(Arc::new(FixedOracle(result)), &ExtractorConfig::default())
    }

    fn node(id: &str, label: &str, properties: serde_json::Value) -> RawNode {
        RawNode {
            id: id.into(),
            label: label.into(),
            properties: serde_json::from_value(properties).unwrap(),
        }
    }

    fn edge(source: &str, target: &str, rel: &str, confidence: Option<f64>) -> RawEdge {
        RawEdge {
            source_id: source.into(),
            target_id: target.into(),
            relation_type: rel.into(),
            properties: Properties::new(),
            confidence,
        }
    }

    fn kim_and_rust(edges: Vec<RawEdge>) -> RawGraph {
        RawGraph {
            nodes: vec![
                node("p1", "Employee", json!({"name": "Kim", "email": "kim@x.com"})),
                node("s1", "Skill", json!({"name": "Rust"})),
            ],
            edges,
        }
    }

    #[test]
    fn test_valid_edge_is_rewritten() {
        let extractor = extractor_with(Ok(RawGraph::default()));
        let metadata: Properties = serde_json::from_value(json!({"row": 3})).unwrap();

        let graph = extractor.validate(
            kim_and_rust(vec![edge("p1", "s1", "HAS_SKILL", Some(0.95))]),
            &metadata,
        );

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);

        let employee = graph
            .nodes
            .iter()
            .find(|n| n.label == NodeLabel::Employee)
            .unwrap();
        let edge = &graph.edges[0];
        assert_eq!(edge.source_id, employee.id);
        assert_eq!(edge.source_label, Some(NodeLabel::Employee));
        assert_eq!(edge.target_label, Some(NodeLabel::Skill));
        assert_eq!(edge.source_metadata[SOURCE_ROW_KEY], 3);
        assert_eq!(employee.source_metadata[SOURCE_ROW_KEY], 3);
    }

    #[test]
    fn test_confidence_boundary() {
        let extractor = extractor_with(Ok(RawGraph::default()));

        let (graph, _) = extractor.validate_with_report(
            kim_and_rust(vec![edge("p1", "s1", "HAS_SKILL", Some(0.8))]),
            &Properties::new(),
        );
        assert_eq!(graph.edges.len(), 1);

        let (graph, rejections) = extractor.validate_with_report(
            kim_and_rust(vec![edge("p1", "s1", "HAS_SKILL", Some(0.799_99))]),
            &Properties::new(),
        );
        assert!(graph.edges.is_empty());
        assert_eq!(rejections, vec![Rejection::LowConfidence(Some(0.799_99))]);
    }

    #[test]
    fn test_missing_or_invalid_confidence_rejected() {
        let extractor = extractor_with(Ok(RawGraph::default()));
        let graph = extractor.validate(
            kim_and_rust(vec![
                edge("p1", "s1", "HAS_SKILL", None),
                edge("p1", "s1", "HAS_SKILL", Some(f64::NAN)),
                edge("p1", "s1", "HAS_SKILL", Some(1.5)),
            ]),
            &Properties::new(),
        );
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_schema_mismatch_dropped() {
        let extractor = extractor_with(Ok(RawGraph::default()));
        let (graph, rejections) = extractor.validate_with_report(
            kim_and_rust(vec![edge("s1", "p1", "HAS_SKILL", Some(0.9))]),
            &Properties::new(),
        );

        assert!(graph.edges.is_empty());
        assert_eq!(
            rejections,
            vec![Rejection::SchemaMismatch {
                relation: RelationType::HasSkill,
                source: NodeLabel::Skill,
                target: NodeLabel::Employee,
            }]
        );
        // nodes survive even when their edges do not
        assert_eq!(graph.nodes.len(), 2);
    }

    #[test]
    fn test_dangling_reference_dropped() {
        let extractor = extractor_with(Ok(RawGraph::default()));
        let (graph, rejections) = extractor.validate_with_report(
            kim_and_rust(vec![edge("p1", "ghost", "HAS_SKILL", Some(0.9))]),
            &Properties::new(),
        );

        assert!(graph.edges.is_empty());
        assert_eq!(rejections, vec![Rejection::DanglingReference("ghost".into())]);
    }

    #[test]
    fn test_unknown_relation_dropped() {
        let extractor = extractor_with(Ok(RawGraph::default()));
        let (graph, rejections) = extractor.validate_with_report(
            kim_and_rust(vec![edge("p1", "s1", "LIKES", Some(0.9))]),
            &Properties::new(),
        );

        assert!(graph.edges.is_empty());
        assert_eq!(rejections, vec![Rejection::UnknownRelation("LIKES".into())]);
    }

    #[test]
    fn test_unknown_label_makes_edges_dangle() {
        let extractor = extractor_with(Ok(RawGraph::default()));
        let raw = RawGraph {
            nodes: vec![
                node("p1", "Employee", json!({"name": "Kim"})),
                node("h1", "Hobby", json!({"name": "Chess"})),
            ],
            edges: vec![edge("p1", "h1", "HAS_SKILL", Some(0.9))],
        };

        let (graph, rejections) = extractor.validate_with_report(raw, &Properties::new());

        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.edges.is_empty());
        assert_eq!(
            rejections,
            vec![
                Rejection::UnknownLabel("Hobby".into()),
                Rejection::DanglingReference("h1".into()),
            ]
        );
    }

    #[test]
    fn test_duplicate_nodes_collapse() {
        let extractor = extractor_with(Ok(RawGraph::default()));
        let raw = RawGraph {
            nodes: vec![
                node("a", "Skill", json!({"code": "RUST", "name": "Rust"})),
                node("b", "Skill", json!({"code": "rust", "name": "Rust lang"})),
            ],
            edges: vec![],
        };

        let graph = extractor.validate(raw, &Properties::new());
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].properties["name"], "Rust lang");
    }

    #[tokio::test]
    async fn test_empty_oracle_output_is_failure() {
        let extractor = extractor_with(Ok(RawGraph::default()));
        let result = extractor.try_extract(&Document::new("nothing here")).await;
        assert!(matches!(result, Err(ExtractionError::EmptyOutput)));
    }

    #[tokio::test]
    async fn test_extract_swallows_oracle_errors() {
        let extractor = extractor_with(Err(OracleError::Malformed("garbage".into())));
        let graph = extractor.extract(&Document::new("row")).await;
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_try_extract_validates() {
        let extractor = extractor_with(Ok(kim_and_rust(vec![edge(
            "p1",
            "s1",
            "HAS_SKILL",
            Some(0.9),
        )])));
        let graph = extractor.try_extract(&Document::new("row")).await.unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
    }
}
