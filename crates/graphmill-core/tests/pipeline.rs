use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use graphmill_core::graph::SOURCE_ROW_KEY;
use graphmill_core::ingest::{OracleResult, RawEdge, RawGraph, RawNode};
use graphmill_core::{
    generate_entity_id, CsvLoader, Document, ExtractionOracle, Extractor, ExtractorConfig,
    HttpOracle, IngestPipeline, JobStatus, JobTracker, MemoryLoader, NodeLabel, OracleConfig,
    PipelineConfig, PipelineStats, Properties, RelationType, SqliteConnector, SqliteGraphStore,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Reads `column: value` lines and reports an Employee, plus a Department
/// and a BELONGS_TO edge when a `department` column is present.
struct RowOracle;

#[async_trait::async_trait]
impl ExtractionOracle for RowOracle {
    async fn extract_raw(&self, text: &str) -> OracleResult<RawGraph> {
        let mut person = Properties::new();
        let mut department = None;
        for line in text.lines() {
            let Some((key, value)) = line.split_once(": ") else {
                continue;
            };
            if key == "department" {
                department = Some(value.to_string());
            } else {
                person.insert(key.to_string(), value.into());
            }
        }

        let mut graph = RawGraph {
            nodes: vec![RawNode {
                id: "1".into(),
                label: "Employee".into(),
                properties: person,
            }],
            edges: Vec::new(),
        };
        if let Some(name) = department {
            let mut props = Properties::new();
            props.insert("name".into(), name.into());
            graph.nodes.push(RawNode {
                id: "2".into(),
                label: "Department".into(),
                properties: props,
            });
            graph.edges.push(RawEdge {
                source_id: "1".into(),
                target_id: "2".into(),
                relation_type: "BELONGS_TO".into(),
                properties: Properties::new(),
                confidence: Some(0.95),
            });
        }
        Ok(graph)
    }
}

fn pipeline_for(db: &Path, oracle: Arc<dyn ExtractionOracle>) -> IngestPipeline {
    let extractor = Extractor::new(oracle, &ExtractorConfig::default());
    let connector = Arc::new(SqliteConnector::new(db));
    IngestPipeline::new(
        extractor,
        connector,
        PipelineConfig {
            batch_size: 2,
            max_concurrency: 2,
        },
    )
}

fn write_csv(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("staff.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
}

fn kim() -> Properties {
    serde_json::from_value(json!({"name": "Kim", "email": "kim@x.com"})).unwrap()
}

#[tokio::test]
async fn same_entity_in_separate_runs_is_updated_not_duplicated() {
    let tmp = TempDir::new().unwrap();
    let db = tmp.path().join("graph.db");
    let pipeline = pipeline_for(&db, Arc::new(RowOracle));

    let content = "name: Kim\nemail: kim@x.com";
    let first = MemoryLoader::new(vec![Document::new(content).with_metadata(SOURCE_ROW_KEY, 1)]);
    let second = MemoryLoader::new(vec![Document::new(content).with_metadata(SOURCE_ROW_KEY, 7)]);

    pipeline.run(&first).await.unwrap();
    let store = SqliteGraphStore::open(&db).await.unwrap();
    let id = generate_entity_id(NodeLabel::Employee, &kim());
    let created = store.get_node(&id).await.unwrap().unwrap();
    assert!(created.updated_at.is_none());
    assert_eq!(created.created_from.row, Some(1));

    pipeline.run(&second).await.unwrap();
    let updated = store.get_node(&id).await.unwrap().unwrap();

    assert_eq!(store.count_nodes(Some(NodeLabel::Employee)).await.unwrap(), 1);
    assert!(updated.updated_at.is_some());
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(updated.created_from.row, Some(1));
    assert_eq!(updated.last_source.row, Some(7));
    assert_eq!(updated.properties, kim());
}

#[tokio::test]
async fn csv_ingest_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let csv = write_csv(
        &tmp,
        "name,email,department\n\
         Kim,kim@x.com,Sales\n\
         Lee,lee@x.com,Sales\n\
         Park,park@x.com,Finance\n",
    );
    let db = tmp.path().join("graph.db");
    let pipeline = pipeline_for(&db, Arc::new(RowOracle));
    let loader = CsvLoader::new(&csv);

    let stats = pipeline.run(&loader).await.unwrap();
    assert_eq!(
        stats,
        PipelineStats {
            total_nodes: 6,
            total_edges: 3,
            failed_docs: 0,
        }
    );

    let again = pipeline.run(&loader).await.unwrap();
    assert_eq!(again, stats);

    let store = SqliteGraphStore::open(&db).await.unwrap();
    assert_eq!(store.count_nodes(Some(NodeLabel::Employee)).await.unwrap(), 3);
    assert_eq!(store.count_nodes(Some(NodeLabel::Department)).await.unwrap(), 2);
    assert_eq!(store.count_edges(Some(RelationType::BelongsTo)).await.unwrap(), 3);

    let employee = store
        .get_node(&generate_entity_id(NodeLabel::Employee, &kim()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(employee.created_from.source_file.as_deref(), Some("staff.csv"));
    assert_eq!(employee.created_from.row, Some(1));
}

#[tokio::test]
async fn job_tracker_sees_completed_run() {
    let tmp = TempDir::new().unwrap();
    let db = tmp.path().join("graph.db");
    let pipeline = pipeline_for(&db, Arc::new(RowOracle));
    let tracker = JobTracker::new();
    let job = tracker.create().await;

    let loader = MemoryLoader::new(
        ["name: A", "name: B", "name: C"]
            .into_iter()
            .map(Document::new)
            .collect(),
    );
    let stats = pipeline.run_job(&loader, &tracker, job).await.unwrap();

    assert_eq!(stats.total_nodes, 3);
    let record = tracker.get(job).await.unwrap();
    assert_eq!(record.status, JobStatus::Completed { stats });
}

#[tokio::test]
async fn http_oracle_feeds_the_store() {
    let server = MockServer::start().await;
    let content = json!({
        "nodes": [
            {"id": 1, "label": "Employee", "properties": {"name": "Kim", "email": "kim@x.com"}},
            {"id": 2, "label": "Skill", "properties": {"name": "Rust"}},
            {"id": 3, "label": "Planet", "properties": {"name": "Mars"}}
        ],
        "edges": [
            {"source_id": 1, "target_id": 2, "type": "HAS_SKILL", "confidence": 0.9},
            {"source_id": 1, "target_id": 2, "type": "HAS_SKILL", "confidence": 0.2},
            {"source_id": 1, "target_id": 3, "type": "HAS_SKILL", "confidence": 0.9}
        ]
    })
    .to_string();
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": format!("```json\n{content}\n```")}}]
        })))
        .mount(&server)
        .await;

    let oracle = HttpOracle::new(&OracleConfig {
        base_url: format!("{}/v1", server.uri()),
        ..OracleConfig::default()
    })
    .unwrap();

    let tmp = TempDir::new().unwrap();
    let db = tmp.path().join("graph.db");
    let pipeline = pipeline_for(&db, Arc::new(oracle));
    let stats = pipeline
        .run(&MemoryLoader::new(vec![Document::new("name: Kim")]))
        .await
        .unwrap();

    assert_eq!(
        stats,
        PipelineStats {
            total_nodes: 2,
            total_edges: 1,
            failed_docs: 0,
        }
    );

    let store = SqliteGraphStore::open(&db).await.unwrap();
    let kim_id = generate_entity_id(NodeLabel::Employee, &kim());
    let rust_id = generate_entity_id(
        NodeLabel::Skill,
        &serde_json::from_value(json!({"name": "Rust"})).unwrap(),
    );
    let edge = store
        .get_edge(&kim_id, &rust_id, RelationType::HasSkill)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(edge.properties["confidence"], 0.9);
}
