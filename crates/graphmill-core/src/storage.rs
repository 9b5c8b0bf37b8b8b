use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use thiserror::Error;
use tracing::debug;

use crate::graph::{Edge, Node, Properties, Provenance};
use crate::schema::{NodeLabel, RelationType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One element of a bulk node upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpsert {
    pub id: String,
    pub properties: Properties,
    pub provenance: Provenance,
}

impl From<Node> for NodeUpsert {
    fn from(node: Node) -> Self {
        Self {
            provenance: Provenance::from_metadata(&node.source_metadata),
            id: node.id,
            properties: node.properties,
        }
    }
}

/// One element of a bulk edge upsert. Confidence is folded into the properties.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeUpsert {
    pub source_id: String,
    pub target_id: String,
    pub properties: Properties,
    pub source_label: Option<NodeLabel>,
    pub target_label: Option<NodeLabel>,
    pub provenance: Provenance,
}

impl From<Edge> for EdgeUpsert {
    fn from(edge: Edge) -> Self {
        let mut properties = edge.properties;
        properties.insert("confidence".to_string(), serde_json::json!(edge.confidence));

        Self {
            provenance: Provenance::from_metadata(&edge.source_metadata),
            source_id: edge.source_id,
            target_id: edge.target_id,
            properties,
            source_label: edge.source_label,
            target_label: edge.target_label,
        }
    }
}

/// The endpoint labels every edge in the group agrees on, if any.
///
/// When present, endpoints can be matched through the `(label, id)` index;
/// otherwise they are matched by id alone.
#[must_use]
pub fn shared_endpoint_labels(edges: &[EdgeUpsert]) -> Option<(NodeLabel, NodeLabel)> {
    let first = edges.first()?;
    let pair = (first.source_label?, first.target_label?);

    edges
        .iter()
        .all(|e| e.source_label == Some(pair.0) && e.target_label == Some(pair.1))
        .then_some(pair)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertCounts {
    pub created: usize,
    pub updated: usize,
    /// Edges whose endpoints were not found in the store
    pub skipped: usize,
}

impl std::ops::AddAssign for UpsertCounts {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Bulk, idempotent writes against the shared graph.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    /// Match-or-create every node by id.
    async fn upsert_nodes(&self, label: NodeLabel, nodes: &[NodeUpsert])
        -> StoreResult<UpsertCounts>;

    /// Match both endpoints, then create-or-update the relationship.
    async fn upsert_edges(
        &self,
        relation: RelationType,
        edges: &[EdgeUpsert],
    ) -> StoreResult<UpsertCounts>;

    /// Releases the underlying connection(s).
    async fn close(&self);
}

/// Acquires a store handle for one pipeline run.
#[async_trait::async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> StoreResult<Box<dyn GraphStore>>;
}

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    properties TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    source_file TEXT,
    source_row INTEGER,
    last_source_file TEXT,
    last_source_row INTEGER
);

CREATE INDEX IF NOT EXISTS idx_nodes_label_id ON nodes(label, id);

CREATE TABLE IF NOT EXISTS edges (
    source_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    rel_type TEXT NOT NULL,
    properties TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    source_file TEXT,
    source_row INTEGER,
    last_source_file TEXT,
    last_source_row INTEGER,
    PRIMARY KEY (source_id, target_id, rel_type)
);

CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(rel_type);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
"#;

type NodeRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<String>,
    Option<i64>,
);

/// A node as persisted, with its audit columns.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub id: String,
    pub label: NodeLabel,
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_from: Provenance,
    pub last_source: Provenance,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEdge {
    pub source_id: String,
    pub target_id: String,
    pub relation: RelationType,
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl StoreConnector for SqliteConnector {
    async fn connect(&self) -> StoreResult<Box<dyn GraphStore>> {
        let store = SqliteGraphStore::open(&self.path).await?;
        Ok(Box::new(store))
    }
}

pub struct SqliteGraphStore {
    pool: Pool<Sqlite>,
}

impl SqliteGraphStore {
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{}?mode=rwc", path.display()))
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn open_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    // Read helpers

    pub async fn get_node(&self, id: &str) -> StoreResult<Option<StoredNode>> {
        let row: Option<NodeRow> = sqlx::query_as(
            r#"
            SELECT id, label, properties, created_at, updated_at,
                   source_file, source_row, last_source_file, last_source_row
            FROM nodes WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(parse_node_row).transpose()
    }

    pub async fn count_nodes(&self, label: Option<NodeLabel>) -> StoreResult<i64> {
        let count = match label {
            Some(l) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM nodes WHERE label = ?")
                    .bind(l.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM nodes")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    pub async fn count_edges(&self, relation: Option<RelationType>) -> StoreResult<i64> {
        let count = match relation {
            Some(r) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM edges WHERE rel_type = ?")
                    .bind(r.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM edges")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    pub async fn get_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relation: RelationType,
    ) -> StoreResult<Option<StoredEdge>> {
        let row: Option<(String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT properties, created_at, updated_at
            FROM edges WHERE source_id = ? AND target_id = ? AND rel_type = ?
            "#,
        )
        .bind(source_id)
        .bind(target_id)
        .bind(relation.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some((properties, created_at, updated_at)) = row else {
            return Ok(None);
        };

        let record_id = format!("{source_id}-[{relation}]->{target_id}");
        Ok(Some(StoredEdge {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation,
            properties: serde_json::from_str(&properties)?,
            created_at: parse_timestamp(&record_id, &created_at)?,
            updated_at: updated_at
                .map(|t| parse_timestamp(&record_id, &t))
                .transpose()?,
        }))
    }
}

#[async_trait::async_trait]
impl GraphStore for SqliteGraphStore {
    async fn upsert_nodes(
        &self,
        label: NodeLabel,
        nodes: &[NodeUpsert],
    ) -> StoreResult<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for node in nodes {
            let properties = serde_json::to_string(&node.properties)?;

            let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM nodes WHERE id = ?")
                .bind(&node.id)
                .fetch_optional(&mut *tx)
                .await?;

            if existing.is_some() {
                sqlx::query(
                    r#"
                    UPDATE nodes
                    SET properties = ?, updated_at = ?, last_source_file = ?, last_source_row = ?
                    WHERE id = ?
                    "#,
                )
                .bind(properties)
                .bind(&now)
                .bind(&node.provenance.source_file)
                .bind(node.provenance.row)
                .bind(&node.id)
                .execute(&mut *tx)
                .await?;
                counts.updated += 1;
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO nodes (id, label, properties, created_at, source_file, source_row,
                                       last_source_file, last_source_row)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&node.id)
                .bind(label.as_str())
                .bind(properties)
                .bind(&now)
                .bind(&node.provenance.source_file)
                .bind(node.provenance.row)
                .bind(&node.provenance.source_file)
                .bind(node.provenance.row)
                .execute(&mut *tx)
                .await?;
                counts.created += 1;
            }
        }

        tx.commit().await?;
        debug!(%label, created = counts.created, updated = counts.updated, "Upserted nodes");
        Ok(counts)
    }

    async fn upsert_edges(
        &self,
        relation: RelationType,
        edges: &[EdgeUpsert],
    ) -> StoreResult<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        let now = Utc::now().to_rfc3339();
        let labels = shared_endpoint_labels(edges);
        let mut tx = self.pool.begin().await?;

        for edge in edges {
            let endpoints_found: i64 = match labels {
                Some((source_label, target_label)) => {
                    sqlx::query_scalar(
                        r#"
                        SELECT EXISTS(SELECT 1 FROM nodes WHERE label = ? AND id = ?)
                           AND EXISTS(SELECT 1 FROM nodes WHERE label = ? AND id = ?)
                        "#,
                    )
                    .bind(source_label.as_str())
                    .bind(&edge.source_id)
                    .bind(target_label.as_str())
                    .bind(&edge.target_id)
                    .fetch_one(&mut *tx)
                    .await?
                }
                None => {
                    sqlx::query_scalar(
                        r#"
                        SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?)
                           AND EXISTS(SELECT 1 FROM nodes WHERE id = ?)
                        "#,
                    )
                    .bind(&edge.source_id)
                    .bind(&edge.target_id)
                    .fetch_one(&mut *tx)
                    .await?
                }
            };

            if endpoints_found == 0 {
                counts.skipped += 1;
                continue;
            }

            let properties = serde_json::to_string(&edge.properties)?;
            let existing: Option<(String,)> = sqlx::query_as(
                "SELECT source_id FROM edges WHERE source_id = ? AND target_id = ? AND rel_type = ?",
            )
            .bind(&edge.source_id)
            .bind(&edge.target_id)
            .bind(relation.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            if existing.is_some() {
                sqlx::query(
                    r#"
                    UPDATE edges
                    SET properties = ?, updated_at = ?, last_source_file = ?, last_source_row = ?
                    WHERE source_id = ? AND target_id = ? AND rel_type = ?
                    "#,
                )
                .bind(properties)
                .bind(&now)
                .bind(&edge.provenance.source_file)
                .bind(edge.provenance.row)
                .bind(&edge.source_id)
                .bind(&edge.target_id)
                .bind(relation.as_str())
                .execute(&mut *tx)
                .await?;
                counts.updated += 1;
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO edges (source_id, target_id, rel_type, properties, created_at,
                                       source_file, source_row, last_source_file, last_source_row)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&edge.source_id)
                .bind(&edge.target_id)
                .bind(relation.as_str())
                .bind(properties)
                .bind(&now)
                .bind(&edge.provenance.source_file)
                .bind(edge.provenance.row)
                .bind(&edge.provenance.source_file)
                .bind(edge.provenance.row)
                .execute(&mut *tx)
                .await?;
                counts.created += 1;
            }
        }

        tx.commit().await?;
        debug!(
            %relation,
            indexed = labels.is_some(),
            created = counts.created,
            updated = counts.updated,
            skipped = counts.skipped,
            "Upserted edges"
        );
        Ok(counts)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn parse_timestamp(id: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
}

fn parse_node_row(row: NodeRow) -> StoreResult<StoredNode> {
    let (
        id,
        label,
        properties,
        created_at,
        updated_at,
        source_file,
        source_row,
        last_source_file,
        last_source_row,
    ) = row;

    let label = label.parse::<NodeLabel>().map_err(|e| StoreError::Corrupt {
        id: id.clone(),
        reason: e.to_string(),
    })?;

    Ok(StoredNode {
        label,
        properties: serde_json::from_str(&properties)?,
        created_at: parse_timestamp(&id, &created_at)?,
        updated_at: updated_at.map(|t| parse_timestamp(&id, &t)).transpose()?,
        created_from: Provenance {
            source_file,
            row: source_row,
        },
        last_source: Provenance {
            source_file: last_source_file,
            row: last_source_row,
        },
        id,
    })
}
