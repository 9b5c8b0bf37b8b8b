pub mod access;
pub mod config;
pub mod error;
pub mod graph;
pub mod identity;
pub mod ingest;
pub mod jobs;
pub mod schema;
pub mod storage;

pub use access::{AccessPolicy, NodeRule, PolicyTable, PropertyAccess, RelationshipRule, Scope};
pub use config::{ExtractorConfig, GraphmillConfig, OracleConfig, PipelineConfig, StoreConfig};
pub use error::{Error, Result};
pub use graph::{Document, Edge, ExtractedGraph, Node, Properties, Provenance};
pub use identity::{generate_entity_id, IdentityResolver};
pub use ingest::{
    CsvLoader, ExtractionOracle, Extractor, HttpOracle, IngestPipeline, Loader, MemoryLoader,
    PipelineError, PipelineStats,
};
pub use jobs::{JobId, JobRecord, JobStatus, JobTracker};
pub use schema::{NodeLabel, RelationType};
pub use storage::{GraphStore, SqliteConnector, SqliteGraphStore, StoreConnector, StoreError};
