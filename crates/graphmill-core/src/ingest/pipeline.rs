use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::extractor::{ExtractionError, Extractor};
use super::loader::{Loader, LoaderError};
use crate::config::PipelineConfig;
use crate::graph::{Document, ExtractedGraph};
use crate::jobs::{JobId, JobTracker};
use crate::schema::{NodeLabel, RelationType};
use crate::storage::{EdgeUpsert, GraphStore, NodeUpsert, StoreConnector, StoreError, UpsertCounts};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Cannot connect to graph store: {0}")]
    Connect(#[source] StoreError),
    #[error("Cannot read documents: {0}")]
    Loader(#[from] LoaderError),
    #[error("Store write failed in batch {batch}: {source}")]
    Write {
        batch: usize,
        #[source]
        source: StoreError,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub failed_docs: usize,
}

impl std::ops::AddAssign for PipelineStats {
    fn add_assign(&mut self, batch: Self) {
        self.total_nodes += batch.total_nodes;
        self.total_edges += batch.total_edges;
        self.failed_docs += batch.failed_docs;
    }
}

/// Merged extraction output of one batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub graph: ExtractedGraph,
    pub failed: usize,
}

impl BatchOutcome {
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            total_nodes: self.graph.nodes.len(),
            total_edges: self.graph.edges.len(),
            failed_docs: self.failed,
        }
    }
}

pub type NodeGroups = BTreeMap<NodeLabel, Vec<NodeUpsert>>;
pub type EdgeGroups = BTreeMap<RelationType, Vec<EdgeUpsert>>;

/// Splits a merged graph into one bulk write per label and per relation type.
#[must_use]
pub fn group_for_write(graph: ExtractedGraph) -> (NodeGroups, EdgeGroups) {
    let mut nodes = NodeGroups::new();
    for node in graph.nodes {
        nodes.entry(node.label).or_default().push(node.into());
    }

    let mut edges = EdgeGroups::new();
    for edge in graph.edges {
        edges.entry(edge.relation_type).or_default().push(edge.into());
    }

    (nodes, edges)
}

/// Batches documents through the extractor and writes each batch to the store.
pub struct IngestPipeline {
    extractor: Arc<Extractor>,
    connector: Arc<dyn StoreConnector>,
    config: PipelineConfig,
    limiter: Arc<Semaphore>,
}

impl IngestPipeline {
    #[must_use]
    pub fn new(
        extractor: Extractor,
        connector: Arc<dyn StoreConnector>,
        config: PipelineConfig,
    ) -> Self {
        let config = config.clamped();
        Self {
            extractor: Arc::new(extractor),
            connector,
            limiter: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self, loader: &dyn Loader) -> PipelineResult<PipelineStats> {
        self.execute(loader, None).await
    }

    /// Same as [`Self::run`], reporting progress and the final state to `tracker`.
    pub async fn run_job(
        &self,
        loader: &dyn Loader,
        tracker: &JobTracker,
        job: JobId,
    ) -> PipelineResult<PipelineStats> {
        let result = self.execute(loader, Some((tracker, job))).await;
        match &result {
            Ok(stats) => tracker.complete(job, *stats).await,
            Err(e) => tracker.fail(job, e.to_string()).await,
        }
        result
    }

    async fn execute(
        &self,
        loader: &dyn Loader,
        progress: Option<(&JobTracker, JobId)>,
    ) -> PipelineResult<PipelineStats> {
        let store = self
            .connector
            .connect()
            .await
            .map_err(PipelineError::Connect)?;

        let result = self.process(loader, store.as_ref(), progress).await;
        store.close().await;

        match &result {
            Ok(stats) => info!(
                nodes = stats.total_nodes,
                edges = stats.total_edges,
                failed = stats.failed_docs,
                "Pipeline run completed"
            ),
            Err(e) => warn!(error = %e, "Pipeline run aborted"),
        }
        result
    }

    async fn process(
        &self,
        loader: &dyn Loader,
        store: &dyn GraphStore,
        progress: Option<(&JobTracker, JobId)>,
    ) -> PipelineResult<PipelineStats> {
        let mut totals = PipelineStats::default();
        let mut documents = loader.documents()?;
        let mut batch_index = 0;

        loop {
            let mut batch = Vec::with_capacity(self.config.batch_size);
            let mut unreadable = 0;

            for item in documents.by_ref() {
                match item {
                    Ok(document) => batch.push(document),
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable document");
                        unreadable += 1;
                    }
                }
                if batch.len() + unreadable >= self.config.batch_size {
                    break;
                }
            }

            if batch.is_empty() && unreadable == 0 {
                break;
            }

            if let Some((tracker, job)) = progress {
                tracker.set_running(job, batch_index, totals).await;
            }

            let size = batch.len();
            let mut outcome = self.extract_batch(batch).await;
            outcome.failed += unreadable;

            let stats = outcome.stats();
            let counts = write_batch(store, batch_index, outcome.graph).await?;
            totals += stats;

            info!(
                batch = batch_index,
                documents = size,
                nodes = stats.total_nodes,
                edges = stats.total_edges,
                failed = stats.failed_docs,
                created = counts.created,
                updated = counts.updated,
                "Batch committed"
            );
            batch_index += 1;
        }

        Ok(totals)
    }

    /// Runs every extraction of a batch under the concurrency limit and waits for all of them.
    pub async fn extract_batch(&self, documents: Vec<Document>) -> BatchOutcome {
        let mut tasks = JoinSet::new();

        for document in documents {
            let extractor = Arc::clone(&self.extractor);
            let limiter = Arc::clone(&self.limiter);
            tasks.spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|e| ExtractionError::Task(e.to_string()))?;
                extractor.try_extract(&document).await
            });
        }

        let mut outcome = BatchOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(graph)) => outcome.graph.merge(graph),
                Ok(Err(e)) => {
                    warn!(error = %e, "Document extraction failed");
                    outcome.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Extraction task did not finish");
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }
}

async fn write_batch(
    store: &dyn GraphStore,
    batch: usize,
    graph: ExtractedGraph,
) -> PipelineResult<UpsertCounts> {
    let mut counts = UpsertCounts::default();
    if graph.is_empty() {
        debug!(batch, "Nothing to write");
        return Ok(counts);
    }

    let (node_groups, edge_groups) = group_for_write(graph);

    // Nodes first so edge endpoints can be matched.
    for (label, nodes) in node_groups {
        counts += store
            .upsert_nodes(label, &nodes)
            .await
            .map_err(|source| PipelineError::Write { batch, source })?;
    }

    for (relation, edges) in edge_groups {
        counts += store
            .upsert_edges(relation, &edges)
            .await
            .map_err(|source| PipelineError::Write { batch, source })?;
    }

    Ok(counts)
}
