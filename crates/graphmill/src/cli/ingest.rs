use std::sync::Arc;

use anyhow::{bail, Context, Result};
use graphmill_core::{
    CsvLoader, Extractor, GraphmillConfig, HttpOracle, IngestPipeline, SqliteConnector,
};
use tracing::info;

use super::IngestArgs;

pub async fn run(args: IngestArgs) -> Result<()> {
    if !args.path.is_file() {
        bail!("No such file: {}", args.path.display());
    }
    let Ok(delimiter) = u8::try_from(args.delimiter) else {
        bail!("Delimiter must be a single ASCII character");
    };

    let config = apply_overrides(GraphmillConfig::from_env(), &args);
    info!(
        database = %config.store.database_path.display(),
        model = %config.oracle.model,
        batch_size = config.pipeline.batch_size,
        concurrency = config.pipeline.max_concurrency,
        "Starting ingest"
    );

    let oracle = HttpOracle::new(&config.oracle).context("Invalid oracle configuration")?;
    let extractor = Extractor::new(Arc::new(oracle), &config.extractor);
    let connector = Arc::new(SqliteConnector::new(config.store.database_path.clone()));
    let pipeline = IngestPipeline::new(extractor, connector, config.pipeline);

    let loader = CsvLoader::new(args.path.clone()).with_delimiter(delimiter);
    let stats = pipeline
        .run(&loader)
        .await
        .with_context(|| format!("Ingest of {} failed", args.path.display()))?;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn apply_overrides(mut config: GraphmillConfig, args: &IngestArgs) -> GraphmillConfig {
    if let Some(db) = &args.db {
        config.store.database_path.clone_from(db);
    }
    if let Some(url) = &args.oracle_url {
        config.oracle.base_url.clone_from(url);
    }
    if let Some(model) = &args.model {
        config.oracle.model.clone_from(model);
    }
    if let Some(size) = args.batch_size {
        config.pipeline.batch_size = size;
    }
    if let Some(limit) = args.concurrency {
        config.pipeline.max_concurrency = limit;
    }
    if let Some(threshold) = args.threshold {
        config.extractor.confidence_threshold = threshold;
    }
    config.pipeline = config.pipeline.clamped();
    config
}
