mod extractor;
mod loader;
mod oracle;
mod pipeline;

pub use extractor::{ExtractionError, ExtractionResult, Extractor, Rejection};
pub use loader::{CsvLoader, DocumentStream, Loader, LoaderError, LoaderResult, MemoryLoader};
pub use oracle::{
    ExtractionOracle, HttpOracle, OracleError, OracleResult, RawEdge, RawGraph, RawNode,
};
pub use pipeline::{
    group_for_write, BatchOutcome, EdgeGroups, IngestPipeline, NodeGroups, PipelineError,
    PipelineResult, PipelineStats,
};
