use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::graph::{Document, SOURCE_FILE_KEY, SOURCE_ROW_KEY};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    /// Whether the source itself is unreadable, as opposed to a single bad record.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Csv(e) => e.is_io_error(),
        }
    }
}

pub type LoaderResult<T> = Result<T, LoaderError>;

pub type DocumentStream<'a> = Box<dyn Iterator<Item = LoaderResult<Document>> + Send + 'a>;

/// A finite, lazily evaluated source of documents.
///
/// Every call to [`Loader::documents`] starts a fresh pass over the source,
/// so a pipeline run can be repeated from scratch for recovery. A per-record
/// error must advance the stream; once a fatal error is yielded the consumer
/// stops reading.
pub trait Loader: Send + Sync {
    fn documents(&self) -> LoaderResult<DocumentStream<'_>>;
}

/// Turns each CSV row into one document of `column: value` lines.
pub struct CsvLoader {
    path: PathBuf,
    delimiter: u8,
}

impl CsvLoader {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Loader for CsvLoader {
    fn documents(&self) -> LoaderResult<DocumentStream<'_>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let headers = reader.headers()?.clone();
        let source_file = self
            .path
            .file_name()
            .map_or_else(|| self.path.to_string_lossy(), |n| n.to_string_lossy())
            .into_owned();

        let rows = reader.into_records().enumerate().map(
            move |(index, record)| -> LoaderResult<Document> {
                let record = record?;
                if record.len() > headers.len() {
                    warn!(
                        source_file = %source_file,
                        row = index + 1,
                        dropped = record.len() - headers.len(),
                        "Ignoring fields without a header"
                    );
                }
                let content = headers
                    .iter()
                    .zip(record.iter())
                    .filter(|(_, value)| !value.is_empty())
                    .map(|(column, value)| format!("{column}: {value}"))
                    .collect::<Vec<_>>()
                    .join("\n");

                Ok(Document::new(content)
                    .with_metadata(SOURCE_FILE_KEY, source_file.clone())
                    .with_metadata(SOURCE_ROW_KEY, index as u64 + 1))
            },
        );

        Ok(Box::new(rows))
    }
}

/// Serves a fixed set of documents, mostly for tests and programmatic callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    documents: Vec<Document>,
}

impl MemoryLoader {
    #[must_use]
    pub const fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

impl Loader for MemoryLoader {
    fn documents(&self) -> LoaderResult<DocumentStream<'_>> {
        Ok(Box::new(self.documents.iter().cloned().map(Ok)))
    }
}
