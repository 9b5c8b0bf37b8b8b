use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid node label: {0}")]
    InvalidNodeLabel(String),

    #[error("Invalid relation type: {0}")]
    InvalidRelationType(String),

    #[error("Invalid policy table: {0}")]
    InvalidPolicyTable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
