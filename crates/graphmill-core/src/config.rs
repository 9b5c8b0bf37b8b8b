use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::identity::DEFAULT_NAMESPACE;

/// Batching and fan-out limits for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Documents per batch; one store write phase per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Simultaneous extraction calls within a batch
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

const fn default_batch_size() -> usize {
    50
}

const fn default_max_concurrency() -> usize {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_parse("GRAPHMILL_BATCH_SIZE").unwrap_or(defaults.batch_size),
            max_concurrency: env_parse("GRAPHMILL_MAX_CONCURRENCY")
                .unwrap_or(defaults.max_concurrency),
        }
        .clamped()
    }

    /// Raises zero limits to one.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            batch_size: self.batch_size.max(1),
            max_concurrency: self.max_concurrency.max(1),
        }
    }
}

/// Validation and identity settings for the extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Minimum confidence an edge needs to survive; the boundary value passes
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Deployment name that qualifies every generated entity id
    #[serde(default = "default_identity_namespace")]
    pub identity_namespace: String,
}

const fn default_confidence_threshold() -> f64 {
    0.8
}

fn default_identity_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            identity_namespace: default_identity_namespace(),
        }
    }
}

impl ExtractorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            confidence_threshold: env_parse("GRAPHMILL_CONFIDENCE_THRESHOLD")
                .unwrap_or(defaults.confidence_threshold),
            identity_namespace: std::env::var("GRAPHMILL_IDENTITY_NAMESPACE")
                .unwrap_or(defaults.identity_namespace),
        }
    }
}

/// Connection settings for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub temperature: f32,
}

const fn default_timeout_seconds() -> u64 {
    120
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3.1".to_string(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
            temperature: 0.0,
        }
    }
}

impl OracleConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("GRAPHMILL_ORACLE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("GRAPHMILL_ORACLE_MODEL").unwrap_or(defaults.model),
            api_key: std::env::var("GRAPHMILL_ORACLE_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            timeout_seconds: env_parse("GRAPHMILL_ORACLE_TIMEOUT")
                .unwrap_or(defaults.timeout_seconds),
            temperature: defaults.temperature,
        }
    }
}

/// Where the graph store lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let database_path = dirs::data_dir().map_or_else(
            || PathBuf::from("graphmill.db"),
            |dir| dir.join("graphmill").join("graph.db"),
        );
        Self { database_path }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        std::env::var("GRAPHMILL_DATABASE")
            .map(|path| Self {
                database_path: PathBuf::from(path),
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphmillConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl GraphmillConfig {
    pub fn from_env() -> Self {
        Self {
            pipeline: PipelineConfig::from_env(),
            extractor: ExtractorConfig::from_env(),
            oracle: OracleConfig::from_env(),
            store: StoreConfig::from_env(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GraphmillConfig::default();
        assert_eq!(config.pipeline.batch_size, 50);
        assert_eq!(config.pipeline.max_concurrency, 5);
        assert!((config.extractor.confidence_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.extractor.identity_namespace, "graphmill");
    }

    #[test]
    fn test_clamped() {
        let config = PipelineConfig {
            batch_size: 0,
            max_concurrency: 0,
        }
        .clamped();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_concurrency, 1);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: GraphmillConfig =
            serde_json::from_str(r#"{"pipeline": {"batch_size": 10}}"#).unwrap();
        assert_eq!(config.pipeline.batch_size, 10);
        assert_eq!(config.pipeline.max_concurrency, 5);
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = OracleConfig {
            api_key: Some("secret".into()),
            ..OracleConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
