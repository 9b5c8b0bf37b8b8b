use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::OracleConfig;
use crate::graph::Properties;
use crate::schema;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Oracle returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed oracle output: {0}")]
    Malformed(String),
    #[error("Invalid oracle URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type OracleResult<T> = Result<T, OracleError>;

/// A node as the oracle reported it, before any validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    #[serde(deserialize_with = "provisional_id")]
    pub id: String,
    pub label: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEdge {
    #[serde(deserialize_with = "provisional_id")]
    pub source_id: String,
    #[serde(deserialize_with = "provisional_id")]
    pub target_id: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Properties,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGraph {
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub edges: Vec<RawEdge>,
}

impl RawGraph {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Parses oracle text, tolerating prose or code fences around the JSON object.
    pub fn parse(text: &str) -> OracleResult<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let json = match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => {
                return Err(OracleError::Malformed(
                    "no JSON object in oracle output".to_string(),
                ))
            }
        };

        serde_json::from_str(json).map_err(|e| OracleError::Malformed(e.to_string()))
    }
}

fn provisional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "invalid provisional id: {other}"
        ))),
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Properties, D::Error> {
    Ok(Option::<Properties>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_confidence<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// The external knowledge-extraction service.
#[async_trait::async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn extract_raw(&self, text: &str) -> OracleResult<RawGraph>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Oracle backed by an OpenAI-compatible `/chat/completions` endpoint
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    system_prompt: String,
}

impl HttpOracle {
    pub fn new(config: &OracleConfig) -> OracleResult<Self> {
        let mut base = Url::parse(&config.base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("chat/completions")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            system_prompt: system_prompt(),
        })
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl ExtractionOracle for HttpOracle {
    async fn extract_raw(&self, text: &str) -> OracleResult<RawGraph> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: self.temperature,
        };

        debug!(model = %self.model, chars = text.len(), "Requesting extraction");

        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        RawGraph::parse(&content)
    }
}

fn system_prompt() -> String {
    format!(
        "You extract a knowledge graph from one record of tabular HR data.\n\
         Use only this schema; anything else will be discarded.\n\
         {}\n\
         Respond with a single JSON object and nothing else:\n\
         {{\"nodes\": [{{\"id\": string, \"label\": string, \"properties\": object}}],\n\
         \"edges\": [{{\"source_id\": string, \"target_id\": string, \"type\": string, \
         \"properties\": object, \"confidence\": number between 0 and 1}}]}}\n\
         Node ids only need to be unique within your answer. Copy identifying fields \
         such as employee_id, email, code and name into node properties verbatim.",
        schema::describe()
    )
}
