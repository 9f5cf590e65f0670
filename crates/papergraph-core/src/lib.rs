use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod backend;
pub mod config_file;
pub mod llm;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod response;
pub mod retry;
pub mod store;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend};
pub use llm::{ChatCompletionClient, CompletionBackend, LlmError};
pub use pipeline::{BatchSummary, IngestOutcome, Ingestor, paper_id_from_filename};
pub use response::{ParseError, parse_extraction, strip_code_fence};
pub use retry::{RetryPolicy, complete_with_retry};
pub use store::{GraphStore, PersistOutcome, StoreError};

/// Default chat-completions endpoint (Groq, OpenAI-compatible).
pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default extraction model.
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Scalar text: strings as-is, numbers and booleans by their JSON text.
/// `null`, arrays and objects yield `None`.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_text(deserializer)?.unwrap_or_default())
}

/// Integers, floats (truncated) and numeric strings such as `"2023"`.
/// Anything else, `null` included, becomes 0.
fn lenient_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let from_float = |f: f64| f.is_finite().then_some(f as i64);
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(from_float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(from_float))
        }
        _ => None,
    }
    .unwrap_or(0))
}

/// Paper fields as proposed by the extraction model.
///
/// `arxiv_id` is whatever the model echoed back; it is always replaced by the
/// caller-assigned identifier before the node is written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperNode {
    #[serde(default, deserialize_with = "lenient_string")]
    pub arxiv_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub authors: String,
    #[serde(default, deserialize_with = "lenient_int")]
    pub year: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub methods: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub datasets: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metrics: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub project_page: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pdf_link: String,
}

/// A relationship proposed by the model. Entries without a target are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEdge {
    #[serde(default, deserialize_with = "lenient_text")]
    pub target_arxiv_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub relationship_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub reasoning: Option<String>,
}

impl ExtractedEdge {
    /// Tag used when the model omits `relationship_type`.
    pub const DEFAULT_RELATIONSHIP: &'static str = "RELATED";

    /// Target identifier, if present and non-empty.
    pub fn target(&self) -> Option<&str> {
        self.target_arxiv_id.as_deref().filter(|t| !t.is_empty())
    }

    pub fn relationship(&self) -> &str {
        self.relationship_type
            .as_deref()
            .unwrap_or(Self::DEFAULT_RELATIONSHIP)
    }

    pub fn reasoning(&self) -> &str {
        self.reasoning.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    #[serde(default, deserialize_with = "lenient_int")]
    pub citation_count: i64,
}

/// The full structure the extraction model is asked to return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub node: PaperNode,
    #[serde(default, deserialize_with = "null_as_default")]
    pub edges: Vec<ExtractedEdge>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: ExtractedMetadata,
}

/// A stored node row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRow {
    pub arxiv_id: String,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub year: Option<i64>,
    pub summary: Option<String>,
    pub methods: Vec<String>,
    pub datasets: Vec<String>,
    pub metrics: Vec<String>,
    pub project_page: Option<String>,
    pub pdf_link: Option<String>,
}

/// A stored edge row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeRow {
    pub id: i64,
    pub source_id: Option<String>,
    pub target_id: Option<String>,
    pub relationship_type: Option<String>,
    pub reasoning: Option<String>,
}

/// A stored metadata row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRow {
    pub arxiv_id: String,
    pub citation_count: Option<i64>,
    pub last_updated: Option<String>,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("PDF extraction error: {0}")]
    Pdf(#[from] BackendError),
    #[error("completion error: {0}")]
    Llm(#[from] LlmError),
    #[error("response parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("database error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Progress events emitted during ingestion.
#[derive(Debug, Clone)]
pub enum IngestEvent {
    BatchStarted {
        dir: PathBuf,
        total: usize,
    },
    PaperStarted {
        index: usize,
        total: usize,
        arxiv_id: String,
        file_name: String,
    },
    AlreadyPresent {
        arxiv_id: String,
    },
    TextExtracted {
        characters: usize,
    },
    Requesting {
        model: String,
    },
    RateLimitWait {
        attempt: u32,
        wait: Duration,
    },
    ResponseParsed,
    Saved {
        arxiv_id: String,
        outcome: PersistOutcome,
    },
    PaperFailed {
        arxiv_id: String,
        message: String,
    },
    Pacing {
        wait: Duration,
    },
}

/// Resolved runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_attempts: u32,
    pub backoff_step_secs: u64,
    pub max_prompt_chars: usize,
    pub timeout_secs: u64,
    pub pacing_secs: u64,
    pub web_bind: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("db_path", &self.db_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_step_secs", &self.backoff_step_secs)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .field("timeout_secs", &self.timeout_secs)
            .field("pacing_secs", &self.pacing_secs)
            .field("web_bind", &self.web_bind)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("papergraph.db"),
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 2048,
            max_attempts: 3,
            backoff_step_secs: 10,
            max_prompt_chars: prompt::MAX_PROMPT_CHARS,
            timeout_secs: 120,
            pacing_secs: 3,
            web_bind: "127.0.0.1:5555".to_string(),
        }
    }
}

impl Config {
    /// Apply values from a config file over the defaults.
    pub fn from_file(file: &config_file::ConfigFile) -> Self {
        let mut config = Self::default();
        if let Some(db) = &file.database
            && let Some(path) = &db.path
        {
            config.db_path = PathBuf::from(path);
        }
        if let Some(llm) = &file.llm {
            config.api_key = llm.api_key.clone().or(config.api_key);
            if let Some(endpoint) = &llm.endpoint {
                config.endpoint = endpoint.clone();
            }
            if let Some(model) = &llm.model {
                config.model = model.clone();
            }
            config.temperature = llm.temperature.unwrap_or(config.temperature);
            config.max_tokens = llm.max_tokens.unwrap_or(config.max_tokens);
            config.max_attempts = llm.max_attempts.unwrap_or(config.max_attempts);
            config.backoff_step_secs = llm.backoff_step_secs.unwrap_or(config.backoff_step_secs);
            config.max_prompt_chars = llm.max_prompt_chars.unwrap_or(config.max_prompt_chars);
            config.timeout_secs = llm.timeout_secs.unwrap_or(config.timeout_secs);
        }
        if let Some(batch) = &file.batch {
            config.pacing_secs = batch.pacing_secs.unwrap_or(config.pacing_secs);
        }
        if let Some(web) = &file.web
            && let Some(bind) = &web.bind
        {
            config.web_bind = bind.clone();
        }
        config
    }

    /// Apply environment overrides (`PAPERGRAPH_DB`, `GROQ_API_KEY`).
    pub fn with_env(mut self) -> Self {
        if let Ok(path) = std::env::var("PAPERGRAPH_DB") {
            self.db_path = PathBuf::from(path);
        }
        if let Ok(key) = std::env::var("GROQ_API_KEY")
            && !key.is_empty()
        {
            self.api_key = Some(key);
        }
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.backoff_step_secs),
        )
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_secs(self.pacing_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_file::{BatchConfig, ConfigFile, LlmConfig};

    #[test]
    fn debug_redacts_api_key() {
        let config = Config {
            api_key: Some("gsk_secret".into()),
            ..Config::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("gsk_secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn file_values_override_defaults() {
        let file = ConfigFile {
            llm: Some(LlmConfig {
                model: Some("other-model".into()),
                max_attempts: Some(5),
                ..Default::default()
            }),
            batch: Some(BatchConfig {
                pacing_secs: Some(0),
            }),
            ..Default::default()
        };
        let config = Config::from_file(&file);
        assert_eq!(config.model, "other-model");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.pacing(), Duration::ZERO);
        // Untouched fields keep their defaults
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn edge_defaults() {
        let edge = ExtractedEdge {
            target_arxiv_id: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(edge.target(), None);
        assert_eq!(edge.relationship(), "RELATED");
        assert_eq!(edge.reasoning(), "");
    }

    #[test]
    fn null_fields_fall_back_to_defaults() {
        let json = r#"{"node": {"title": null, "year": null, "methods": null},
                       "edges": null, "metadata": null}"#;
        let extraction: Extraction = serde_json::from_str(json).unwrap();
        assert_eq!(extraction.node.title, "");
        assert_eq!(extraction.node.year, 0);
        assert!(extraction.node.methods.is_empty());
        assert!(extraction.edges.is_empty());
        assert_eq!(extraction.metadata.citation_count, 0);
    }

    #[test]
    fn scalar_fields_accept_numbers_and_strings() {
        let json = r#"{"node": {"arxiv_id": 2312.00042, "year": "2023"},
                       "edges": [{"target_arxiv_id": 2401.00001, "relationship_type": null,
                                  "reasoning": ["not", "text"]}],
                       "metadata": {"citation_count": 41.9}}"#;
        let extraction: Extraction = serde_json::from_str(json).unwrap();
        assert_eq!(extraction.node.arxiv_id, "2312.00042");
        assert_eq!(extraction.node.year, 2023);
        assert_eq!(extraction.edges[0].target(), Some("2401.00001"));
        assert_eq!(extraction.edges[0].relationship(), "RELATED");
        assert_eq!(extraction.edges[0].reasoning(), "");
        assert_eq!(extraction.metadata.citation_count, 41);
    }

    #[test]
    fn non_numeric_counts_become_zero() {
        let json = r#"{"node": {"year": "circa 2020"},
                       "metadata": {"citation_count": "unknown"}}"#;
        let extraction: Extraction = serde_json::from_str(json).unwrap();
        assert_eq!(extraction.node.year, 0);
        assert_eq!(extraction.metadata.citation_count, 0);

        let json = r#"{"node": {"year": " 1999 "}, "metadata": {"citation_count": true}}"#;
        let extraction: Extraction = serde_json::from_str(json).unwrap();
        assert_eq!(extraction.node.year, 1999);
        assert_eq!(extraction.metadata.citation_count, 0);
    }
}
