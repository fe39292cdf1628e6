//! Runtime configuration: provider credentials, provider endpoints and the
//! knobs of a single question-answering session.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

pub const EMBEDDING_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const LLM_API_KEY_ENV: &str = "GROQ_API_KEY";

pub const DEFAULT_SOURCE_DIR: &str = "./PDFdocs";
pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_MAX_DOCUMENTS: usize = 50;
pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;

#[derive(Clone)]
pub struct Credentials {
    pub embedding_api_key: String,
    pub llm_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("embedding_api_key", &"<redacted>")
            .field("llm_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(
        embedding_api_key: Option<String>,
        llm_api_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            embedding_api_key: required(EMBEDDING_API_KEY_ENV, embedding_api_key)?,
            llm_api_key: required(LLM_API_KEY_ENV, llm_api_key)?,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(
            std::env::var(EMBEDDING_API_KEY_ENV).ok(),
            std::env::var(LLM_API_KEY_ENV).ok(),
        )
    }
}

fn required(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
        .ok_or(ConfigError::MissingEnv { key })
}

#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub chat_base_url: String,
    pub chat_model: String,
    pub request_timeout: Duration,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            embedding_base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            chat_base_url: "https://api.groq.com/openai/v1".to_string(),
            chat_model: "llama3-8b-8192".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub source_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Only the first `max_documents` pages are chunked; `None` keeps all.
    pub max_documents: Option<usize>,
    pub top_k: usize,
    pub recursive: bool,
    pub skip_unreadable: bool,
    pub embedding_batch_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_documents: Some(DEFAULT_MAX_DOCUMENTS),
            top_k: DEFAULT_TOP_K,
            recursive: false,
            skip_unreadable: false,
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }
}

impl SessionOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be positive".to_string()));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding batch size must be positive".to_string(),
            ));
        }
        if self.max_documents == Some(0) {
            return Err(ConfigError::Invalid(
                "document cap must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}
