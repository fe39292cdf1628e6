use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {key}")]
    MissingEnv { key: &'static str },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("source path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("no pdf files found in {}", .0.display())]
    NoPdfFiles(PathBuf),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("documents produced no text to index")]
    EmptyCorpus,
}

/// Failure talking to a hosted embedding or completion provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid response from {provider}: {details}")]
    MalformedResponse { provider: String, details: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("vector dimension {found} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("embedding count {vectors} doesn't match chunk count {chunks}")]
    CountMismatch { chunks: usize, vectors: usize },

    #[error("cannot build an index over zero chunks")]
    Empty,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("vector store is not ready; run document embedding first")]
    NotIndexed,

    #[error("question is empty")]
    EmptyQuestion,

    #[error("query embedding failed: {0}")]
    QueryEmbedding(#[source] ProviderError),

    #[error("similarity search failed: {0}")]
    Search(#[from] IndexError),

    #[error("answer generation failed: {0}")]
    Generation(#[source] ProviderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Ingestion,
    Embedding,
    Retrieval,
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Error returned at the boundary of a session operation, tagged by the
/// stage that failed.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("ingestion error: {0}")]
    Ingestion(#[from] IngestError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Ingestion(_) => ErrorKind::Ingestion,
            Self::Embedding(_) => ErrorKind::Embedding,
            Self::Retrieval(_) => ErrorKind::Retrieval,
        }
    }
}

impl From<ProviderError> for SessionError {
    fn from(value: ProviderError) -> Self {
        Self::Embedding(EmbeddingError::Provider(value))
    }
}

impl From<IndexError> for SessionError {
    fn from(value: IndexError) -> Self {
        Self::Embedding(EmbeddingError::Index(value))
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
