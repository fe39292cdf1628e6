pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod index;
pub mod loader;
pub mod models;
pub mod session;
pub mod traits;

#[cfg(test)]
mod test_http;

pub use chunking::{chunk_documents, normalize_whitespace, split_text, ChunkingConfig, TextWindow};
pub use config::{Credentials, ProviderEndpoints, SessionOptions};
pub use embeddings::{
    cosine_similarity, CharacterNgramEmbedder, Embedder, OpenAiEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ConfigError, EmbeddingError, ErrorKind, IndexError, IngestError, ProviderError,
    RetrievalError, SessionError,
};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use generator::{AnswerGenerator, AnswerPrompt, ChatCompletionGenerator, ExtractiveGenerator};
pub use index::VectorIndex;
pub use loader::{discover_pdf_files, load_documents, LoadReport};
pub use models::{
    Answer, BuildReport, Chunk, Document, DocumentFingerprint, ScoredChunk, SessionPhase,
    SkippedPdf,
};
pub use session::{answer_with, IndexRetriever, Session};
pub use traits::Retriever;
