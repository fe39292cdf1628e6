use crate::error::RetrievalError;
use crate::models::ScoredChunk;
use async_trait::async_trait;

/// Read-only view that turns a question into ranked context chunks borrowed
/// for `'a`.
#[async_trait]
pub trait Retriever<'a>: Send + Sync {
    fn top_k(&self) -> usize;

    async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk<'a>>, RetrievalError>;
}
