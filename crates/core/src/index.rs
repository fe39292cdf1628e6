use crate::embeddings::cosine_similarity;
use crate::error::IndexError;
use crate::models::{Chunk, ScoredChunk};

/// Exact in-memory nearest-neighbour index. Owns each chunk together with
/// its embedding; search results borrow the chunks.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    dimensions: usize,
}

impl VectorIndex {
    pub fn build(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let dimensions = match vectors.first() {
            Some(first) => first.len(),
            None => return Err(IndexError::Empty),
        };

        if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                found: bad.len(),
            });
        }

        Ok(Self {
            chunks,
            vectors,
            dimensions,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Returns the `top_k` most similar chunks, best first. Equal scores keep
    /// corpus order.
    pub fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk<'_>>, IndexError> {
        if query_vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                found: query_vector.len(),
            });
        }

        let mut scored: Vec<ScoredChunk<'_>> = self
            .chunks
            .iter()
            .zip(&self.vectors)
            .map(|(chunk, vector)| ScoredChunk {
                chunk,
                score: cosine_similarity(query_vector, vector),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}
