use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Deterministic, offline embedder built from hashed character trigrams.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn name(&self) -> &str {
        "character-ngram"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed(text))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: batch,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: "embeddings".to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let parsed: EmbeddingResponse = serde_json::from_str(&body)?;
        order_embeddings(parsed, batch.len())
    }
}

fn order_embeddings(
    response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if response.data.len() != expected {
        return Err(ProviderError::MalformedResponse {
            provider: "embeddings".to_string(),
            details: format!(
                "expected {expected} embeddings, received {}",
                response.data.len()
            ),
        });
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for (position, row) in response.data.into_iter().enumerate() {
        let index = row.index.unwrap_or(position);
        let Some(slot) = slots.get_mut(index).filter(|slot| slot.is_none()) else {
            return Err(ProviderError::MalformedResponse {
                provider: "embeddings".to_string(),
                details: format!("unexpected or duplicate embedding index {index}"),
            });
        };
        *slot = Some(row.embedding);
    }

    // every slot is filled: lengths match and indices are unique
    Ok(slots.into_iter().flatten().collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, inputs = texts.len(), "requesting embeddings");
        self.embed_batch(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| ProviderError::MalformedResponse {
            provider: "embeddings".to_string(),
            details: "no embedding returned for query".to_string(),
        })
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
