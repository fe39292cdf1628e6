//! Answer generation: prompt assembly and the hosted chat-completion client.

use crate::error::ProviderError;
use crate::models::ScoredChunk;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const PROMPT_TEMPLATE: &str = "
Answer the questions based on the provided context only.
Please provide the most accurate response based on the question
<context>
{context}
<context>
Questions:{input}
";

/// The question plus the retrieved context, "stuffed" into one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerPrompt {
    pub question: String,
    pub context: String,
}

impl AnswerPrompt {
    pub fn new(question: &str, retrieved: &[ScoredChunk<'_>]) -> Self {
        let context = retrieved
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            question: question.to_string(),
            context,
        }
    }

    pub fn render(&self) -> String {
        PROMPT_TEMPLATE
            .replace("{context}", &self.context)
            .replace("{input}", &self.question)
    }
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &AnswerPrompt) -> Result<String, ProviderError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint (Groq by
/// default).
#[derive(Debug, Clone)]
pub struct ChatCompletionGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatCompletionGenerator {
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
}

fn first_choice_content(response: ChatResponse, provider: &str) -> Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::MalformedResponse {
            provider: provider.to_string(),
            details: "response has no message content".to_string(),
        })
}

#[async_trait]
impl AnswerGenerator for ChatCompletionGenerator {
    async fn generate(&self, prompt: &AnswerPrompt) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.render(),
            }],
            stream: false,
        };

        debug!(model = %self.model, context_chars = prompt.context.len(), "requesting completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: self.model.clone(),
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)?;
        first_choice_content(parsed, &self.model)
    }
}

/// Offline generator: answers with the context passage that mentions the most
/// question terms, without calling any model.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveGenerator;

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    async fn generate(&self, prompt: &AnswerPrompt) -> Result<String, ProviderError> {
        let terms = question_terms(&prompt.question);
        let best = prompt
            .context
            .split("\n\n")
            .filter(|passage| !passage.trim().is_empty())
            .enumerate()
            .max_by_key(|(position, passage)| {
                (matched_terms(passage, &terms), std::cmp::Reverse(*position))
            })
            .map(|(_, passage)| passage.trim().to_string());

        Ok(best.unwrap_or_else(|| "No relevant context was found.".to_string()))
    }
}

fn question_terms(question: &str) -> Vec<String> {
    question
        .split(|c: char| !c.is_alphanumeric())
        .map(|token| token.to_lowercase())
        .filter(|token| token.len() > 2)
        .collect()
}

fn matched_terms(text: &str, terms: &[String]) -> usize {
    let lowered = text.to_lowercase();
    terms.iter().filter(|term| lowered.contains(term.as_str())).count()
}
