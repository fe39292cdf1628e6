//! The question-answering session.
//!
//! A [`Session`] starts *unindexed*. [`Session::build_index`] loads, chunks
//! and embeds the PDF folder once and moves it to *indexed*; the index is
//! kept until [`Session::reset`] or until the session is dropped. Questions
//! go through [`Session::retriever`], which only exists while indexed.

use crate::chunking::{chunk_documents, ChunkingConfig};
use crate::config::SessionOptions;
use crate::embeddings::Embedder;
use crate::error::{IngestError, Result, RetrievalError};
use crate::extractor::PdfExtractor;
use crate::generator::{AnswerGenerator, AnswerPrompt};
use crate::index::VectorIndex;
use crate::loader::load_documents;
use crate::models::{Answer, BuildReport, Document, ScoredChunk, SessionPhase};
use crate::traits::Retriever;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info, warn};

struct IndexedCorpus {
    documents: Vec<Document>,
    index: VectorIndex,
}

pub struct Session<E, G> {
    embedder: E,
    generator: G,
    options: SessionOptions,
    corpus: Option<IndexedCorpus>,
}

impl<E, G> Session<E, G>
where
    E: Embedder,
    G: AnswerGenerator,
{
    pub fn new(embedder: E, generator: G, options: SessionOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            embedder,
            generator,
            options,
            corpus: None,
        })
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn phase(&self) -> SessionPhase {
        match self.corpus {
            Some(_) => SessionPhase::Indexed,
            None => SessionPhase::Unindexed,
        }
    }

    /// Pages the current index was built from; empty while unindexed.
    pub fn documents(&self) -> &[Document] {
        self.corpus
            .as_ref()
            .map(|corpus| corpus.documents.as_slice())
            .unwrap_or_default()
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.corpus.as_ref().map(|corpus| &corpus.index)
    }

    /// Builds the vector index unless one already exists.
    ///
    /// Nothing is installed unless every stage succeeds, so a failed build
    /// leaves the session unindexed.
    pub async fn build_index<X>(&mut self, extractor: &X) -> Result<BuildReport>
    where
        X: PdfExtractor + ?Sized,
    {
        if let Some(corpus) = &self.corpus {
            debug!("vector index already built; skipping");
            return Ok(BuildReport {
                documents_loaded: corpus.documents.len(),
                documents_indexed: corpus.documents.len(),
                chunks: corpus.index.len(),
                vectors: corpus.index.len(),
                already_indexed: true,
                ..BuildReport::default()
            });
        }

        let started = Instant::now();
        let loaded = load_documents(&self.options, extractor)?;
        let documents_loaded = loaded.documents.len();
        let mut documents = loaded.documents;

        if let Some(cap) = self.options.max_documents {
            if documents.len() > cap {
                warn!(
                    loaded = documents.len(),
                    cap, "document cap reached; later pages are not indexed"
                );
                documents.truncate(cap);
            }
        }

        let chunks = chunk_documents(&documents, ChunkingConfig::from(&self.options))?;
        if chunks.is_empty() {
            return Err(IngestError::EmptyCorpus.into());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.options.embedding_batch_size) {
            vectors.extend(self.embedder.embed_documents(batch).await?);
            debug!(
                embedder = self.embedder.name(),
                embedded = vectors.len(),
                total = texts.len(),
                "embedded batch"
            );
        }

        let index = VectorIndex::build(chunks, vectors)?;
        let report = BuildReport {
            documents_loaded,
            documents_indexed: documents.len(),
            chunks: index.len(),
            vectors: index.len(),
            skipped: loaded.skipped,
            already_indexed: false,
            elapsed: started.elapsed(),
        };

        info!(
            documents = report.documents_indexed,
            chunks = report.chunks,
            dimensions = index.dimensions(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "vector index ready"
        );

        self.corpus = Some(IndexedCorpus { documents, index });
        Ok(report)
    }

    /// Retrieval view over the index. Fails while unindexed.
    pub fn retriever(&self) -> Result<IndexRetriever<'_, E>> {
        let corpus = self.corpus.as_ref().ok_or(RetrievalError::NotIndexed)?;
        Ok(IndexRetriever {
            index: &corpus.index,
            embedder: &self.embedder,
            top_k: self.options.top_k,
        })
    }

    pub async fn answer_question(&self, question: &str) -> Result<Answer<'_>> {
        let retriever = self.retriever()?;
        Ok(answer_with(&retriever, &self.generator, question).await?)
    }

    /// Drops the index and returns to the unindexed phase.
    pub fn reset(&mut self) {
        if self.corpus.take().is_some() {
            info!("vector index discarded");
        }
    }
}

pub struct IndexRetriever<'a, E> {
    index: &'a VectorIndex,
    embedder: &'a E,
    top_k: usize,
}

#[async_trait]
impl<'a, E> Retriever<'a> for IndexRetriever<'a, E>
where
    E: Embedder,
{
    fn top_k(&self) -> usize {
        self.top_k
    }

    async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk<'a>>, RetrievalError> {
        let index: &'a VectorIndex = self.index;
        let query_vector = self
            .embedder
            .embed_query(question)
            .await
            .map_err(RetrievalError::QueryEmbedding)?;
        Ok(index.search(&query_vector, self.top_k)?)
    }
}

/// Retrieves context for `question` and asks `generator` to answer from it.
pub async fn answer_with<'a, R, G>(
    retriever: &R,
    generator: &G,
    question: &str,
) -> Result<Answer<'a>, RetrievalError>
where
    R: Retriever<'a> + ?Sized,
    G: AnswerGenerator + ?Sized,
{
    let question = question.trim();
    if question.is_empty() {
        return Err(RetrievalError::EmptyQuestion);
    }

    let started = Instant::now();
    let context = retriever.retrieve(question).await?;
    let prompt = AnswerPrompt::new(question, &context);
    let text = generator
        .generate(&prompt)
        .await
        .map_err(RetrievalError::Generation)?;
    let elapsed = started.elapsed();

    info!(
        retrieved = context.len(),
        top_k = retriever.top_k(),
        elapsed_ms = elapsed.as_millis() as u64,
        "answered question"
    );

    Ok(Answer {
        text,
        context,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::{ErrorKind, ProviderError, SessionError};
    use crate::extractor::fixtures::write_text_pdf;
    use crate::extractor::{LopdfExtractor, PageText};
    use crate::generator::ExtractiveGenerator;
    use crate::models::Chunk;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    /// Serves the same in-memory pages for every PDF path.
    struct StaticExtractor {
        pages: Vec<String>,
    }

    impl PdfExtractor for StaticExtractor {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            Ok(self
                .pages
                .iter()
                .enumerate()
                .map(|(index, text)| PageText {
                    number: index as u32 + 1,
                    text: text.clone(),
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<AnswerPrompt>>,
    }

    #[async_trait]
    impl AnswerGenerator for RecordingGenerator {
        async fn generate(&self, prompt: &AnswerPrompt) -> Result<String, ProviderError> {
            self.prompts
                .lock()
                .expect("prompt log poisoned")
                .push(prompt.clone());
            Ok(format!("answer to: {}", prompt.question))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl AnswerGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &AnswerPrompt) -> Result<String, ProviderError> {
            Err(ProviderError::Api {
                provider: "llama3-8b-8192".to_string(),
                status: 503,
                message: "overloaded".to_string(),
            })
        }
    }

    /// Fails the first document embedding call, then behaves like the n-gram
    /// embedder.
    #[derive(Default)]
    struct FlakyEmbedder {
        failed_once: AtomicBool,
        inner: CharacterNgramEmbedder,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(ProviderError::Api {
                    provider: "embeddings".to_string(),
                    status: 429,
                    message: "rate limited".to_string(),
                });
            }
            self.inner.embed_documents(texts).await
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.inner.embed_query(text).await
        }
    }

    fn options_for(dir: &Path) -> SessionOptions {
        SessionOptions {
            source_dir: dir.to_path_buf(),
            ..SessionOptions::default()
        }
    }

    fn corpus_with_placeholder_pdf() -> Result<TempDir, std::io::Error> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("corpus.pdf"), b"%PDF-1.4\n%placeholder")?;
        Ok(dir)
    }

    #[tokio::test]
    async fn three_page_pdf_is_indexed_and_refund_question_is_answered(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_text_pdf(
            &dir.path().join("handbook.pdf"),
            &[
                "Shipping: orders leave the warehouse within two days.",
                "Refund policy: a full refund is granted within 30 days of purchase.",
                "Contact: write to the support team for any other question.",
            ],
        );

        let mut session = Session::new(
            CharacterNgramEmbedder::default(),
            RecordingGenerator::default(),
            options_for(dir.path()),
        )?;
        let report = session.build_index(&LopdfExtractor).await?;

        assert_eq!(report.documents_loaded, 3);
        assert_eq!(report.documents_indexed, 3);
        assert!(report.chunks >= 3);
        assert_eq!(report.vectors, report.chunks);
        assert_eq!(session.index().map(VectorIndex::len), Some(report.chunks));
        assert_eq!(session.phase(), SessionPhase::Indexed);

        let answer = session.answer_question("What is the refund policy?").await?;

        assert!(!answer.text.is_empty());
        assert!(!answer.context.is_empty());
        assert!(answer.context.len() <= session.options().top_k);
        assert!(answer
            .context
            .iter()
            .any(|hit| hit.chunk.text.to_lowercase().contains("refund")));
        assert!(answer
            .context
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score));

        let prompts = session.generator.prompts.lock().expect("prompt log poisoned");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].context.to_lowercase().contains("refund"));
        Ok(())
    }

    #[tokio::test]
    async fn build_index_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = corpus_with_placeholder_pdf()?;
        let extractor = StaticExtractor {
            pages: vec!["alpha ".repeat(400), "beta".to_string()],
        };
        let mut session = Session::new(
            CharacterNgramEmbedder::default(),
            ExtractiveGenerator,
            options_for(dir.path()),
        )?;

        let first = session.build_index(&extractor).await?;
        let first_index: *const VectorIndex = session.index().ok_or("index missing")?;

        let second = session.build_index(&extractor).await?;
        let second_index: *const VectorIndex = session.index().ok_or("index missing")?;

        assert!(!first.already_indexed);
        assert!(second.already_indexed);
        assert_eq!(first.chunks, second.chunks);
        assert!(std::ptr::eq(first_index, second_index));
        Ok(())
    }

    #[tokio::test]
    async fn question_before_indexing_is_a_retrieval_error() -> Result<(), SessionError> {
        let session = Session::new(
            CharacterNgramEmbedder::default(),
            ExtractiveGenerator,
            SessionOptions::default(),
        )?;

        let error = session
            .answer_question("What is the refund policy?")
            .await
            .expect_err("no index yet");

        assert_eq!(error.kind(), ErrorKind::Retrieval);
        assert!(matches!(
            error,
            SessionError::Retrieval(RetrievalError::NotIndexed)
        ));
        assert!(session.retriever().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn missing_directory_leaves_session_unindexed() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let mut session = Session::new(
            CharacterNgramEmbedder::default(),
            ExtractiveGenerator,
            options_for(&dir.path().join("PDFdocs")),
        )?;

        let error = session
            .build_index(&LopdfExtractor)
            .await
            .expect_err("directory does not exist");

        assert_eq!(error.kind(), ErrorKind::Ingestion);
        assert_eq!(session.phase(), SessionPhase::Unindexed);
        assert!(session.index().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn embedding_failure_installs_nothing_and_retry_succeeds(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = corpus_with_placeholder_pdf()?;
        let extractor = StaticExtractor {
            pages: vec!["Refund policy: 30 days.".to_string()],
        };
        let mut session = Session::new(
            FlakyEmbedder::default(),
            ExtractiveGenerator,
            options_for(dir.path()),
        )?;

        let error = session
            .build_index(&extractor)
            .await
            .expect_err("first embedding call fails");
        assert_eq!(error.kind(), ErrorKind::Embedding);
        assert_eq!(session.phase(), SessionPhase::Unindexed);

        let report = session.build_index(&extractor).await?;
        assert!(!report.already_indexed);
        assert_eq!(session.phase(), SessionPhase::Indexed);
        Ok(())
    }

    #[tokio::test]
    async fn blank_pages_are_an_empty_corpus() -> Result<(), Box<dyn std::error::Error>> {
        let dir = corpus_with_placeholder_pdf()?;
        let extractor = StaticExtractor {
            pages: vec!["   ".to_string(), String::new()],
        };
        let mut session = Session::new(
            CharacterNgramEmbedder::default(),
            ExtractiveGenerator,
            options_for(dir.path()),
        )?;

        let error = session
            .build_index(&extractor)
            .await
            .expect_err("nothing to embed");
        assert!(matches!(
            error,
            SessionError::Ingestion(IngestError::EmptyCorpus)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn document_cap_limits_indexed_pages() -> Result<(), Box<dyn std::error::Error>> {
        let dir = corpus_with_placeholder_pdf()?;
        let extractor = StaticExtractor {
            pages: (1..=60).map(|page| format!("page {page} text")).collect(),
        };
        let mut session = Session::new(
            CharacterNgramEmbedder::default(),
            ExtractiveGenerator,
            options_for(dir.path()),
        )?;

        let report = session.build_index(&extractor).await?;

        assert_eq!(report.documents_loaded, 60);
        assert_eq!(report.documents_indexed, 50);
        assert_eq!(report.chunks, 50);
        assert_eq!(session.documents().last().map(|doc| doc.page), Some(50));
        Ok(())
    }

    #[tokio::test]
    async fn reset_returns_to_unindexed_and_rebuild_works() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = corpus_with_placeholder_pdf()?;
        let extractor = StaticExtractor {
            pages: vec!["Refund policy: 30 days.".to_string()],
        };
        let mut session = Session::new(
            CharacterNgramEmbedder::default(),
            ExtractiveGenerator,
            options_for(dir.path()),
        )?;

        session.build_index(&extractor).await?;
        session.reset();
        assert_eq!(session.phase(), SessionPhase::Unindexed);
        assert!(session.documents().is_empty());

        let report = session.build_index(&extractor).await?;
        assert!(!report.already_indexed);
        assert_eq!(session.phase(), SessionPhase::Indexed);
        Ok(())
    }

    #[tokio::test]
    async fn generation_and_empty_question_failures_are_retrieval_kind(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = corpus_with_placeholder_pdf()?;
        let extractor = StaticExtractor {
            pages: vec!["Refund policy: 30 days.".to_string()],
        };
        let mut session = Session::new(
            CharacterNgramEmbedder::default(),
            FailingGenerator,
            options_for(dir.path()),
        )?;
        session.build_index(&extractor).await?;

        let error = session
            .answer_question("What is the refund policy?")
            .await
            .expect_err("generator is down");
        assert_eq!(error.kind(), ErrorKind::Retrieval);
        assert!(matches!(
            error,
            SessionError::Retrieval(RetrievalError::Generation(_))
        ));

        let error = session.answer_question("  ").await.expect_err("blank question");
        assert!(matches!(
            error,
            SessionError::Retrieval(RetrievalError::EmptyQuestion)
        ));
        assert_eq!(session.phase(), SessionPhase::Indexed);
        Ok(())
    }

    struct FixedRetriever<'a> {
        hits: Vec<ScoredChunk<'a>>,
    }

    #[async_trait]
    impl<'a> Retriever<'a> for FixedRetriever<'a> {
        fn top_k(&self) -> usize {
            self.hits.len()
        }

        async fn retrieve(&self, _question: &str) -> Result<Vec<ScoredChunk<'a>>, RetrievalError> {
            Ok(self.hits.clone())
        }
    }

    #[tokio::test]
    async fn answer_with_keeps_retrieval_order() -> Result<(), RetrievalError> {
        let chunks = ["first passage", "second passage"].map(|text| Chunk {
            chunk_id: text.to_string(),
            document_id: "doc-1".to_string(),
            source_path: "/tmp/doc.pdf".to_string(),
            page: 1,
            chunk_index: 0,
            start_char: 0,
            text: text.to_string(),
        });
        let retriever = FixedRetriever {
            hits: chunks
                .iter()
                .zip([0.8, 0.3])
                .map(|(chunk, score)| ScoredChunk { chunk, score })
                .collect(),
        };
        let generator = RecordingGenerator::default();

        let answer = answer_with(&retriever, &generator, " Which passage? ").await?;

        assert_eq!(answer.text, "answer to: Which passage?");
        assert_eq!(answer.context[0].chunk.text, "first passage");
        assert_eq!(answer.context[1].chunk.text, "second passage");
        Ok(())
    }
}
