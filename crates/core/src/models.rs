use crate::chunking::normalize_whitespace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub title: String,
    pub source_path: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

/// Text of one PDF page together with where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub title: String,
    pub source_path: String,
    /// 1-based page number.
    pub page: u32,
    /// Whitespace-normalized page text; chunks are substrings of it.
    pub text: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    pub fn from_page(fingerprint: &DocumentFingerprint, page: u32, text: &str) -> Self {
        Self {
            document_id: fingerprint.document_id.clone(),
            title: fingerprint.title.clone(),
            source_path: fingerprint.source_path.clone(),
            page,
            text: normalize_whitespace(text),
            checksum: fingerprint.checksum.clone(),
            ingested_at: fingerprint.ingested_at,
        }
    }

    /// 0-based page index, as shown in citations.
    pub fn page_index(&self) -> u32 {
        self.page.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source_path: String,
    pub page: u32,
    pub chunk_index: u64,
    /// Offset, in characters, of the chunk inside its document's text.
    pub start_char: usize,
    pub text: String,
}

/// A chunk borrowed from the index with its similarity to the question.
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub documents_loaded: usize,
    pub documents_indexed: usize,
    pub chunks: usize,
    pub vectors: usize,
    pub skipped: Vec<SkippedPdf>,
    pub already_indexed: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Answer<'a> {
    pub text: String,
    pub context: Vec<ScoredChunk<'a>>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Unindexed,
    Indexed,
}
