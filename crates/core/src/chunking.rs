use crate::config::SessionOptions;
use crate::error::IngestError;
use crate::models::{Chunk, Document};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl From<&SessionOptions> for ChunkingConfig {
    fn from(value: &SessionOptions) -> Self {
        Self {
            size: value.chunk_size,
            overlap: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "window size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than window size {}",
                self.overlap, self.size
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.size - self.overlap
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    /// Character offset of the window in the source text.
    pub start: usize,
    pub text: String,
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits `text` into windows of `config.size` characters where each window
/// starts `size - overlap` characters after the previous one.
///
/// The last window always ends at the end of the text. Windows never split a
/// code point.
pub fn split_text(text: &str, config: ChunkingConfig) -> Result<Vec<TextWindow>, IngestError> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let mut windows = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + config.size).min(chars.len());
        windows.push(TextWindow {
            start,
            text: chars[start..end].iter().collect(),
        });
        if end == chars.len() {
            break;
        }
        start += config.stride();
    }

    Ok(windows)
}

/// Chunks every document's text, numbering chunks sequentially across the
/// whole corpus. Each chunk is the substring of its document's text starting
/// at `start_char`.
pub fn chunk_documents(
    documents: &[Document],
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for document in documents {
        for window in split_text(&document.text, config)? {
            chunks.push(Chunk {
                chunk_id: make_chunk_id(&document.document_id, document.page, cursor, &window.text),
                document_id: document.document_id.clone(),
                source_path: document.source_path.clone(),
                page: document.page,
                chunk_index: cursor,
                start_char: window.start,
                text: window.text,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

fn make_chunk_id(document_id: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
