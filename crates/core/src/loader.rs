use crate::config::SessionOptions;
use crate::error::IngestError;
use crate::extractor::PdfExtractor;
use crate::models::{Document, DocumentFingerprint, SkippedPdf};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedPdf>,
}

pub fn discover_pdf_files(folder: &Path, recursive: bool) -> Vec<PathBuf> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let hidden = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'));

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf && !hidden {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Loads every PDF under `options.source_dir` as one [`Document`] per page.
///
/// Files come back in path order and pages in page order. An unreadable file
/// fails the whole load unless `options.skip_unreadable` is set, in which case
/// it is recorded in [`LoadReport::skipped`].
pub fn load_documents<X>(options: &SessionOptions, extractor: &X) -> Result<LoadReport, IngestError>
where
    X: PdfExtractor + ?Sized,
{
    let folder = options.source_dir.as_path();
    if !folder.exists() {
        return Err(IngestError::MissingDirectory(folder.to_path_buf()));
    }
    if !folder.is_dir() {
        return Err(IngestError::NotADirectory(folder.to_path_buf()));
    }

    let files = discover_pdf_files(folder, options.recursive);
    if files.is_empty() {
        return Err(IngestError::NoPdfFiles(folder.to_path_buf()));
    }

    let mut documents = Vec::new();
    let mut skipped = Vec::new();

    for path in files {
        let loaded = (|| {
            let fingerprint = build_document_fingerprint(&path)?;
            let pages = extractor.extract_pages(&path)?;
            Ok::<_, IngestError>(
                pages
                    .into_iter()
                    .map(|page| Document::from_page(&fingerprint, page.number, &page.text))
                    .collect::<Vec<_>>(),
            )
        })();

        match loaded {
            Ok(pages) => documents.extend(pages),
            Err(error) if options.skip_unreadable => {
                warn!(path = %path.display(), reason = %error, "skipped pdf");
                skipped.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
            Err(error) => {
                return Err(IngestError::PdfParse(format!("{}: {error}", path.display())));
            }
        }
    }

    info!(
        folder = %folder.display(),
        documents = documents.len(),
        skipped = skipped.len(),
        "loaded pdf pages"
    );

    Ok(LoadReport { documents, skipped })
}

fn build_document_fingerprint(path: &Path) -> Result<DocumentFingerprint, IngestError> {
    let checksum = digest_file(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    Ok(DocumentFingerprint {
        document_id: generate_document_id(path),
        title: name.to_string(),
        source_path: path.to_string_lossy().to_string(),
        checksum,
        ingested_at: Utc::now(),
    })
}

fn generate_document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}
