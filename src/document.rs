//! Document loading.
//!
//! [`load`] reads the source file, extracts its text (see [`crate::extract`])
//! and stamps the metadata the rest of the pipeline carries along. Every
//! failure is an [`Error::Ingestion`], which is fatal at startup.

use std::path::Path;

use chrono::Utc;
use pharmacist_core::{Document, Error, Result};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::extract::{content_type_for, extract_text};

/// Load and extract the document at `path`.
///
/// # Errors
///
/// Returns [`Error::Ingestion`] if the path does not exist or is not a
/// regular file, the format is unsupported, the content cannot be parsed,
/// or no text could be extracted.
pub fn load(path: &Path) -> Result<Document> {
    let source_id = path.display().to_string();
    let fail = |message: String| Error::ingestion(source_id.clone(), message);

    let meta = std::fs::metadata(path).map_err(|e| fail(format!("cannot access file: {e}")))?;
    if !meta.is_file() {
        return Err(fail("not a regular file".to_string()));
    }

    let content_type = content_type_for(path).map_err(|e| fail(e.to_string()))?;
    let bytes = std::fs::read(path).map_err(|e| fail(format!("cannot read file: {e}")))?;
    let extracted = extract_text(&bytes, content_type).map_err(|e| fail(e.to_string()))?;

    if extracted.text.trim().is_empty() {
        return Err(fail("no text could be extracted".to_string()));
    }

    let mut hasher = Sha256::new();
    hasher.update(extracted.text.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    let document = Document {
        id: source_id,
        content_type: content_type.to_string(),
        page_count: extracted.page_count,
        content_hash,
        loaded_at: Utc::now(),
        text: extracted.text,
    };

    info!(
        document.id = %document.id,
        content_type = %document.content_type,
        pages = document.page_count,
        bytes = bytes.len(),
        chars = document.text.chars().count(),
        "loaded document"
    );

    Ok(document)
}
