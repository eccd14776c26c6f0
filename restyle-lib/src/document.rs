//! Document records and the owned registry of the current document set.
//!
//! The registry is the single writer for everything document-shaped: upload
//! batches replace the whole set, resets clear modifications, and a
//! generation counter makes sure a batch whose file reads resolve late,
//! after a newer upload started, is discarded instead of merged.

use crate::error::IngestError;
use crate::store::{PropertyRecord, SelectorMap};
use std::path::Path;

/// Per-file ceiling for uploads.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Markup,
    Stylesheet,
}

impl DocumentKind {
    /// Kind by file extension; `None` for anything unsupported.
    pub fn from_name(name: &str) -> Option<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        match extension.as_str() {
            "html" | "htm" => Some(DocumentKind::Markup),
            "css" => Some(DocumentKind::Stylesheet),
            _ => None,
        }
    }
}

/// An uploaded file plus its accumulated modifications. The original
/// source is immutable once loaded; it is the rollback baseline and the
/// input every export starts from.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub name: String,
    pub kind: DocumentKind,
    original_source: String,
    modifications: SelectorMap,
}

impl DocumentRecord {
    pub fn new(name: String, kind: DocumentKind, original_source: String) -> Self {
        DocumentRecord {
            name,
            kind,
            original_source,
            modifications: SelectorMap::new(),
        }
    }

    pub fn original_source(&self) -> &str {
        &self.original_source
    }

    pub fn modifications(&self) -> &SelectorMap {
        &self.modifications
    }

    pub fn merge_modification(&mut self, selector: &str, delta: &PropertyRecord) {
        self.modifications.merge(selector, delta);
    }

    /// Drops every modification; the original source is untouched.
    pub fn reset(&mut self) {
        self.modifications.reset();
    }
}

/// A file's name and raw content, before validation. The in-memory
/// ingestion input: the async reader produces these, tests build them
/// directly.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

/// Outcome of validating one upload batch: the surviving records plus one
/// error per rejected file.
#[derive(Debug, Default)]
pub struct BatchValidation {
    pub records: Vec<DocumentRecord>,
    pub rejected: Vec<IngestError>,
}

/// Validates a batch: per-file kind and size checks, then the batch-level
/// requirement that at least one markup file survived.
pub fn validate_batch(files: Vec<SourceFile>) -> Result<BatchValidation, IngestError> {
    if files.is_empty() {
        return Err(IngestError::EmptyBatch);
    }
    let mut outcome = BatchValidation::default();
    for file in files {
        let Some(kind) = DocumentKind::from_name(&file.name) else {
            log::warn!("rejecting {}: unsupported type", file.name);
            outcome
                .rejected
                .push(IngestError::UnsupportedType { name: file.name });
            continue;
        };
        let size = file.content.len() as u64;
        if size > MAX_FILE_SIZE {
            log::warn!("rejecting {}: {} bytes", file.name, size);
            outcome.rejected.push(IngestError::Oversized {
                name: file.name,
                size,
                limit: MAX_FILE_SIZE,
            });
            continue;
        }
        outcome
            .records
            .push(DocumentRecord::new(file.name, kind, file.content));
    }
    if outcome.records.is_empty() {
        return Err(IngestError::EmptyBatch);
    }
    if !outcome
        .records
        .iter()
        .any(|r| r.kind == DocumentKind::Markup)
    {
        return Err(IngestError::MissingMarkup);
    }
    Ok(outcome)
}

/// Reads a batch of paths. Each read is awaited on its own; a failed read
/// rejects that file and the rest continue. Oversized files are rejected
/// on metadata before their content is pulled in.
pub async fn read_batch(paths: &[std::path::PathBuf]) -> (Vec<SourceFile>, Vec<IngestError>) {
    let mut files = Vec::new();
    let mut rejected = Vec::new();
    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > MAX_FILE_SIZE => {
                rejected.push(IngestError::Oversized {
                    name,
                    size: meta.len(),
                    limit: MAX_FILE_SIZE,
                });
                continue;
            }
            Ok(_) => {}
            Err(source) => {
                rejected.push(IngestError::Read { name, source });
                continue;
            }
        }
        match tokio::fs::read_to_string(path).await {
            Ok(content) => files.push(SourceFile { name, content }),
            Err(source) => rejected.push(IngestError::Read { name, source }),
        }
    }
    (files, rejected)
}

/// The current document set. One writer, explicit replacement, no ambient
/// mutation from anywhere else.
#[derive(Debug, Default)]
pub struct DocumentSet {
    documents: Vec<DocumentRecord>,
    active: Option<String>,
    generation: u64,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an upload batch and returns its generation token. Any batch
    /// started earlier becomes stale from this moment.
    pub fn begin_batch(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Installs a batch, fully replacing the previous document set, unless
    /// a newer batch began while this one's reads were in flight, in which
    /// case the records are dropped.
    pub fn commit_batch(
        &mut self,
        generation: u64,
        records: Vec<DocumentRecord>,
    ) -> Result<(), IngestError> {
        if generation != self.generation {
            log::debug!(
                "discarding superseded batch (generation {} < {})",
                generation,
                self.generation
            );
            return Err(IngestError::SupersededBatch);
        }
        self.active = records
            .iter()
            .find(|r| r.kind == DocumentKind::Markup)
            .map(|r| r.name.clone());
        self.documents = records;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[DocumentRecord] {
        &self.documents
    }

    pub fn document(&self, name: &str) -> Option<&DocumentRecord> {
        self.documents.iter().find(|d| d.name == name)
    }

    pub fn document_mut(&mut self, name: &str) -> Option<&mut DocumentRecord> {
        self.documents.iter_mut().find(|d| d.name == name)
    }

    pub fn stylesheets(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.documents
            .iter()
            .filter(|d| d.kind == DocumentKind::Stylesheet)
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// The markup document currently in the preview.
    pub fn active_markup(&self) -> Option<&DocumentRecord> {
        let name = self.active.as_deref()?;
        self.document(name)
            .filter(|d| d.kind == DocumentKind::Markup)
    }

    pub fn active_markup_mut(&mut self) -> Option<&mut DocumentRecord> {
        let name = self.active.clone()?;
        self.document_mut(&name)
            .filter(|d| d.kind == DocumentKind::Markup)
    }

    pub fn set_active(&mut self, name: &str) -> bool {
        let exists = self
            .documents
            .iter()
            .any(|d| d.name == name && d.kind == DocumentKind::Markup);
        if exists {
            self.active = Some(name.to_string());
        }
        exists
    }

    /// Back to the uploaded baseline for one document.
    pub fn reset_document(&mut self, name: &str) {
        if let Some(doc) = self.document_mut(name) {
            doc.reset();
        }
    }

    pub fn reset_all(&mut self) {
        for doc in &mut self.documents {
            doc.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content: &str) -> SourceFile {
        SourceFile {
            name: name.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn kind_follows_extension() {
        assert_eq!(DocumentKind::from_name("a.html"), Some(DocumentKind::Markup));
        assert_eq!(DocumentKind::from_name("a.HTM"), Some(DocumentKind::Markup));
        assert_eq!(
            DocumentKind::from_name("style.css"),
            Some(DocumentKind::Stylesheet)
        );
        assert_eq!(DocumentKind::from_name("notes.txt"), None);
        assert_eq!(DocumentKind::from_name("README"), None);
    }

    #[test]
    fn batch_rejects_individual_files_but_continues() {
        let outcome = validate_batch(vec![
            file("index.html", "<p>hi</p>"),
            file("notes.txt", "nope"),
            file("style.css", "p { color: red; }"),
        ])
        .expect("batch is valid");
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.rejected.len(), 1);
        assert!(matches!(
            outcome.rejected[0],
            IngestError::UnsupportedType { .. }
        ));
    }

    #[test]
    fn batch_without_markup_fails() {
        let result = validate_batch(vec![file("style.css", "p {}")]);
        assert!(matches!(result, Err(IngestError::MissingMarkup)));
    }

    #[test]
    fn empty_batch_fails() {
        assert!(matches!(validate_batch(vec![]), Err(IngestError::EmptyBatch)));
    }

    #[test]
    fn oversized_file_is_rejected() {
        let big = "x".repeat((MAX_FILE_SIZE + 1) as usize);
        let outcome = validate_batch(vec![file("index.html", "<p></p>"), file("big.css", &big)])
            .expect("markup file survives");
        assert_eq!(outcome.records.len(), 1);
        assert!(matches!(outcome.rejected[0], IngestError::Oversized { .. }));
    }

    #[test]
    fn superseded_batch_is_discarded() {
        let mut set = DocumentSet::new();
        let older = set.begin_batch();
        let newer = set.begin_batch();
        let stale = vec![DocumentRecord::new(
            "old.html".into(),
            DocumentKind::Markup,
            "<p>old</p>".into(),
        )];
        assert!(matches!(
            set.commit_batch(older, stale),
            Err(IngestError::SupersededBatch)
        ));
        assert!(set.is_empty());

        let fresh = vec![DocumentRecord::new(
            "new.html".into(),
            DocumentKind::Markup,
            "<p>new</p>".into(),
        )];
        set.commit_batch(newer, fresh).expect("current batch commits");
        assert_eq!(set.active_name(), Some("new.html"));
    }

    #[test]
    fn reset_keeps_original_source() {
        let mut set = DocumentSet::new();
        let generation = set.begin_batch();
        set.commit_batch(
            generation,
            vec![DocumentRecord::new(
                "index.html".into(),
                DocumentKind::Markup,
                "<p>hi</p>".into(),
            )],
        )
        .unwrap();
        let doc = set.document_mut("index.html").unwrap();
        doc.merge_modification("p", &PropertyRecord::from_pairs([("color", "red")]));
        assert!(!doc.modifications().is_empty());
        set.reset_document("index.html");
        let doc = set.document("index.html").unwrap();
        assert!(doc.modifications().is_empty());
        assert_eq!(doc.original_source(), "<p>hi</p>");
    }
}
