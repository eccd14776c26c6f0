//! Error types for the ingestion and export boundaries.
//!
//! The engine prefers per-item recovery: a bad file is reported and the
//! rest of the batch carries on. Only a batch that produces nothing at all
//! turns into a hard error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{name}: unsupported file type (only markup and stylesheet files)")]
    UnsupportedType { name: String },

    #[error("{name}: file too large ({size} bytes, limit {limit})")]
    Oversized { name: String, size: u64, limit: u64 },

    #[error("{name}: read failed: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("upload batch contained no usable files")]
    EmptyBatch,

    #[error("at least one markup file is required")]
    MissingMarkup,

    #[error("upload batch was superseded by a newer one")]
    SupersededBatch,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{name}: source could not be parsed: {message}")]
    SourceParse { name: String, message: String },

    #[error("no documents could be exported")]
    Empty,
}
