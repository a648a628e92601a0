//! Document ingestion: upload validation, chunking, embedding, persistence.
//!
//! One upload fans out into per-file outcomes; a bad file never poisons its
//! siblings. Within a file the unit of failure is a single chunk: an
//! embedding or persistence error skips that chunk and the rest of the file
//! keeps flowing.

mod pipeline;

pub use pipeline::IngestionPipeline;

use crate::types::KbError;

/// One uploaded file, already read into memory by the transport layer.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub filename: String,
    /// MIME content type as declared by the uploader.
    pub content_type: String,
    pub data: Vec<u8>,
}

impl SourceFile {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        }
    }
}

/// What happened to one file of an upload.
#[derive(Debug)]
pub enum FileOutcome {
    /// The file was chunked and persisted; `skipped_chunks` counts chunks
    /// dropped on embedding or persistence errors.
    Ingested {
        filename: String,
        chunks: usize,
        skipped_chunks: usize,
    },
    /// The file was rejected before chunking (oversized, unsupported type).
    Skipped { filename: String, reason: String },
    /// Extraction blew up mid-file; nothing from this file was persisted.
    Failed { filename: String, error: KbError },
}

impl FileOutcome {
    pub fn filename(&self) -> &str {
        match self {
            FileOutcome::Ingested { filename, .. }
            | FileOutcome::Skipped { filename, .. }
            | FileOutcome::Failed { filename, .. } => filename,
        }
    }
}

/// Per-file outcomes of one upload plus the total persisted chunk count.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub outcomes: Vec<FileOutcome>,
    pub chunks_persisted: usize,
}

impl UploadReport {
    /// Number of files that made it through chunking and persistence.
    pub fn files_ingested(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, FileOutcome::Ingested { .. }))
            .count()
    }
}
