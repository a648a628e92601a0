//! The ingestion pipeline proper.

use std::borrow::Cow;
use std::mem;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cache::QueryCache;
use crate::chunker::StreamingChunker;
use crate::config::IngestionConfig;
use crate::embeddings::EmbeddingProvider;
use crate::extract::ExtractorRegistry;
use crate::stores::{ChunkRecord, FileSummary, IndexEntry, KnowledgeBackend};
use crate::types::{BotId, ChunkId, KbError};

use super::{FileOutcome, SourceFile, UploadReport};

/// Drives uploads end to end: validation, chunking, embedding, the
/// row-then-index write sequence, and cache invalidation.
///
/// Writes are ordered so readers can only ever observe a chunk row without a
/// vector, never a vector without its row: the row is persisted first, the
/// vector lands with the next batch flush, and the bot's retrieval cache is
/// invalidated once at the end of the upload.
pub struct IngestionPipeline {
    backend: Arc<dyn KnowledgeBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: QueryCache,
    extractors: ExtractorRegistry,
    config: IngestionConfig,
}

impl IngestionPipeline {
    pub fn new(
        backend: Arc<dyn KnowledgeBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        cache: QueryCache,
        config: IngestionConfig,
    ) -> Self {
        Self {
            backend,
            embedder,
            cache,
            extractors: ExtractorRegistry::new(),
            config,
        }
    }

    /// Use a custom extractor registry instead of the plain-text default.
    #[must_use]
    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    /// Ingest a batch of files into one bot's knowledge base.
    ///
    /// Only request-level validation fails the call; everything after that is
    /// reported per file in the [`UploadReport`].
    pub async fn upload(
        &self,
        bot_id: BotId,
        files: Vec<SourceFile>,
    ) -> Result<UploadReport, KbError> {
        if files.is_empty() {
            return Err(KbError::Validation("upload contains no files".into()));
        }
        if files.len() > self.config.max_files_per_upload {
            return Err(KbError::Validation(format!(
                "upload has {} files, limit is {}",
                files.len(),
                self.config.max_files_per_upload
            )));
        }
        let total_bytes: u64 = files.iter().map(|file| file.data.len() as u64).sum();
        if total_bytes > self.config.max_upload_bytes {
            return Err(KbError::Validation(format!(
                "upload is {total_bytes} bytes, limit is {} bytes",
                self.config.max_upload_bytes
            )));
        }

        let mut report = UploadReport::default();
        for file in &files {
            let outcome = self.ingest_file(bot_id, file).await;
            if let FileOutcome::Ingested { chunks, .. } = outcome {
                report.chunks_persisted += chunks;
            }
            report.outcomes.push(outcome);
        }

        // New chunks make every memoized retrieval for this bot stale.
        if let Err(err) = self.cache.invalidate(bot_id).await {
            warn!(%bot_id, error = %err, "cache invalidation after upload failed");
        }

        info!(
            %bot_id,
            files = files.len(),
            ingested = report.files_ingested(),
            chunks = report.chunks_persisted,
            "upload complete"
        );
        Ok(report)
    }

    async fn ingest_file(&self, bot_id: BotId, file: &SourceFile) -> FileOutcome {
        if file.filename.contains("..") {
            return FileOutcome::Skipped {
                filename: file.filename.clone(),
                reason: "filename must not contain '..'".into(),
            };
        }
        if file.data.is_empty() {
            return FileOutcome::Skipped {
                filename: file.filename.clone(),
                reason: "file is empty".into(),
            };
        }
        if file.data.len() as u64 > self.config.max_file_bytes {
            warn!(%bot_id, filename = %file.filename, bytes = file.data.len(), "file over size cap, skipping");
            return FileOutcome::Skipped {
                filename: file.filename.clone(),
                reason: format!(
                    "file is {} bytes, limit is {} bytes",
                    file.data.len(),
                    self.config.max_file_bytes
                ),
            };
        }
        let (chunks, skipped_chunks) = if ExtractorRegistry::is_plain_text(&file.content_type) {
            // Plain text streams straight through the chunker line by line.
            let lines = file.data.split(|&byte| byte == b'\n').map(|raw| {
                let line = String::from_utf8_lossy(raw);
                match line {
                    Cow::Borrowed(text) => Cow::Borrowed(text.strip_suffix('\r').unwrap_or(text)),
                    Cow::Owned(mut text) => {
                        if text.ends_with('\r') {
                            text.pop();
                        }
                        Cow::Owned(text)
                    }
                }
            });
            self.chunk_and_store(bot_id, &file.filename, lines).await
        } else {
            let Some(extractor) = self.extractors.get(&file.content_type) else {
                return FileOutcome::Skipped {
                    filename: file.filename.clone(),
                    reason: format!("unsupported content type '{}'", file.content_type),
                };
            };
            let mut text = match extractor.extract(&file.data) {
                Ok(text) => text,
                Err(err) => {
                    error!(%bot_id, filename = %file.filename, error = %err, "extraction failed");
                    return FileOutcome::Failed {
                        filename: file.filename.clone(),
                        error: err,
                    };
                }
            };
            if text.chars().count() > self.config.max_text_chars {
                warn!(
                    %bot_id,
                    filename = %file.filename,
                    limit = self.config.max_text_chars,
                    "extracted text over length cap, truncating"
                );
                let cut = text
                    .char_indices()
                    .nth(self.config.max_text_chars)
                    .map(|(idx, _)| idx)
                    .unwrap_or(text.len());
                text.truncate(cut);
            }
            self.chunk_and_store(bot_id, &file.filename, text.lines().map(Cow::Borrowed))
                .await
        };

        info!(%bot_id, filename = %file.filename, chunks, skipped_chunks, "file ingested");
        FileOutcome::Ingested {
            filename: file.filename.clone(),
            chunks,
            skipped_chunks,
        }
    }

    /// Run lines through the chunker and store every resulting chunk.
    /// Returns (persisted, skipped) chunk counts.
    async fn chunk_and_store<'a>(
        &self,
        bot_id: BotId,
        filename: &str,
        lines: impl Iterator<Item = Cow<'a, str>>,
    ) -> (usize, usize) {
        let mut chunker =
            StreamingChunker::new(self.config.max_chunk_size, self.config.chunk_overlap);
        let mut batch: Vec<IndexEntry> = Vec::with_capacity(self.config.index_batch_size);
        let mut persisted = 0usize;
        let mut skipped = 0usize;
        let mut next_index = 0usize;

        for line in lines {
            chunker.push_line(&line);
            while let Some(chunk) = chunker.next_chunk() {
                self.store_chunk(bot_id, filename, chunk, &mut next_index, &mut batch, &mut persisted, &mut skipped)
                    .await;
            }
        }
        if let Some(tail) = chunker.finish() {
            self.store_chunk(bot_id, filename, tail, &mut next_index, &mut batch, &mut persisted, &mut skipped)
                .await;
        }
        self.flush(&mut batch).await;

        (persisted, skipped)
    }

    #[allow(clippy::too_many_arguments)]
    async fn store_chunk(
        &self,
        bot_id: BotId,
        filename: &str,
        content: String,
        next_index: &mut usize,
        batch: &mut Vec<IndexEntry>,
        persisted: &mut usize,
        skipped: &mut usize,
    ) {
        if content.is_empty() {
            return;
        }
        let chunk_index = *next_index;
        *next_index += 1;

        let embedding = match self.embedder.embed(&content).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(%bot_id, filename, chunk_index, error = %err, "embedding failed, skipping chunk");
                *skipped += 1;
                return;
            }
        };
        if embedding.len() != self.embedder.dimensions() {
            warn!(
                %bot_id,
                filename,
                chunk_index,
                got = embedding.len(),
                want = self.embedder.dimensions(),
                "embedding has wrong dimensionality, skipping chunk"
            );
            *skipped += 1;
            return;
        }

        let record = ChunkRecord::new(bot_id, filename, chunk_index, content, embedding);

        // Row first. A chunk whose row fails is dropped entirely; a row
        // whose later index write fails stays, invisible to search.
        if let Err(err) = self.backend.persist_chunk(&record).await {
            warn!(%bot_id, filename, chunk_index, error = %err, "persist failed, skipping chunk");
            *skipped += 1;
            return;
        }
        *persisted += 1;

        batch.push(IndexEntry::from(&record));
        if batch.len() >= self.config.index_batch_size {
            self.flush(batch).await;
        }
    }

    async fn flush(&self, batch: &mut Vec<IndexEntry>) {
        if batch.is_empty() {
            return;
        }
        let entries = mem::take(batch);
        let count = entries.len();
        if let Err(err) = self.backend.index_chunks(entries).await {
            // Rows stay; the chunks simply never become searchable.
            error!(count, error = %err, "vector index write failed");
        }
    }

    /// Remove one chunk and stale the bot's cache.
    pub async fn delete_chunk(&self, bot_id: BotId, chunk_id: ChunkId) -> Result<bool, KbError> {
        let existed = self.backend.remove_chunk(chunk_id).await?;
        if existed {
            if let Err(err) = self.cache.invalidate(bot_id).await {
                warn!(%bot_id, error = %err, "cache invalidation after delete failed");
            }
        }
        Ok(existed)
    }

    /// Remove every chunk of one file and stale the bot's cache.
    pub async fn delete_file(&self, bot_id: BotId, filename: &str) -> Result<usize, KbError> {
        let removed = self.backend.remove_file(bot_id, filename).await?;
        if let Err(err) = self.cache.invalidate(bot_id).await {
            warn!(%bot_id, error = %err, "cache invalidation after delete failed");
        }
        info!(%bot_id, filename, removed, "file removed from knowledge base");
        Ok(removed)
    }

    /// Remove a bot's entire corpus and stale its cache.
    pub async fn delete_bot(&self, bot_id: BotId) -> Result<usize, KbError> {
        let removed = self.backend.remove_bot(bot_id).await?;
        if let Err(err) = self.cache.invalidate(bot_id).await {
            warn!(%bot_id, error = %err, "cache invalidation after delete failed");
        }
        info!(%bot_id, removed, "bot corpus removed");
        Ok(removed)
    }

    /// Filenames with chunk counts for one bot.
    pub async fn list_files(&self, bot_id: BotId) -> Result<Vec<FileSummary>, KbError> {
        self.backend.list_files(bot_id).await
    }
}
