//! SQLite backend: chunk rows in a regular table, vectors in a `sqlite-vec`
//! virtual table joined by rowid.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use tokio_rusqlite::{Connection, ffi, rusqlite};
use uuid::Uuid;

use crate::types::{BotId, ChunkId, KbError};

use super::{ChunkRecord, ChunkSnapshot, FileSummary, IndexEntry, KnowledgeBackend, ScoredChunk};

/// Knowledge backend persisting to a single SQLite database file.
///
/// The `chunks` table is the durable chunk store; the `chunk_vectors` vec0
/// virtual table is the similarity index. Row and vector land in separate
/// statements in pipeline order (row first), so a crash between the two
/// leaves a row without a vector rather than a dangling vector.
#[derive(Clone)]
pub struct SqliteKnowledgeStore {
    conn: Connection,
    dimensions: usize,
}

impl SqliteKnowledgeStore {
    /// Open (and create if needed) the database at `path`, with embedding
    /// vectors of the given dimensionality.
    pub async fn open(path: impl AsRef<Path>, dimensions: usize) -> Result<Self, KbError> {
        Self::register_sqlite_vec()?;

        let conn = Connection::open(path)
            .await
            .map_err(|err| KbError::Persistence(err.to_string()))?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            // Fails fast if the sqlite-vec extension did not load.
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS chunks (
                    id TEXT PRIMARY KEY,
                    bot_id TEXT NOT NULL,
                    filename TEXT NOT NULL,
                    chunk_index INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    embedding TEXT NOT NULL
                )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_chunks_bot ON chunks(bot_id)",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_chunks_bot_file ON chunks(bot_id, filename)",
                [],
            )?;
            conn.execute(
                &format!(
                    "CREATE VIRTUAL TABLE IF NOT EXISTS chunk_vectors \
                     USING vec0(embedding float[{dimensions}])"
                ),
                [],
            )?;
            Ok(())
        })
        .await
        .map_err(|err| KbError::Persistence(err.to_string()))?;

        Ok(Self { conn, dimensions })
    }

    /// Vector dimensionality the index was created with.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn register_sqlite_vec() -> Result<(), KbError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!("failed to register sqlite-vec extension (code {rc})"))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(KbError::Persistence)
    }
}

#[async_trait::async_trait]
impl KnowledgeBackend for SqliteKnowledgeStore {
    async fn persist_chunk(&self, record: &ChunkRecord) -> Result<(), KbError> {
        let id = record.id.to_string();
        let bot_id = record.bot_id.to_string();
        let filename = record.filename.clone();
        let chunk_index = record.chunk_index as i64;
        let content = record.content.clone();
        // The row keeps the vector too, so an index write that never lands
        // can be backfilled from the durable side.
        let embedding = serde_json::to_string(&record.embedding)
            .map_err(|err| KbError::Persistence(err.to_string()))?;

        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO chunks (id, bot_id, filename, chunk_index, content, embedding) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    (id, bot_id, filename, chunk_index, content, embedding),
                )?;
                Ok(())
            })
            .await
            .map_err(|err| KbError::Persistence(err.to_string()))
    }

    async fn index_chunks(&self, entries: Vec<IndexEntry>) -> Result<(), KbError> {
        if entries.is_empty() {
            return Ok(());
        }

        // sqlite-vec accepts vectors as JSON text for float[] columns.
        let mut rows = Vec::with_capacity(entries.len());
        for entry in &entries {
            let vector_json = serde_json::to_string(&entry.embedding)
                .map_err(|err| KbError::Persistence(err.to_string()))?;
            rows.push((entry.id.to_string(), vector_json));
        }

        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                for (id, vector_json) in rows {
                    tx.execute(
                        "INSERT INTO chunk_vectors (rowid, embedding) \
                         SELECT rowid, ?1 FROM chunks WHERE id = ?2",
                        (vector_json, id),
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err| KbError::Persistence(err.to_string()))
    }

    async fn remove_chunk(&self, id: ChunkId) -> Result<bool, KbError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM chunk_vectors WHERE rowid IN \
                     (SELECT rowid FROM chunks WHERE id = ?1)",
                    [&id],
                )?;
                let deleted = tx.execute("DELETE FROM chunks WHERE id = ?1", [&id])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await
            .map_err(|err| KbError::Persistence(err.to_string()))
    }

    async fn remove_file(&self, bot_id: BotId, filename: &str) -> Result<usize, KbError> {
        let bot_id = bot_id.to_string();
        let filename = filename.to_string();
        self.conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM chunk_vectors WHERE rowid IN \
                     (SELECT rowid FROM chunks WHERE bot_id = ?1 AND filename = ?2)",
                    (&bot_id, &filename),
                )?;
                let deleted = tx.execute(
                    "DELETE FROM chunks WHERE bot_id = ?1 AND filename = ?2",
                    (&bot_id, &filename),
                )?;
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(|err| KbError::Persistence(err.to_string()))
    }

    async fn remove_bot(&self, bot_id: BotId) -> Result<usize, KbError> {
        let bot_id = bot_id.to_string();
        self.conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM chunk_vectors WHERE rowid IN \
                     (SELECT rowid FROM chunks WHERE bot_id = ?1)",
                    [&bot_id],
                )?;
                let deleted = tx.execute("DELETE FROM chunks WHERE bot_id = ?1", [&bot_id])?;
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(|err| KbError::Persistence(err.to_string()))
    }

    async fn list_files(&self, bot_id: BotId) -> Result<Vec<FileSummary>, KbError> {
        let bot_id = bot_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<FileSummary>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT filename, COUNT(*) AS chunk_count FROM chunks \
                     WHERE bot_id = ?1 GROUP BY filename ORDER BY filename",
                )?;
                let rows = stmt.query_map([&bot_id], |row| {
                    Ok(FileSummary {
                        filename: row.get(0)?,
                        chunk_count: row.get::<_, i64>(1)? as usize,
                    })
                })?;

                let mut summaries = Vec::new();
                for row in rows {
                    summaries.push(row?);
                }
                Ok(summaries)
            })
            .await
            .map_err(|err| KbError::Persistence(err.to_string()))
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        bot_id: BotId,
    ) -> Result<Vec<ScoredChunk>, KbError> {
        let embedding_json = serde_json::to_string(query_embedding)
            .map_err(|err| KbError::Persistence(err.to_string()))?;
        let bot_id = bot_id.to_string();

        let raw = self
            .conn
            .call(move |conn| -> Result<Vec<(String, String, i64, String, f32)>, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT c.id, c.filename, c.chunk_index, c.content, \
                     vec_distance_cosine(v.embedding, vec_f32(?1)) AS distance \
                     FROM chunks c \
                     JOIN chunk_vectors v ON v.rowid = c.rowid \
                     WHERE c.bot_id = ?2 \
                     ORDER BY distance ASC \
                     LIMIT {top_k}"
                ))?;

                let rows = stmt.query_map((&embedding_json, &bot_id), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, f32>(4)?,
                    ))
                })?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| KbError::Persistence(err.to_string()))?;

        let mut scored = Vec::with_capacity(raw.len());
        for (id, filename, chunk_index, content, distance) in raw {
            let id = Uuid::parse_str(&id)
                .map_err(|err| KbError::Persistence(format!("malformed chunk id '{id}': {err}")))?;
            scored.push(ScoredChunk {
                chunk: ChunkSnapshot {
                    id,
                    filename,
                    chunk_index: chunk_index as usize,
                    content,
                },
                // Cosine distance to similarity.
                score: 1.0 - distance,
            });
        }
        Ok(scored)
    }

    async fn chunk_count(&self, bot_id: BotId) -> Result<usize, KbError> {
        let bot_id = bot_id.to_string();
        self.conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM chunks WHERE bot_id = ?1",
                    [&bot_id],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| KbError::Persistence(err.to_string()))
    }
}
