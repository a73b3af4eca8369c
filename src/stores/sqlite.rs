//! SQLite backend: chunk rows plus a `sqlite-vec` embedding table, searched
//! with a cosine-distance scan.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, ffi, params_from_iter, types::Value};

use crate::dates::to_unix_timestamp;
use crate::models::{
    DocumentChunk, DocumentChunkMetadata, DocumentChunkWithScore, DocumentMetadataFilter,
    QueryWithEmbedding,
};
use crate::types::RagstoreError;

use super::{DeleteRequest, VectorStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    id          TEXT NOT NULL UNIQUE,
    document_id TEXT NOT NULL,
    text        TEXT NOT NULL,
    metadata    TEXT NOT NULL,
    token_count INTEGER,
    created_at  INTEGER
);
CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id);
CREATE TABLE IF NOT EXISTS chunk_embeddings (
    id        TEXT PRIMARY KEY,
    embedding BLOB NOT NULL
);
";

/// Chunk storage over `tokio-rusqlite` with vector search via the
/// `sqlite-vec` extension.
///
/// `chunks.seq` is the insertion order used for pagination; `chunk_embeddings`
/// holds one `vec_f32` blob per chunk id. `created_at` is the normalized unix
/// timestamp used by date-range filters.
pub struct SqliteVectorStore {
    conn: Connection,
}

impl SqliteVectorStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagstoreError> {
        register_sqlite_vec()?;
        let conn = Connection::open(path).await.map_err(storage)?;
        conn.call(|conn| {
            conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
                .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await
        .map_err(storage)?;
        Self::init(conn).await
    }

    /// In-memory store, used by tests and throwaway pipelines.
    pub async fn open_in_memory() -> Result<Self, RagstoreError> {
        register_sqlite_vec()?;
        let conn = Connection::open_in_memory().await.map_err(storage)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, RagstoreError> {
        conn.call(|conn| {
            conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            conn.execute_batch(SCHEMA)
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await
        .map_err(storage)?;
        Ok(Self { conn })
    }
}

/// One chunk flattened into SQL-ready column values.
struct ChunkRow {
    id: String,
    document_id: String,
    text: String,
    metadata_json: String,
    token_count: Option<i64>,
    created_at: Option<i64>,
    embedding_json: String,
}

fn chunk_row(document_id: &str, chunk: &DocumentChunk) -> Result<Option<ChunkRow>, RagstoreError> {
    let Some(embedding) = &chunk.embedding else {
        tracing::warn!(chunk_id = %chunk.id, "skipping chunk without an embedding");
        return Ok(None);
    };
    let metadata_json = serde_json::to_string(&chunk.metadata)
        .map_err(|err| RagstoreError::Storage(format!("metadata serialization: {err}")))?;
    let embedding_json = serde_json::to_string(embedding)
        .map_err(|err| RagstoreError::Storage(format!("embedding serialization: {err}")))?;
    // Malformed dates at ingest time degrade to an unfilterable chunk rather
    // than failing the upsert.
    let created_at = match chunk.metadata.document.created_at.as_deref() {
        Some(date) => match to_unix_timestamp(date) {
            Ok(timestamp) => Some(timestamp),
            Err(err) => {
                tracing::warn!(chunk_id = %chunk.id, %err, "unparseable created_at");
                None
            }
        },
        None => None,
    };
    Ok(Some(ChunkRow {
        id: chunk.id.clone(),
        document_id: document_id.to_string(),
        text: chunk.text.clone(),
        metadata_json,
        token_count: chunk.token_count.map(|count| count as i64),
        created_at,
        embedding_json,
    }))
}

/// Translates a metadata filter into SQL conditions over the aliased `c`
/// chunks table. Date bounds fail with `InvalidInput` when unparseable; the
/// remaining fields are exact matches on the stored metadata JSON.
fn filter_to_sql(
    filter: &DocumentMetadataFilter,
) -> Result<(Vec<String>, Vec<Value>), RagstoreError> {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    if let Some(document_id) = &filter.document_id {
        conditions.push("c.document_id = ?".to_string());
        params.push(Value::Text(document_id.clone()));
    }
    if let Some(source) = &filter.source {
        conditions.push("json_extract(c.metadata, '$.source') = ?".to_string());
        params.push(Value::Text(source.as_str().to_string()));
    }
    for (field, value) in [
        ("source_id", &filter.source_id),
        ("author", &filter.author),
        ("title", &filter.title),
        ("url", &filter.url),
    ] {
        if let Some(value) = value {
            conditions.push(format!("json_extract(c.metadata, '$.{field}') = ?"));
            params.push(Value::Text(value.clone()));
        }
    }
    if let Some(start_date) = &filter.start_date {
        conditions.push("c.created_at >= ?".to_string());
        params.push(Value::Integer(to_unix_timestamp(start_date)?));
    }
    if let Some(end_date) = &filter.end_date {
        conditions.push("c.created_at <= ?".to_string());
        params.push(Value::Integer(to_unix_timestamp(end_date)?));
    }

    Ok((conditions, params))
}

fn parse_chunk(
    id: String,
    text: String,
    metadata_json: &str,
    token_count: Option<i64>,
) -> Result<DocumentChunk, RagstoreError> {
    let metadata: DocumentChunkMetadata = serde_json::from_str(metadata_json)
        .map_err(|err| RagstoreError::Storage(format!("stored metadata for {id}: {err}")))?;
    Ok(DocumentChunk {
        id,
        text,
        metadata,
        embedding: None,
        token_count: token_count.map(|count| count as usize),
    })
}

fn storage(err: tokio_rusqlite::Error) -> RagstoreError {
    RagstoreError::Storage(err.to_string())
}

/// Registers `sqlite-vec` as an auto extension for every connection opened
/// afterwards. Process-wide, so the result of the first call sticks.
fn register_sqlite_vec() -> Result<(), RagstoreError> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *const c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!(
                    "failed to register sqlite-vec extension (code {rc})"
                ))
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
        .map_err(RagstoreError::Storage)
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add(
        &self,
        grouped: &[(String, Vec<DocumentChunk>)],
    ) -> Result<Vec<String>, RagstoreError> {
        let mut document_ids = Vec::with_capacity(grouped.len());
        let mut rows = Vec::new();
        for (document_id, chunks) in grouped {
            document_ids.push(document_id.clone());
            for chunk in chunks {
                if let Some(row) = chunk_row(document_id, chunk)? {
                    rows.push(row);
                }
            }
        }

        let inserted = rows.len();
        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                for row in rows {
                    tx.execute(
                        "INSERT OR REPLACE INTO chunks \
                         (id, document_id, text, metadata, token_count, created_at) \
                         VALUES (?, ?, ?, ?, ?, ?)",
                        (
                            &row.id,
                            &row.document_id,
                            &row.text,
                            &row.metadata_json,
                            row.token_count,
                            row.created_at,
                        ),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    tx.execute(
                        "INSERT OR REPLACE INTO chunk_embeddings (id, embedding) \
                         VALUES (?, vec_f32(?))",
                        (&row.id, &row.embedding_json),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(storage)?;

        tracing::info!(
            documents = document_ids.len(),
            chunks = inserted,
            "stored chunk batch"
        );
        Ok(document_ids)
    }

    async fn search(
        &self,
        query: &QueryWithEmbedding,
    ) -> Result<Vec<DocumentChunkWithScore>, RagstoreError> {
        let embedding_json = serde_json::to_string(&query.embedding)
            .map_err(|err| RagstoreError::Storage(format!("query embedding: {err}")))?;

        let mut sql = String::from(
            "SELECT c.id, c.text, c.metadata, c.token_count, \
             vec_distance_cosine(e.embedding, vec_f32(?)) AS distance \
             FROM chunks c JOIN chunk_embeddings e ON c.id = e.id",
        );
        let mut params = vec![Value::Text(embedding_json)];
        if let Some(filter) = &query.query.filter {
            let (conditions, mut filter_params) = filter_to_sql(filter)?;
            if !conditions.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&conditions.join(" AND "));
                params.append(&mut filter_params);
            }
        }
        sql.push_str(&format!(
            " ORDER BY distance ASC LIMIT {}",
            query.query.top_k
        ));

        let raw: Vec<(String, String, String, Option<i64>, f64)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql).map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map(params_from_iter(params), |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                        ))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut collected = Vec::new();
                for row in rows {
                    collected.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(collected)
            })
            .await
            .map_err(storage)?;

        raw.into_iter()
            .map(|(id, text, metadata_json, token_count, distance)| {
                let chunk = parse_chunk(id, text, &metadata_json, token_count)?;
                Ok(DocumentChunkWithScore {
                    chunk,
                    score: 1.0 - distance as f32,
                })
            })
            .collect()
    }

    async fn delete(&self, request: &DeleteRequest) -> Result<(), RagstoreError> {
        if request.delete_all {
            tracing::info!("deleting every chunk from the store");
            return self
                .conn
                .call(|conn| {
                    conn.execute_batch("DELETE FROM chunk_embeddings; DELETE FROM chunks;")
                        .map_err(tokio_rusqlite::Error::Rusqlite)
                })
                .await
                .map_err(storage);
        }

        // The criteria are independent; a filter and an id list in the same
        // request each delete their own matches.
        let mut document_ids: Vec<String> = Vec::new();
        let mut filter_sql: Option<(String, Vec<Value>)> = None;

        if let Some(filter) = &request.filter {
            if let Some(document_id) = filter.as_document_id_only() {
                document_ids.push(document_id.to_string());
            } else if !filter.is_empty() {
                let (conditions, params) = filter_to_sql(filter)?;
                filter_sql = Some((conditions.join(" AND "), params));
            }
        }
        if let Some(ids) = &request.ids {
            document_ids.extend(ids.iter().cloned());
        }
        if document_ids.is_empty() && filter_sql.is_none() {
            return Ok(());
        }

        tracing::info!(
            document_ids = document_ids.len(),
            filtered = filter_sql.is_some(),
            "deleting chunks"
        );
        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                if !document_ids.is_empty() {
                    let placeholders = vec!["?"; document_ids.len()].join(", ");
                    let params: Vec<Value> =
                        document_ids.into_iter().map(Value::Text).collect();
                    tx.execute(
                        &format!(
                            "DELETE FROM chunk_embeddings WHERE id IN \
                             (SELECT id FROM chunks WHERE document_id IN ({placeholders}))"
                        ),
                        params_from_iter(params.clone()),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    tx.execute(
                        &format!("DELETE FROM chunks WHERE document_id IN ({placeholders})"),
                        params_from_iter(params),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                }
                if let Some((conditions, params)) = filter_sql {
                    tx.execute(
                        &format!(
                            "DELETE FROM chunk_embeddings WHERE id IN \
                             (SELECT c.id FROM chunks c WHERE {conditions})"
                        ),
                        params_from_iter(params.clone()),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    tx.execute(
                        &format!(
                            "DELETE FROM chunks WHERE seq IN \
                             (SELECT c.seq FROM chunks c WHERE {conditions})"
                        ),
                        params_from_iter(params),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(storage)
    }

    async fn chunks(
        &self,
        start: usize,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<DocumentChunk>, RagstoreError> {
        let order = if reverse { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT id, text, metadata, token_count FROM chunks \
             ORDER BY seq {order} LIMIT ? OFFSET ?"
        );
        let raw: Vec<(String, String, String, Option<i64>)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql).map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map((limit as i64, start as i64), |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut collected = Vec::new();
                for row in rows {
                    collected.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(collected)
            })
            .await
            .map_err(storage)?;

        raw.into_iter()
            .map(|(id, text, metadata_json, token_count)| {
                parse_chunk(id, text, &metadata_json, token_count)
            })
            .collect()
    }

    async fn doc(&self, document_id: &str) -> Result<Vec<DocumentChunk>, RagstoreError> {
        let document_id = document_id.to_string();
        let raw: Vec<(String, String, String, Option<i64>)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, text, metadata, token_count FROM chunks \
                         WHERE document_id = ? ORDER BY seq ASC",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([&document_id], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut collected = Vec::new();
                for row in rows {
                    collected.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(collected)
            })
            .await
            .map_err(storage)?;

        raw.into_iter()
            .map(|(id, text, metadata_json, token_count)| {
                parse_chunk(id, text, &metadata_json, token_count)
            })
            .collect()
    }

    async fn count(&self) -> Result<usize, RagstoreError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(storage)
    }

    async fn shutdown(&self) -> Result<(), RagstoreError> {
        self.conn
            .call(|conn| {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                    .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(storage)?;
        tracing::info!("vector store shut down");
        Ok(())
    }
}
