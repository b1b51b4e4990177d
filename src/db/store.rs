//! SQLite-backed chunk store.
//!
//! Each enriched chunk becomes one `chunks` row keyed by its record key
//! (`sha256(package::class::signature)`), so re-ingesting an unchanged tree
//! updates rows in place instead of appending duplicates. Searches run KNN
//! over `vec_chunks` when an embedder is attached and fall back to FTS5
//! BM25 otherwise.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, Row};
use serde::Serialize;
use zerocopy::IntoBytes;

use crate::config::StorageConfig;
use crate::db::schema::{initialize_database, table_exists};
use crate::error::{Result, StructdexError};
use crate::indexer::embedder::{Embedder, EmbeddingTask};
use crate::indexer::identity::record_key;
use crate::types::EnrichedChunk;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One search result. Lower `distance` means closer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub chunk_id: String,
    pub package: String,
    pub class_name: String,
    pub method_name: String,
    pub signature: String,
    pub body: String,
    pub class_context: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub dependency_types: Vec<String>,
    pub inherited_methods: Vec<String>,
    pub file_path: String,
    pub distance: f64,
}

/// Store summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub count: usize,
    /// Whether anything has been written yet.
    pub exists: bool,
}

/// Storage collaborator used by the ingestion pipeline.
///
/// Implementations are owned by exactly one writer at a time, so `add_batch`
/// takes `&mut self`.
pub trait ChunkStore: Send {
    /// Upsert every chunk; returns the number of rows written.
    fn add_batch(&mut self, chunks: &[EnrichedChunk]) -> Result<usize>;

    fn search(&self, query: &str, limit: usize, task: EmbeddingTask) -> Result<Vec<SearchHit>>;

    fn stats(&self) -> Result<StoreStats>;
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

const UPSERT_CHUNK_SQL: &str = "\
INSERT INTO chunks (id, chunk_id, package, class_name, method_name, signature, body,
                    class_context, dependency_types, inherited_methods, summary, keywords,
                    search_text, file_path)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
ON CONFLICT(id) DO UPDATE SET
  chunk_id = excluded.chunk_id,
  method_name = excluded.method_name,
  body = excluded.body,
  class_context = excluded.class_context,
  dependency_types = excluded.dependency_types,
  inherited_methods = excluded.inherited_methods,
  summary = excluded.summary,
  keywords = excluded.keywords,
  search_text = excluded.search_text,
  file_path = excluded.file_path,
  indexed_at = strftime('%s','now')";

const HIT_COLUMNS: &str = "c.id, c.chunk_id, c.package, c.class_name, c.method_name, \
c.signature, c.body, c.class_context, c.summary, c.keywords, c.dependency_types, \
c.inherited_methods, c.file_path";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Virtual document that gets embedded and searched:
/// `Summary: .. | Keywords: .. | Signature: .. | Context: ..`.
pub fn build_search_text(chunk: &EnrichedChunk) -> String {
    let mut parts = Vec::with_capacity(4);
    if !chunk.summary.is_empty() {
        parts.push(format!("Summary: {}", chunk.summary));
    }
    if !chunk.keywords.is_empty() {
        parts.push(format!("Keywords: {}", chunk.keywords.join(", ")));
    }
    parts.push(format!("Signature: {}", chunk.chunk.signature));
    parts.push(format!("Context: {}", chunk.chunk.class_context));
    parts.join(" | ")
}

/// Quote each whitespace token for FTS5 and OR them together, dropping
/// operator characters.
pub fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .filter_map(|token| {
            let clean: String = token
                .chars()
                .filter(|c| {
                    !matches!(
                        c,
                        '*' | '"' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '~' | ':'
                    )
                })
                .collect();
            (!clean.is_empty()).then(|| format!("\"{clean}\""))
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn json_list(raw: String) -> Vec<String> {
    serde_json::from_str(&raw).unwrap_or_default()
}

fn hit_from_row(row: &Row<'_>) -> rusqlite::Result<SearchHit> {
    Ok(SearchHit {
        id: row.get(0)?,
        chunk_id: row.get(1)?,
        package: row.get(2)?,
        class_name: row.get(3)?,
        method_name: row.get(4)?,
        signature: row.get(5)?,
        body: row.get(6)?,
        class_context: row.get(7)?,
        summary: row.get(8)?,
        keywords: json_list(row.get(9)?),
        dependency_types: json_list(row.get(10)?),
        inherited_methods: json_list(row.get(11)?),
        file_path: row.get(12)?,
        distance: row.get(13)?,
    })
}

// ---------------------------------------------------------------------------
// SqliteChunkStore
// ---------------------------------------------------------------------------

/// [`ChunkStore`] over SQLite with optional sqlite-vec vectors.
pub struct SqliteChunkStore {
    conn: Connection,
    embedder: Option<Box<dyn Embedder>>,
    vectors: bool,
    write_retries: u32,
    retry_backoff: Duration,
    query_prefix: String,
}

impl std::fmt::Debug for SqliteChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteChunkStore")
            .field("vectors", &self.vectors)
            .field("write_retries", &self.write_retries)
            .finish_non_exhaustive()
    }
}

impl SqliteChunkStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(
        path: &Path,
        embedder: Option<Box<dyn Embedder>>,
        config: &StorageConfig,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_path_str(&path.to_string_lossy(), embedder, config)
    }

    /// In-memory store, mostly for tests.
    pub fn open_in_memory(
        embedder: Option<Box<dyn Embedder>>,
        config: &StorageConfig,
    ) -> Result<Self> {
        Self::from_path_str(":memory:", embedder, config)
    }

    fn from_path_str(
        path: &str,
        embedder: Option<Box<dyn Embedder>>,
        config: &StorageConfig,
    ) -> Result<Self> {
        let dims = embedder.as_ref().map(|e| e.dimensions());
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let conn = initialize_database(path, dims, busy_timeout)?;
        let vectors = dims.is_some() && table_exists(&conn, "vec_chunks");
        if dims.is_some() && !vectors {
            tracing::warn!("vector table unavailable; search will use keywords only");
        }

        Ok(Self {
            conn,
            embedder,
            vectors,
            write_retries: config.write_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            query_prefix: config.query_prefix.clone(),
        })
    }

    /// Whether searches use vector KNN.
    pub fn has_vectors(&self) -> bool {
        self.vectors
    }

    /// Look up one record by its record key.
    pub fn get(&self, id: &str) -> Result<Option<SearchHit>> {
        let sql = format!("SELECT {HIT_COLUMNS}, 0.0 FROM chunks c WHERE c.id = ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query_map(params![id], hit_from_row)?;
        let hit = rows.next().transpose()?;
        Ok(hit)
    }

    /// Every record key, sorted.
    pub fn ids(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached("SELECT id FROM chunks ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_backoff * attempt
    }

    fn write_batch(
        &mut self,
        chunks: &[EnrichedChunk],
        texts: &[String],
        embeddings: Option<&[Vec<f32>]>,
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut upsert = tx.prepare_cached(UPSERT_CHUNK_SQL)?;
            let mut delete_vec = if embeddings.is_some() {
                Some(tx.prepare_cached("DELETE FROM vec_chunks WHERE record_id = ?1")?)
            } else {
                None
            };
            let mut insert_vec = if embeddings.is_some() {
                Some(tx.prepare_cached(
                    "INSERT INTO vec_chunks (record_id, embedding) VALUES (?1, ?2)",
                )?)
            } else {
                None
            };

            for (i, enriched) in chunks.iter().enumerate() {
                let chunk = &enriched.chunk;
                let key = record_key(&chunk.package, &chunk.class_name, &chunk.signature);
                upsert.execute(params![
                    key,
                    chunk.id,
                    chunk.package,
                    chunk.class_name,
                    chunk.method_name,
                    chunk.signature,
                    chunk.body,
                    chunk.class_context,
                    serde_json::to_string(&chunk.dependency_types)?,
                    serde_json::to_string(&chunk.inherited_methods)?,
                    enriched.summary,
                    serde_json::to_string(&enriched.keywords)?,
                    texts[i],
                    enriched.file_path(),
                ])?;

                if let (Some(vectors), Some(delete), Some(insert)) =
                    (embeddings, delete_vec.as_mut(), insert_vec.as_mut())
                {
                    delete.execute(params![key])?;
                    insert.execute(params![key, vectors[i].as_slice().as_bytes()])?;
                }
            }
        }
        tx.commit()?;
        Ok(chunks.len())
    }

    fn search_vectors(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        limit: usize,
        task: EmbeddingTask,
    ) -> Result<Vec<SearchHit>> {
        let text = format!("{}{query}", self.query_prefix);
        let vector = embedder
            .embed(&[text], task)?
            .pop()
            .ok_or_else(|| StructdexError::Storage("embedder returned no query vector".into()))?;

        let sql = format!(
            "SELECT {HIT_COLUMNS}, v.distance
             FROM (SELECT record_id, distance FROM vec_chunks
                   WHERE embedding MATCH ?1 AND k = ?2) v
             JOIN chunks c ON c.id = v.record_id
             ORDER BY v.distance"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let hits = stmt
            .query_map(params![vector.as_slice().as_bytes(), limit as i64], hit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }

    fn search_keywords(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let fts_query = sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {HIT_COLUMNS}, bm25(fts_chunks) AS rank
             FROM fts_chunks
             JOIN chunks c ON c.rowid = fts_chunks.rowid
             WHERE fts_chunks MATCH ?1
             ORDER BY rank
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let hits = stmt
            .query_map(params![fts_query, limit as i64], hit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }
}

impl ChunkStore for SqliteChunkStore {
    fn add_batch(&mut self, chunks: &[EnrichedChunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(build_search_text).collect();
        let embeddings = match (&self.embedder, self.vectors) {
            (Some(embedder), true) => {
                let vectors = embedder.embed(&texts, EmbeddingTask::Passage)?;
                if vectors.len() != texts.len() {
                    return Err(StructdexError::Storage(format!(
                        "embedder returned {} vectors for {} texts",
                        vectors.len(),
                        texts.len()
                    )));
                }
                Some(vectors)
            }
            _ => None,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.write_batch(chunks, &texts, embeddings.as_deref()) {
                Ok(written) => {
                    tracing::debug!("stored {written} chunks");
                    return Ok(written);
                }
                Err(e) if e.is_transient() && attempt <= self.write_retries => {
                    let delay = self.retry_delay(attempt);
                    tracing::warn!(
                        "database busy (attempt {attempt}/{}); retrying in {delay:?}",
                        self.write_retries
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn search(&self, query: &str, limit: usize, task: EmbeddingTask) -> Result<Vec<SearchHit>> {
        match (&self.embedder, self.vectors) {
            (Some(embedder), true) => self.search_vectors(embedder.as_ref(), query, limit, task),
            _ => self.search_keywords(query, limit),
        }
    }

    fn stats(&self) -> Result<StoreStats> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(StoreStats {
            count: count as usize,
            exists: count > 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::embedder::testing::HashEmbedder;
    use crate::types::{Enrichment, MethodChunk};
    use pretty_assertions::assert_eq;

    fn enriched(package: &str, class: &str, name: &str, summary: &str) -> EnrichedChunk {
        let signature = format!("public void {name}()");
        let context = format!("Package: {package}, Class: {class}, Fields: None");
        EnrichedChunk::new(
            MethodChunk {
                id: crate::indexer::identity::chunk_id(&context, &signature),
                method_name: name.to_string(),
                signature,
                body: "{ run(); }".to_string(),
                class_context: context,
                dependency_types: vec!["Order".to_string()],
                package: package.to_string(),
                class_name: class.to_string(),
                inherited_methods: vec![],
                file_path: Some(format!("{class}.java")),
            },
            Enrichment {
                summary: summary.to_string(),
                keywords: vec![name.to_lowercase(), "java".to_string()],
            },
        )
    }

    fn keyword_store() -> SqliteChunkStore {
        SqliteChunkStore::open_in_memory(None, &StorageConfig::default()).unwrap()
    }

    #[test]
    fn empty_store_stats() {
        let store = keyword_store();
        assert_eq!(store.stats().unwrap(), StoreStats { count: 0, exists: false });
        assert!(!store.has_vectors());
    }

    #[test]
    fn add_batch_upserts_by_record_key() {
        let mut store = keyword_store();
        let first = enriched("p", "Dog", "bark", "Makes a noise");
        assert_eq!(store.add_batch(&[first.clone()]).unwrap(), 1);

        let mut again = first.clone();
        again.summary = "Barks loudly".to_string();
        store.add_batch(&[again]).unwrap();

        assert_eq!(store.stats().unwrap().count, 1);
        let key = record_key("p", "Dog", "public void bark()");
        let row = store.get(&key).unwrap().unwrap();
        assert_eq!(row.summary, "Barks loudly");
        assert_eq!(row.chunk_id, first.chunk.id);
        assert_eq!(row.dependency_types, vec!["Order"]);
        assert_eq!(row.file_path, "Dog.java");
    }

    #[test]
    fn same_signature_in_other_package_is_separate() {
        let mut store = keyword_store();
        store
            .add_batch(&[enriched("a", "Job", "run", "s"), enriched("b", "Job", "run", "s")])
            .unwrap();
        assert_eq!(store.ids().unwrap().len(), 2);
    }

    #[test]
    fn keyword_search_ranks_matches() {
        let mut store = keyword_store();
        store
            .add_batch(&[
                enriched("p", "Billing", "charge", "Charges the customer invoice"),
                enriched("p", "Shipping", "ship", "Dispatches a parcel"),
            ])
            .unwrap();

        let hits = store.search("invoice", 10, EmbeddingTask::Query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].method_name, "charge");
        assert!(store.search("***", 10, EmbeddingTask::Query).unwrap().is_empty());
    }

    #[test]
    fn vector_search_returns_nearest_first() {
        let embedder = Box::new(HashEmbedder { dims: 32 });
        let mut store = SqliteChunkStore::open_in_memory(Some(embedder), &StorageConfig::default()).unwrap();
        assert!(store.has_vectors());

        store
            .add_batch(&[
                enriched("p", "Billing", "chargeInvoice", "Charges the customer invoice"),
                enriched("p", "Zoo", "feedAnimals", "Feeds every zebra"),
            ])
            .unwrap();
        // Re-adding must replace vectors, not duplicate them.
        store
            .add_batch(&[enriched("p", "Zoo", "feedAnimals", "Feeds every zebra")])
            .unwrap();

        let hits = store
            .search("Summary: Charges the customer invoice", 2, EmbeddingTask::Query)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].method_name, "chargeInvoice");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn search_text_layout() {
        let text = build_search_text(&enriched("p", "Dog", "bark", "Makes a noise"));
        assert_eq!(
            text,
            "Summary: Makes a noise | Keywords: bark, java | Signature: public void bark() | \
             Context: Package: p, Class: Dog, Fields: None"
        );
    }

    #[test]
    fn sanitize_strips_operators() {
        assert_eq!(sanitize_fts_query("foo* (bar) baz:qux"), r#""foo" OR "bar" OR "bazqux""#);
        assert_eq!(sanitize_fts_query("   "), "");
    }

    #[test]
    fn retry_backoff_grows_linearly() {
        let store = keyword_store();
        assert_eq!(store.retry_delay(1), Duration::from_millis(500));
        assert_eq!(store.retry_delay(3), Duration::from_millis(1500));
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/structdex.db");
        {
            let mut store = SqliteChunkStore::open(&path, None, &StorageConfig::default()).unwrap();
            store.add_batch(&[enriched("p", "Dog", "bark", "s")]).unwrap();
        }
        let store = SqliteChunkStore::open(&path, None, &StorageConfig::default()).unwrap();
        assert_eq!(store.stats().unwrap(), StoreStats { count: 1, exists: true });
    }

    /// File-backed store that reports BUSY at once instead of waiting.
    fn impatient_store(path: &Path, write_retries: u32, retry_backoff_ms: u64) -> SqliteChunkStore {
        let config = StorageConfig {
            write_retries,
            retry_backoff_ms,
            busy_timeout_ms: 0,
            ..StorageConfig::default()
        };
        SqliteChunkStore::open(path, None, &config).unwrap()
    }

    /// Second connection holding the write lock.
    fn lock_database(path: &Path) -> Connection {
        let holder = Connection::open(path).unwrap();
        holder.execute_batch("BEGIN EXCLUSIVE").unwrap();
        holder
    }

    #[test]
    fn locked_write_retries_until_released() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("structdex.db");
        let mut store = impatient_store(&path, 10, 40);
        let holder = lock_database(&path);

        let release = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            holder.execute_batch("COMMIT").unwrap();
        });

        let started = std::time::Instant::now();
        let written = store.add_batch(&[enriched("p", "Dog", "bark", "s")]).unwrap();
        release.join().unwrap();

        assert_eq!(written, 1);
        // The first attempt hit the lock, so at least one backoff elapsed.
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(store.stats().unwrap().count, 1);
    }

    #[test]
    fn locked_write_fails_after_retries() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("structdex.db");
        let mut store = impatient_store(&path, 2, 1);
        let holder = lock_database(&path);

        let err = store.add_batch(&[enriched("p", "Dog", "bark", "s")]).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.kind(), "StorageFailure");

        holder.execute_batch("ROLLBACK").unwrap();
        assert_eq!(store.stats().unwrap().count, 0);
    }
}
