//! SQLite schema for the chunk store.
//!
//! `chunks` holds one row per persisted method record, keyed by the record
//! key `sha256(package::class::signature)`. `fts_chunks` mirrors the
//! searchable columns through triggers. `vec_chunks` is a sqlite-vec table
//! created only when the caller knows its embedding width.

use std::time::Duration;

use rusqlite::Connection;

/// Busy timeout used when the caller has no configured value.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

const CREATE_CHUNKS: &str = "\
CREATE TABLE IF NOT EXISTS chunks (
  id TEXT PRIMARY KEY,
  chunk_id TEXT NOT NULL,
  package TEXT NOT NULL,
  class_name TEXT NOT NULL,
  method_name TEXT NOT NULL,
  signature TEXT NOT NULL,
  body TEXT NOT NULL,
  class_context TEXT NOT NULL,
  dependency_types TEXT NOT NULL DEFAULT '[]',
  inherited_methods TEXT NOT NULL DEFAULT '[]',
  summary TEXT NOT NULL DEFAULT '',
  keywords TEXT NOT NULL DEFAULT '[]',
  search_text TEXT NOT NULL,
  file_path TEXT NOT NULL,
  indexed_at INTEGER DEFAULT (strftime('%s','now'))
)";

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_path)",
    "CREATE INDEX IF NOT EXISTS idx_chunks_class ON chunks(package, class_name)",
    "CREATE INDEX IF NOT EXISTS idx_chunks_method ON chunks(method_name)",
];

// FTS5 -------------------------------------------------------------------

const CREATE_FTS: &str = "\
CREATE VIRTUAL TABLE IF NOT EXISTS fts_chunks USING fts5(
  method_name, signature, summary, keywords, class_context,
  content='chunks', content_rowid='rowid'
)";

const CREATE_FTS_TRIGGERS: &[&str] = &[
    "\
CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
  INSERT INTO fts_chunks(rowid, method_name, signature, summary, keywords, class_context)
  VALUES (new.rowid, new.method_name, new.signature, new.summary, new.keywords, new.class_context);
END",
    "\
CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
  INSERT INTO fts_chunks(fts_chunks, rowid, method_name, signature, summary, keywords, class_context)
  VALUES ('delete', old.rowid, old.method_name, old.signature, old.summary, old.keywords, old.class_context);
END",
    "\
CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
  INSERT INTO fts_chunks(fts_chunks, rowid, method_name, signature, summary, keywords, class_context)
  VALUES ('delete', old.rowid, old.method_name, old.signature, old.summary, old.keywords, old.class_context);
  INSERT INTO fts_chunks(rowid, method_name, signature, summary, keywords, class_context)
  VALUES (new.rowid, new.method_name, new.signature, new.summary, new.keywords, new.class_context);
END",
];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Register sqlite-vec as an auto-extension so every connection opened
/// afterwards has `vec0`. Registering twice is harmless.
#[allow(clippy::missing_transmute_annotations)]
fn load_sqlite_vec_extension() {
    use rusqlite::ffi::sqlite3_auto_extension;
    use sqlite_vec::sqlite3_vec_init;

    unsafe {
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    }
}

/// Create the `vec_chunks` table for `dims`-wide vectors.
///
/// Returns false (and logs) when sqlite-vec is unavailable; the store then
/// runs keyword-only.
pub fn create_vec_table(conn: &Connection, dims: usize) -> bool {
    let ddl = format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(
  record_id TEXT PRIMARY KEY,
  embedding float[{dims}]
)"
    );
    match conn.execute_batch(&ddl) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("could not create vec_chunks table (sqlite-vec may not be loaded): {e}");
            false
        }
    }
}

/// Open (or create) the database at `db_path` and apply the schema.
///
/// `dims` is the embedding width; `None` skips the vector table. The
/// connection comes back with WAL, `synchronous=NORMAL` and the given busy
/// timeout set.
pub fn initialize_database(
    db_path: &str,
    dims: Option<usize>,
    busy_timeout: Duration,
) -> rusqlite::Result<Connection> {
    load_sqlite_vec_extension();

    let conn = Connection::open(db_path)?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(busy_timeout)?;

    conn.execute_batch(CREATE_CHUNKS)?;
    for ddl in CREATE_INDEXES {
        conn.execute_batch(ddl)?;
    }

    conn.execute_batch(CREATE_FTS)?;
    for trigger in CREATE_FTS_TRIGGERS {
        conn.execute_batch(trigger)?;
    }

    if let Some(dims) = dims {
        create_vec_table(&conn, dims);
    }

    Ok(conn)
}

/// Whether `name` exists in `sqlite_master`.
pub fn table_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1",
        [name],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
