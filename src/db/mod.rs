//! Persistence: SQLite schema and the chunk store.

pub mod schema;
pub mod store;

use crate::config::StructdexConfig;
use crate::error::Result;
use crate::indexer::embedder::default_embedder;

pub use store::{ChunkStore, SearchHit, SqliteChunkStore, StoreStats};

/// Open the configured database with the default embedder attached.
pub fn open_store(config: &StructdexConfig) -> Result<SqliteChunkStore> {
    SqliteChunkStore::open(&config.paths.database_path, default_embedder(), &config.storage)
}
