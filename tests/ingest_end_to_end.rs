//! End-to-end ingestion tests.
//!
//! These tests write a small Java project to a temp directory, run both
//! passes with the offline enricher, and inspect the resulting SQLite store.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use structdex::config::{StorageConfig, StructdexConfig};
use structdex::db::{ChunkStore, SqliteChunkStore};
use structdex::indexer::embedder::EmbeddingTask;
use structdex::indexer::enricher::{Enricher, MockEnricher};
use structdex::indexer::hierarchy;
use structdex::indexer::pipeline::{IngestionPipeline, IngestionReport};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ANIMAL: &str = r#"
package com.zoo;

public class Animal {
    protected String name;

    public void eat() { System.out.println("eating"); }

    public void sleep() { System.out.println("sleeping"); }
}
"#;

const DOG: &str = r#"
package com.zoo;

public class Dog extends Animal {
    private String breed;

    public Dog(String breed) {
        this.breed = breed;
    }

    public void bark() { System.out.println("woof"); }
}
"#;

const CALCULATOR: &str = r#"
package com.zoo.billing;

public class Calculator {
    public int calculate(int x) { return x * 2; }

    public int calculate(String x) { return Integer.parseInt(x); }

    public Invoice settle(Order order, Customer customer) {
        return new Invoice(order, customer);
    }

    public abstract void skipped();
}
"#;

fn write_project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }
    dir
}

fn config_for(root: &Path) -> StructdexConfig {
    let mut config = StructdexConfig::default();
    config.paths.project_root = root.to_path_buf();
    config.paths.database_path = root.join("data").join("index.db");
    config.paths.error_log = root.join("errors.log");
    config.ingestion.show_progress = false;
    config.ingestion.flush_size = 2;
    config.ingestion.write_multiple = 2;
    config
}

async fn ingest(config: StructdexConfig) -> IngestionReport {
    let store = SqliteChunkStore::open(&config.paths.database_path, None, &config.storage).unwrap();
    let enricher: Arc<dyn Enricher> = Arc::new(MockEnricher::new(Duration::ZERO));
    IngestionPipeline::new(config, enricher, Box::new(store))
        .unwrap()
        .run()
        .await
        .unwrap()
}

fn reopen(config: &StructdexConfig) -> SqliteChunkStore {
    SqliteChunkStore::open(&config.paths.database_path, None, &StorageConfig::default()).unwrap()
}

fn zoo() -> TempDir {
    write_project(&[
        ("src/com/zoo/Animal.java", ANIMAL),
        ("src/com/zoo/Dog.java", DOG),
        ("src/com/zoo/billing/Calculator.java", CALCULATOR),
    ])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_chunk_becomes_one_record() {
    let dir = zoo();
    let config = config_for(dir.path());
    let report = ingest(config.clone()).await;

    // Animal: 2, Dog: constructor + bark, Calculator: 2 overloads + settle.
    assert_eq!(report.stats.files_total, 3);
    assert_eq!(report.stats.files_processed, 3);
    assert_eq!(report.stats.files_failed, 0);
    assert_eq!(report.stats.chunks_indexed, 7);
    assert_eq!(report.stored_records, 7);
    assert!(report.error_log.is_none());
    assert!(!config.paths.error_log.exists());

    let store = reopen(&config);
    let ids = store.ids().unwrap();
    assert_eq!(ids.len(), 7);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 7);
}

#[tokio::test]
async fn hierarchy_file_is_written_before_parsing() {
    let dir = zoo();
    let config = config_for(dir.path());
    let report = ingest(config.clone()).await;

    let map = hierarchy::load(&report.hierarchy_file).unwrap();
    assert_eq!(map.len(), 3);
    assert_eq!(map["com.zoo.Dog"].parent.as_deref(), Some("Animal"));
    assert_eq!(
        map["com.zoo.billing.Calculator"].public_methods,
        vec!["calculate", "settle", "skipped"]
    );
}

#[tokio::test]
async fn stored_records_carry_structure_and_enrichment() {
    let dir = zoo();
    let config = config_for(dir.path());
    ingest(config.clone()).await;
    let store = reopen(&config);

    let bark = store
        .search("bark", 10, EmbeddingTask::Query)
        .unwrap()
        .into_iter()
        .find(|h| h.method_name == "bark")
        .unwrap();
    assert_eq!(bark.class_name, "Dog");
    assert_eq!(bark.package, "com.zoo");
    assert_eq!(bark.inherited_methods, vec!["eat", "sleep"]);
    assert!(bark.class_context.ends_with("Extends: Animal, Inherited Methods: [eat, sleep]"));
    assert!(bark.file_path.ends_with("Dog.java"));
    assert_eq!(bark.summary, "Method bark performs business logic operations");

    let all = store.search("public", 20, EmbeddingTask::Query).unwrap();
    let ctor = all.iter().find(|h| h.method_name == "<Constructor>").unwrap();
    assert!(ctor.dependency_types.is_empty());
    assert_eq!(ctor.signature, "public <Constructor> Dog(String breed)");

    let settle = all.iter().find(|h| h.method_name == "settle").unwrap();
    assert_eq!(settle.dependency_types, vec!["Order", "Customer"]);

    let overloads: Vec<_> = all.iter().filter(|h| h.method_name == "calculate").collect();
    assert_eq!(overloads.len(), 2);
    assert_ne!(overloads[0].id, overloads[1].id);
}

#[tokio::test]
async fn reingesting_upserts_in_place() {
    let dir = zoo();
    let config = config_for(dir.path());
    ingest(config.clone()).await;
    let report = ingest(config.clone()).await;

    assert_eq!(report.stats.chunks_indexed, 7);
    assert_eq!(report.stored_records, 7);
    assert_eq!(reopen(&config).stats().unwrap().count, 7);
}

#[tokio::test]
async fn stray_bytes_in_a_comment_do_not_cost_the_file() {
    let dir = zoo();
    let mut source = b"package com.zoo;\n// caf\xe9\n".to_vec();
    source.extend_from_slice(b"public class Cat extends Animal { public void purr() { hum(); } }\n");
    std::fs::write(dir.path().join("src/com/zoo/Cat.java"), source).unwrap();
    let config = config_for(dir.path());
    let report = ingest(config.clone()).await;

    assert_eq!(report.stats.files_total, 4);
    assert_eq!(report.stats.files_failed, 0);
    assert_eq!(report.stats.chunks_indexed, 8);
}

#[tokio::test]
async fn empty_tree_completes_with_nothing_stored() {
    let dir = TempDir::new().unwrap();
    let config = config_for(dir.path());
    let report = ingest(config).await;

    assert_eq!(report.stats.files_total, 0);
    assert_eq!(report.stored_records, 0);
    assert!(report.summary().contains("Chunks indexed:  0"));
}
