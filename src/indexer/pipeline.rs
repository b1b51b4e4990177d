//! Two-pass ingestion orchestrator.
//!
//! ```text
//! ScanningHierarchy → BuildingComponents → Pass2Running → Draining → Done
//! ```
//!
//! Pass 1 scans the whole tree and persists the hierarchy map. Pass 2 walks
//! the same file list one file at a time: chunks collect in a parse buffer,
//! every `flush_size` chunks go through enrichment, and every
//! `flush_size * write_multiple` enriched chunks go to storage. Draining
//! flushes whatever is left in both buffers.
//!
//! All storage traffic goes through [`StoreWriter`], a dedicated thread that
//! owns the store. The control flow awaits each write before continuing, so
//! there is never more than one write in flight.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::config::StructdexConfig;
use crate::db::store::{ChunkStore, StoreStats};
use crate::error::{Result, StructdexError};
use crate::indexer::discovery::find_source_files;
use crate::indexer::enricher::{enrich_batch, Enricher};
use crate::indexer::hierarchy::{self, HierarchyScanner};
use crate::indexer::identity::record_key;
use crate::indexer::structure::StructuralParser;
use crate::observability::{ErrorLog, IngestMetrics};
use crate::types::{qualified_name, EnrichedChunk, IngestionStats, MethodChunk};

// ---------------------------------------------------------------------------
// State and report
// ---------------------------------------------------------------------------

/// Stage of an ingestion run. Stages are entered strictly in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    ScanningHierarchy,
    BuildingComponents,
    Pass2Running,
    Draining,
    Done,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub stats: IngestionStats,
    pub metrics: IngestMetrics,
    pub duration: Duration,
    /// Records in the store after the run.
    pub stored_records: usize,
    pub hierarchy_file: PathBuf,
    /// Set when anything was written to the error log.
    pub error_log: Option<PathBuf>,
    /// Stages entered, in order.
    pub transitions: Vec<PipelineState>,
}

impl IngestionReport {
    /// Human-readable run summary.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Files scanned:   {}\n\
             Files processed: {}\n\
             Files failed:    {}\n\
             Chunks indexed:  {}\n\
             Stored records:  {}\n\
             Duration:        {:.2}s",
            self.stats.files_total,
            self.stats.files_processed,
            self.stats.files_failed,
            self.stats.chunks_indexed,
            self.stored_records,
            self.duration.as_secs_f64(),
        );
        if let Some(path) = &self.error_log {
            out.push_str(&format!("\nFailures were logged to {}", path.display()));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Single writer
// ---------------------------------------------------------------------------

enum WriteRequest {
    Batch {
        chunks: Vec<EnrichedChunk>,
        reply: oneshot::Sender<Result<usize>>,
    },
    Stats {
        reply: oneshot::Sender<Result<StoreStats>>,
    },
}

/// Owns a [`ChunkStore`] on a dedicated thread and serializes every call
/// to it.
pub struct StoreWriter {
    tx: mpsc::Sender<WriteRequest>,
    handle: JoinHandle<Box<dyn ChunkStore>>,
}

impl StoreWriter {
    pub fn spawn(store: Box<dyn ChunkStore>) -> Result<Self> {
        let (tx, mut rx) = mpsc::channel::<WriteRequest>(1);
        let handle = std::thread::Builder::new()
            .name("structdex-writer".to_string())
            .spawn(move || {
                let mut store = store;
                while let Some(request) = rx.blocking_recv() {
                    match request {
                        WriteRequest::Batch { chunks, reply } => {
                            let _ = reply.send(store.add_batch(&chunks));
                        }
                        WriteRequest::Stats { reply } => {
                            let _ = reply.send(store.stats());
                        }
                    }
                }
                store
            })?;
        Ok(Self { tx, handle })
    }

    /// Write one batch and wait for the result.
    pub async fn write(&self, chunks: Vec<EnrichedChunk>) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WriteRequest::Batch { chunks, reply })
            .await
            .map_err(|_| StructdexError::Storage("writer thread has stopped".into()))?;
        rx.await
            .map_err(|_| StructdexError::Storage("writer thread dropped the reply".into()))?
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WriteRequest::Stats { reply })
            .await
            .map_err(|_| StructdexError::Storage("writer thread has stopped".into()))?;
        rx.await
            .map_err(|_| StructdexError::Storage("writer thread dropped the reply".into()))?
    }

    /// Stop the thread and hand the store back.
    pub fn shutdown(self) -> Result<Box<dyn ChunkStore>> {
        drop(self.tx);
        self.handle
            .join()
            .map_err(|_| StructdexError::Storage("writer thread panicked".into()))
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Drives one full ingestion run.
pub struct IngestionPipeline {
    config: StructdexConfig,
    enricher: Arc<dyn Enricher>,
    store: Box<dyn ChunkStore>,
}

impl IngestionPipeline {
    pub fn new(
        config: StructdexConfig,
        enricher: Arc<dyn Enricher>,
        store: Box<dyn ChunkStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            enricher,
            store,
        })
    }

    pub fn config(&self) -> &StructdexConfig {
        &self.config
    }

    /// Run both passes. Only a missing root, an unwritable hierarchy file,
    /// or a failure to start the writer abort the run; everything else is
    /// logged and counted.
    pub async fn run(self) -> Result<IngestionReport> {
        let Self {
            config,
            enricher,
            store,
        } = self;
        let started = Instant::now();
        let mut transitions = Vec::with_capacity(5);
        let mut stats = IngestionStats::default();
        let mut metrics = IngestMetrics::new();
        let mut error_log = ErrorLog::new(&config.paths.error_log);
        let root = config.paths.project_root.clone();

        // -- Pass 1 -------------------------------------------------------
        enter(&mut transitions, PipelineState::ScanningHierarchy);
        let files = find_source_files(&root)?;
        stats.files_total = files.len();
        tracing::info!("found {} Java files under {}", files.len(), root.display());

        let scan_started = Instant::now();
        let outcome = HierarchyScanner::new().scan_files(&files);
        metrics.hierarchy_classes = outcome.map.len();
        let hierarchy_file = config.hierarchy_path();
        hierarchy::persist(&outcome.map, &hierarchy_file)?;
        metrics.scan_ms = scan_started.elapsed().as_millis() as u64;

        // -- Components ---------------------------------------------------
        enter(&mut transitions, PipelineState::BuildingComponents);
        let parser = StructuralParser::from_hierarchy_file(
            &hierarchy_file,
            config.ingestion.max_inheritance_depth,
        );
        let writer = StoreWriter::spawn(store)?;
        let progress = progress_bar(files.len(), config.ingestion.show_progress);

        // -- Pass 2 -------------------------------------------------------
        enter(&mut transitions, PipelineState::Pass2Running);
        let pass2_started = Instant::now();
        let flush_size = config.ingestion.flush_size;
        let write_threshold = config.write_threshold();
        let batches = Batches::new(&config, Arc::clone(&enricher));
        let mut parse_buffer: Vec<MethodChunk> = Vec::with_capacity(flush_size);
        let mut write_buffer: Vec<EnrichedChunk> = Vec::with_capacity(write_threshold);

        for path in &files {
            process_file(
                &parser,
                path,
                &mut parse_buffer,
                &mut stats,
                &mut metrics,
                &mut error_log,
            );
            progress.inc(1);

            if parse_buffer.len() >= flush_size {
                batches.enrich(&mut parse_buffer, &mut write_buffer, &mut metrics).await;
                if write_buffer.len() >= write_threshold {
                    write_accumulated(
                        &writer,
                        &mut write_buffer,
                        &mut stats,
                        &mut metrics,
                        &mut error_log,
                    )
                    .await;
                }
            }
        }
        progress.finish_with_message("parsing complete");

        // -- Drain --------------------------------------------------------
        enter(&mut transitions, PipelineState::Draining);
        if !parse_buffer.is_empty() {
            batches.enrich(&mut parse_buffer, &mut write_buffer, &mut metrics).await;
        }
        if !write_buffer.is_empty() {
            write_accumulated(
                &writer,
                &mut write_buffer,
                &mut stats,
                &mut metrics,
                &mut error_log,
            )
            .await;
        }
        metrics.pass2_ms = pass2_started.elapsed().as_millis() as u64;

        let stored_records = match writer.stats().await {
            Ok(store_stats) => store_stats.count,
            Err(e) => {
                tracing::warn!("could not read store stats: {e}");
                0
            }
        };
        writer.shutdown()?;
        enter(&mut transitions, PipelineState::Done);

        let report = IngestionReport {
            stats,
            metrics,
            duration: started.elapsed(),
            stored_records,
            hierarchy_file,
            error_log: (error_log.entries() > 0).then(|| error_log.path().to_path_buf()),
            transitions,
        };
        tracing::info!(
            "ingestion finished: {} files, {} failed, {} chunks indexed in {:.2}s",
            report.stats.files_total,
            report.stats.files_failed,
            report.stats.chunks_indexed,
            report.duration.as_secs_f64()
        );
        if report.metrics.enrichment_fallbacks > 0 {
            tracing::warn!(
                "{:.1}% of chunks used fallback enrichment",
                report.metrics.fallback_rate() * 100.0
            );
        }
        tracing::debug!("ingestion metrics: {}", report.metrics.to_json());
        Ok(report)
    }
}

fn enter(transitions: &mut Vec<PipelineState>, state: PipelineState) {
    tracing::info!("pipeline state: {state:?}");
    transitions.push(state);
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let template = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}";
    if let Ok(style) = ProgressStyle::default_bar().template(template) {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}

/// Parse one file into the buffer, tagging each chunk with its path. A
/// failure is counted and logged, never propagated.
pub(crate) fn process_file(
    parser: &StructuralParser,
    path: &Path,
    buffer: &mut Vec<MethodChunk>,
    stats: &mut IngestionStats,
    metrics: &mut IngestMetrics,
    error_log: &mut ErrorLog,
) {
    let file = path.display().to_string();
    match parser.parse_file(path) {
        Ok(chunks) => {
            stats.files_processed += 1;
            metrics.chunks_parsed += chunks.len();
            buffer.extend(chunks.into_iter().map(|mut chunk| {
                chunk.file_path = Some(file.clone());
                chunk
            }));
        }
        Err(e) => {
            stats.files_failed += 1;
            error_log.record(&file, &e);
        }
    }
}

/// Enrichment settings captured once per run.
struct Batches {
    enricher: Arc<dyn Enricher>,
    max_concurrent: usize,
    timeout: Duration,
}

impl Batches {
    fn new(config: &StructdexConfig, enricher: Arc<dyn Enricher>) -> Self {
        Self {
            enricher,
            max_concurrent: config.ingestion.max_concurrent,
            timeout: config.enrichment_timeout(),
        }
    }

    /// Enrich the whole parse buffer into the write buffer. Never touches
    /// storage.
    async fn enrich(
        &self,
        parse_buffer: &mut Vec<MethodChunk>,
        write_buffer: &mut Vec<EnrichedChunk>,
        metrics: &mut IngestMetrics,
    ) {
        let chunks = std::mem::take(parse_buffer);
        let batch = enrich_batch(
            Arc::clone(&self.enricher),
            chunks,
            self.max_concurrent,
            self.timeout,
        )
        .await;
        metrics.enrichment_batches += 1;
        metrics.chunks_enriched += batch.chunks.len();
        metrics.enrichment_fallbacks += batch.fallbacks;
        write_buffer.extend(batch.chunks);
    }
}

/// `(package.class, signature)` of every record key shared by more than one
/// chunk in `chunks`, first-seen order.
pub(crate) fn duplicate_record_keys(chunks: &[EnrichedChunk]) -> Vec<(String, String)> {
    let mut seen = HashSet::with_capacity(chunks.len());
    let mut reported = HashSet::new();
    let mut duplicates = Vec::new();
    for enriched in chunks {
        let chunk = &enriched.chunk;
        let key = record_key(&chunk.package, &chunk.class_name, &chunk.signature);
        if !seen.insert(key.clone()) && reported.insert(key) {
            duplicates.push((
                qualified_name(&chunk.package, &chunk.class_name),
                chunk.signature.clone(),
            ));
        }
    }
    duplicates
}

/// Hand the write buffer to the writer. A failed write is logged once per
/// chunk and not retried here.
async fn write_accumulated(
    writer: &StoreWriter,
    buffer: &mut Vec<EnrichedChunk>,
    stats: &mut IngestionStats,
    metrics: &mut IngestMetrics,
    error_log: &mut ErrorLog,
) {
    let chunks = std::mem::take(buffer);
    let count = chunks.len();
    let files: Vec<String> = chunks.iter().map(|c| c.file_path().to_string()).collect();
    tracing::info!("writing {count} enriched chunks to storage");
    for (class, signature) in duplicate_record_keys(&chunks) {
        tracing::warn!(
            "{class}: `{signature}` appears more than once in this batch; \
             the store keeps one record, so chunks indexed will exceed stored records"
        );
    }

    metrics.storage_writes += 1;
    match writer.write(chunks).await {
        Ok(written) => {
            stats.chunks_indexed += written;
            metrics.chunks_written += written;
        }
        Err(e) => {
            tracing::error!("storage write of {count} chunks failed: {e}");
            metrics.write_failures += count;
            for file in &files {
                error_log.record(file, &e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
