//! Batch orchestration.
//!
//! Drives the full pipeline for one run: list units from the provider,
//! fetch and parse each unit, assemble chunks, route them through the
//! backend with retry, and fold the outcomes into an ordered
//! [`BatchReport`].
//!
//! Failure scoping: a listing failure aborts the run; everything after that
//! point (fetch, parse, chunking, summarization) is recorded as a failed
//! entry and the run continues. Entries appear in unit discovery order and,
//! within a unit, in extraction order, regardless of worker count or
//! retries.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::backend::{create_backend, SummarizationBackend, SummarizeRequest};
use crate::chunk::{chunk_function, chunk_whole_file};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::FunctionExtractor;
use crate::models::{
    BatchReport, Chunk, ChunkOutcome, ChunkSummary, EntryStatus, ReportCounts, SourceUnit,
    Subject, SummaryEntry,
};
use crate::provider::{create_provider, SourceProvider};

/// Cooperative cancellation handle. Cancelling stops dispatch of further
/// units; units already in flight finish and their entries are kept.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Knobs for one run, resolved from config plus CLI overrides.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_tokens: usize,
    pub max_length: usize,
    pub min_length: usize,
    /// Total attempts per chunk, including the first.
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub workers: usize,
    pub max_in_flight: usize,
    /// Cap on the number of units processed, for smoke runs.
    pub limit: Option<usize>,
    pub cancel: CancelFlag,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_tokens: config.chunking.max_tokens,
            max_length: config.backend.max_length,
            min_length: config.backend.min_length,
            max_retries: config.backend.max_retries.max(1),
            retry_backoff: Duration::from_millis(config.backend.retry_backoff_ms),
            workers: config.concurrency.workers,
            max_in_flight: config.concurrency.max_in_flight,
            limit: None,
            cancel: CancelFlag::new(),
        }
    }
}

/// Run one batch with the configured provider and backend.
pub async fn run_batch(config: &Config) -> Result<BatchReport> {
    run_batch_with(config, RunOptions::from_config(config)).await
}

pub async fn run_batch_with(config: &Config, options: RunOptions) -> Result<BatchReport> {
    let provider: Arc<dyn SourceProvider> = Arc::from(create_provider(config)?);
    let backend: Arc<dyn SummarizationBackend> = Arc::from(create_backend(&config.backend)?);
    run_with(provider, backend, &options).await
}

/// Run one batch against explicit provider and backend instances.
pub async fn run_with(
    provider: Arc<dyn SourceProvider>,
    backend: Arc<dyn SummarizationBackend>,
    options: &RunOptions,
) -> Result<BatchReport> {
    let started_at = Utc::now();
    let start = Instant::now();

    let mut units = provider.list().await?;
    if let Some(limit) = options.limit {
        units.truncate(limit);
    }
    let units_discovered = units.len();
    log::info!(
        "discovered {} unit(s) from {} ({})",
        units_discovered,
        provider.name(),
        provider.source_label()
    );

    let gate = Arc::new(Semaphore::new(options.max_in_flight));

    let (entries, skipped) = if options.workers <= 1 {
        run_sequential(&provider, &backend, units, options, &gate).await
    } else {
        run_concurrent(&provider, &backend, units, options, &gate).await
    };

    let mut report = BatchReport {
        backend: backend.name().to_string(),
        units_discovered,
        entries,
        counts: ReportCounts {
            succeeded: 0,
            failed: 0,
            skipped,
        },
        started_at,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    report.tally();

    log::info!(
        "run finished: {} succeeded, {} failed, {} skipped in {} ms",
        report.counts.succeeded,
        report.counts.failed,
        report.counts.skipped,
        report.elapsed_ms
    );
    Ok(report)
}

async fn run_sequential(
    provider: &Arc<dyn SourceProvider>,
    backend: &Arc<dyn SummarizationBackend>,
    units: Vec<SourceUnit>,
    options: &RunOptions,
    gate: &Arc<Semaphore>,
) -> (Vec<SummaryEntry>, usize) {
    let mut entries = Vec::new();
    let mut skipped = 0;

    for unit in units {
        if options.cancel.is_cancelled() {
            skipped += 1;
            continue;
        }
        entries.extend(process_unit(provider, backend, &unit, options, gate).await);
    }
    (entries, skipped)
}

async fn run_concurrent(
    provider: &Arc<dyn SourceProvider>,
    backend: &Arc<dyn SummarizationBackend>,
    units: Vec<SourceUnit>,
    options: &RunOptions,
    gate: &Arc<Semaphore>,
) -> (Vec<SummaryEntry>, usize) {
    let workers = Arc::new(Semaphore::new(options.workers));
    let mut set: JoinSet<(usize, Option<Vec<SummaryEntry>>)> = JoinSet::new();

    for (index, unit) in units.iter().cloned().enumerate() {
        let provider = Arc::clone(provider);
        let backend = Arc::clone(backend);
        let options = options.clone();
        let gate = Arc::clone(gate);
        let workers = Arc::clone(&workers);

        set.spawn(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(p) => p,
                Err(_) => return (index, None),
            };
            if options.cancel.is_cancelled() {
                return (index, None);
            }
            let entries = process_unit(&provider, &backend, &unit, &options, &gate).await;
            (index, Some(entries))
        });
    }

    // Results return in completion order; reassemble by discovery index.
    let mut slots: Vec<Option<Option<Vec<SummaryEntry>>>> = vec![None; units.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => log::error!("unit task failed: {}", e),
        }
    }

    let mut entries = Vec::new();
    let mut skipped = 0;
    for (slot, unit) in slots.into_iter().zip(units.iter()) {
        match slot {
            Some(Some(unit_entries)) => entries.extend(unit_entries),
            Some(None) => skipped += 1,
            None => entries.push(SummaryEntry::failed_unit(
                &unit.path,
                backend.name(),
                "unit task aborted",
            )),
        }
    }
    (entries, skipped)
}

/// Run the fetch, extract, chunk, summarize pipeline for one unit. All
/// failures are folded into entries; this never aborts the batch.
async fn process_unit(
    provider: &Arc<dyn SourceProvider>,
    backend: &Arc<dyn SummarizationBackend>,
    unit: &SourceUnit,
    options: &RunOptions,
    gate: &Arc<Semaphore>,
) -> Vec<SummaryEntry> {
    let backend_name = backend.name();

    let text = match provider.fetch(unit).await {
        Ok(text) => text,
        Err(e) => {
            log::warn!("fetch failed for {}: {}", unit.path, e);
            return vec![SummaryEntry::failed_unit(&unit.path, backend_name, e.to_string())];
        }
    };

    let spans = match FunctionExtractor::new().and_then(|mut ex| ex.extract(&text)) {
        Ok(spans) => spans,
        Err(e) => {
            log::warn!("extraction failed for {}: {}", unit.path, e);
            return vec![SummaryEntry::failed_unit(&unit.path, backend_name, e.to_string())];
        }
    };

    let measure = |t: &str| backend.count_tokens(t);
    let mut entries = Vec::new();

    if spans.is_empty() {
        // No functions: fall back to summarizing the file as a whole.
        let subject = Subject::File;
        match chunk_whole_file(&text, &unit.path, options.max_tokens, &measure) {
            Ok(chunks) => {
                entries
                    .push(summarize_subject(backend, unit, subject, chunks, options, gate).await);
            }
            Err(e) => {
                entries.push(SummaryEntry::failed_unit(&unit.path, backend_name, e.to_string()));
            }
        }
        return entries;
    }

    for span in &spans {
        let subject = Subject::Function {
            name: span.name.clone(),
            params: span.params.clone(),
        };
        match chunk_function(&text, span, &unit.path, options.max_tokens, &measure) {
            Ok(chunks) => {
                entries
                    .push(summarize_subject(backend, unit, subject, chunks, options, gate).await);
            }
            Err(e) => entries.push(SummaryEntry {
                unit: unit.path.clone(),
                subject,
                backend: backend_name.to_string(),
                chunks: Vec::new(),
                summary: String::new(),
                status: EntryStatus::Failed {
                    reason: e.to_string(),
                },
            }),
        }
    }
    entries
}

/// Summarize every chunk of one subject and fold the outcomes into an
/// entry. The aggregate summary concatenates succeeded chunk summaries in
/// chunk order; any failed chunk fails the entry.
async fn summarize_subject(
    backend: &Arc<dyn SummarizationBackend>,
    unit: &SourceUnit,
    subject: Subject,
    chunks: Vec<Chunk>,
    options: &RunOptions,
    gate: &Arc<Semaphore>,
) -> SummaryEntry {
    let mut chunk_summaries = Vec::with_capacity(chunks.len());
    let mut failure: Option<String> = None;

    for chunk in &chunks {
        let request = SummarizeRequest {
            text: &chunk.text,
            subject: &subject,
            unit_path: &unit.path,
            max_length: options.max_length,
            min_length: options.min_length,
        };
        match summarize_with_retry(backend, &request, options, gate).await {
            Ok(text) => chunk_summaries.push(ChunkSummary {
                index: chunk.index,
                outcome: ChunkOutcome::Succeeded { text },
            }),
            Err(e) => {
                log::warn!(
                    "chunk {} of {} in {} failed: {}",
                    chunk.index,
                    subject.label(),
                    unit.path,
                    e
                );
                let reason = e.to_string();
                if failure.is_none() {
                    failure = Some(reason.clone());
                }
                chunk_summaries.push(ChunkSummary {
                    index: chunk.index,
                    outcome: ChunkOutcome::Failed { reason },
                });
            }
        }
    }

    let summary = chunk_summaries
        .iter()
        .filter_map(|c| match &c.outcome {
            ChunkOutcome::Succeeded { text } => Some(text.as_str()),
            ChunkOutcome::Failed { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let status = match failure {
        None => EntryStatus::Succeeded,
        Some(reason) => EntryStatus::Failed { reason },
    };

    SummaryEntry {
        unit: unit.path.clone(),
        subject,
        backend: backend.name().to_string(),
        chunks: chunk_summaries,
        summary,
        status,
    }
}

/// Call the backend with bounded concurrency and exponential backoff.
/// Only retryable failures are retried; permanent ones return immediately.
async fn summarize_with_retry(
    backend: &Arc<dyn SummarizationBackend>,
    request: &SummarizeRequest<'_>,
    options: &RunOptions,
    gate: &Arc<Semaphore>,
) -> Result<String> {
    let attempts = options.max_retries.max(1);
    let mut attempt = 1u32;

    loop {
        let result = {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| Error::backend_permanent("backend gate closed"))?;
            backend.summarize(request).await
        };

        match result {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let backoff = options.retry_backoff * (1u32 << (attempt - 1).min(5));
                log::warn!(
                    "attempt {}/{} failed ({}); retrying in {:?}",
                    attempt,
                    attempts,
                    e,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
