//! Telemetry ring buffer
//!
//! One record per build, evicted oldest-first past `max_records`. The outcome
//! is the only field that changes after recording; every labelling stamps a
//! fresh sequence number so consumers can ask for "records labelled since".

use super::persist;
use crate::config::TelemetryConfig;
use crate::domain::{EvidenceTelemetry, Outcome, ProviderType};
use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: EvidenceTelemetry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_seq: Option<u64>,
}

impl TelemetryRecord {
    pub fn new(session_id: impl Into<String>, data: EvidenceTelemetry) -> Self {
        Self { session_id: session_id.into(), timestamp: Utc::now(), data, outcome: None, label_seq: None }
    }

    /// Labelled with a success or failure, the two outcomes that carry signal.
    pub fn is_decisive(&self) -> bool {
        matches!(self.outcome, Some(Outcome::Success | Outcome::Failure))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub calls: usize,
    pub avg_latency_ms: f64,
    pub failure_rate: f64,
    pub cache_hit_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryStats {
    pub total_records: usize,
    pub successes: usize,
    pub failures: usize,
    pub abandoned: usize,
    pub unlabeled: usize,
    /// Successes over decisive outcomes; `None` before any feedback.
    pub success_rate: Option<f64>,
    pub avg_duration_ms: f64,
    pub avg_evidence_before_budget: f64,
    pub avg_evidence_after_budget: f64,
    pub avg_tokens_saved: f64,
    pub providers: BTreeMap<ProviderType, ProviderStats>,
}

struct Buffer {
    records: VecDeque<TelemetryRecord>,
    next_label: u64,
    pending_writes: usize,
    generation: u64,
}

pub struct EvidenceTelemetryService {
    buffer: Mutex<Buffer>,
    max_records: usize,
    path: Option<PathBuf>,
    persist_every: usize,
    /// Generation of the newest snapshot on disk.
    written: Arc<Mutex<u64>>,
}

impl EvidenceTelemetryService {
    /// Build the service, loading any persisted history. A missing or corrupt
    /// file starts an empty history.
    pub fn new(config: &TelemetryConfig) -> Result<Self, ConfigError> {
        if config.max_records == 0 {
            return Err(ConfigError::ZeroValue("telemetry.max_records"));
        }

        let mut records: VecDeque<TelemetryRecord> = match &config.path {
            Some(path) => match persist::load_records(path) {
                Ok(records) => records.into(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable telemetry file");
                    VecDeque::new()
                }
            },
            None => VecDeque::new(),
        };
        while records.len() > config.max_records {
            records.pop_front();
        }
        let next_label = records.iter().filter_map(|r| r.label_seq).max().map_or(1, |max| max + 1);
        debug!(records = records.len(), "telemetry service loaded");

        Ok(Self {
            buffer: Mutex::new(Buffer { records, next_label, pending_writes: 0, generation: 0 }),
            max_records: config.max_records,
            path: config.path.clone(),
            persist_every: config.persist_every,
            written: Arc::new(Mutex::new(0)),
        })
    }

    pub fn in_memory(max_records: usize) -> Result<Self, ConfigError> {
        Self::new(&TelemetryConfig { max_records, path: None, persist_every: 0 })
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    pub fn record(&self, session_id: impl Into<String>, data: EvidenceTelemetry) -> TelemetryRecord {
        let record = TelemetryRecord::new(session_id, data);
        let mut buffer = self.lock();
        buffer.records.push_back(record.clone());
        while buffer.records.len() > self.max_records {
            buffer.records.pop_front();
        }
        self.after_mutation(buffer);
        record
    }

    /// Label a session. Returns the updated record, or `None` for an unknown
    /// (or already evicted) session.
    pub fn mark_outcome(&self, session_id: &str, outcome: Outcome) -> Option<TelemetryRecord> {
        let mut buffer = self.lock();
        let label = buffer.next_label;
        let record = buffer.records.iter_mut().rev().find(|r| r.session_id == session_id)?;
        record.outcome = Some(outcome);
        record.label_seq = Some(label);
        let updated = record.clone();
        buffer.next_label += 1;
        self.after_mutation(buffer);
        Some(updated)
    }

    pub fn get(&self, session_id: &str) -> Option<TelemetryRecord> {
        self.lock().records.iter().rev().find(|r| r.session_id == session_id).cloned()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.lock().records.iter().cloned().collect()
    }

    /// Decisive records labelled after sequence `watermark`.
    pub fn labeled_since(&self, watermark: u64) -> Vec<TelemetryRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.is_decisive() && r.label_seq.is_some_and(|seq| seq > watermark))
            .cloned()
            .collect()
    }

    /// Sequence number of the most recent label, 0 when nothing is labelled.
    pub fn last_label(&self) -> u64 {
        self.lock().next_label - 1
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut buffer = self.lock();
        buffer.records.clear();
        self.after_mutation(buffer);
    }

    pub fn stats(&self) -> TelemetryStats {
        compute_stats(&self.lock().records)
    }

    /// Write the buffer to disk now. A no-op without a configured path.
    pub fn flush(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let (snapshot, generation) = {
            let mut buffer = self.lock();
            buffer.pending_writes = 0;
            buffer.generation += 1;
            (buffer.records.iter().cloned().collect::<Vec<_>>(), buffer.generation)
        };
        write_generation(&self.written, path, &snapshot, generation)
    }

    /// Count a mutation and schedule a background write every
    /// `persist_every` mutations. Consumes the guard so the write runs
    /// without holding the buffer lock.
    fn after_mutation(&self, mut buffer: MutexGuard<'_, Buffer>) {
        let Some(path) = self.path.clone() else { return };
        if self.persist_every == 0 {
            return;
        }
        buffer.pending_writes += 1;
        if buffer.pending_writes < self.persist_every {
            return;
        }
        buffer.pending_writes = 0;
        buffer.generation += 1;
        let generation = buffer.generation;
        let snapshot: Vec<TelemetryRecord> = buffer.records.iter().cloned().collect();
        drop(buffer);

        let written = Arc::clone(&self.written);
        let write = move || {
            if let Err(e) = write_generation(&written, &path, &snapshot, generation) {
                warn!(path = %path.display(), error = %e, "telemetry persistence failed");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }
}

/// Write `snapshot` unless a newer generation already reached disk.
fn write_generation(
    written: &Mutex<u64>,
    path: &Path,
    snapshot: &[TelemetryRecord],
    generation: u64,
) -> anyhow::Result<()> {
    let mut last = written.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if *last >= generation {
        return Ok(());
    }
    persist::save_records(path, snapshot)?;
    *last = generation;
    debug!(path = %path.display(), records = snapshot.len(), "telemetry flushed");
    Ok(())
}

fn compute_stats(records: &VecDeque<TelemetryRecord>) -> TelemetryStats {
    let mut stats = TelemetryStats { total_records: records.len(), ..Default::default() };
    if records.is_empty() {
        return stats;
    }

    #[derive(Default)]
    struct ProviderTotals {
        calls: usize,
        latency: u64,
        failures: usize,
        hits: usize,
    }
    let mut totals: BTreeMap<ProviderType, ProviderTotals> = BTreeMap::new();
    let (mut duration, mut before, mut after, mut saved) = (0u64, 0usize, 0usize, 0usize);

    for record in records {
        match record.outcome {
            Some(Outcome::Success) => stats.successes += 1,
            Some(Outcome::Failure) => stats.failures += 1,
            Some(Outcome::Abandoned) => stats.abandoned += 1,
            None => stats.unlabeled += 1,
        }
        let data = &record.data;
        duration += data.total_duration_ms;
        before += data.evidence_before_budget;
        after += data.evidence_after_budget;
        saved += data.tokens_saved;
        for (provider, timing) in &data.provider_timings {
            let entry = totals.entry(*provider).or_default();
            entry.calls += 1;
            entry.latency += timing.duration_ms;
            entry.failures += usize::from(timing.failed);
            entry.hits += usize::from(timing.cache_hit);
        }
    }

    let n = records.len() as f64;
    let decisive = stats.successes + stats.failures;
    stats.success_rate = (decisive > 0).then(|| stats.successes as f64 / decisive as f64);
    stats.avg_duration_ms = duration as f64 / n;
    stats.avg_evidence_before_budget = before as f64 / n;
    stats.avg_evidence_after_budget = after as f64 / n;
    stats.avg_tokens_saved = saved as f64 / n;
    stats.providers = totals
        .into_iter()
        .map(|(provider, t)| {
            let calls = t.calls as f64;
            let provider_stats = ProviderStats {
                calls: t.calls,
                avg_latency_ms: t.latency as f64 / calls,
                failure_rate: t.failures as f64 / calls,
                cache_hit_rate: t.hits as f64 / calls,
            };
            (provider, provider_stats)
        })
        .collect();
    stats
}
