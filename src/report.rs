//! Run accounting: per-dataset counters, a bounded ring of failing record
//! identifiers, and the final summary. Nothing in here can fail; a
//! reporting problem must never abort an import.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

/// How many failing identifiers to retain per dataset. Identifiers only,
/// never record bodies, so memory stays bounded on pathological inputs.
pub const FAILED_ID_CAPACITY: usize = 100;

/// Ring of the most recent failing record identifiers
#[derive(Debug, Clone, Serialize)]
pub struct FailedIds {
    ids: VecDeque<String>,
    /// Failures beyond capacity (oldest entries were dropped)
    overflow: u64,
}

impl FailedIds {
    fn new() -> Self {
        Self {
            ids: VecDeque::with_capacity(FAILED_ID_CAPACITY),
            overflow: 0,
        }
    }

    fn push(&mut self, id: String) {
        if self.ids.len() == FAILED_ID_CAPACITY {
            self.ids.pop_front();
            self.overflow += 1;
        }
        self.ids.push_back(id);
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }
}

/// Outcome of one dataset import
#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub dataset: String,
    /// Records read from the source, decodable or not
    pub read: u64,
    /// Entity rows committed
    pub inserted: u64,
    /// Junction rows committed
    pub junctions: u64,
    /// Records the decoder could not parse
    pub skipped_malformed: u64,
    /// Embedded singleton tuples the scan could not parse
    pub malformed_tuples: u64,
    /// Records that failed field mapping (data quality)
    pub mapping_failed: u64,
    /// Records whose singleton keys were missing from the identity cache
    pub unresolved: u64,
    pub chunks_committed: u64,
    pub chunks_failed: u64,
    /// Records lost to rolled-back chunks
    pub records_in_failed_chunks: u64,
    pub singletons_inserted: u64,
    pub elapsed_secs: f64,
    pub failed_ids: FailedIds,
}

impl DatasetReport {
    pub fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            read: 0,
            inserted: 0,
            junctions: 0,
            skipped_malformed: 0,
            malformed_tuples: 0,
            mapping_failed: 0,
            unresolved: 0,
            chunks_committed: 0,
            chunks_failed: 0,
            records_in_failed_chunks: 0,
            singletons_inserted: 0,
            elapsed_secs: 0.0,
            failed_ids: FailedIds::new(),
        }
    }

    pub fn record_read(&mut self, count: u64) {
        self.read += count;
    }

    pub fn record_malformed(&mut self, index: u64) {
        self.skipped_malformed += 1;
        self.failed_ids.push(format!("record #{}", index));
    }

    pub fn record_mapping_failure(&mut self, external_id: Option<i64>, index: u64, unresolved: bool) {
        if unresolved {
            self.unresolved += 1;
        } else {
            self.mapping_failed += 1;
        }
        match external_id {
            Some(aoid) => self.failed_ids.push(format!("aoid {}", aoid)),
            None => self.failed_ids.push(format!("record #{}", index)),
        }
    }

    pub fn record_committed_chunk(&mut self, entities: u64, junctions: u64) {
        self.chunks_committed += 1;
        self.inserted += entities;
        self.junctions += junctions;
    }

    pub fn record_failed_chunk(&mut self, external_ids: &[i64]) {
        self.chunks_failed += 1;
        self.records_in_failed_chunks += external_ids.len() as u64;
        for aoid in external_ids {
            self.failed_ids.push(format!("aoid {}", aoid));
        }
    }

    pub fn record_singletons(&mut self, inserted: u64) {
        self.singletons_inserted += inserted;
    }

    /// Embedded tuples skipped during the singleton scan. Not part of
    /// `failed()`: the owning records fail on their own if they matter.
    pub fn record_malformed_tuples(&mut self, count: u64) {
        self.malformed_tuples += count;
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
    }

    /// Total records that did not make it into the store
    pub fn failed(&self) -> u64 {
        self.skipped_malformed + self.mapping_failed + self.unresolved + self.records_in_failed_chunks
    }

    pub fn throughput(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.read as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

/// The whole run, in dataset execution order
#[derive(Debug, Clone, Serialize, Default)]
pub struct RunSummary {
    pub datasets: Vec<DatasetReport>,
    /// Set when the run aborted before finishing; completed datasets stay
    /// in `datasets` so the summary can say what was and wasn't imported
    pub fatal: Option<String>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, report: DatasetReport) {
        self.datasets.push(report);
    }

    pub fn total_inserted(&self) -> u64 {
        self.datasets.iter().map(|d| d.inserted).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.datasets.iter().map(|d| d.failed()).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.total_failed() > 0
    }

    /// Human-readable summary. Always renderable, even after a partial run.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "============================================");
        let _ = writeln!(out, "  Import summary");
        let _ = writeln!(out, "============================================");

        for d in &self.datasets {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", d.dataset);
            let _ = writeln!(out, "  read:               {:>10}", d.read);
            let _ = writeln!(out, "  inserted:           {:>10}", d.inserted);
            let _ = writeln!(out, "  junction rows:      {:>10}", d.junctions);
            let _ = writeln!(out, "  singletons added:   {:>10}", d.singletons_inserted);
            let _ = writeln!(out, "  skipped (malformed):{:>10}", d.skipped_malformed);
            let _ = writeln!(out, "  bad tuples:         {:>10}", d.malformed_tuples);
            let _ = writeln!(out, "  mapping failed:     {:>10}", d.mapping_failed);
            let _ = writeln!(out, "  unresolved keys:    {:>10}", d.unresolved);
            let _ = writeln!(
                out,
                "  chunks:             {:>10} committed, {} failed",
                d.chunks_committed, d.chunks_failed
            );
            let _ = writeln!(
                out,
                "  elapsed:            {:>10.2}s ({:.0} rec/s)",
                d.elapsed_secs,
                d.throughput()
            );

            if !d.failed_ids.is_empty() {
                let ids: Vec<&str> = d.failed_ids.iter().collect();
                let _ = writeln!(out, "  failed records:     {}", ids.join(", "));
                if d.failed_ids.overflow() > 0 {
                    let _ = writeln!(
                        out,
                        "                      ... and {} earlier failures",
                        d.failed_ids.overflow()
                    );
                }
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "TOTAL: {} inserted, {} failed",
            self.total_inserted(),
            self.total_failed()
        );

        if let Some(fatal) = &self.fatal {
            let scope = if self.total_inserted() == 0 {
                "no data imported"
            } else {
                "partially imported"
            };
            let _ = writeln!(out, "FATAL ({}): {}", scope, fatal);
        }
        out
    }
}
