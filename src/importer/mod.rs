//! Import orchestration: dataset sequencing, clear mode, the two-phase
//! singleton-then-entity pipeline, and source validation.

pub mod chunk;
pub mod singletons;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::datasets::{DatasetSpec, DependencyResolver, ALL_DATASETS};
use crate::extract::scan_singletons;
use crate::mapper::{map_record, MappedRecord};
use crate::reader::record::coerce_i64;
use crate::reader::{ChunkedReader, RawRecord};
use crate::report::{DatasetReport, RunSummary};
use crate::schema::gen::missing_tables;

use chunk::{commit_chunk, ChunkOutcome};
use singletons::{load_entity_ids, load_singletons, IdentityCache};

/// Default records per chunk transaction
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Upper bound on how long one chunk may sit on a locked database before
/// it counts as a failed chunk
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Directory holding the source files
    pub sources: PathBuf,
    pub chunk_size: usize,
    /// Truncate affected tables before loading
    pub clear: bool,
    /// Suppress progress bars (tests, scripted runs)
    pub quiet: bool,
}

impl ImportOptions {
    pub fn new(sources: impl Into<PathBuf>) -> Self {
        Self {
            sources: sources.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            clear: false,
            quiet: false,
        }
    }
}

/// Owns the store connection and the per-run identity cache.
///
/// One importer instance is one run; nothing it builds outlives it.
#[derive(Debug)]
pub struct Importer {
    conn: Connection,
    options: ImportOptions,
    cache: IdentityCache,
}

impl Importer {
    /// Open the target store and verify the schema is provisioned.
    /// A missing schema is fatal before any data moves.
    pub fn open(db_path: &Path, options: ImportOptions) -> Result<Self> {
        if options.chunk_size == 0 {
            bail!("chunk size must be at least 1");
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {:?}", db_path))?;

        // Bulk-load friendly settings; FK enforcement is non-negotiable
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;",
        )
        .context("Failed to apply database pragmas")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let missing = missing_tables(&conn)?;
        if !missing.is_empty() {
            bail!(
                "Schema is not provisioned (missing tables: {}). \
                 Apply migrations or run 'init-db' first.",
                missing.join(", ")
            );
        }

        Ok(Self {
            conn,
            options,
            cache: IdentityCache::new(),
        })
    }

    /// Import a single dataset by name.
    ///
    /// Unknown names fail fast before anything runs. Fatal conditions
    /// during the import land in the returned summary instead, so chunks
    /// that committed before the fault are still accounted for.
    pub fn import_dataset(&mut self, name: &str) -> Result<RunSummary> {
        let dataset = crate::datasets::get_dataset(name)
            .with_context(|| format!("Unknown dataset: {}", name))?;

        let mut summary = RunSummary::new();

        if self.options.clear {
            if let Err(e) = self.clear_tables(&dataset.tables_delete_order()) {
                summary.fatal = Some(format!("{:#}", e));
                return Ok(summary);
            }
        }

        let (report, fatal) = self.run_dataset(dataset);
        summary.push(report);
        if let Some(e) = fatal {
            error!(dataset = dataset.name, "fatal import error: {e:#}");
            summary.fatal = Some(format!("{} failed: {:#}", dataset.name, e));
        }
        Ok(summary)
    }

    /// Import every dataset in dependency order.
    ///
    /// Fatal errors stop the sequence but never the summary: whatever
    /// completed is reported, and `fatal` says why the rest did not run.
    pub fn import_all(&mut self) -> RunSummary {
        let mut summary = RunSummary::new();

        let ordered = match DependencyResolver::new().all_ordered() {
            Ok(ordered) => ordered,
            Err(e) => {
                summary.fatal = Some(e);
                return summary;
            }
        };

        if self.options.clear {
            // One pass over everything, children before parents
            let mut tables: Vec<_> = crate::schema::tables::ALL_TABLES.to_vec();
            tables.reverse();
            if let Err(e) = self.clear_tables(&tables) {
                summary.fatal = Some(format!("{:#}", e));
                return summary;
            }
        }

        for dataset in ordered {
            let (report, fatal) = self.run_dataset(dataset);
            summary.push(report);
            if let Some(e) = fatal {
                error!(dataset = dataset.name, "fatal import error: {e:#}");
                summary.fatal = Some(format!("{} failed: {:#}", dataset.name, e));
                break;
            }
        }

        summary
    }

    /// Delete rows from the given tables, in the given (FK-safe) order
    fn clear_tables(&mut self, tables: &[&crate::schema::types::TableSchema]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to begin clear transaction")?;
        for table in tables {
            let deleted = tx
                .execute(&format!("DELETE FROM {}", table.name), [])
                .with_context(|| format!("Failed to clear table: {}", table.name))?;
            if deleted > 0 {
                info!(table = table.name, deleted, "cleared");
            }
        }
        tx.commit().context("Failed to commit clear transaction")
    }

    /// The full pipeline for one dataset: extract singletons, bulk-load
    /// them, then stream the file again mapping and committing chunks.
    ///
    /// The report comes back even when the pipeline dies partway: chunks
    /// committed before a fatal fault are durable and must be reported.
    fn run_dataset(
        &mut self,
        dataset: &'static DatasetSpec,
    ) -> (DatasetReport, Option<anyhow::Error>) {
        let start = Instant::now();
        let mut report = DatasetReport::new(dataset.name);
        let result = self.run_pipeline(dataset, &mut report);
        report.finish(start.elapsed());

        info!(
            dataset = dataset.name,
            read = report.read,
            inserted = report.inserted,
            failed = report.failed(),
            chunks_failed = report.chunks_failed,
            "dataset finished"
        );
        (report, result.err())
    }

    fn run_pipeline(
        &mut self,
        dataset: &'static DatasetSpec,
        report: &mut DatasetReport,
    ) -> Result<()> {
        let path = self.options.sources.join(dataset.source_file);

        info!(dataset = dataset.name, file = %path.display(), "importing");

        // Phase 1: deduplicated singleton universe (record bodies are not
        // retained; the file is replayable so a second pass is cheap)
        let mut reader = ChunkedReader::open(&path, dataset.format, self.options.chunk_size)?;
        let set = scan_singletons(&mut reader)
            .with_context(|| format!("Singleton scan failed for {}", dataset.name))?;
        if set.malformed_tuples > 0 {
            warn!(
                dataset = dataset.name,
                count = set.malformed_tuples,
                "skipped malformed embedded tuples during scan"
            );
        }
        report.record_malformed_tuples(set.malformed_tuples);

        let (stats, criteria) = load_singletons(&mut self.conn, &set, &mut self.cache)
            .with_context(|| format!("Singleton load failed for {}", dataset.name))?;
        report.record_singletons(stats + criteria);

        // Entity-to-entity junctions need the parents' id maps
        for table in dataset.entity_dependencies() {
            load_entity_ids(&self.conn, table, &mut self.cache)
                .with_context(|| format!("Failed to load {} ids", table))?;
        }

        // Phase 2: map and commit, one transaction per chunk
        let progress = self.make_progress(dataset.name);
        let mut reader = ChunkedReader::open(&path, dataset.format, self.options.chunk_size)?;

        while let Some(records) = reader.next_chunk()? {
            report.record_read(records.len() as u64);
            let mapped = self.map_chunk(dataset, &records, report);

            if !mapped.is_empty() {
                let outcome = commit_chunk(&mut self.conn, dataset, &mapped)?;
                match outcome {
                    ChunkOutcome::Committed {
                        entities,
                        junctions,
                    } => report.record_committed_chunk(entities, junctions),
                    ChunkOutcome::RolledBack { error: cause } => {
                        let ids: Vec<i64> = mapped.iter().map(|m| m.external_id).collect();
                        error!(
                            dataset = dataset.name,
                            chunk = report.chunks_committed + report.chunks_failed,
                            records = ids.len(),
                            "chunk rolled back: {cause}"
                        );
                        report.record_failed_chunk(&ids);
                    }
                }
            }
            progress.set_position(report.read);
        }

        // Make this dataset's rows resolvable by dependents
        let entity_table = dataset.entity_table.name;
        load_entity_ids(&self.conn, entity_table, &mut self.cache)
            .with_context(|| format!("Failed to refresh {} ids", entity_table))?;

        progress.finish_with_message(format!(
            "{}: {} records, {} failed",
            dataset.name,
            report.inserted,
            report.failed()
        ));

        Ok(())
    }

    /// Map one chunk's records, folding per-record failures into the
    /// report instead of letting them stop the stream
    fn map_chunk(
        &self,
        dataset: &DatasetSpec,
        records: &[RawRecord],
        report: &mut DatasetReport,
    ) -> Vec<MappedRecord> {
        let mut mapped = Vec::with_capacity(records.len());

        for record in records {
            match record {
                RawRecord::Malformed { index, error: why } => {
                    warn!(
                        dataset = dataset.name,
                        record = index,
                        "skipping malformed record: {why}"
                    );
                    report.record_malformed(*index);
                }
                RawRecord::Parsed { index, body } => match map_record(dataset, body, &self.cache) {
                    Ok(row) => mapped.push(row),
                    Err(e) => {
                        let external_id = body.get("aoid").and_then(coerce_i64);
                        if e.is_unresolved() {
                            // Not a data problem: the extractor or loader
                            // dropped a key it should have carried
                            error!(dataset = dataset.name, record = index, "{e}");
                        } else {
                            warn!(dataset = dataset.name, record = index, "{e}");
                        }
                        report.record_mapping_failure(external_id, *index, e.is_unresolved());
                    }
                },
            }
        }

        mapped
    }

    fn make_progress(&self, name: &str) -> ProgressBar {
        if self.options.quiet {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg:10} {pos} records")
                .unwrap(),
        );
        pb.set_message(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

// =============================================================================
// Source validation
// =============================================================================

/// How many records to probe when checking a source's shape
const VALIDATE_PROBE: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct DatasetValidation {
    pub dataset: String,
    pub file: String,
    pub present: bool,
    pub shape_ok: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ValidationReport {
    pub datasets: Vec<DatasetValidation>,
}

impl ValidationReport {
    pub fn ok(&self) -> bool {
        self.datasets.iter().all(|d| d.present && d.shape_ok)
    }
}

/// Check that every dataset's source file exists and decodes.
///
/// Probes the first few records of each file; a file whose probe yields
/// only malformed records fails the shape check. Empty files pass: an
/// empty dataset is valid.
pub fn validate_sources(sources: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    for dataset in ALL_DATASETS {
        let path = sources.join(dataset.source_file);
        let file = path.display().to_string();

        if !path.is_file() {
            report.datasets.push(DatasetValidation {
                dataset: dataset.name.to_string(),
                file,
                present: false,
                shape_ok: false,
                detail: Some("file not found".to_string()),
            });
            continue;
        }

        let (shape_ok, detail) = probe_shape(&path, dataset);
        report.datasets.push(DatasetValidation {
            dataset: dataset.name.to_string(),
            file,
            present: true,
            shape_ok,
            detail,
        });
    }

    report
}

fn probe_shape(path: &Path, dataset: &DatasetSpec) -> (bool, Option<String>) {
    let mut reader = match ChunkedReader::open(path, dataset.format, VALIDATE_PROBE) {
        Ok(reader) => reader,
        Err(e) => return (false, Some(format!("{:#}", e))),
    };

    match reader.next_chunk() {
        Ok(None) => (true, Some("empty".to_string())),
        Ok(Some(chunk)) => {
            let parsed = chunk.iter().filter(|r| r.body().is_some()).count();
            if parsed == 0 {
                let first_error = chunk.iter().find_map(|r| match r {
                    RawRecord::Malformed { error, .. } => Some(error.clone()),
                    _ => None,
                });
                (false, first_error)
            } else {
                (true, None)
            }
        }
        Err(e) => (false, Some(format!("{:#}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn validate_reports_missing_files() {
        let dir = TempDir::new().unwrap();
        let report = validate_sources(dir.path());
        assert!(!report.ok());
        assert!(report.datasets.iter().all(|d| !d.present));
    }

    #[test]
    fn validate_accepts_well_shaped_sources() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("items.json"),
            r#"[{"aoid": 1, "name": "A"}]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("nanos.json"), "[]").unwrap();
        std::fs::write(
            dir.path().join("mobs.csv"),
            "aoid,name,level,playfield,drops\n1,Leet,5,ICC,\n",
        )
        .unwrap();

        let report = validate_sources(dir.path());
        assert!(report.ok(), "{:?}", report);
    }

    #[test]
    fn validate_flags_wrong_shape() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("items.json"), r#"{"not": "an array"}"#).unwrap();
        std::fs::write(dir.path().join("nanos.json"), "[]").unwrap();
        std::fs::write(
            dir.path().join("mobs.csv"),
            "aoid,name,level,playfield,drops\n",
        )
        .unwrap();

        let report = validate_sources(dir.path());
        assert!(!report.ok());
        let items = report
            .datasets
            .iter()
            .find(|d| d.dataset == "items")
            .unwrap();
        assert!(items.present);
        assert!(!items.shape_ok);
    }

    #[test]
    fn empty_sources_validate_clean() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("items.json"), "").unwrap();
        std::fs::write(dir.path().join("nanos.json"), "[]").unwrap();
        std::fs::write(
            dir.path().join("mobs.csv"),
            "aoid,name,level,playfield,drops\n",
        )
        .unwrap();

        assert!(validate_sources(dir.path()).ok());
    }
}
