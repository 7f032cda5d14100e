//! Transactional chunk commits.
//!
//! A chunk either commits whole or leaves no trace. Per-record
//! transactions would make multi-million-record runs crawl; a single
//! whole-file transaction would hold the entire dataset hostage to one
//! late failure. One transaction per chunk bounds both.

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction};

use crate::datasets::DatasetSpec;
use crate::mapper::MappedRecord;
use crate::schema::types::TableSchema;

/// Terminal state of one chunk. There is no observable in-between.
#[derive(Debug)]
pub enum ChunkOutcome {
    Committed { entities: u64, junctions: u64 },
    RolledBack { error: String },
}

fn insert_sql(table: &TableSchema) -> String {
    let columns = table.column_names();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        columns.join(", "),
        placeholders
    )
}

/// Insert one mapped chunk inside a single transaction.
///
/// Returns `Err` only when the transaction cannot even begin (a run-fatal
/// condition); every failure after that rolls the chunk back and is
/// reported as a `RolledBack` outcome so the caller can move on.
pub fn commit_chunk(
    conn: &mut Connection,
    dataset: &DatasetSpec,
    records: &[MappedRecord],
) -> Result<ChunkOutcome> {
    let tx = conn
        .transaction()
        .context("Failed to begin chunk transaction")?;

    match insert_records(&tx, dataset, records) {
        Ok((entities, junctions)) => match tx.commit() {
            Ok(()) => Ok(ChunkOutcome::Committed {
                entities,
                junctions,
            }),
            Err(e) => Ok(ChunkOutcome::RolledBack {
                error: e.to_string(),
            }),
        },
        // Dropping the transaction rolls it back
        Err(e) => Ok(ChunkOutcome::RolledBack {
            error: format!("{:#}", e),
        }),
    }
}

fn insert_records(
    tx: &Transaction,
    dataset: &DatasetSpec,
    records: &[MappedRecord],
) -> Result<(u64, u64)> {
    let entity_sql = insert_sql(dataset.entity_table);
    let mut entities = 0u64;
    let mut junctions = 0u64;

    for record in records {
        {
            let mut stmt = tx.prepare_cached(&entity_sql)?;
            for (idx, value) in record.entity.iter().enumerate() {
                value.bind_to(idx + 1, &mut stmt)?;
            }
            stmt.raw_execute()?;
        }
        let entity_id = tx.last_insert_rowid();
        entities += 1;

        for junction in &record.junctions {
            // A junction aimed outside the dataset means the mapper and
            // the dataset spec disagree; fail the chunk, not the process
            let table = dataset
                .junction_tables
                .iter()
                .find(|t| t.name == junction.table)
                .with_context(|| format!("unknown junction table {}", junction.table))?;

            let mut stmt = tx.prepare_cached(&insert_sql(table))?;
            // Parent FK column is always first
            stmt.raw_bind_parameter(1, entity_id)?;
            for (idx, value) in junction.values.iter().enumerate() {
                value.bind_to(idx + 2, &mut stmt)?;
            }
            stmt.raw_execute()?;
            junctions += 1;
        }
    }

    Ok((entities, junctions))
}
