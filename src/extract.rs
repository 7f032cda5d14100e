//! Singleton extraction: a streaming pass that derives the deduplicated
//! universe of shared value tuples before any entity is imported.

use std::collections::HashSet;

use anyhow::Result;
use serde_json::Value;

use crate::reader::record::coerce_i64;
use crate::reader::{ChunkedReader, RawRecord};

/// Natural key of a stat tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatKey {
    pub stat: i64,
    pub value: i64,
}

impl StatKey {
    /// Parse one embedded stat tuple from its canonical form
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            stat: coerce_i64(value.get("stat")?)?,
            value: coerce_i64(value.get("value")?)?,
        })
    }
}

/// Natural key of a criterion tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CriterionKey {
    pub value1: i64,
    pub value2: i64,
    pub operator: i64,
}

impl CriterionKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            value1: coerce_i64(value.get("value1")?)?,
            value2: coerce_i64(value.get("value2")?)?,
            operator: coerce_i64(value.get("operator")?)?,
        })
    }
}

/// The deduplicated singleton universe of one scan
#[derive(Debug, Default)]
pub struct SingletonSet {
    pub stats: HashSet<StatKey>,
    pub criteria: HashSet<CriterionKey>,
    /// Embedded tuples that could not be parsed (counted, never fatal)
    pub malformed_tuples: u64,
}

impl SingletonSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull every embedded tuple out of one record body.
    ///
    /// The record body is not retained; only the lightweight keys are.
    pub fn collect_record(&mut self, body: &Value) {
        if let Some(stats) = body.get("stats").and_then(|v| v.as_array()) {
            for entry in stats {
                match StatKey::from_value(entry) {
                    Some(key) => {
                        self.stats.insert(key);
                    }
                    None => self.malformed_tuples += 1,
                }
            }
        }

        if let Some(criteria) = body.get("criteria").and_then(|v| v.as_array()) {
            for entry in criteria {
                match CriterionKey::from_value(entry) {
                    Some(key) => {
                        self.criteria.insert(key);
                    }
                    None => self.malformed_tuples += 1,
                }
            }
        }
    }
}

/// Scan a whole source for its singleton universe.
///
/// Malformed records are simply skipped here; the import pass counts them.
pub fn scan_singletons(reader: &mut ChunkedReader) -> Result<SingletonSet> {
    let mut set = SingletonSet::new();
    while let Some(chunk) = reader.next_chunk()? {
        for record in &chunk {
            if let RawRecord::Parsed { body, .. } = record {
                set.collect_record(body);
            }
        }
    }
    Ok(set)
}
