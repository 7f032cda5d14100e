//! Pure record-to-row mapping. No I/O happens here, which keeps every
//! mapping rule unit-testable without a database.

use std::fmt;

use serde_json::Value;

use crate::datasets::{DatasetKind, DatasetSpec};
use crate::extract::{CriterionKey, StatKey};
use crate::importer::singletons::IdentityCache;
use crate::reader::record::coerce_i64;

/// A value ready to bind into an insert statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn bind_to(&self, idx: usize, stmt: &mut rusqlite::Statement) -> rusqlite::Result<()> {
        match self {
            SqlValue::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null)?,
            SqlValue::Integer(i) => stmt.raw_bind_parameter(idx, i)?,
            SqlValue::Real(f) => stmt.raw_bind_parameter(idx, f)?,
            SqlValue::Text(s) => stmt.raw_bind_parameter(idx, s.as_str())?,
        }
        Ok(())
    }
}

/// Why one record could not be mapped.
///
/// The two classes are deliberately distinct: `DataQuality` is a problem
/// in the source data and is expected at scale; `Unresolved` means a
/// singleton key survived extraction but is missing from the identity
/// cache, which points at a pipeline bug rather than bad data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    DataQuality(String),
    Unresolved(String),
}

impl MapError {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, MapError::Unresolved(_))
    }
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::DataQuality(msg) => write!(f, "data quality: {}", msg),
            MapError::Unresolved(msg) => write!(f, "unresolved identity: {}", msg),
        }
    }
}

/// One junction row minus its parent id, which the committer binds after
/// the owning entity insert returns a surrogate id
#[derive(Debug, Clone)]
pub struct JunctionRow {
    pub table: &'static str,
    pub values: Vec<SqlValue>,
}

/// One fully mapped record: the entity row plus its junction rows
#[derive(Debug, Clone)]
pub struct MappedRecord {
    /// External identifier, for failure reporting
    pub external_id: i64,
    /// Values for the entity table's columns, in schema order
    pub entity: Vec<SqlValue>,
    pub junctions: Vec<JunctionRow>,
}

/// Map one canonical record body into rows for its dataset
pub fn map_record(
    dataset: &DatasetSpec,
    body: &Value,
    cache: &IdentityCache,
) -> Result<MappedRecord, MapError> {
    match dataset.kind {
        DatasetKind::Items => map_item(body, cache),
        DatasetKind::Nanos => map_nano(body, cache),
        DatasetKind::Mobs => map_mob(body, cache),
    }
}

fn map_item(body: &Value, cache: &IdentityCache) -> Result<MappedRecord, MapError> {
    let aoid = required_i64(body, "aoid")?;
    let name = required_text(body, "name")?;

    let entity = vec![
        SqlValue::Integer(aoid),
        SqlValue::Text(name),
        optional_i64(body, "ql"),
        optional_i64(body, "item_class"),
        optional_text(body, "description"),
    ];

    let mut junctions = stat_junctions(body, cache, "item_stats")?;
    junctions.extend(criterion_junctions(body, cache, "item_criteria")?);

    Ok(MappedRecord {
        external_id: aoid,
        entity,
        junctions,
    })
}

fn map_nano(body: &Value, cache: &IdentityCache) -> Result<MappedRecord, MapError> {
    let aoid = required_i64(body, "aoid")?;
    let name = required_text(body, "name")?;

    let entity = vec![
        SqlValue::Integer(aoid),
        SqlValue::Text(name),
        optional_i64(body, "ql"),
        optional_i64(body, "school"),
        optional_text(body, "description"),
    ];

    let mut junctions = stat_junctions(body, cache, "nano_stats")?;
    junctions.extend(criterion_junctions(body, cache, "nano_criteria")?);

    Ok(MappedRecord {
        external_id: aoid,
        entity,
        junctions,
    })
}

fn map_mob(body: &Value, cache: &IdentityCache) -> Result<MappedRecord, MapError> {
    let aoid = required_i64(body, "aoid")?;
    let name = required_text(body, "name")?;

    let entity = vec![
        SqlValue::Integer(aoid),
        SqlValue::Text(name),
        optional_i64(body, "level"),
        optional_text(body, "playfield"),
    ];

    let mut junctions = Vec::new();
    if let Some(drops) = body.get("drops").and_then(|v| v.as_str()) {
        for entry in drops.split(';').filter(|e| !e.trim().is_empty()) {
            junctions.push(parse_drop(entry, cache)?);
        }
    }

    Ok(MappedRecord {
        external_id: aoid,
        entity,
        junctions,
    })
}

/// One drop entry: `item_aoid:drop_rate:min_ql:max_ql`
fn parse_drop(entry: &str, cache: &IdentityCache) -> Result<JunctionRow, MapError> {
    let parts: Vec<&str> = entry.trim().split(':').collect();
    if parts.len() != 4 {
        return Err(MapError::DataQuality(format!(
            "malformed drop entry '{}'",
            entry.trim()
        )));
    }

    let item_aoid: i64 = parts[0]
        .parse()
        .map_err(|_| MapError::DataQuality(format!("bad item aoid in drop '{}'", entry.trim())))?;

    // A drop pointing at an item absent from the store is a dangling
    // reference in the source, not a cache defect
    let item_id = cache.entity_id("items", item_aoid).ok_or_else(|| {
        MapError::DataQuality(format!("drop references unknown item aoid {}", item_aoid))
    })?;

    let drop_rate = match parts[1].trim() {
        "" => SqlValue::Null,
        s => s
            .parse::<f64>()
            .map(SqlValue::Real)
            .map_err(|_| MapError::DataQuality(format!("bad drop rate '{}'", s)))?,
    };
    let min_ql = parse_optional_ql(parts[2])?;
    let max_ql = parse_optional_ql(parts[3])?;

    Ok(JunctionRow {
        table: "mob_drops",
        values: vec![SqlValue::Integer(item_id), drop_rate, min_ql, max_ql],
    })
}

fn parse_optional_ql(part: &str) -> Result<SqlValue, MapError> {
    match part.trim() {
        "" => Ok(SqlValue::Null),
        s => s
            .parse::<i64>()
            .map(SqlValue::Integer)
            .map_err(|_| MapError::DataQuality(format!("bad quality level '{}'", s))),
    }
}

fn stat_junctions(
    body: &Value,
    cache: &IdentityCache,
    table: &'static str,
) -> Result<Vec<JunctionRow>, MapError> {
    let mut rows = Vec::new();
    if let Some(stats) = body.get("stats").and_then(|v| v.as_array()) {
        for entry in stats {
            let key = StatKey::from_value(entry).ok_or_else(|| {
                MapError::DataQuality(format!("malformed stat tuple: {}", entry))
            })?;
            let id = cache.stat_id(&key).ok_or_else(|| {
                MapError::Unresolved(format!(
                    "stat tuple ({}, {}) missing from identity cache",
                    key.stat, key.value
                ))
            })?;
            rows.push(JunctionRow {
                table,
                values: vec![SqlValue::Integer(id)],
            });
        }
    }
    Ok(rows)
}

fn criterion_junctions(
    body: &Value,
    cache: &IdentityCache,
    table: &'static str,
) -> Result<Vec<JunctionRow>, MapError> {
    let mut rows = Vec::new();
    if let Some(criteria) = body.get("criteria").and_then(|v| v.as_array()) {
        for entry in criteria {
            let key = CriterionKey::from_value(entry).ok_or_else(|| {
                MapError::DataQuality(format!("malformed criterion tuple: {}", entry))
            })?;
            let id = cache.criterion_id(&key).ok_or_else(|| {
                MapError::Unresolved(format!(
                    "criterion tuple ({}, {}, {}) missing from identity cache",
                    key.value1, key.value2, key.operator
                ))
            })?;
            rows.push(JunctionRow {
                table,
                values: vec![SqlValue::Integer(id)],
            });
        }
    }
    Ok(rows)
}

// =============================================================================
// Field coercion
// =============================================================================

fn required_i64(body: &Value, field: &str) -> Result<i64, MapError> {
    body.get(field)
        .filter(|v| !v.is_null())
        .and_then(coerce_i64)
        .ok_or_else(|| MapError::DataQuality(format!("missing or malformed field '{}'", field)))
}

fn required_text(body: &Value, field: &str) -> Result<String, MapError> {
    match body.get(field).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(MapError::DataQuality(format!(
            "missing or empty field '{}'",
            field
        ))),
    }
}

/// Missing or malformed optional integers become NULL
fn optional_i64(body: &Value, field: &str) -> SqlValue {
    body.get(field)
        .and_then(coerce_i64)
        .map(SqlValue::Integer)
        .unwrap_or(SqlValue::Null)
}

fn optional_text(body: &Value, field: &str) -> SqlValue {
    body.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| SqlValue::Text(s.to_string()))
        .unwrap_or(SqlValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::get_dataset;
    use crate::extract::SingletonSet;
    use crate::schema::gen::create_all_tables;
    use rusqlite::Connection;
    use serde_json::json;

    /// Cache backed by a throwaway in-memory store
    fn cache_with(set: &SingletonSet) -> IdentityCache {
        let mut conn = Connection::open_in_memory().unwrap();
        create_all_tables(&conn).unwrap();
        let mut cache = IdentityCache::new();
        crate::importer::singletons::load_singletons(&mut conn, set, &mut cache).unwrap();
        cache
    }

    fn item_cache() -> IdentityCache {
        let mut set = SingletonSet::new();
        set.stats.insert(StatKey {
            stat: 16,
            value: 400,
        });
        set.criteria.insert(CriterionKey {
            value1: 112,
            value2: 500,
            operator: 2,
        });
        cache_with(&set)
    }

    #[test]
    fn maps_full_item() {
        let dataset = get_dataset("items").unwrap();
        let cache = item_cache();
        let body = json!({
            "aoid": 246660, "name": "Combined Commando's Jacket", "ql": 300,
            "item_class": 2, "description": "Sleek.",
            "stats": [{"stat": 16, "value": 400}],
            "criteria": [{"value1": 112, "value2": 500, "operator": 2}]
        });

        let mapped = map_record(dataset, &body, &cache).unwrap();
        assert_eq!(mapped.external_id, 246660);
        assert_eq!(mapped.entity[0], SqlValue::Integer(246660));
        assert_eq!(mapped.entity[2], SqlValue::Integer(300));
        assert_eq!(mapped.junctions.len(), 2);
        assert_eq!(mapped.junctions[0].table, "item_stats");
        assert_eq!(mapped.junctions[1].table, "item_criteria");
    }

    #[test]
    fn missing_optional_fields_become_null() {
        let dataset = get_dataset("items").unwrap();
        let cache = IdentityCache::new();
        let body = json!({"aoid": 1, "name": "Bare"});

        let mapped = map_record(dataset, &body, &cache).unwrap();
        assert_eq!(mapped.entity[2], SqlValue::Null);
        assert_eq!(mapped.entity[3], SqlValue::Null);
        assert_eq!(mapped.entity[4], SqlValue::Null);
        assert!(mapped.junctions.is_empty());
    }

    #[test]
    fn malformed_required_field_is_data_quality() {
        let dataset = get_dataset("items").unwrap();
        let cache = IdentityCache::new();

        let err = map_record(dataset, &json!({"name": "No Aoid"}), &cache).unwrap_err();
        assert!(matches!(err, MapError::DataQuality(_)));

        let err = map_record(dataset, &json!({"aoid": "x", "name": "Bad"}), &cache).unwrap_err();
        assert!(matches!(err, MapError::DataQuality(_)));

        let err = map_record(dataset, &json!({"aoid": 5, "name": ""}), &cache).unwrap_err();
        assert!(matches!(err, MapError::DataQuality(_)));
    }

    #[test]
    fn uncached_stat_tuple_is_unresolved_not_data_quality() {
        let dataset = get_dataset("items").unwrap();
        let cache = IdentityCache::new();
        let body = json!({
            "aoid": 1, "name": "Ghost",
            "stats": [{"stat": 99, "value": 1}]
        });

        let err = map_record(dataset, &body, &cache).unwrap_err();
        assert!(err.is_unresolved());
    }

    #[test]
    fn maps_mob_with_drops_from_csv_shape() {
        let dataset = get_dataset("mobs").unwrap();
        let mut cache = IdentityCache::new();
        cache.insert_entity_id("items", 209280, 7);

        // CSV decoding leaves every field a string
        let body = json!({
            "aoid": "5530", "name": "Abmouth Supremus", "level": "125",
            "playfield": "Smuggler's Den",
            "drops": "209280:0.12:180:220"
        });

        let mapped = map_record(dataset, &body, &cache).unwrap();
        assert_eq!(mapped.external_id, 5530);
        assert_eq!(mapped.entity[2], SqlValue::Integer(125));
        assert_eq!(mapped.junctions.len(), 1);
        assert_eq!(mapped.junctions[0].table, "mob_drops");
        assert_eq!(mapped.junctions[0].values[0], SqlValue::Integer(7));
        assert_eq!(mapped.junctions[0].values[1], SqlValue::Real(0.12));
    }

    #[test]
    fn drop_referencing_unknown_item_is_data_quality() {
        let dataset = get_dataset("mobs").unwrap();
        let cache = IdentityCache::new();
        let body = json!({
            "aoid": "5530", "name": "Abmouth", "drops": "999999:0.5:1:300"
        });

        let err = map_record(dataset, &body, &cache).unwrap_err();
        assert!(matches!(err, MapError::DataQuality(_)));
        assert!(!err.is_unresolved());
    }

    #[test]
    fn malformed_drop_entry_fails_the_record() {
        let dataset = get_dataset("mobs").unwrap();
        let cache = IdentityCache::new();
        let body = json!({"aoid": "1", "name": "M", "drops": "not-a-drop"});
        assert!(map_record(dataset, &body, &cache).is_err());
    }

    #[test]
    fn empty_drops_field_means_no_junctions() {
        let dataset = get_dataset("mobs").unwrap();
        let cache = IdentityCache::new();
        let body = json!({"aoid": "1", "name": "M", "drops": ""});
        let mapped = map_record(dataset, &body, &cache).unwrap();
        assert!(mapped.junctions.is_empty());
    }
}
