//! Singleton bulk loading and the natural-key -> surrogate-id cache.

use std::collections::HashMap;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

use crate::extract::{CriterionKey, SingletonSet, StatKey};

/// Rows per multi-row INSERT statement. Keeps bound parameters well under
/// SQLite's limit while bounding round-trips to O(set size / batch).
const INSERT_BATCH: usize = 250;

/// In-memory map from natural keys to store-assigned surrogate ids.
///
/// Built once per run by the orchestrator, read-only while records are
/// mapped. Entity id maps are filled in as parent datasets commit, so
/// junctions to other entities resolve the same way singleton links do.
#[derive(Debug, Default)]
pub struct IdentityCache {
    stat_values: HashMap<StatKey, i64>,
    criteria: HashMap<CriterionKey, i64>,
    entities: HashMap<&'static str, HashMap<i64, i64>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stat_id(&self, key: &StatKey) -> Option<i64> {
        self.stat_values.get(key).copied()
    }

    pub fn criterion_id(&self, key: &CriterionKey) -> Option<i64> {
        self.criteria.get(key).copied()
    }

    /// Surrogate id of an entity row by its external identifier
    pub fn entity_id(&self, table: &str, aoid: i64) -> Option<i64> {
        self.entities.get(table).and_then(|m| m.get(&aoid)).copied()
    }

    pub fn insert_entity_id(&mut self, table: &'static str, aoid: i64, id: i64) {
        self.entities.entry(table).or_default().insert(aoid, id);
    }

    pub fn stat_count(&self) -> usize {
        self.stat_values.len()
    }

    pub fn criterion_count(&self) -> usize {
        self.criteria.len()
    }
}

/// Bulk-insert the deduplicated singleton universe and refresh the cache.
///
/// Keys already present in the store are left alone (`INSERT OR IGNORE`),
/// so reimporting without `--clear` is idempotent for singletons. The
/// returned cache entries cover pre-existing and newly inserted rows
/// alike. Any failure here is fatal for the run: without a complete
/// identity cache no foreign key can be resolved.
pub fn load_singletons(
    conn: &mut Connection,
    set: &SingletonSet,
    cache: &mut IdentityCache,
) -> Result<(u64, u64)> {
    let tx = conn
        .transaction()
        .context("Failed to begin singleton load transaction")?;

    let mut inserted_stats = 0u64;
    let stat_keys: Vec<&StatKey> = set.stats.iter().collect();
    for batch in stat_keys.chunks(INSERT_BATCH) {
        let placeholders = vec!["(?, ?)"; batch.len()].join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO stat_values (stat, value) VALUES {}",
            placeholders
        );
        let mut stmt = tx.prepare(&sql)?;
        for (i, key) in batch.iter().enumerate() {
            stmt.raw_bind_parameter(i * 2 + 1, key.stat)?;
            stmt.raw_bind_parameter(i * 2 + 2, key.value)?;
        }
        inserted_stats += stmt.raw_execute().context("Bulk insert of stat tuples failed")? as u64;
    }

    let mut inserted_criteria = 0u64;
    let criterion_keys: Vec<&CriterionKey> = set.criteria.iter().collect();
    for batch in criterion_keys.chunks(INSERT_BATCH) {
        let placeholders = vec!["(?, ?, ?)"; batch.len()].join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO criteria (value1, value2, operator) VALUES {}",
            placeholders
        );
        let mut stmt = tx.prepare(&sql)?;
        for (i, key) in batch.iter().enumerate() {
            stmt.raw_bind_parameter(i * 3 + 1, key.value1)?;
            stmt.raw_bind_parameter(i * 3 + 2, key.value2)?;
            stmt.raw_bind_parameter(i * 3 + 3, key.operator)?;
        }
        inserted_criteria += stmt
            .raw_execute()
            .context("Bulk insert of criterion tuples failed")? as u64;
    }

    tx.commit()
        .context("Failed to commit singleton load transaction")?;

    refresh_singleton_cache(conn, cache)?;

    info!(
        inserted_stats,
        inserted_criteria,
        cached_stats = cache.stat_count(),
        cached_criteria = cache.criterion_count(),
        "singleton universe loaded"
    );

    Ok((inserted_stats, inserted_criteria))
}

/// Rebuild the singleton side of the cache from the store
fn refresh_singleton_cache(conn: &Connection, cache: &mut IdentityCache) -> Result<()> {
    cache.stat_values.clear();
    let mut stmt = conn.prepare("SELECT id, stat, value FROM stat_values")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            StatKey {
                stat: row.get(1)?,
                value: row.get(2)?,
            },
        ))
    })?;
    for row in rows {
        let (id, key) = row?;
        cache.stat_values.insert(key, id);
    }

    cache.criteria.clear();
    let mut stmt = conn.prepare("SELECT id, value1, value2, operator FROM criteria")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            CriterionKey {
                value1: row.get(1)?,
                value2: row.get(2)?,
                operator: row.get(3)?,
            },
        ))
    })?;
    for row in rows {
        let (id, key) = row?;
        cache.criteria.insert(key, id);
    }

    Ok(())
}

/// Load the aoid -> id map for one entity table into the cache.
///
/// Called after a parent dataset commits so dependents can resolve
/// entity-to-entity junctions.
pub fn load_entity_ids(
    conn: &Connection,
    table: &'static str,
    cache: &mut IdentityCache,
) -> Result<()> {
    let mut stmt = conn.prepare(&format!("SELECT id, aoid FROM {}", table))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;

    let map = cache.entities.entry(table).or_default();
    map.clear();
    for row in rows {
        let (id, aoid) = row?;
        map.insert(aoid, id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::gen::create_all_tables;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_all_tables(&conn).unwrap();
        conn
    }

    fn sample_set() -> SingletonSet {
        let mut set = SingletonSet::new();
        set.stats.insert(StatKey {
            stat: 16,
            value: 400,
        });
        set.stats.insert(StatKey {
            stat: 17,
            value: 350,
        });
        set.criteria.insert(CriterionKey {
            value1: 112,
            value2: 500,
            operator: 2,
        });
        set
    }

    #[test]
    fn load_builds_complete_cache() {
        let mut conn = test_conn();
        let mut cache = IdentityCache::new();
        let (stats, criteria) = load_singletons(&mut conn, &sample_set(), &mut cache).unwrap();

        assert_eq!(stats, 2);
        assert_eq!(criteria, 1);
        assert_eq!(cache.stat_count(), 2);
        assert!(cache
            .stat_id(&StatKey {
                stat: 16,
                value: 400
            })
            .is_some());
        assert!(cache
            .criterion_id(&CriterionKey {
                value1: 112,
                value2: 500,
                operator: 2
            })
            .is_some());
    }

    #[test]
    fn reload_is_idempotent_and_keeps_ids() {
        let mut conn = test_conn();
        let mut cache = IdentityCache::new();
        load_singletons(&mut conn, &sample_set(), &mut cache).unwrap();
        let key = StatKey {
            stat: 16,
            value: 400,
        };
        let first_id = cache.stat_id(&key).unwrap();

        let mut cache2 = IdentityCache::new();
        let (stats, criteria) = load_singletons(&mut conn, &sample_set(), &mut cache2).unwrap();

        assert_eq!(stats, 0);
        assert_eq!(criteria, 0);
        assert_eq!(cache2.stat_id(&key).unwrap(), first_id);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM stat_values", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn cache_covers_preexisting_rows() {
        let mut conn = test_conn();
        conn.execute("INSERT INTO stat_values (stat, value) VALUES (1, 1)", [])
            .unwrap();

        let mut cache = IdentityCache::new();
        load_singletons(&mut conn, &sample_set(), &mut cache).unwrap();

        assert_eq!(cache.stat_count(), 3);
        assert!(cache.stat_id(&StatKey { stat: 1, value: 1 }).is_some());
    }

    #[test]
    fn entity_ids_load_by_aoid() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO items (aoid, name) VALUES (100, 'Leet Blade')",
            [],
        )
        .unwrap();
        let mut cache = IdentityCache::new();
        load_entity_ids(&conn, "items", &mut cache).unwrap();

        assert!(cache.entity_id("items", 100).is_some());
        assert!(cache.entity_id("items", 999).is_none());
        assert!(cache.entity_id("mobs", 100).is_none());
    }

    #[test]
    fn empty_set_loads_nothing() {
        let mut conn = test_conn();
        let mut cache = IdentityCache::new();
        let (stats, criteria) =
            load_singletons(&mut conn, &SingletonSet::new(), &mut cache).unwrap();
        assert_eq!((stats, criteria), (0, 0));
        assert_eq!(cache.stat_count(), 0);
    }
}
