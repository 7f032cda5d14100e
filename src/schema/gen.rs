use anyhow::{Context, Result};
use rusqlite::Connection;

use super::tables::ALL_TABLES;
use super::types::{ColumnType, TableSchema};

/// Generate CREATE TABLE SQL for a table schema
pub fn generate_create_table(schema: &TableSchema) -> String {
    let mut sql = format!("CREATE TABLE {} (\n", schema.name);
    let mut columns = vec!["    id INTEGER PRIMARY KEY".to_string()];

    for col in schema.columns {
        let sql_type = match col.col_type {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        };
        let null_constraint = if !col.nullable { " NOT NULL" } else { "" };
        columns.push(format!("    {} {}{}", col.name, sql_type, null_constraint));
    }

    if !schema.unique.is_empty() {
        columns.push(format!("    UNIQUE ({})", schema.unique.join(", ")));
    }

    for fk in schema.foreign_keys {
        columns.push(format!(
            "    FOREIGN KEY ({}) REFERENCES {}({})",
            fk.column, fk.references_table, fk.references_column
        ));
    }

    sql.push_str(&columns.join(",\n"));
    sql.push_str("\n)");

    sql
}

/// Generate CREATE INDEX statements for foreign key columns
pub fn generate_indexes(schema: &TableSchema) -> Vec<String> {
    schema
        .foreign_keys
        .iter()
        .map(|fk| {
            format!(
                "CREATE INDEX idx_{}_{} ON {}({})",
                schema.name, fk.column, schema.name, fk.column
            )
        })
        .collect()
}

/// Create every table and index. Intended for `init-db` and test fixtures;
/// production runs expect an already-provisioned store.
pub fn create_all_tables(conn: &Connection) -> Result<()> {
    for schema in ALL_TABLES {
        let sql = generate_create_table(schema);
        conn.execute(&sql, [])
            .with_context(|| format!("Failed to create table: {}", schema.name))?;

        for index_sql in generate_indexes(schema) {
            conn.execute(&index_sql, [])
                .with_context(|| format!("Failed to create index for: {}", schema.name))?;
        }
    }
    Ok(())
}

/// Names of schema tables missing from the connected database
pub fn missing_tables(conn: &Connection) -> Result<Vec<&'static str>> {
    let mut stmt = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")
        .context("Failed to query sqlite_master")?;

    let mut missing = Vec::new();
    for schema in ALL_TABLES {
        if !stmt.exists([schema.name])? {
            missing.push(schema.name);
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables::{ITEMS, MOB_DROPS, STAT_VALUES};

    #[test]
    fn create_table_items() {
        let sql = generate_create_table(&ITEMS);
        assert!(sql.contains("CREATE TABLE items"));
        assert!(sql.contains("id INTEGER PRIMARY KEY"));
        assert!(sql.contains("aoid INTEGER NOT NULL"));
        assert!(sql.contains("UNIQUE (aoid)"));
        assert!(sql.contains("description TEXT"));
    }

    #[test]
    fn create_table_singleton_natural_key() {
        let sql = generate_create_table(&STAT_VALUES);
        assert!(sql.contains("UNIQUE (stat, value)"));
    }

    #[test]
    fn create_table_junction_foreign_keys() {
        let sql = generate_create_table(&MOB_DROPS);
        assert!(sql.contains("FOREIGN KEY (mob_id) REFERENCES mobs(id)"));
        assert!(sql.contains("FOREIGN KEY (item_id) REFERENCES items(id)"));
        assert!(sql.contains("drop_rate REAL"));
    }

    #[test]
    fn indexes_cover_foreign_keys() {
        let indexes = generate_indexes(&MOB_DROPS);
        assert!(indexes.iter().any(|i| i.contains("idx_mob_drops_mob_id")));
        assert!(indexes.iter().any(|i| i.contains("idx_mob_drops_item_id")));
    }

    #[test]
    fn create_all_and_detect_missing() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!missing_tables(&conn).unwrap().is_empty());

        create_all_tables(&conn).unwrap();
        assert!(missing_tables(&conn).unwrap().is_empty());
    }
}
