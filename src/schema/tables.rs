//! Table schema definitions for the normalized item database

use super::types::*;

// =============================================================================
// Singleton Tables (content-addressed, shared across entities)
// =============================================================================

pub static STAT_VALUES: TableSchema = TableSchema {
    name: "stat_values",
    role: TableRole::Singleton,
    columns: &[
        Column::required("stat", ColumnType::Integer),
        Column::required("value", ColumnType::Integer),
    ],
    foreign_keys: &[],
    unique: &["stat", "value"],
};

pub static CRITERIA: TableSchema = TableSchema {
    name: "criteria",
    role: TableRole::Singleton,
    columns: &[
        Column::required("value1", ColumnType::Integer),
        Column::required("value2", ColumnType::Integer),
        Column::required("operator", ColumnType::Integer),
    ],
    foreign_keys: &[],
    unique: &["value1", "value2", "operator"],
};

// =============================================================================
// Entity Tables
// =============================================================================

pub static ITEMS: TableSchema = TableSchema {
    name: "items",
    role: TableRole::Entity,
    columns: &[
        Column::required("aoid", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::new("ql", ColumnType::Integer),
        Column::new("item_class", ColumnType::Integer),
        Column::new("description", ColumnType::Text),
    ],
    foreign_keys: &[],
    unique: &["aoid"],
};

pub static NANOS: TableSchema = TableSchema {
    name: "nanos",
    role: TableRole::Entity,
    columns: &[
        Column::required("aoid", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::new("ql", ColumnType::Integer),
        Column::new("school", ColumnType::Integer),
        Column::new("description", ColumnType::Text),
    ],
    foreign_keys: &[],
    unique: &["aoid"],
};

pub static MOBS: TableSchema = TableSchema {
    name: "mobs",
    role: TableRole::Entity,
    columns: &[
        Column::required("aoid", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::new("level", ColumnType::Integer),
        Column::new("playfield", ColumnType::Text),
    ],
    foreign_keys: &[],
    unique: &["aoid"],
};

// =============================================================================
// Junction Tables (parent FK column always comes first)
// =============================================================================

pub static ITEM_STATS: TableSchema = TableSchema {
    name: "item_stats",
    role: TableRole::Junction,
    columns: &[
        Column::required("item_id", ColumnType::Integer),
        Column::required("stat_value_id", ColumnType::Integer),
    ],
    foreign_keys: &[
        ForeignKey::new("item_id", "items"),
        ForeignKey::new("stat_value_id", "stat_values"),
    ],
    unique: &[],
};

pub static ITEM_CRITERIA: TableSchema = TableSchema {
    name: "item_criteria",
    role: TableRole::Junction,
    columns: &[
        Column::required("item_id", ColumnType::Integer),
        Column::required("criterion_id", ColumnType::Integer),
    ],
    foreign_keys: &[
        ForeignKey::new("item_id", "items"),
        ForeignKey::new("criterion_id", "criteria"),
    ],
    unique: &[],
};

pub static NANO_STATS: TableSchema = TableSchema {
    name: "nano_stats",
    role: TableRole::Junction,
    columns: &[
        Column::required("nano_id", ColumnType::Integer),
        Column::required("stat_value_id", ColumnType::Integer),
    ],
    foreign_keys: &[
        ForeignKey::new("nano_id", "nanos"),
        ForeignKey::new("stat_value_id", "stat_values"),
    ],
    unique: &[],
};

pub static NANO_CRITERIA: TableSchema = TableSchema {
    name: "nano_criteria",
    role: TableRole::Junction,
    columns: &[
        Column::required("nano_id", ColumnType::Integer),
        Column::required("criterion_id", ColumnType::Integer),
    ],
    foreign_keys: &[
        ForeignKey::new("nano_id", "nanos"),
        ForeignKey::new("criterion_id", "criteria"),
    ],
    unique: &[],
};

pub static MOB_DROPS: TableSchema = TableSchema {
    name: "mob_drops",
    role: TableRole::Junction,
    columns: &[
        Column::required("mob_id", ColumnType::Integer),
        Column::required("item_id", ColumnType::Integer),
        Column::new("drop_rate", ColumnType::Real),
        Column::new("min_ql", ColumnType::Integer),
        Column::new("max_ql", ColumnType::Integer),
    ],
    foreign_keys: &[
        ForeignKey::new("mob_id", "mobs"),
        ForeignKey::new("item_id", "items"),
    ],
    unique: &[],
};

/// All tables in FK dependency order (parents before children)
pub static ALL_TABLES: &[&TableSchema] = &[
    &STAT_VALUES,
    &CRITERIA,
    &ITEMS,
    &NANOS,
    &MOBS,
    &ITEM_STATS,
    &ITEM_CRITERIA,
    &NANO_STATS,
    &NANO_CRITERIA,
    &MOB_DROPS,
];

/// Look up a table schema by name
pub fn get_table(name: &str) -> Option<&'static TableSchema> {
    ALL_TABLES.iter().copied().find(|t| t.name == name)
}

/// All table names, in dependency order
pub fn table_names() -> Vec<&'static str> {
    ALL_TABLES.iter().map(|t| t.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_tables_listed_in_dependency_order() {
        let mut seen = std::collections::HashSet::new();
        for table in ALL_TABLES {
            for dep in table.dependencies() {
                assert!(
                    seen.contains(dep),
                    "{} listed before its parent {}",
                    table.name,
                    dep
                );
            }
            seen.insert(table.name);
        }
    }

    #[test]
    fn junction_parent_column_is_first() {
        for table in ALL_TABLES {
            if table.role == TableRole::Junction {
                let first = table.columns[0].name;
                assert!(
                    table.foreign_keys.iter().any(|fk| fk.column == first),
                    "{}: first column {} is not a foreign key",
                    table.name,
                    first
                );
            }
        }
    }

    #[test]
    fn get_table_by_name() {
        assert!(get_table("items").is_some());
        assert!(get_table("no_such_table").is_none());
    }
}
