//! Dataset definitions and dependency ordering.
//!
//! A dataset is one source file feeding one entity table plus its junction
//! tables. Import order between datasets is derived from junction foreign
//! keys: if a dataset's junction references another dataset's entity table,
//! that dataset must load first.

use std::collections::{HashMap, HashSet};

use crate::schema::tables::{
    ITEMS, ITEM_CRITERIA, ITEM_STATS, MOBS, MOB_DROPS, NANOS, NANO_CRITERIA, NANO_STATS,
};
use crate::schema::types::TableSchema;

/// Serialized form of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// One whole-file JSON array of record objects
    JsonArray,
    /// Row-oriented CSV with a header line
    Csv,
}

/// Selects the mapping rules for a dataset's records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Items,
    Nanos,
    Mobs,
}

#[derive(Debug)]
pub struct DatasetSpec {
    pub name: &'static str,
    pub source_file: &'static str,
    pub format: SourceFormat,
    pub kind: DatasetKind,
    pub entity_table: &'static TableSchema,
    pub junction_tables: &'static [&'static TableSchema],
}

impl DatasetSpec {
    /// Entity tables of other datasets that this dataset's junctions reference
    pub fn entity_dependencies(&self) -> HashSet<&'static str> {
        self.junction_tables
            .iter()
            .flat_map(|t| t.foreign_keys)
            .map(|fk| fk.references_table)
            .filter(|name| *name != self.entity_table.name)
            .filter(|name| ALL_DATASETS.iter().any(|d| d.entity_table.name == *name))
            .collect()
    }

    /// This dataset's tables in delete order (junctions before the entity)
    pub fn tables_delete_order(&self) -> Vec<&'static TableSchema> {
        let mut tables: Vec<&'static TableSchema> = self.junction_tables.to_vec();
        tables.push(self.entity_table);
        tables
    }
}

pub static ALL_DATASETS: &[DatasetSpec] = &[
    DatasetSpec {
        name: "items",
        source_file: "items.json",
        format: SourceFormat::JsonArray,
        kind: DatasetKind::Items,
        entity_table: &ITEMS,
        junction_tables: &[&ITEM_STATS, &ITEM_CRITERIA],
    },
    DatasetSpec {
        name: "nanos",
        source_file: "nanos.json",
        format: SourceFormat::JsonArray,
        kind: DatasetKind::Nanos,
        entity_table: &NANOS,
        junction_tables: &[&NANO_STATS, &NANO_CRITERIA],
    },
    DatasetSpec {
        name: "mobs",
        source_file: "mobs.csv",
        format: SourceFormat::Csv,
        kind: DatasetKind::Mobs,
        entity_table: &MOBS,
        junction_tables: &[&MOB_DROPS],
    },
];

/// Look up a dataset by name
pub fn get_dataset(name: &str) -> Option<&'static DatasetSpec> {
    ALL_DATASETS.iter().find(|d| d.name == name)
}

/// Resolves dataset ordering from junction foreign keys
pub struct DependencyResolver {
    /// Map of dataset name -> datasets it depends on
    deps: HashMap<&'static str, HashSet<&'static str>>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        let by_entity_table: HashMap<&'static str, &'static str> = ALL_DATASETS
            .iter()
            .map(|d| (d.entity_table.name, d.name))
            .collect();

        let mut deps: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
        for dataset in ALL_DATASETS {
            let dataset_deps = dataset
                .entity_dependencies()
                .into_iter()
                .filter_map(|table| by_entity_table.get(table).copied())
                .collect();
            deps.insert(dataset.name, dataset_deps);
        }

        Self { deps }
    }

    /// All datasets in dependency order (referenced entities load first)
    pub fn all_ordered(&self) -> Result<Vec<&'static DatasetSpec>, String> {
        let names: HashSet<&str> = ALL_DATASETS.iter().map(|d| d.name).collect();
        self.topological_sort(&names)
    }

    /// Topological sort of datasets by dependencies
    fn topological_sort(
        &self,
        included: &HashSet<&str>,
    ) -> Result<Vec<&'static DatasetSpec>, String> {
        let mut result = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut temp_visited: HashSet<&str> = HashSet::new();

        // Walk in declaration order so the output is stable
        for dataset in ALL_DATASETS {
            if included.contains(dataset.name) && !visited.contains(dataset.name) {
                self.visit(
                    dataset.name,
                    included,
                    &mut visited,
                    &mut temp_visited,
                    &mut result,
                )?;
            }
        }

        Ok(result)
    }

    fn visit<'a>(
        &self,
        name: &'a str,
        included: &HashSet<&'a str>,
        visited: &mut HashSet<&'a str>,
        temp_visited: &mut HashSet<&'a str>,
        result: &mut Vec<&'static DatasetSpec>,
    ) -> Result<(), String> {
        if temp_visited.contains(name) {
            return Err(format!("Circular dependency detected at: {}", name));
        }
        if visited.contains(name) {
            return Ok(());
        }

        temp_visited.insert(name);

        if let Some(deps) = self.deps.get(name) {
            for dep in deps {
                if *dep != name && included.contains(dep) {
                    self.visit(dep, included, visited, temp_visited, result)?;
                }
            }
        }

        temp_visited.remove(name);
        visited.insert(name);

        if let Some(dataset) = get_dataset(name) {
            result.push(dataset);
        }

        Ok(())
    }
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}
