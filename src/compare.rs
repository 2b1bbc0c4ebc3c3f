//! Structural comparison of two sets of extracted table schemas.
//!
//! Nothing here knows which engine produced a schema; data types and
//! nullability markers are compared verbatim.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::schema::{ForeignKeySchema, IndexSchema, TableSchema};

/// Result of comparing two databases' table sets.
///
/// Every table name of either side lands in exactly one of `missing`,
/// `extra` and `common`, each sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaComparison {
    /// In the source only.
    pub missing: Vec<String>,
    /// In the target only.
    pub extra: Vec<String>,
    pub common: Vec<String>,
    /// Column and primary-key differences per common table. Index and
    /// foreign-key differences are added here only in strict mode.
    pub differences: BTreeMap<String, Vec<String>>,
    /// Index and foreign-key differences reported as notices when not in
    /// strict mode.
    pub notices: BTreeMap<String, Vec<String>>,
}

impl SchemaComparison {
    pub fn has_differences(&self, table: &str) -> bool {
        self.differences.contains_key(table)
    }
}

pub fn compare_databases(
    source: &BTreeMap<String, TableSchema>,
    target: &BTreeMap<String, TableSchema>,
    strict_structure: bool,
) -> SchemaComparison {
    let mut result = SchemaComparison::default();

    for (name, source_schema) in source {
        let Some(target_schema) = target.get(name) else {
            result.missing.push(name.clone());
            continue;
        };
        result.common.push(name.clone());

        let mut differences = compare_table_schema(name, source_schema, target_schema);

        let mut structure = compare_indexes(name, &source_schema.indexes, &target_schema.indexes);
        structure.extend(compare_foreign_keys(
            name,
            &source_schema.foreign_keys,
            &target_schema.foreign_keys,
        ));

        if strict_structure {
            differences.extend(structure);
        } else if !structure.is_empty() {
            result.notices.insert(name.clone(), structure);
        }

        if !differences.is_empty() {
            result.differences.insert(name.clone(), differences);
        }
    }

    result.extra = target
        .keys()
        .filter(|name| !source.contains_key(*name))
        .cloned()
        .collect();

    result
}

/// Column set, column type, nullability and primary-key differences.
pub fn compare_table_schema(table: &str, source: &TableSchema, target: &TableSchema) -> Vec<String> {
    let mut differences = Vec::new();

    let target_columns: HashMap<&str, _> = target
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c))
        .collect();
    let source_names: BTreeSet<&str> = source.columns.iter().map(|c| c.name.as_str()).collect();

    for source_col in &source.columns {
        let Some(target_col) = target_columns.get(source_col.name.as_str()) else {
            differences.push(format!(
                "Column '{}.{}' exists in source but not in target",
                table, source_col.name
            ));
            continue;
        };

        if source_col.data_type != target_col.data_type {
            differences.push(format!(
                "Column '{}.{}' has different data type: source='{}', target='{}'",
                table, source_col.name, source_col.data_type, target_col.data_type
            ));
        }
        if source_col.nullable != target_col.nullable {
            differences.push(format!(
                "Column '{}.{}' has different nullable property: source='{}', target='{}'",
                table, source_col.name, source_col.nullable, target_col.nullable
            ));
        }
    }

    for target_col in &target.columns {
        if !source_names.contains(target_col.name.as_str()) {
            differences.push(format!(
                "Column '{}.{}' exists in target but not in source",
                table, target_col.name
            ));
        }
    }

    if !same_key_set(&source.primary_keys, &target.primary_keys) {
        differences.push(format!(
            "Table '{}' has different primary keys: source=[{}], target=[{}]",
            table,
            source.primary_keys.join(", "),
            target.primary_keys.join(", ")
        ));
    }

    differences
}

/// Declaration order is irrelevant.
pub fn same_key_set(a: &[String], b: &[String]) -> bool {
    a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
}

fn group_indexes(indexes: &[IndexSchema]) -> BTreeMap<&str, BTreeMap<&str, &IndexSchema>> {
    let mut grouped: BTreeMap<&str, BTreeMap<&str, &IndexSchema>> = BTreeMap::new();
    for idx in indexes {
        grouped
            .entry(idx.name.as_str())
            .or_default()
            .insert(idx.column_name.as_str(), idx);
    }
    grouped
}

/// Indexes keyed by (name, column); reports missing indexes, missing index
/// columns and uniqueness changes.
pub fn compare_indexes(table: &str, source: &[IndexSchema], target: &[IndexSchema]) -> Vec<String> {
    let source_map = group_indexes(source);
    let target_map = group_indexes(target);
    let mut notices = Vec::new();

    for (name, source_cols) in &source_map {
        let Some(target_cols) = target_map.get(name) else {
            notices.push(format!(
                "Index '{}' on columns [{}] exists in source but not in target for table '{}'",
                name,
                source_cols.keys().copied().collect::<Vec<_>>().join(", "),
                table
            ));
            continue;
        };

        for (column, source_idx) in source_cols {
            match target_cols.get(column) {
                None => notices.push(format!(
                    "Column '{}' of index '{}' exists in source but not in target for table '{}'",
                    column, name, table
                )),
                Some(target_idx) if source_idx.non_unique != target_idx.non_unique => {
                    notices.push(format!(
                        "Index '{}' on column '{}' has different uniqueness in table '{}': source={}, target={}",
                        name,
                        column,
                        table,
                        source_idx.is_unique(),
                        target_idx.is_unique()
                    ))
                }
                Some(_) => {}
            }
        }

        for column in target_cols.keys() {
            if !source_cols.contains_key(column) {
                notices.push(format!(
                    "Column '{}' of index '{}' exists in target but not in source for table '{}'",
                    column, name, table
                ));
            }
        }
    }

    for (name, target_cols) in &target_map {
        if !source_map.contains_key(name) {
            notices.push(format!(
                "Index '{}' on columns [{}] exists in target but not in source for table '{}'",
                name,
                target_cols.keys().copied().collect::<Vec<_>>().join(", "),
                table
            ));
        }
    }

    notices
}

/// Foreign keys compared by their full (name, column, referenced table,
/// referenced column) tuple.
pub fn compare_foreign_keys(
    table: &str,
    source: &[ForeignKeySchema],
    target: &[ForeignKeySchema],
) -> Vec<String> {
    let source_set: BTreeSet<_> = source.iter().map(fk_key).collect();
    let target_set: BTreeSet<_> = target.iter().map(fk_key).collect();

    let describe = |fk: &(&str, &str, &str, &str), side: &str, other: &str| {
        format!(
            "Foreign key '{}' from '{}.{}' to '{}.{}' exists in {} but not in {}",
            fk.0, table, fk.1, fk.2, fk.3, side, other
        )
    };

    source_set
        .difference(&target_set)
        .map(|fk| describe(fk, "source", "target"))
        .chain(
            target_set
                .difference(&source_set)
                .map(|fk| describe(fk, "target", "source")),
        )
        .collect()
}

fn fk_key(fk: &ForeignKeySchema) -> (&str, &str, &str, &str) {
    (
        fk.name.as_str(),
        fk.column_name.as_str(),
        fk.referenced_table.as_str(),
        fk.referenced_column.as_str(),
    )
}
