//! Final report: merges the schema comparison with the data verification
//! summary and renders it as text or JSON.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::{
    compare::SchemaComparison,
    errors::DbError,
    models::summary::{ComparisonSummary, DataVerdict, DatabaseInfo},
};

const KB: i64 = 1024;
const MB: i64 = KB * 1024;
const GB: i64 = MB * 1024;

pub fn format_size(bytes: i64) -> String {
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// One table in the final summary. A table appears in at most one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Difference {
    RowCount {
        table: String,
        source: i64,
        target: i64,
    },
    Missing {
        table: String,
    },
    Extra {
        table: String,
    },
    /// Only the first schema difference is kept; `remaining` counts the rest.
    Schema {
        table: String,
        first: String,
        remaining: usize,
    },
    Data {
        table: String,
        detail: String,
    },
}

impl Difference {
    pub fn table(&self) -> &str {
        match self {
            Difference::RowCount { table, .. }
            | Difference::Missing { table }
            | Difference::Extra { table }
            | Difference::Schema { table, .. }
            | Difference::Data { table, .. } => table,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub source: DatabaseInfo,
    pub target: DatabaseInfo,
    pub missing_tables: Vec<String>,
    pub extra_tables: Vec<String>,
    /// Every table found different by any check, in first-seen order.
    pub different_tables: Vec<String>,
    pub differences: Vec<Difference>,
    pub data_verdicts: BTreeMap<String, DataVerdict>,
    pub structure_notices: BTreeMap<String, Vec<String>>,
    pub skipped: Vec<(String, String)>,
    pub total_tables_checked: usize,
    pub schema_only: bool,
}

impl Report {
    /// Orders the differences as row counts, missing tables, extra tables,
    /// schema differences, then data mismatches found by checksum only.
    pub fn build(
        source: DatabaseInfo,
        target: DatabaseInfo,
        comparison: &SchemaComparison,
        summary: &ComparisonSummary,
    ) -> Self {
        let mut differences: Vec<Difference> = summary
            .different_row_counts
            .iter()
            .map(|(table, counts)| Difference::RowCount {
                table: table.clone(),
                source: counts.source,
                target: counts.target,
            })
            .collect();

        differences.extend(
            comparison
                .missing
                .iter()
                .map(|table| Difference::Missing { table: table.clone() }),
        );
        differences.extend(
            comparison
                .extra
                .iter()
                .map(|table| Difference::Extra { table: table.clone() }),
        );

        for (table, diffs) in &comparison.differences {
            if summary.different_row_counts.contains_key(table) {
                continue;
            }
            if let Some((first, rest)) = diffs.split_first() {
                differences.push(Difference::Schema {
                    table: table.clone(),
                    first: first.clone(),
                    remaining: rest.len(),
                });
            }
        }

        for (table, verdict) in &summary.data_verdicts {
            let reported = differences.iter().any(|d| d.table() == table);
            if verdict.differs() == Some(true) && !reported {
                differences.push(Difference::Data {
                    table: table.clone(),
                    detail: verdict.describe(),
                });
            }
        }

        Self {
            source,
            target,
            missing_tables: comparison.missing.clone(),
            extra_tables: comparison.extra.clone(),
            different_tables: summary.different_tables.clone(),
            differences,
            data_verdicts: summary.data_verdicts.clone(),
            structure_notices: comparison.notices.clone(),
            skipped: summary.skipped.clone(),
            total_tables_checked: summary.total_tables_checked,
            schema_only: summary.schema_only,
        }
    }

    pub fn has_differences(&self) -> bool {
        !self.different_tables.is_empty()
    }

    pub fn to_json(&self) -> Result<String, DbError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Everything after the data differences section.
    pub fn write_text<W: Write>(&self, out: &mut W) -> Result<(), DbError> {
        if !self.data_verdicts.is_empty() {
            writeln!(out, "\n=== Data Checksums ===")?;
            for (table, verdict) in &self.data_verdicts {
                writeln!(out, "- {}: {}", table, verdict.describe())?;
            }
        }

        if !self.structure_notices.is_empty() {
            writeln!(out, "\n=== Structure Notices ===")?;
            for notices in self.structure_notices.values() {
                for notice in notices {
                    writeln!(out, "{}", notice)?;
                }
            }
        }

        writeln!(out, "\n=== Comparison Summary ===")?;
        if self.schema_only {
            writeln!(out, "Schema-only comparison, table data was not verified.")?;
        }
        if self.different_tables.is_empty() {
            writeln!(out, "No differences found between the databases.")?;
        } else {
            writeln!(
                out,
                "Found differences in {} tables:",
                self.different_tables.len()
            )?;
            for difference in &self.differences {
                write_difference(out, difference)?;
            }
        }

        if !self.skipped.is_empty() {
            writeln!(out, "Could not verify {} tables:", self.skipped.len())?;
            for (table, error) in &self.skipped {
                writeln!(out, "- {} ({})", table, error)?;
            }
        }

        writeln!(out, "\n=== Database Comparison Finished ===")?;
        Ok(())
    }
}

fn write_difference<W: Write>(out: &mut W, difference: &Difference) -> Result<(), DbError> {
    match difference {
        Difference::RowCount {
            table,
            source,
            target,
        } => writeln!(
            out,
            "- {} (row counts differ: source={}, target={})",
            table, source, target
        )?,
        Difference::Missing { table } => {
            writeln!(out, "- {} (exists in source but not in target)", table)?
        }
        Difference::Extra { table } => {
            writeln!(out, "- {} (exists in target but not in source)", table)?
        }
        Difference::Schema {
            table,
            first,
            remaining,
        } => {
            writeln!(out, "- {} ({})", table, first)?;
            if *remaining > 0 {
                writeln!(out, "  (and {} more differences)", remaining)?;
            }
        }
        Difference::Data { table, detail } => writeln!(out, "- {} ({})", table, detail)?,
    }
    Ok(())
}

pub fn write_database_info<W: Write>(
    out: &mut W,
    source: &DatabaseInfo,
    target: &DatabaseInfo,
) -> Result<(), DbError> {
    writeln!(out, "\n=== Database Information ===")?;
    for (label, info) in [("Source", source), ("Target", target)] {
        writeln!(
            out,
            "{}: {}, Database: {}, Tables: {}, Size: {}",
            label,
            info.host,
            info.database_name,
            info.table_count,
            format_size(info.total_size)
        )?;
    }
    Ok(())
}

pub fn write_table_lists<W: Write>(out: &mut W, comparison: &SchemaComparison) -> Result<(), DbError> {
    if !comparison.missing.is_empty() {
        writeln!(
            out,
            "Tables in source but not in target: [{}]",
            comparison.missing.join(", ")
        )?;
    }
    if !comparison.extra.is_empty() {
        writeln!(
            out,
            "Tables in target but not in source: [{}]",
            comparison.extra.join(", ")
        )?;
    }
    Ok(())
}
