use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Diagnostic facts about one side. Fields that could not be probed stay at
/// their zero value.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct DatabaseInfo {
    pub host: String,
    pub database_name: String,
    pub table_count: usize,
    pub total_size: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RowCounts {
    pub source: i64,
    pub target: i64,
}

impl RowCounts {
    pub fn differ(&self) -> bool {
        self.source != self.target
    }
}

/// Strength of the data-equivalence signal an engine can produce.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Engine-native table checksum (MySQL `CHECKSUM TABLE`).
    NativeChecksum,
    /// Hash over every row in primary-key order (PostgreSQL).
    ContentHash,
    /// Row count plus a rowid total (SQLite). Much weaker than the others.
    RowHeuristic,
}

impl Tier {
    pub fn is_strong(&self) -> bool {
        !matches!(self, Tier::RowHeuristic)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::NativeChecksum => "native checksum",
            Tier::ContentHash => "content hash",
            Tier::RowHeuristic => "row-count heuristic, weak",
        })
    }
}

/// What one side's adapter reports about a table's content.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum DataFingerprint {
    /// `None` when the server could not produce a checksum.
    Checksum(Option<i64>),
    /// `None` for an empty table.
    ContentHash(Option<String>),
    /// `rowid_total` is `None` for WITHOUT ROWID tables.
    RowSum {
        rows: i64,
        rowid_total: Option<f64>,
    },
}

impl DataFingerprint {
    pub fn tier(&self) -> Tier {
        match self {
            DataFingerprint::Checksum(_) => Tier::NativeChecksum,
            DataFingerprint::ContentHash(_) => Tier::ContentHash,
            DataFingerprint::RowSum { .. } => Tier::RowHeuristic,
        }
    }
}

/// Outcome of comparing two fingerprints of the same table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DataVerdict {
    Match { tier: Tier },
    Mismatch { tier: Tier, reason: String },
    /// Neither side produced a usable signal. Not the same as a match.
    Indeterminate { reason: String },
}

impl DataVerdict {
    /// `Some(true)` if the data differs, `Some(false)` if it matched, `None`
    /// when no conclusion could be drawn.
    pub fn differs(&self) -> Option<bool> {
        match self {
            DataVerdict::Match { .. } => Some(false),
            DataVerdict::Mismatch { .. } => Some(true),
            DataVerdict::Indeterminate { .. } => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DataVerdict::Match { tier } if tier.is_strong() => format!("identical ({})", tier),
            DataVerdict::Match { tier } => format!("likely identical ({})", tier),
            DataVerdict::Mismatch { tier, reason } => format!("data differs: {} ({})", reason, tier),
            DataVerdict::Indeterminate { reason } => format!("cannot tell: {}", reason),
        }
    }
}

/// Accumulated result of the data verification pass.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ComparisonSummary {
    /// Tables found different so far, first-seen order, no duplicates.
    pub different_tables: Vec<String>,
    pub different_row_counts: BTreeMap<String, RowCounts>,
    pub data_verdicts: BTreeMap<String, DataVerdict>,
    /// Tables whose row-count or checksum query failed, with the error text.
    pub skipped: Vec<(String, String)>,
    pub total_tables_checked: usize,
    pub schema_only: bool,
}

impl ComparisonSummary {
    pub fn mark_different(&mut self, table: &str) {
        if !self.different_tables.iter().any(|t| t == table) {
            self.different_tables.push(table.to_string());
        }
    }

    pub fn record_row_counts(&mut self, table: &str, counts: RowCounts) {
        if counts.differ() {
            self.different_row_counts.insert(table.to_string(), counts);
            self.mark_different(table);
        }
    }
}
