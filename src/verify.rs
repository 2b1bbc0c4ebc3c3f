//! Data verification over the tables present on both sides.
//!
//! Failures on a single table never abort the pass: the table is logged,
//! recorded in `ComparisonSummary::skipped` and the loop moves on.

use std::collections::BTreeMap;
use std::io::Write;

use log::{debug, warn};

use crate::{
    db::{compare_by_checksum, compare_row_counts, DbAdapter},
    errors::DbError,
    models::{schema::TableSchema, summary::ComparisonSummary},
};

/// Integer percentage of processed tables, reported only when it grows.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    last_reported: Option<usize>,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            last_reported: None,
        }
    }

    /// Percentage to report before processing the table at `index`, or
    /// `None` if it would repeat the last one.
    pub fn advance(&mut self, index: usize) -> Option<usize> {
        if self.total == 0 {
            return None;
        }
        let percent = index * 100 / self.total;
        if self.last_reported.map_or(true, |last| percent > last) {
            self.last_reported = Some(percent);
            return Some(percent);
        }
        None
    }

    pub fn finish(&mut self) -> usize {
        self.last_reported = Some(100);
        100
    }
}

/// Row-count pass. Writes progress and mismatch lines to `out` as it goes.
pub async fn verify_row_counts<W: Write>(
    source: &dyn DbAdapter,
    target: &dyn DbAdapter,
    tables: &[String],
    summary: &mut ComparisonSummary,
    out: &mut W,
) -> Result<(), DbError> {
    writeln!(out, "Comparing data for {} tables...", tables.len())?;
    summary.total_tables_checked = tables.len();

    let mut progress = ProgressTracker::new(tables.len());
    for (i, table) in tables.iter().enumerate() {
        if let Some(percent) = progress.advance(i) {
            writeln!(out, "Progress: {}%", percent)?;
        }

        let counts = match compare_row_counts(source, target, table).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!("Error comparing row counts for table {}: {}", table, e);
                summary.skipped.push((table.clone(), e.to_string()));
                continue;
            }
        };

        if counts.differ() {
            writeln!(
                out,
                "Table '{}' has different row counts: source={}, target={}",
                table, counts.source, counts.target
            )?;
        }
        summary.record_row_counts(table, counts);
    }

    writeln!(out, "Progress: {}%", progress.finish())?;
    Ok(())
}

/// Fingerprint pass, independent of the row counts. A mismatch marks the
/// table different; an indeterminate verdict does not.
pub async fn verify_checksums(
    source: &dyn DbAdapter,
    target: &dyn DbAdapter,
    tables: &[String],
    schemas: &BTreeMap<String, TableSchema>,
    summary: &mut ComparisonSummary,
) {
    for table in tables {
        let Some(schema) = schemas.get(table) else {
            debug!("No schema for '{}', skipping checksum", table);
            continue;
        };

        match compare_by_checksum(source, target, table, schema).await {
            Ok(verdict) => {
                if verdict.differs() == Some(true) {
                    summary.mark_different(table);
                }
                summary.data_verdicts.insert(table.clone(), verdict);
            }
            Err(e) => {
                warn!("Error comparing checksums for table {}: {}", table, e);
                summary
                    .skipped
                    .push((table.clone(), format!("checksum: {}", e)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::MockAdapter;
    use crate::models::summary::{DataFingerprint, DataVerdict, RowCounts, Tier};
    use mockall::predicate;

    fn names(tables: &[&str]) -> Vec<String> {
        tables.iter().map(|t| t.to_string()).collect()
    }

    fn emitted(tracker: &mut ProgressTracker, total: usize) -> Vec<usize> {
        let mut out: Vec<usize> = (0..total).filter_map(|i| tracker.advance(i)).collect();
        out.push(tracker.finish());
        out
    }

    #[test]
    fn test_progress_is_monotonic_without_repeats() {
        let mut tracker = ProgressTracker::new(3);
        assert_eq!(emitted(&mut tracker, 3), vec![0, 33, 66, 100]);

        let mut tracker = ProgressTracker::new(300);
        let percents = emitted(&mut tracker, 300);
        assert_eq!(percents.len(), 101);
        assert!(percents.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_progress_always_finishes_at_100() {
        assert_eq!(emitted(&mut ProgressTracker::new(0), 0), vec![100]);
        assert_eq!(emitted(&mut ProgressTracker::new(1), 1), vec![0, 100]);
    }

    #[tokio::test]
    async fn test_row_count_pass_records_mismatches_and_skips_failures() {
        let mut source = MockAdapter::new();
        source.expect_count_rows().returning(|table| match table {
            "broken" => Err(DbError::Config("permission denied".to_string())),
            _ => Ok(100),
        });
        let mut target = MockAdapter::new();
        target
            .expect_count_rows()
            .returning(|table| Ok(if table == "orders" { 101 } else { 100 }));

        let tables = names(&["broken", "orders", "users"]);
        let mut summary = ComparisonSummary::default();
        let mut out = Vec::new();
        verify_row_counts(&source, &target, &tables, &mut summary, &mut out)
            .await
            .unwrap();

        assert_eq!(summary.total_tables_checked, 3);
        assert_eq!(summary.different_tables, vec!["orders".to_string()]);
        assert_eq!(
            summary.different_row_counts["orders"],
            RowCounts { source: 100, target: 101 }
        );
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].0, "broken");

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Comparing data for 3 tables...",
                "Progress: 0%",
                "Progress: 33%",
                "Progress: 66%",
                "Table 'orders' has different row counts: source=100, target=101",
                "Progress: 100%",
            ]
        );
    }

    #[tokio::test]
    async fn test_checksum_pass_is_independent_of_row_counts() {
        let mut source = MockAdapter::new();
        source
            .expect_fingerprint()
            .with(predicate::eq("users"), predicate::always())
            .returning(|_, _| Ok(DataFingerprint::Checksum(Some(1))));
        source
            .expect_fingerprint()
            .with(predicate::eq("logs"), predicate::always())
            .returning(|_, _| Ok(DataFingerprint::Checksum(None)));
        let mut target = MockAdapter::new();
        target
            .expect_fingerprint()
            .with(predicate::eq("users"), predicate::always())
            .returning(|_, _| Ok(DataFingerprint::Checksum(Some(2))));
        target
            .expect_fingerprint()
            .with(predicate::eq("logs"), predicate::always())
            .returning(|_, _| Ok(DataFingerprint::Checksum(None)));

        let tables = names(&["logs", "users"]);
        let schemas: BTreeMap<String, TableSchema> = tables
            .iter()
            .map(|t| (t.clone(), TableSchema::new(t.as_str())))
            .collect();

        // Row counts already agreed for both tables.
        let mut summary = ComparisonSummary::default();
        summary.record_row_counts("users", RowCounts { source: 5, target: 5 });

        verify_checksums(&source, &target, &tables, &schemas, &mut summary).await;

        assert_eq!(summary.different_tables, vec!["users".to_string()]);
        assert!(matches!(
            summary.data_verdicts["users"],
            DataVerdict::Mismatch { tier: Tier::NativeChecksum, .. }
        ));
        assert_eq!(summary.data_verdicts["logs"].differs(), None);
        assert!(summary.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_checksum_failure_is_skipped() {
        let mut source = MockAdapter::new();
        source
            .expect_fingerprint()
            .returning(|_, _| Err(DbError::Config("without rowid".to_string())));
        let target = MockAdapter::new();

        let tables = names(&["t"]);
        let schemas = BTreeMap::from([("t".to_string(), TableSchema::new("t"))]);
        let mut summary = ComparisonSummary::default();
        verify_checksums(&source, &target, &tables, &schemas, &mut summary).await;

        assert!(summary.data_verdicts.is_empty());
        assert!(summary.different_tables.is_empty());
        assert!(summary.skipped[0].1.starts_with("checksum:"));
    }
}
