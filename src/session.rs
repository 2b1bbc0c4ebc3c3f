use std::io::Write;

use log::info;

use crate::{
    compare::compare_databases,
    db::{collect_schemas, connect, database_info, DbAdapter},
    errors::DbError,
    models::{
        connections::{ConnectionConfig, DbEngine},
        summary::ComparisonSummary,
    },
    report::{write_database_info, write_table_lists, Report},
    verify::{verify_checksums, verify_row_counts},
};

/// Knobs for one run.
#[derive(Debug, Clone, Copy)]
pub struct CompareOptions {
    /// Skip every data query; compare structure only.
    pub schema_only: bool,
    /// Run the fingerprint pass after the row counts.
    pub checksum: bool,
    /// Count index and foreign-key differences as table differences.
    pub strict_structure: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            schema_only: false,
            checksum: true,
            strict_structure: false,
        }
    }
}

/// Owns the connections to both sides for the duration of one comparison.
pub struct CompareSession {
    source: Box<dyn DbAdapter>,
    target: Box<dyn DbAdapter>,
    source_config: ConnectionConfig,
    target_config: ConnectionConfig,
    options: CompareOptions,
}

impl CompareSession {
    /// Connects to the source, then the target. If the target fails the
    /// source handle is closed before returning the error.
    pub async fn open(
        engine: DbEngine,
        source: &str,
        target: &str,
        options: CompareOptions,
    ) -> Result<Self, DbError> {
        let source_config = ConnectionConfig::new(engine, source);
        let target_config = ConnectionConfig::new(engine, target);

        info!("Connecting to source database");
        let source = connect(&source_config).await?;
        info!("Connecting to target database");
        let target = match connect(&target_config).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        Ok(Self::from_adapters(
            source,
            target,
            source_config,
            target_config,
            options,
        ))
    }

    pub fn from_adapters(
        source: Box<dyn DbAdapter>,
        target: Box<dyn DbAdapter>,
        source_config: ConnectionConfig,
        target_config: ConnectionConfig,
        options: CompareOptions,
    ) -> Self {
        Self {
            source,
            target,
            source_config,
            target_config,
            options,
        }
    }

    /// Runs the whole comparison, writing the text report to `out`.
    pub async fn run<W: Write>(&self, out: &mut W) -> Result<Report, DbError> {
        let source = self.source.as_ref();
        let target = self.target.as_ref();

        info!("Getting table lists");
        let source_tables = source.list_tables().await?;
        let target_tables = target.list_tables().await?;

        info!("Getting table schemas");
        let source_schemas = collect_schemas(source, &source_tables).await?;
        let target_schemas = collect_schemas(target, &target_tables).await?;

        info!("Collecting database information");
        let source_info = database_info(source, &self.source_config).await;
        let target_info = database_info(target, &self.target_config).await;
        write_database_info(out, &source_info, &target_info)?;

        let comparison = compare_databases(
            &source_schemas,
            &target_schemas,
            self.options.strict_structure,
        );

        let mut summary = ComparisonSummary {
            schema_only: self.options.schema_only,
            ..ComparisonSummary::default()
        };
        for table in comparison.differences.keys() {
            summary.mark_different(table);
        }

        writeln!(out, "\n=== Data Differences ===")?;
        if self.options.schema_only {
            writeln!(out, "Skipping data comparison (schema only)")?;
        } else {
            verify_row_counts(source, target, &comparison.common, &mut summary, out).await?;
        }
        write_table_lists(out, &comparison)?;

        if self.options.checksum && !self.options.schema_only {
            verify_checksums(
                source,
                target,
                &comparison.common,
                &source_schemas,
                &mut summary,
            )
            .await;
        }

        for table in comparison.missing.iter().chain(&comparison.extra) {
            summary.mark_different(table);
        }

        let report = Report::build(source_info, target_info, &comparison, &summary);
        report.write_text(out)?;
        Ok(report)
    }

    pub async fn close(self) {
        self.source.close().await;
        self.target.close().await;
    }
}

/// Opens both sides, runs, and closes both connections whatever the outcome.
pub async fn run_comparison<W: Write>(
    engine: DbEngine,
    source: &str,
    target: &str,
    options: CompareOptions,
    out: &mut W,
) -> Result<Report, DbError> {
    let session = CompareSession::open(engine, source, target, options).await?;
    let result = session.run(out).await;
    session.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::MockAdapter;
    use crate::models::schema::{ColumnSchema, TableSchema};
    use crate::models::summary::DataFingerprint;
    use crate::report::Difference;

    fn users() -> TableSchema {
        let mut schema = TableSchema::new("users");
        schema.columns = vec![
            ColumnSchema::new("id", "integer", false),
            ColumnSchema::new("email", "text", true),
        ];
        schema.mark_primary_key("id");
        schema
    }

    fn side(tables: &'static [&'static str], rows: i64) -> MockAdapter {
        let mut adapter = MockAdapter::new();
        adapter
            .expect_list_tables()
            .returning(move || Ok(tables.iter().map(|t| t.to_string()).collect()));
        adapter.expect_describe_table().returning(|name| {
            let mut schema = users();
            schema.name = name.to_string();
            Ok(schema)
        });
        adapter.expect_probe_size().returning(|| Ok(Some(4096)));
        adapter.expect_count_rows().returning(move |_| Ok(rows));
        adapter
            .expect_fingerprint()
            .returning(|_, _| Ok(DataFingerprint::ContentHash(Some("abc".to_string()))));
        adapter.expect_close().times(1).return_const(());
        adapter
    }

    fn session(source: MockAdapter, target: MockAdapter, options: CompareOptions) -> CompareSession {
        CompareSession::from_adapters(
            Box::new(source),
            Box::new(target),
            ConnectionConfig::new(DbEngine::Postgres, "postgres://u:p@src:5432/app"),
            ConnectionConfig::new(DbEngine::Postgres, "postgres://u:p@dst:5432/app"),
            options,
        )
    }

    #[tokio::test]
    async fn test_missing_and_extra_tables_are_the_only_differences() {
        let session = session(
            side(&["orders", "users"], 10),
            side(&["products", "users"], 10),
            CompareOptions::default(),
        );

        let mut out = Vec::new();
        let report = session.run(&mut out).await.unwrap();
        session.close().await;

        assert_eq!(report.missing_tables, vec!["orders".to_string()]);
        assert_eq!(report.extra_tables, vec!["products".to_string()]);
        assert_eq!(report.differences.len(), 2);
        assert!(report
            .differences
            .iter()
            .all(|d| !matches!(d, Difference::Schema { .. })));

        let text = String::from_utf8(out).unwrap();
        let order = [
            "=== Database Information ===",
            "=== Data Differences ===",
            "Progress: 100%",
            "Tables in source but not in target: [orders]",
            "=== Data Checksums ===",
            "=== Comparison Summary ===",
            "Found differences in 2 tables:",
            "=== Database Comparison Finished ===",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|needle| text.find(needle).unwrap_or_else(|| panic!("missing {}", needle)))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(text.contains("Source: src:5432, Database: app, Tables: 2, Size: 4.00 KB"));
    }

    #[tokio::test]
    async fn test_schema_only_skips_data_queries() {
        let mut source = MockAdapter::new();
        source
            .expect_list_tables()
            .returning(|| Ok(vec!["users".to_string()]));
        source.expect_describe_table().returning(|_| Ok(users()));
        source.expect_probe_size().returning(|| Ok(None));
        source.expect_count_rows().never();
        source.expect_fingerprint().never();

        let mut target = MockAdapter::new();
        target
            .expect_list_tables()
            .returning(|| Ok(vec!["users".to_string()]));
        target.expect_describe_table().returning(|_| {
            let mut schema = users();
            schema.columns[1].data_type = "varchar(255)".to_string();
            Ok(schema)
        });
        target.expect_probe_size().returning(|| Ok(None));
        target.expect_count_rows().never();
        target.expect_fingerprint().never();

        let options = CompareOptions {
            schema_only: true,
            ..CompareOptions::default()
        };
        let mut out = Vec::new();
        let report = session(source, target, options).run(&mut out).await.unwrap();

        assert!(report.schema_only);
        assert_eq!(
            report.differences,
            vec![Difference::Schema {
                table: "users".to_string(),
                first: "Column 'users.email' has different data type: source='text', target='varchar(255)'".to_string(),
                remaining: 0,
            }]
        );
    }

    #[tokio::test]
    async fn test_schema_extraction_failure_is_fatal() {
        let mut source = MockAdapter::new();
        source
            .expect_list_tables()
            .returning(|| Ok(vec!["users".to_string()]));
        source
            .expect_describe_table()
            .returning(|_| Err(DbError::Schema("primary key 'x' missing".to_string())));
        let mut target = MockAdapter::new();
        target.expect_list_tables().returning(|| Ok(vec![]));

        let mut out = Vec::new();
        let result = session(source, target, CompareOptions::default())
            .run(&mut out)
            .await;
        assert!(matches!(result, Err(DbError::Schema(_))));
        assert!(out.is_empty());
    }
}
