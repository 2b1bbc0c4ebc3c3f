use std::collections::BTreeMap;

use async_trait::async_trait;
use log::{debug, warn};

use crate::{
    errors::DbError,
    models::{
        connections::{ConnectionConfig, DbEngine},
        schema::TableSchema,
        summary::{DataFingerprint, DataVerdict, DatabaseInfo, RowCounts},
    },
};

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use mysql::MySqlClient;
use postgres::PostgresClient;
use sqlite::SqliteClient;

/// Engine-specific access to one database. Implementations absorb the
/// differences between the engines' catalogs so that callers only ever see
/// the common schema model.
#[async_trait]
pub trait DbAdapter: Send + Sync {
    fn engine(&self) -> DbEngine;
    /// Base tables only; views and system tables are excluded.
    async fn list_tables(&self) -> Result<Vec<String>, DbError>;
    async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DbError>;
    async fn count_rows(&self, table_name: &str) -> Result<i64, DbError>;
    /// Best content signal the engine can produce for `table_name`.
    async fn fingerprint(
        &self,
        table_name: &str,
        schema: &TableSchema,
    ) -> Result<DataFingerprint, DbError>;
    /// Total size in bytes, `None` when the engine returned nothing.
    async fn probe_size(&self) -> Result<Option<i64>, DbError>;
    async fn close(&self);
}

/// Opens the adapter matching `config.engine`.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn DbAdapter>, DbError> {
    debug!("Connecting to {} database", config.engine);
    let adapter: Box<dyn DbAdapter> = match config.engine {
        DbEngine::MySql => Box::new(MySqlClient::connect(&config.connection_string).await?),
        DbEngine::Postgres => {
            Box::new(PostgresClient::connect(&config.connection_string).await?)
        }
        DbEngine::Sqlite => Box::new(SqliteClient::connect(&config.connection_string).await?),
    };
    Ok(adapter)
}

/// Counts rows on the source, then on the target.
pub async fn compare_row_counts(
    source: &dyn DbAdapter,
    target: &dyn DbAdapter,
    table_name: &str,
) -> Result<RowCounts, DbError> {
    let source_count = source.count_rows(table_name).await?;
    let target_count = target.count_rows(table_name).await?;
    Ok(RowCounts {
        source: source_count,
        target: target_count,
    })
}

pub async fn compare_by_checksum(
    source: &dyn DbAdapter,
    target: &dyn DbAdapter,
    table_name: &str,
    schema: &TableSchema,
) -> Result<DataVerdict, DbError> {
    let source_fp = source.fingerprint(table_name, schema).await?;
    let target_fp = target.fingerprint(table_name, schema).await?;
    let verdict = compare_fingerprints(&source_fp, &target_fp);
    debug!("Table '{}': {}", table_name, verdict.describe());
    Ok(verdict)
}

pub fn compare_fingerprints(source: &DataFingerprint, target: &DataFingerprint) -> DataVerdict {
    let tier = source.tier();
    let mismatch = |reason: String| DataVerdict::Mismatch { tier, reason };

    match (source, target) {
        (DataFingerprint::Checksum(s), DataFingerprint::Checksum(t)) => match (s, t) {
            (None, None) => DataVerdict::Indeterminate {
                reason: "checksum not available on either side".to_string(),
            },
            (Some(_), None) | (None, Some(_)) => {
                mismatch("checksum available on one side only".to_string())
            }
            (Some(s), Some(t)) if s != t => {
                mismatch(format!("checksums differ: source={}, target={}", s, t))
            }
            _ => DataVerdict::Match { tier },
        },
        (DataFingerprint::ContentHash(s), DataFingerprint::ContentHash(t)) => match (s, t) {
            (Some(_), None) | (None, Some(_)) => {
                mismatch("table is empty on one side only".to_string())
            }
            (Some(s), Some(t)) if s != t => mismatch("content hashes differ".to_string()),
            _ => DataVerdict::Match { tier },
        },
        (
            DataFingerprint::RowSum {
                rows: source_rows,
                rowid_total: source_total,
            },
            DataFingerprint::RowSum {
                rows: target_rows,
                rowid_total: target_total,
            },
        ) => {
            if source_rows != target_rows {
                mismatch(format!(
                    "row counts differ: source={}, target={}",
                    source_rows, target_rows
                ))
            } else if matches!((source_total, target_total), (Some(s), Some(t)) if s != t) {
                mismatch("rowid totals differ".to_string())
            } else {
                DataVerdict::Match { tier }
            }
        }
        _ => DataVerdict::Indeterminate {
            reason: "fingerprints come from different engines".to_string(),
        },
    }
}

/// Extracts every listed table. Any failure aborts: the comparison has no
/// valid input without a complete schema set.
pub async fn collect_schemas(
    adapter: &dyn DbAdapter,
    tables: &[String],
) -> Result<BTreeMap<String, TableSchema>, DbError> {
    let mut schemas = BTreeMap::new();
    for table in tables {
        let schema = adapter.describe_table(table).await?;
        schemas.insert(table.clone(), schema);
    }
    Ok(schemas)
}

/// Best effort; every failure is logged and leaves the field at zero.
pub async fn database_info(adapter: &dyn DbAdapter, config: &ConnectionConfig) -> DatabaseInfo {
    let (host, database_name) = config.location();
    let mut info = DatabaseInfo {
        host,
        database_name,
        ..DatabaseInfo::default()
    };

    match adapter.list_tables().await {
        Ok(tables) => info.table_count = tables.len(),
        Err(e) => warn!("couldn't count tables of {}: {}", info.database_name, e),
    }

    match adapter.probe_size().await {
        Ok(Some(size)) => info.total_size = size,
        Ok(None) => warn!(
            "{}",
            DbError::SizeProbe(format!("no size reported for {}", info.database_name))
        ),
        Err(e) => warn!("{}", DbError::SizeProbe(e.to_string())),
    }

    info
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::summary::Tier;
    use mockall::{mock, predicate};

    mock! {
        pub Adapter {}

        #[async_trait]
        impl DbAdapter for Adapter {
            fn engine(&self) -> DbEngine;
            async fn list_tables(&self) -> Result<Vec<String>, DbError>;
            async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DbError>;
            async fn count_rows(&self, table_name: &str) -> Result<i64, DbError>;
            async fn fingerprint(&self, table_name: &str, schema: &TableSchema) -> Result<DataFingerprint, DbError>;
            async fn probe_size(&self) -> Result<Option<i64>, DbError>;
            async fn close(&self);
        }
    }

    #[test]
    fn test_checksum_unavailable_on_both_sides_is_indeterminate() {
        let verdict = compare_fingerprints(
            &DataFingerprint::Checksum(None),
            &DataFingerprint::Checksum(None),
        );
        assert_eq!(verdict.differs(), None);
    }

    #[test]
    fn test_checksum_tiers() {
        let differs = compare_fingerprints(
            &DataFingerprint::Checksum(Some(1)),
            &DataFingerprint::Checksum(Some(2)),
        );
        assert!(matches!(
            differs,
            DataVerdict::Mismatch { tier: Tier::NativeChecksum, .. }
        ));
        assert_eq!(
            compare_fingerprints(
                &DataFingerprint::Checksum(Some(7)),
                &DataFingerprint::Checksum(None)
            )
            .differs(),
            Some(true)
        );
        assert_eq!(
            compare_fingerprints(
                &DataFingerprint::Checksum(Some(7)),
                &DataFingerprint::Checksum(Some(7))
            ),
            DataVerdict::Match { tier: Tier::NativeChecksum }
        );
    }

    #[test]
    fn test_content_hash_of_two_empty_tables_matches() {
        let verdict = compare_fingerprints(
            &DataFingerprint::ContentHash(None),
            &DataFingerprint::ContentHash(None),
        );
        assert_eq!(verdict, DataVerdict::Match { tier: Tier::ContentHash });

        let verdict = compare_fingerprints(
            &DataFingerprint::ContentHash(Some("abc".to_string())),
            &DataFingerprint::ContentHash(Some("abd".to_string())),
        );
        assert_eq!(verdict.differs(), Some(true));
    }

    #[test]
    fn test_row_sum_checks_counts_before_totals() {
        let verdict = compare_fingerprints(
            &DataFingerprint::RowSum { rows: 3, rowid_total: Some(6.0) },
            &DataFingerprint::RowSum { rows: 4, rowid_total: Some(6.0) },
        );
        match verdict {
            DataVerdict::Mismatch { tier, reason } => {
                assert_eq!(tier, Tier::RowHeuristic);
                assert!(reason.contains("row counts"));
            }
            other => panic!("unexpected verdict: {:?}", other),
        }

        let verdict = compare_fingerprints(
            &DataFingerprint::RowSum { rows: 3, rowid_total: Some(6.0) },
            &DataFingerprint::RowSum { rows: 3, rowid_total: Some(7.0) },
        );
        assert!(matches!(verdict, DataVerdict::Mismatch { ref reason, .. } if reason.contains("rowid")));

        let verdict = compare_fingerprints(
            &DataFingerprint::RowSum { rows: 3, rowid_total: Some(6.0) },
            &DataFingerprint::RowSum { rows: 3, rowid_total: Some(6.0) },
        );
        assert_eq!(verdict, DataVerdict::Match { tier: Tier::RowHeuristic });
    }

    #[test]
    fn test_row_sum_without_rowid_compares_counts_only() {
        let verdict = compare_fingerprints(
            &DataFingerprint::RowSum { rows: 2, rowid_total: None },
            &DataFingerprint::RowSum { rows: 2, rowid_total: None },
        );
        assert_eq!(verdict, DataVerdict::Match { tier: Tier::RowHeuristic });

        let verdict = compare_fingerprints(
            &DataFingerprint::RowSum { rows: 2, rowid_total: None },
            &DataFingerprint::RowSum { rows: 5, rowid_total: None },
        );
        assert!(matches!(verdict, DataVerdict::Mismatch { ref reason, .. } if reason.contains("row counts")));
    }

    #[test]
    fn test_mixed_engines_are_indeterminate() {
        let verdict = compare_fingerprints(
            &DataFingerprint::Checksum(Some(1)),
            &DataFingerprint::ContentHash(Some("1".to_string())),
        );
        assert_eq!(verdict.differs(), None);
    }

    #[tokio::test]
    async fn test_compare_row_counts_queries_both_sides() {
        let mut source = MockAdapter::new();
        source
            .expect_count_rows()
            .with(predicate::eq("users"))
            .returning(|_| Ok(100));
        let mut target = MockAdapter::new();
        target
            .expect_count_rows()
            .with(predicate::eq("users"))
            .returning(|_| Ok(101));

        let counts = compare_row_counts(&source, &target, "users").await.unwrap();
        assert_eq!(counts, RowCounts { source: 100, target: 101 });
        assert!(counts.differ());
    }

    #[tokio::test]
    async fn test_compare_by_checksum_uses_both_fingerprints() {
        let mut source = MockAdapter::new();
        source
            .expect_fingerprint()
            .returning(|_, _| Ok(DataFingerprint::ContentHash(Some("aa".to_string()))));
        let mut target = MockAdapter::new();
        target
            .expect_fingerprint()
            .returning(|_, _| Ok(DataFingerprint::ContentHash(Some("aa".to_string()))));

        let schema = TableSchema::new("users");
        let verdict = compare_by_checksum(&source, &target, "users", &schema)
            .await
            .unwrap();
        assert_eq!(verdict, DataVerdict::Match { tier: Tier::ContentHash });
    }

    #[tokio::test]
    async fn test_collect_schemas_stops_on_first_failure() {
        let mut adapter = MockAdapter::new();
        adapter
            .expect_describe_table()
            .with(predicate::eq("users"))
            .returning(|name| Ok(TableSchema::new(name)));
        adapter
            .expect_describe_table()
            .with(predicate::eq("orders"))
            .returning(|_| Err(DbError::Schema("broken".to_string())));

        let tables = vec!["users".to_string(), "orders".to_string()];
        assert!(collect_schemas(&adapter, &tables).await.is_err());

        let schemas = collect_schemas(&adapter, &tables[..1]).await.unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas["users"].name, "users");
    }

    #[tokio::test]
    async fn test_database_info_never_fails() {
        let mut adapter = MockAdapter::new();
        adapter
            .expect_list_tables()
            .returning(|| Ok(vec!["a".to_string(), "b".to_string()]));
        adapter
            .expect_probe_size()
            .returning(|| Err(DbError::Config("no permission".to_string())));

        let config = ConnectionConfig::new(DbEngine::Postgres, "postgres://u:p@db:5432/app");
        let info = database_info(&adapter, &config).await;

        assert_eq!(info.host, "db:5432");
        assert_eq!(info.database_name, "app");
        assert_eq!(info.table_count, 2);
        assert_eq!(info.total_size, 0);
    }
}
