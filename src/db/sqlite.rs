use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};

use crate::{
    errors::DbError,
    models::{
        connections::{sqlite_path, DbEngine},
        schema::{nullable_marker, ColumnSchema, ForeignKeySchema, IndexSchema, TableSchema},
        summary::DataFingerprint,
    },
};

use super::DbAdapter;

pub struct SqliteClient {
    pub pool: SqlitePool,
}

impl SqliteClient {
    /// Opens the file read-only; a missing file is a connection error.
    pub async fn connect(connection_string: &str) -> Result<Self, DbError> {
        let path = sqlite_path(connection_string);
        if path.is_empty() {
            return Err(DbError::Config("empty SQLite path".to_string()));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(format!("{}: {}", path, e)))?;

        Ok(Self { pool })
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl DbAdapter for SqliteClient {
    fn engine(&self) -> DbEngine {
        DbEngine::Sqlite
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::query("listing tables"))
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DbError> {
        let mut schema = TableSchema::new(table_name);

        let columns = sqlx::query(
            r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::query(format!("describing {}", table_name)))?;

        // pk holds the 1-based position within the primary key, 0 otherwise.
        let mut key_positions: Vec<(i64, String)> = Vec::new();
        for row in &columns {
            let name: String = row.try_get("name")?;
            let not_null: i64 = row.try_get("notnull")?;
            let pk: i64 = row.try_get("pk")?;

            schema.columns.push(ColumnSchema {
                name: name.clone(),
                data_type: row.try_get("type")?,
                nullable: nullable_marker(not_null == 0).to_string(),
                key: String::new(),
                default: row.try_get("dflt_value")?,
                extra: String::new(),
            });
            if pk > 0 {
                key_positions.push((pk, name));
            }
        }
        key_positions.sort();
        for (_, name) in &key_positions {
            schema.mark_primary_key(name);
        }

        let index_list = sqlx::query(r#"SELECT name, "unique" FROM pragma_index_list(?1)"#)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::query(format!("listing indexes of {}", table_name)))?;

        for index in &index_list {
            let index_name: String = index.try_get("name")?;
            let unique: i64 = index.try_get("unique")?;

            // Expression columns come back with a NULL name.
            let index_columns = sqlx::query_scalar::<_, Option<String>>(
                "SELECT name FROM pragma_index_info(?1) ORDER BY seqno",
            )
            .bind(&index_name)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::query(format!("reading index {}", index_name)))?;

            for column_name in index_columns.into_iter().flatten() {
                schema
                    .indexes
                    .push(IndexSchema::new(index_name.clone(), column_name, unique != 0));
            }
        }

        let foreign_keys = sqlx::query(
            r#"SELECT id, "table", "from", "to" FROM pragma_foreign_key_list(?1) ORDER BY id, seq"#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::query(format!("listing foreign keys of {}", table_name)))?;

        for row in &foreign_keys {
            let id: i64 = row.try_get("id")?;
            // SQLite does not name constraints.
            schema.foreign_keys.push(ForeignKeySchema {
                name: format!("fk_{}_{}", table_name, id),
                column_name: row.try_get("from")?,
                referenced_table: row.try_get("table")?,
                referenced_column: row
                    .try_get::<Option<String>, _>("to")?
                    .unwrap_or_default(),
            });
        }

        schema.validate()?;
        Ok(schema)
    }

    async fn count_rows(&self, table_name: &str) -> Result<i64, DbError> {
        sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM {}",
            quote_ident(table_name)
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::query(format!("counting rows of {}", table_name)))
    }

    /// Row count plus the total of all rowids. Weak: equal totals do not
    /// prove equal content. WITHOUT ROWID tables only get the count.
    async fn fingerprint(
        &self,
        table_name: &str,
        _schema: &TableSchema,
    ) -> Result<DataFingerprint, DbError> {
        let rows = self.count_rows(table_name).await?;

        let without_rowid = sqlx::query_scalar::<_, i64>(
            "SELECT wr FROM pragma_table_list(?1) WHERE schema = 'main'",
        )
        .bind(table_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::query(format!("inspecting {}", table_name)))?;
        if without_rowid == Some(1) {
            return Ok(DataFingerprint::RowSum {
                rows,
                rowid_total: None,
            });
        }

        let rowid_total = sqlx::query_scalar::<_, f64>(&format!(
            "SELECT total(rowid) FROM {}",
            quote_ident(table_name)
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::query(format!("summing rowids of {}", table_name)))?;

        Ok(DataFingerprint::RowSum {
            rows,
            rowid_total: Some(rowid_total),
        })
    }

    async fn probe_size(&self) -> Result<Option<i64>, DbError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::query("probing database size"))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
