use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow},
    ColumnIndex, MySqlPool, Row,
};

use crate::{
    errors::DbError,
    models::{
        connections::{DbEngine, MySqlDsn},
        schema::{ColumnSchema, ForeignKeySchema, IndexSchema, TableSchema, PRIMARY_KEY_MARKER},
        summary::DataFingerprint,
    },
};

use super::DbAdapter;

pub struct MySqlClient {
    pub pool: MySqlPool,
}

impl MySqlClient {
    /// Accepts `user:pass@host:port/db`, `user:pass@tcp(host:port)/db` or a
    /// `mysql://` URL.
    pub async fn connect(connection_string: &str) -> Result<Self, DbError> {
        let options = connect_options(connection_string)?;
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }
}

/// `mysql://` URLs go through sqlx's own parser; DSN forms are split into
/// their parts so that credentials never pass through URL decoding.
pub fn connect_options(connection_string: &str) -> Result<MySqlConnectOptions, DbError> {
    let cs = connection_string.trim();
    if cs.starts_with("mysql://") {
        return cs
            .parse::<MySqlConnectOptions>()
            .map_err(|e| DbError::Config(e.to_string()));
    }

    let dsn = MySqlDsn::parse(cs)?;
    let mut options = MySqlConnectOptions::new()
        .host(&dsn.host)
        .username(&dsn.username);
    if let Some(port) = dsn.port {
        options = options.port(port);
    }
    if let Some(password) = &dsn.password {
        options = options.password(password);
    }
    if let Some(database) = &dsn.database {
        options = options.database(database);
    }
    Ok(options)
}

pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

// Metadata statements return VARBINARY instead of VARCHAR on some server
// versions, so fall back to raw bytes.
fn text<I>(row: &MySqlRow, index: I) -> Result<String, DbError>
where
    I: ColumnIndex<MySqlRow> + Copy + std::fmt::Debug,
{
    optional_text(row, index)?.ok_or_else(|| {
        DbError::Schema(format!("unexpected NULL in metadata column {:?}", index))
    })
}

fn optional_text<I>(row: &MySqlRow, index: I) -> Result<Option<String>, DbError>
where
    I: ColumnIndex<MySqlRow> + Copy + std::fmt::Debug,
{
    match row.try_get::<Option<String>, _>(index) {
        Ok(value) => Ok(value),
        Err(_) => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map(|bytes| bytes.map(|b| String::from_utf8_lossy(&b).into_owned()))
            .map_err(DbError::query(format!("decoding column {:?}", index))),
    }
}

fn integer<I>(row: &MySqlRow, index: I) -> Result<Option<i64>, DbError>
where
    I: ColumnIndex<MySqlRow> + Copy + std::fmt::Debug,
{
    match row.try_get::<Option<i64>, _>(index) {
        Ok(value) => Ok(value),
        Err(_) => row
            .try_get::<Option<u64>, _>(index)
            .map(|value| value.map(|v| v as i64))
            .map_err(DbError::query(format!("decoding column {:?}", index))),
    }
}

#[async_trait]
impl DbAdapter for MySqlClient {
    fn engine(&self) -> DbEngine {
        DbEngine::MySql
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query("SHOW FULL TABLES WHERE Table_type = 'BASE TABLE'")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::query("listing tables"))?;

        rows.iter().map(|row| text(row, 0usize)).collect()
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DbError> {
        let mut schema = TableSchema::new(table_name);

        let columns = sqlx::query(&format!("DESCRIBE {}", quote_ident(table_name)))
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::query(format!("describing {}", table_name)))?;

        for row in &columns {
            let column = ColumnSchema {
                name: text(row, "Field")?,
                data_type: text(row, "Type")?,
                nullable: text(row, "Null")?,
                key: optional_text(row, "Key")?.unwrap_or_default(),
                default: optional_text(row, "Default")?,
                extra: optional_text(row, "Extra")?.unwrap_or_default(),
            };
            if column.key == PRIMARY_KEY_MARKER {
                schema.primary_keys.push(column.name.clone());
            }
            schema.columns.push(column);
        }

        // Columns are looked up by name; the positional layout of SHOW INDEX
        // changed between server versions.
        let indexes = sqlx::query(&format!("SHOW INDEX FROM {}", quote_ident(table_name)))
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::query(format!("listing indexes of {}", table_name)))?;

        for row in &indexes {
            // Functional indexes have no column name.
            let Some(column_name) = optional_text(row, "Column_name")? else {
                continue;
            };
            schema.indexes.push(IndexSchema {
                name: text(row, "Key_name")?,
                column_name,
                non_unique: integer(row, "Non_unique")?.unwrap_or(1) as i32,
            });
        }

        let foreign_keys = sqlx::query(
            r#"
            SELECT
                CAST(CONSTRAINT_NAME AS CHAR) AS constraint_name,
                CAST(COLUMN_NAME AS CHAR) AS column_name,
                CAST(REFERENCED_TABLE_NAME AS CHAR) AS referenced_table,
                CAST(REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE()
              AND TABLE_NAME = ?
              AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::query(format!("listing foreign keys of {}", table_name)))?;

        for row in &foreign_keys {
            schema.foreign_keys.push(ForeignKeySchema {
                name: text(row, "constraint_name")?,
                column_name: text(row, "column_name")?,
                referenced_table: text(row, "referenced_table")?,
                referenced_column: text(row, "referenced_column")?,
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

    async fn fingerprint(
        &self,
        table_name: &str,
        _schema: &TableSchema,
    ) -> Result<DataFingerprint, DbError> {
        let row = sqlx::query(&format!("CHECKSUM TABLE {}", quote_ident(table_name)))
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::query(format!("checksumming {}", table_name)))?;

        Ok(DataFingerprint::Checksum(integer(&row, "Checksum")?))
    }

    async fn probe_size(&self) -> Result<Option<i64>, DbError> {
        sqlx::query_scalar::<_, Option<i64>>(
            r#"
            SELECT CAST(SUM(data_length + index_length) AS SIGNED)
            FROM information_schema.tables
            WHERE table_schema = DATABASE()
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::query("probing database size"))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
