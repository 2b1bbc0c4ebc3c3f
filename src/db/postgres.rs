use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use crate::{
    errors::DbError,
    models::{
        connections::DbEngine,
        schema::{ColumnSchema, ForeignKeySchema, IndexSchema, TableSchema},
        summary::DataFingerprint,
    },
};

use super::DbAdapter;

/// Adapter for the `public` schema of a PostgreSQL database.
pub struct PostgresClient {
    pub pool: PgPool,
}

impl PostgresClient {
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Deterministic ordering for the content hash: primary-key columns when the
/// table has any, every column otherwise. Empty for a table without columns.
pub fn order_by_clause(schema: &TableSchema) -> String {
    let columns: Vec<&str> = if schema.primary_keys.is_empty() {
        schema.columns.iter().map(|c| c.name.as_str()).collect()
    } else {
        schema.primary_keys.iter().map(String::as_str).collect()
    };

    columns
        .iter()
        .map(|c| format!("t.{}", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn content_hash_query(table_name: &str, schema: &TableSchema) -> String {
    let order_by = order_by_clause(schema);
    let aggregate = if order_by.is_empty() {
        "array_agg(t.*)".to_string()
    } else {
        format!("array_agg(t.* ORDER BY {})", order_by)
    };
    format!(
        "SELECT MD5(CAST({} AS text)) FROM {} t",
        aggregate,
        quote_ident(table_name)
    )
}

#[async_trait]
impl DbAdapter for PostgresClient {
    fn engine(&self) -> DbEngine {
        DbEngine::Postgres
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let query = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::query("listing tables"))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("table_name")
                    .map_err(DbError::query("reading table name"))
            })
            .collect()
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DbError> {
        let mut schema = TableSchema::new(table_name);

        let rows = sqlx::query(
            r#"
            SELECT
                column_name::text AS column_name,
                data_type::text AS data_type,
                is_nullable::text AS is_nullable,
                column_default::text AS column_default
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::query(format!("describing {}", table_name)))?;

        for row in &rows {
            schema.columns.push(ColumnSchema {
                name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
                nullable: row.try_get("is_nullable")?,
                key: String::new(),
                default: row.try_get("column_default")?,
                extra: String::new(),
            });
        }

        // The column list has to exist before the key pass can mark columns.
        let primary_keys = sqlx::query_scalar::<_, String>(
            r#"
            SELECT a.attname::text
            FROM pg_index i
            JOIN pg_attribute a
              ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
            WHERE i.indrelid = ('public.' || quote_ident($1))::regclass
              AND i.indisprimary
            ORDER BY array_position(i.indkey::int2[], a.attnum)
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::query(format!("reading primary key of {}", table_name)))?;

        for pk in &primary_keys {
            schema.mark_primary_key(pk);
        }

        let indexes = sqlx::query(
            r#"
            SELECT
                i.relname::text AS index_name,
                a.attname::text AS column_name,
                ix.indisunique AS is_unique
            FROM pg_class t
            JOIN pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_index ix ON ix.indrelid = t.oid
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            WHERE t.relkind = 'r'
              AND n.nspname = 'public'
              AND t.relname = $1
            ORDER BY i.relname, array_position(ix.indkey::int2[], a.attnum)
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::query(format!("listing indexes of {}", table_name)))?;

        for row in &indexes {
            let name: String = row.try_get("index_name")?;
            let column_name: String = row.try_get("column_name")?;
            let is_unique: bool = row.try_get("is_unique")?;
            schema
                .indexes
                .push(IndexSchema::new(name, column_name, is_unique));
        }

        let foreign_keys = sqlx::query(
            r#"
            SELECT
                tc.constraint_name::text AS constraint_name,
                kcu.column_name::text AS column_name,
                ccu.table_name::text AS referenced_table,
                ccu.column_name::text AS referenced_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
              ON ccu.constraint_name = tc.constraint_name
             AND ccu.table_schema = tc.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
              AND tc.table_schema = 'public'
              AND tc.table_name = $1
            ORDER BY tc.constraint_name, kcu.ordinal_position
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::query(format!("listing foreign keys of {}", table_name)))?;

        for row in &foreign_keys {
            schema.foreign_keys.push(ForeignKeySchema {
                name: row.try_get("constraint_name")?,
                column_name: row.try_get("column_name")?,
                referenced_table: row.try_get("referenced_table")?,
                referenced_column: row.try_get("referenced_column")?,
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

    /// MD5 over the text form of all rows aggregated in primary-key order.
    async fn fingerprint(
        &self,
        table_name: &str,
        schema: &TableSchema,
    ) -> Result<DataFingerprint, DbError> {
        let query = content_hash_query(table_name, schema);
        let hash = sqlx::query_scalar::<_, Option<String>>(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::query(format!("hashing {}", table_name)))?;

        Ok(DataFingerprint::ContentHash(hash))
    }

    async fn probe_size(&self) -> Result<Option<i64>, DbError> {
        sqlx::query_scalar::<_, Option<i64>>("SELECT pg_database_size(current_database())")
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::query("probing database size"))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
