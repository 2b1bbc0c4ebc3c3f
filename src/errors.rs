use thiserror::Error;

/// Error type shared by every adapter and by the comparison run.
#[derive(Error, Debug)]
pub enum DbError {
    /// Raw driver failure that was not given more context.
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    /// The handle to a database could not be opened.
    #[error("Connection error: {0}")]
    Connection(String),
    /// The engine tag given on the command line is not one of mysql, postgres, sqlite.
    #[error("unsupported database type: {0}")]
    UnsupportedEngine(String),
    /// A single query failed.
    #[error("Query error ({context}): {source}")]
    Query {
        context: String,
        #[source]
        source: sqlx::Error,
    },
    /// Best-effort size or host information could not be collected.
    #[error("Size probe error: {0}")]
    SizeProbe(String),
    /// Extracted schema violates the model's invariants.
    #[error("Schema error: {0}")]
    Schema(String),
    /// Invalid run configuration (e.g. a malformed connection string).
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub fn query(context: impl Into<String>) -> impl FnOnce(sqlx::Error) -> DbError {
        let context = context.into();
        move |source| DbError::Query { context, source }
    }
}
