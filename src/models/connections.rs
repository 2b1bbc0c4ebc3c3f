use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::DbError;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DbEngine {
    MySql,
    Postgres,
    Sqlite,
}

impl DbEngine {
    pub const ALL: [DbEngine; 3] = [DbEngine::MySql, DbEngine::Postgres, DbEngine::Sqlite];

    pub fn as_str(&self) -> &'static str {
        match self {
            DbEngine::MySql => "mysql",
            DbEngine::Postgres => "postgres",
            DbEngine::Sqlite => "sqlite",
        }
    }

    /// Strips the URL scheme the engine's driver does not want to see.
    /// PostgreSQL keeps its scheme since the driver accepts it natively.
    pub fn normalize_connection_string<'a>(&self, raw: &'a str) -> &'a str {
        let raw = raw.trim();
        match self {
            DbEngine::MySql => raw.strip_prefix("mysql://").unwrap_or(raw),
            DbEngine::Sqlite => raw.strip_prefix("sqlite://").unwrap_or(raw),
            DbEngine::Postgres => raw,
        }
    }
}

impl fmt::Display for DbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbEngine {
    type Err = DbError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "mysql" => Ok(DbEngine::MySql),
            "postgres" => Ok(DbEngine::Postgres),
            "sqlite" => Ok(DbEngine::Sqlite),
            other => Err(DbError::UnsupportedEngine(other.to_string())),
        }
    }
}

/// Connection descriptor for one side of the comparison.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConnectionConfig {
    pub engine: DbEngine,
    /// Descriptor after scheme stripping; what the adapter's `connect` receives.
    pub connection_string: String,
}

impl ConnectionConfig {
    pub fn new(engine: DbEngine, raw: &str) -> Self {
        Self {
            engine,
            connection_string: engine.normalize_connection_string(raw).to_string(),
        }
    }

    /// Host and database name for display. SQLite is always `local`.
    pub fn location(&self) -> (String, String) {
        if self.engine == DbEngine::Sqlite {
            return ("local".to_string(), sqlite_path(&self.connection_string).to_string());
        }

        let without_scheme = match self.connection_string.split_once("://") {
            Some((_, rest)) => rest,
            None => self.connection_string.as_str(),
        };
        let host_and_db = match without_scheme.rsplit_once('@') {
            Some((_, rest)) => rest,
            None => without_scheme,
        };
        let (host, database) = match host_and_db.split_once('/') {
            Some((host, rest)) => (host, rest.split('?').next().unwrap_or_default()),
            None => (host_and_db, ""),
        };
        let host = host
            .strip_prefix("tcp(")
            .and_then(|h| h.strip_suffix(')'))
            .unwrap_or(host);

        (host.to_string(), database.to_string())
    }
}

/// Parts of a MySQL descriptor in the `user:pass@host:port/db` or
/// `user:pass@tcp(host:port)/db` form. Credentials are taken verbatim, so a
/// password may hold `/`, `#`, `?`, `:` or `@`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MySqlDsn {
    pub username: String,
    pub password: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub database: Option<String>,
}

impl MySqlDsn {
    pub fn parse(connection_string: &str) -> Result<Self, DbError> {
        let cs = connection_string.trim();
        if cs.is_empty() {
            return Err(DbError::Config("empty MySQL connection string".to_string()));
        }

        let (credentials, address) = match cs.rsplit_once('@') {
            Some((credentials, address)) => (Some(credentials), address),
            None => (None, cs),
        };
        let (username, password) = match credentials {
            Some(credentials) => match credentials.split_once(':') {
                Some((user, password)) => (user.to_string(), Some(password.to_string())),
                None => (credentials.to_string(), None),
            },
            None => (String::new(), None),
        };

        // Driver parameters after `?` are not forwarded.
        let address = address.split('?').next().unwrap_or(address);
        let (host, database) = match address.split_once('/') {
            Some((host, database)) if !database.is_empty() => (host, Some(database.to_string())),
            Some((host, _)) => (host, None),
            None => (address, None),
        };
        let host = match host.strip_prefix("tcp(") {
            Some(inner) => inner.strip_suffix(')').ok_or_else(|| {
                DbError::Config(format!("unterminated tcp(...) in '{}'", host))
            })?,
            None => host,
        };

        let (host, port) = match host.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| DbError::Config(format!("invalid MySQL port '{}'", port)))?;
                (host, Some(port))
            }
            None => (host, None),
        };

        Ok(Self {
            username,
            password,
            host: if host.is_empty() { "localhost" } else { host }.to_string(),
            port,
            database,
        })
    }
}

/// Filesystem path of a SQLite descriptor with `sqlite:`/`file:` prefixes and
/// `?` parameters removed.
pub fn sqlite_path(connection_string: &str) -> &str {
    let path = connection_string.trim();
    let path = path
        .strip_prefix("sqlite://")
        .or_else(|| path.strip_prefix("sqlite:"))
        .unwrap_or(path);
    let path = path.strip_prefix("file:").unwrap_or(path);
    path.split('?').next().unwrap_or(path)
}
