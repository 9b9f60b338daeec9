// Schema setup.
//
// The statements are idempotent (`IF NOT EXISTS`), so migrating an already
// migrated database is a no-op.

use sqlx::{AnyPool, Row};
use tracing::info;

use serena_billing::schema::SCHEMA_STATEMENTS;
use serena_core::SerenaError;

/// Tables the store needs.
pub const REQUIRED_TABLES: [&str; 2] = ["subscriptions", "webhook_events"];

/// Backend behind a connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Sqlite,
    Postgres,
}

impl DatabaseKind {
    pub fn from_url(url: &str) -> Result<Self, SerenaError> {
        if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else {
            Err(SerenaError::Config(format!(
                "unsupported database url scheme: {}",
                url.split(':').next().unwrap_or_default()
            )))
        }
    }

    fn list_tables_sql(&self) -> &'static str {
        match self {
            Self::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'table'",
            Self::Postgres => {
                "SELECT CAST(table_name AS TEXT) AS name FROM information_schema.tables \
                 WHERE table_schema = current_schema()"
            }
        }
    }
}

/// Apply the schema. Returns how many statements ran.
pub async fn run_migrations(pool: &AnyPool) -> Result<usize, SerenaError> {
    for stmt in SCHEMA_STATEMENTS {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| SerenaError::Store(format!("Migration failed: {e}")))?;
    }
    info!(statements = SCHEMA_STATEMENTS.len(), "schema migrated");
    Ok(SCHEMA_STATEMENTS.len())
}

/// Required tables not yet present.
pub async fn missing_tables(
    pool: &AnyPool,
    kind: DatabaseKind,
) -> Result<Vec<&'static str>, SerenaError> {
    let rows = sqlx::query(kind.list_tables_sql())
        .fetch_all(pool)
        .await
        .map_err(|e| SerenaError::Store(format!("Schema introspection failed: {e}")))?;

    let existing: Vec<String> = rows
        .iter()
        .filter_map(|row| row.try_get::<String, _>("name").ok())
        .collect();

    Ok(REQUIRED_TABLES
        .into_iter()
        .filter(|table| !existing.iter().any(|name| name == table))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_url() {
        assert_eq!(DatabaseKind::from_url("sqlite::memory:").unwrap(), DatabaseKind::Sqlite);
        assert_eq!(DatabaseKind::from_url("sqlite://serena.db").unwrap(), DatabaseKind::Sqlite);
        assert_eq!(
            DatabaseKind::from_url("postgres://u:p@localhost/serena").unwrap(),
            DatabaseKind::Postgres
        );
        assert!(DatabaseKind::from_url("mysql://localhost/serena").is_err());
    }
}
