use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::AppError;

const MIGRATION_0001: (&str, &str) = (
    "0001_init.sql",
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0001_init.sql"
    )),
);

fn migrations() -> Vec<(&'static str, &'static str)> {
    vec![MIGRATION_0001]
}

pub fn open(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(path)
        .map_err(|e| AppError::wrap("DB_OPEN_FAILED", "Failed to open SQLite database", e))?;
    enable_foreign_keys(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    let conn = Connection::open_in_memory().map_err(|e| {
        AppError::wrap(
            "DB_OPEN_FAILED",
            "Failed to open in-memory SQLite database",
            e,
        )
    })?;
    enable_foreign_keys(&conn)?;
    Ok(conn)
}

fn enable_foreign_keys(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| AppError::wrap("DB_PRAGMA_FAILED", "Failed to enable foreign keys", e))
}

/// Apply pending migrations, each exactly once, in name order.
pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    conn.execute_batch(
        r#"
      CREATE TABLE IF NOT EXISTS _migrations (
        name TEXT PRIMARY KEY NOT NULL,
        applied_at TEXT NOT NULL
      );
    "#,
    )
    .map_err(|e| {
        AppError::wrap(
            "DB_MIGRATIONS_TABLE_FAILED",
            "Failed to ensure migrations table exists",
            e,
        )
    })?;

    let applied: HashSet<String> = {
        let mut stmt = conn.prepare("SELECT name FROM _migrations").map_err(|e| {
            AppError::wrap(
                "DB_MIGRATIONS_QUERY_FAILED",
                "Failed to query applied migrations",
                e,
            )
        })?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| {
                AppError::wrap(
                    "DB_MIGRATIONS_QUERY_FAILED",
                    "Failed to read applied migrations",
                    e,
                )
            })?;
        rows.collect::<Result<_, _>>().map_err(|e| {
            AppError::wrap(
                "DB_MIGRATIONS_QUERY_FAILED",
                "Failed to read applied migration row",
                e,
            )
        })?
    };

    for (name, sql) in migrations() {
        if applied.contains(name) {
            debug!(migration = name, "already applied");
            continue;
        }

        let tx = conn.transaction().map_err(|e| {
            AppError::wrap("DB_TX_FAILED", "Failed to start migration transaction", e)
        })?;

        tx.execute_batch(sql).map_err(|e| {
            AppError::wrap("DB_MIGRATION_FAILED", format!("Migration {name} failed"), e)
        })?;

        tx.execute(
            "INSERT INTO _migrations(name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
            [name],
        )
        .map_err(|e| {
            AppError::wrap(
                "DB_MIGRATION_FAILED",
                format!("Failed to record migration {name}"),
                e,
            )
        })?;

        tx.commit().map_err(|e| {
            AppError::wrap("DB_TX_FAILED", "Failed to commit migration transaction", e)
        })?;
        info!(migration = name, "applied migration");
    }

    Ok(())
}
