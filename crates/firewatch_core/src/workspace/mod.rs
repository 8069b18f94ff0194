//! A workspace is one SQLite file holding the drone fleet and its fire events.

use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceMetadata {
    pub db_path: String,
    pub is_empty: bool,
    pub drone_count: i64,
    pub fire_event_count: i64,
}

fn remap(e: AppError, code: &str, message: &str) -> AppError {
    let details = e.details.clone().unwrap_or_else(|| e.to_string());
    AppError::new(code, message).with_details(details)
}

fn check_db_path(path: &Path) -> Result<(), AppError> {
    if path.as_os_str().is_empty() {
        return Err(AppError::new("WORKSPACE_INVALID_PATH", "Workspace path is empty"));
    }
    if path.is_dir() {
        return Err(
            AppError::new("WORKSPACE_INVALID_PATH", "Workspace path is a directory")
                .with_details(path.display().to_string()),
        );
    }
    Ok(())
}

fn metadata(db_path: &Path, conn: &Connection) -> Result<WorkspaceMetadata, AppError> {
    let drone_count = crate::repo::count_units(conn)?;
    let fire_event_count = crate::repo::count_incidents(conn)?;
    Ok(WorkspaceMetadata {
        db_path: db_path.to_string_lossy().to_string(),
        is_empty: drone_count == 0 && fire_event_count == 0,
        drone_count,
        fire_event_count,
    })
}

/// Open an existing workspace and bring its schema up to date.
pub fn open_workspace_connection(db_path: &Path) -> Result<Connection, AppError> {
    check_db_path(db_path)?;
    if !db_path.is_file() {
        return Err(
            AppError::new("WORKSPACE_DB_NOT_FOUND", "Workspace database file not found")
                .with_details(db_path.display().to_string()),
        );
    }

    let mut conn = crate::db::open(db_path)
        .map_err(|e| remap(e, "WORKSPACE_OPEN_FAILED", "Failed to open workspace database"))?;
    crate::db::migrate(&mut conn).map_err(|e| {
        remap(e, "WORKSPACE_MIGRATION_FAILED", "Failed to migrate workspace database")
    })?;
    Ok(conn)
}

/// Create a new workspace file (and its parent directories). Refuses to overwrite.
pub fn create_workspace_connection(db_path: &Path) -> Result<Connection, AppError> {
    check_db_path(db_path)?;
    if db_path.exists() {
        return Err(
            AppError::new("WORKSPACE_CREATE_FAILED", "Workspace database already exists")
                .with_details(db_path.display().to_string()),
        );
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::new("WORKSPACE_CREATE_FAILED", "Failed to create workspace directory")
                .with_details(format!("path={}; err={}", parent.display(), e))
        })?;
    }

    let mut conn = crate::db::open(db_path).map_err(|e| {
        remap(e, "WORKSPACE_CREATE_FAILED", "Failed to create workspace database")
    })?;
    crate::db::migrate(&mut conn).map_err(|e| {
        remap(e, "WORKSPACE_MIGRATION_FAILED", "Failed to migrate new workspace database")
    })?;
    info!(path = %db_path.display(), "workspace created");
    Ok(conn)
}

pub fn open_workspace(db_path: &Path) -> Result<WorkspaceMetadata, AppError> {
    let conn = open_workspace_connection(db_path)?;
    metadata(db_path, &conn)
}

pub fn create_workspace(db_path: &Path) -> Result<WorkspaceMetadata, AppError> {
    let conn = create_workspace_connection(db_path)?;
    metadata(db_path, &conn)
}

/// True when the workspace has neither drones nor fire events.
pub fn db_is_empty(db_path: &Path) -> Result<bool, AppError> {
    Ok(open_workspace(db_path)?.is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("firewatch.sqlite3");

        let meta = create_workspace(&path).unwrap();
        assert!(meta.is_empty);
        assert!(path.is_file());

        let err = create_workspace(&path).unwrap_err();
        assert_eq!(err.code, "WORKSPACE_CREATE_FAILED");

        assert!(db_is_empty(&path).unwrap());
    }

    #[test]
    fn open_missing_and_directory_paths_fail() {
        let dir = tempfile::tempdir().unwrap();
        let missing = open_workspace_connection(&dir.path().join("nope.sqlite3")).unwrap_err();
        assert_eq!(missing.code, "WORKSPACE_DB_NOT_FOUND");

        let is_dir = open_workspace_connection(dir.path()).unwrap_err();
        assert_eq!(is_dir.code, "WORKSPACE_INVALID_PATH");
    }
}
