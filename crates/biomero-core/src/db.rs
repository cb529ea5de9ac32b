use anyhow::{Context, Result};
use directories::ProjectDirs;
use rusqlite::Connection;
use std::path::PathBuf;

/// Returns the biomero data directory, creating it if needed.
/// Location: `~/.local/share/biomero/` (XDG-compliant)
pub fn data_dir() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "biomero").context("Could not determine data directory")?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    Ok(data_dir.to_path_buf())
}

/// Returns the path to the local history database.
pub fn db_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("biomero.db"))
}

/// Opens (or creates) the local SQLite database and returns the connection.
pub fn open_db() -> Result<Connection> {
    let path = db_path()?;
    let conn = Connection::open(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    Ok(conn)
}

/// Open an in-memory database for testing.
pub fn open_memory_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}
