use log::info;
use rusqlite::Connection;

use crate::db::Database;
use crate::error::DatabaseError;
use crate::WorkingDirectory;

static SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/db/schema.sql"));

impl Database {
    /// Open (or create) `autolaunch.db` in the working directory and apply the schema
    pub fn open(wd: &WorkingDirectory) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(&wd.path).map_err(|source| DatabaseError::Io { path: wd.path.clone(), source })?;

        let path = wd.path.join("autolaunch.db");
        if !path.exists() {
            info!("Creating new database {}", path.display())
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Database opened at {}", path.display());
        Ok(Database::new(conn))
    }

    /// Opens an in-memory database for testing
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Database::new(conn))
    }
}
