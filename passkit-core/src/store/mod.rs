//! SQLite storage backend for passes, devices, registrations, identities
//! and drip campaigns.

pub mod models;
pub mod passes;
pub mod registrations;
pub mod sequences;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Storage error types.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage lock poisoned")]
    LockPoisoned,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Thread-safe storage handle. Cheap to clone; all clones share one
/// connection behind a mutex.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory database, used by tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS signing_identities (
                id TEXT PRIMARY KEY,
                pass_type_id TEXT NOT NULL,
                team_id TEXT NOT NULL,
                auth_key TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'ACTIVE'
                    CHECK (status IN ('ACTIVE', 'BURNED', 'COOLDOWN')),
                priority INTEGER NOT NULL DEFAULT 0,
                last_used_at INTEGER,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS passes (
                id TEXT PRIMARY KEY,
                serial_number TEXT NOT NULL UNIQUE,
                authentication_token TEXT NOT NULL UNIQUE,
                signing_identity_id TEXT NOT NULL,
                data TEXT NOT NULL,
                last_modified INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (signing_identity_id) REFERENCES signing_identities(id)
            );

            CREATE TABLE IF NOT EXISTS devices (
                id TEXT PRIMARY KEY,
                device_library_identifier TEXT NOT NULL UNIQUE,
                push_token TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS registrations (
                pass_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (pass_id, device_id),
                FOREIGN KEY (pass_id) REFERENCES passes(id),
                FOREIGN KEY (device_id) REFERENCES devices(id)
            );

            CREATE TABLE IF NOT EXISTS sequences (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sequence_steps (
                sequence_id TEXT NOT NULL,
                step_number INTEGER NOT NULL,
                delay_hours INTEGER NOT NULL,
                message_template TEXT NOT NULL,
                PRIMARY KEY (sequence_id, step_number),
                FOREIGN KEY (sequence_id) REFERENCES sequences(id)
            );

            CREATE TABLE IF NOT EXISTS sequence_enrollments (
                id TEXT PRIMARY KEY,
                pass_id TEXT NOT NULL,
                sequence_id TEXT NOT NULL,
                current_step INTEGER NOT NULL,
                next_execution_at INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'ACTIVE'
                    CHECK (status IN ('ACTIVE', 'PAUSED', 'COMPLETED')),
                created_at INTEGER NOT NULL,
                FOREIGN KEY (pass_id) REFERENCES passes(id),
                FOREIGN KEY (sequence_id) REFERENCES sequences(id)
            );

            CREATE INDEX IF NOT EXISTS idx_passes_serial
                ON passes(serial_number);
            CREATE INDEX IF NOT EXISTS idx_passes_identity
                ON passes(signing_identity_id);
            CREATE INDEX IF NOT EXISTS idx_registrations_device
                ON registrations(device_id);
            CREATE INDEX IF NOT EXISTS idx_identities_pass_type
                ON signing_identities(pass_type_id, status);
            CREATE INDEX IF NOT EXISTS idx_enrollments_due
                ON sequence_enrollments(status, next_execution_at);",
        )?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::IdentityStatus;
    use serde_json::json;

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passes.db");
        {
            let store = Store::open(&path).unwrap();
            let identity = store
                .create_identity("pass.com.example.coupon", "TEAM01", "k1", IdentityStatus::Active, 0)
                .unwrap();
            store
                .create_pass("S1", "tok-1", &identity.id, &json!({}))
                .unwrap();
        }

        let reopened = Store::open(&path).unwrap();
        assert!(reopened.pass_by_serial("S1").unwrap().is_some());
    }
}
