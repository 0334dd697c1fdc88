//! Devices and their pass registrations.

use crate::store::models::Device;
use crate::store::{Store, StoreError};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

fn row_to_device(row: &Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        device_library_identifier: row.get(1)?,
        push_token: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

impl Store {
    /// Create a device record, or refresh the push token of an existing one.
    pub fn upsert_device(
        &self,
        device_library_identifier: &str,
        push_token: &str,
    ) -> Result<Device, StoreError> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO devices (id, device_library_identifier, push_token, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(device_library_identifier) DO UPDATE SET
                push_token = excluded.push_token,
                updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                device_library_identifier,
                push_token,
                now,
            ],
        )?;
        let device = conn.query_row(
            "SELECT id, device_library_identifier, push_token, updated_at
             FROM devices WHERE device_library_identifier = ?1",
            [device_library_identifier],
            row_to_device,
        )?;
        Ok(device)
    }

    pub fn device_by_identifier(
        &self,
        device_library_identifier: &str,
    ) -> Result<Option<Device>, StoreError> {
        let conn = self.conn()?;
        let device = conn
            .query_row(
                "SELECT id, device_library_identifier, push_token, updated_at
                 FROM devices WHERE device_library_identifier = ?1",
                [device_library_identifier],
                row_to_device,
            )
            .optional()?;
        Ok(device)
    }

    /// Record that a device watches a pass. No duplicate rows, no error if
    /// the pair is already present.
    pub fn upsert_registration(&self, pass_id: &str, device_id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT OR IGNORE INTO registrations (pass_id, device_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![pass_id, device_id, now],
        )?;
        Ok(())
    }

    /// Remove a registration. Succeeds whether or not a row existed.
    pub fn delete_registration(&self, pass_id: &str, device_id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM registrations WHERE pass_id = ?1 AND device_id = ?2",
            params![pass_id, device_id],
        )?;
        Ok(())
    }

    pub fn registration_exists(&self, pass_id: &str, device_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM registrations WHERE pass_id = ?1 AND device_id = ?2)",
            params![pass_id, device_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Push tokens of every device registered for a pass.
    pub fn push_tokens_for_pass(&self, pass_id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT d.push_token
             FROM devices d
             JOIN registrations r ON r.device_id = d.id
             WHERE r.pass_id = ?1",
        )?;
        let tokens = stmt
            .query_map([pass_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tokens)
    }
}
