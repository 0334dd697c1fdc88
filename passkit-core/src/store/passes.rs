//! Pass records: creation, lookup, and cursor-bumping mutation.

use crate::store::models::Pass;
use crate::store::{Store, StoreError};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

/// Payload field carrying the most recent campaign / broadcast message.
pub const UPDATE_MESSAGE_KEY: &str = "latestMessage";

fn row_to_pass(row: &Row<'_>) -> rusqlite::Result<Pass> {
    let raw: String = row.get(4)?;
    let data = serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(Pass {
        id: row.get(0)?,
        serial_number: row.get(1)?,
        authentication_token: row.get(2)?,
        signing_identity_id: row.get(3)?,
        data,
        last_modified: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const PASS_COLUMNS: &str = "id, serial_number, authentication_token, signing_identity_id, \
                            data, last_modified, created_at";

/// Merge a campaign message into a pass payload under the distinguished
/// update-message field.
pub(crate) fn merge_update_message(
    data: &mut serde_json::Value,
    message: &str,
) -> Result<(), StoreError> {
    match data {
        serde_json::Value::Object(map) => {
            map.insert(
                UPDATE_MESSAGE_KEY.to_string(),
                serde_json::Value::String(message.to_string()),
            );
            Ok(())
        }
        _ => Err(StoreError::InvalidPayload(
            "pass data is not a JSON object".to_string(),
        )),
    }
}

impl Store {
    pub fn create_pass(
        &self,
        serial_number: &str,
        authentication_token: &str,
        signing_identity_id: &str,
        data: &serde_json::Value,
    ) -> Result<Pass, StoreError> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO passes (id, serial_number, authentication_token, signing_identity_id,
                                 data, last_modified, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                serial_number,
                authentication_token,
                signing_identity_id,
                data.to_string(),
                now,
                now,
            ],
        )?;
        Ok(Pass {
            id,
            serial_number: serial_number.to_string(),
            authentication_token: authentication_token.to_string(),
            signing_identity_id: signing_identity_id.to_string(),
            data: data.clone(),
            last_modified: now,
            created_at: now,
        })
    }

    pub fn pass_by_id(&self, id: &str) -> Result<Option<Pass>, StoreError> {
        let conn = self.conn()?;
        let pass = conn
            .query_row(
                &format!("SELECT {} FROM passes WHERE id = ?1", PASS_COLUMNS),
                [id],
                row_to_pass,
            )
            .optional()?;
        Ok(pass)
    }

    pub fn pass_by_serial(&self, serial_number: &str) -> Result<Option<Pass>, StoreError> {
        let conn = self.conn()?;
        let pass = conn
            .query_row(
                &format!("SELECT {} FROM passes WHERE serial_number = ?1", PASS_COLUMNS),
                [serial_number],
                row_to_pass,
            )
            .optional()?;
        Ok(pass)
    }

    pub fn pass_by_auth_token(&self, token: &str) -> Result<Option<Pass>, StoreError> {
        let conn = self.conn()?;
        let pass = conn
            .query_row(
                &format!(
                    "SELECT {} FROM passes WHERE authentication_token = ?1",
                    PASS_COLUMNS
                ),
                [token],
                row_to_pass,
            )
            .optional()?;
        Ok(pass)
    }

    /// Replace a pass's payload. Content and cursor move together in one
    /// statement, so a concurrent reader never sees one without the other;
    /// `MAX(now, last_modified + 1)` keeps the cursor strictly increasing
    /// even for several mutations within the same second.
    pub fn update_pass_data(
        &self,
        pass_id: &str,
        data: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        let changed = conn.execute(
            "UPDATE passes
             SET data = ?1, last_modified = MAX(?2, last_modified + 1)
             WHERE id = ?3",
            params![data.to_string(), now, pass_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("pass {}", pass_id)));
        }
        Ok(())
    }

    /// Merge a broadcast message into a pass payload and bump the cursor.
    pub fn set_update_message(&self, pass_id: &str, message: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let raw: String = tx
            .query_row("SELECT data FROM passes WHERE id = ?1", [pass_id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("pass {}", pass_id)))?;
        let mut data: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| StoreError::InvalidPayload(e.to_string()))?;
        merge_update_message(&mut data, message)?;
        let now = Utc::now().timestamp();
        tx.execute(
            "UPDATE passes
             SET data = ?1, last_modified = MAX(?2, last_modified + 1)
             WHERE id = ?3",
            params![data.to_string(), now, pass_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Serials a device is registered for, restricted to passes under one
    /// signing identity. A since-cursor filters to strictly newer passes.
    pub fn serials_updated_since(
        &self,
        device_id: &str,
        signing_identity_id: &str,
        since: Option<i64>,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.serial_number
             FROM passes p
             JOIN registrations r ON r.pass_id = p.id
             WHERE r.device_id = ?1
               AND p.signing_identity_id = ?2
               AND (?3 IS NULL OR p.last_modified > ?3)
             ORDER BY p.serial_number",
        )?;
        let serials = stmt
            .query_map(params![device_id, signing_identity_id, since], |row| {
                row.get(0)
            })?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(serials)
    }
}
