//! Signing identity pool: least-recently-used selection over ACTIVE
//! credentials.
//!
//! Status transitions (ACTIVE / BURNED / COOLDOWN) are operator-driven and
//! happen outside this service; the pool only reads status and stamps
//! `last_used_at`.

use crate::store::models::{IdentityStatus, SigningIdentity};
use crate::store::{Store, StoreError};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

fn row_to_identity(row: &Row<'_>) -> rusqlite::Result<SigningIdentity> {
    Ok(SigningIdentity {
        id: row.get(0)?,
        pass_type_id: row.get(1)?,
        team_id: row.get(2)?,
        auth_key: row.get(3)?,
        status: row.get(4)?,
        priority: row.get(5)?,
        last_used_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const IDENTITY_COLUMNS: &str =
    "id, pass_type_id, team_id, auth_key, status, priority, last_used_at, created_at";

impl Store {
    pub fn create_identity(
        &self,
        pass_type_id: &str,
        team_id: &str,
        auth_key: &str,
        status: IdentityStatus,
        priority: i64,
    ) -> Result<SigningIdentity, StoreError> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO signing_identities
                (id, pass_type_id, team_id, auth_key, status, priority, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, pass_type_id, team_id, auth_key, status, priority, now],
        )?;
        Ok(SigningIdentity {
            id,
            pass_type_id: pass_type_id.to_string(),
            team_id: team_id.to_string(),
            auth_key: auth_key.to_string(),
            status,
            priority,
            last_used_at: None,
            created_at: now,
        })
    }
}

/// Rotating pool of signing identities backed by the store.
#[derive(Clone)]
pub struct CredentialPool {
    store: Store,
}

impl CredentialPool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Pick the least-recently-used ACTIVE identity (never-used first,
    /// ties broken by priority descending) and stamp its `last_used_at`
    /// before returning. The stamp is a storage-backed update in the same
    /// transaction as the selection, so load spreading holds across
    /// service instances; a concurrent caller may still pick the same
    /// identity, which is acceptable.
    pub fn select_active(&self) -> Result<Option<SigningIdentity>, StoreError> {
        let conn = self.store.conn()?;
        let tx = conn.unchecked_transaction()?;

        let picked = tx
            .query_row(
                &format!(
                    "SELECT {} FROM signing_identities
                     WHERE status = ?1
                     ORDER BY last_used_at IS NOT NULL, last_used_at ASC, priority DESC
                     LIMIT 1",
                    IDENTITY_COLUMNS
                ),
                params![IdentityStatus::Active],
                row_to_identity,
            )
            .optional()?;

        let Some(mut identity) = picked else {
            return Ok(None);
        };

        let now = Utc::now().timestamp();
        tx.execute(
            "UPDATE signing_identities SET last_used_at = ?1 WHERE id = ?2",
            params![now, identity.id],
        )?;
        tx.commit()?;

        identity.last_used_at = Some(now);
        Ok(Some(identity))
    }

    pub fn by_id(&self, id: &str) -> Result<Option<SigningIdentity>, StoreError> {
        let conn = self.store.conn()?;
        let identity = conn
            .query_row(
                &format!("SELECT {} FROM signing_identities WHERE id = ?1", IDENTITY_COLUMNS),
                [id],
                row_to_identity,
            )
            .optional()?;
        Ok(identity)
    }

    /// The ACTIVE identity declaring the given pass type, if any.
    pub fn by_pass_type(&self, pass_type_id: &str) -> Result<Option<SigningIdentity>, StoreError> {
        let conn = self.store.conn()?;
        let identity = conn
            .query_row(
                &format!(
                    "SELECT {} FROM signing_identities
                     WHERE pass_type_id = ?1 AND status = ?2
                     ORDER BY priority DESC LIMIT 1",
                    IDENTITY_COLUMNS
                ),
                params![pass_type_id, IdentityStatus::Active],
                row_to_identity,
            )
            .optional()?;
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> (Store, CredentialPool) {
        let store = Store::in_memory().unwrap();
        let pool = CredentialPool::new(store.clone());
        (store, pool)
    }

    #[test]
    fn never_returns_non_active() {
        let (store, pool) = pool();
        store
            .create_identity("pass.a", "TEAM01", "k1", IdentityStatus::Burned, 10)
            .unwrap();
        store
            .create_identity("pass.b", "TEAM01", "k2", IdentityStatus::Cooldown, 10)
            .unwrap();

        assert!(pool.select_active().unwrap().is_none());
        assert!(pool.by_pass_type("pass.a").unwrap().is_none());
    }

    #[test]
    fn never_used_wins_over_used() {
        let (store, pool) = pool();
        let used = store
            .create_identity("pass.a", "TEAM01", "k1", IdentityStatus::Active, 100)
            .unwrap();
        {
            let conn = store.conn().unwrap();
            conn.execute(
                "UPDATE signing_identities SET last_used_at = 1000 WHERE id = ?1",
                [&used.id],
            )
            .unwrap();
        }
        let fresh = store
            .create_identity("pass.b", "TEAM01", "k2", IdentityStatus::Active, 0)
            .unwrap();

        let picked = pool.select_active().unwrap().unwrap();
        assert_eq!(picked.id, fresh.id);
    }

    #[test]
    fn priority_breaks_ties_between_never_used() {
        let (store, pool) = pool();
        store
            .create_identity("pass.a", "TEAM01", "k1", IdentityStatus::Active, 1)
            .unwrap();
        let preferred = store
            .create_identity("pass.b", "TEAM01", "k2", IdentityStatus::Active, 5)
            .unwrap();

        let picked = pool.select_active().unwrap().unwrap();
        assert_eq!(picked.id, preferred.id);
    }

    #[test]
    fn selection_stamps_last_used() {
        let (store, pool) = pool();
        store
            .create_identity("pass.a", "TEAM01", "k1", IdentityStatus::Active, 0)
            .unwrap();
        let b = store
            .create_identity("pass.b", "TEAM01", "k2", IdentityStatus::Active, 0)
            .unwrap();

        let first = pool.select_active().unwrap().unwrap();
        assert!(first.last_used_at.is_some());

        // The stamped identity goes to the back of the rotation.
        let second = pool.select_active().unwrap().unwrap();
        assert_ne!(first.id, second.id);
        let _ = b;
    }

    #[test]
    fn by_pass_type_filters_to_active() {
        let (store, pool) = pool();
        store
            .create_identity("pass.a", "TEAM01", "k1", IdentityStatus::Burned, 10)
            .unwrap();
        let active = store
            .create_identity("pass.a", "TEAM01", "k2", IdentityStatus::Active, 0)
            .unwrap();

        let found = pool.by_pass_type("pass.a").unwrap().unwrap();
        assert_eq!(found.id, active.id);
    }
}
