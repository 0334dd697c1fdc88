//! Drip campaign sequences, steps and enrollments.

use crate::store::models::{EnrollmentStatus, Sequence, SequenceEnrollment, SequenceStep};
use crate::store::passes::merge_update_message;
use crate::store::{Store, StoreError};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

/// How an enrollment moves after its current step has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAdvance {
    /// A later step exists: move to it and schedule its execution time.
    Next { step: i64, run_at: i64 },
    /// No later step: the enrollment is done.
    Complete,
}

fn row_to_enrollment(row: &Row<'_>) -> rusqlite::Result<SequenceEnrollment> {
    Ok(SequenceEnrollment {
        id: row.get(0)?,
        pass_id: row.get(1)?,
        sequence_id: row.get(2)?,
        current_step: row.get(3)?,
        next_execution_at: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const ENROLLMENT_COLUMNS: &str =
    "id, pass_id, sequence_id, current_step, next_execution_at, status, created_at";

impl Store {
    pub fn create_sequence(&self, name: &str) -> Result<Sequence, StoreError> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO sequences (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id, name, now],
        )?;
        Ok(Sequence {
            id,
            name: name.to_string(),
            created_at: now,
        })
    }

    pub fn add_sequence_step(
        &self,
        sequence_id: &str,
        step_number: i64,
        delay_hours: i64,
        message_template: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sequence_steps (sequence_id, step_number, delay_hours, message_template)
             VALUES (?1, ?2, ?3, ?4)",
            params![sequence_id, step_number, delay_hours, message_template],
        )?;
        Ok(())
    }

    /// Steps of a sequence, ordered by step number.
    pub fn steps_for_sequence(&self, sequence_id: &str) -> Result<Vec<SequenceStep>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT sequence_id, step_number, delay_hours, message_template
             FROM sequence_steps WHERE sequence_id = ?1
             ORDER BY step_number",
        )?;
        let steps = stmt
            .query_map([sequence_id], |row| {
                Ok(SequenceStep {
                    sequence_id: row.get(0)?,
                    step_number: row.get(1)?,
                    delay_hours: row.get(2)?,
                    message_template: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(steps)
    }

    pub fn create_enrollment(
        &self,
        pass_id: &str,
        sequence_id: &str,
        first_execution_at: i64,
    ) -> Result<SequenceEnrollment, StoreError> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO sequence_enrollments
                (id, pass_id, sequence_id, current_step, next_execution_at, status, created_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)",
            params![
                id,
                pass_id,
                sequence_id,
                first_execution_at,
                EnrollmentStatus::Active,
                now,
            ],
        )?;
        Ok(SequenceEnrollment {
            id,
            pass_id: pass_id.to_string(),
            sequence_id: sequence_id.to_string(),
            current_step: 1,
            next_execution_at: first_execution_at,
            status: EnrollmentStatus::Active,
            created_at: now,
        })
    }

    pub fn enrollment_by_id(&self, id: &str) -> Result<Option<SequenceEnrollment>, StoreError> {
        let conn = self.conn()?;
        let enrollment = conn
            .query_row(
                &format!(
                    "SELECT {} FROM sequence_enrollments WHERE id = ?1",
                    ENROLLMENT_COLUMNS
                ),
                [id],
                row_to_enrollment,
            )
            .optional()?;
        Ok(enrollment)
    }

    /// Active enrollments whose execution time has arrived.
    pub fn due_enrollments(&self, now: i64) -> Result<Vec<SequenceEnrollment>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sequence_enrollments
             WHERE status = ?1 AND next_execution_at <= ?2
             ORDER BY next_execution_at",
            ENROLLMENT_COLUMNS
        ))?;
        let due = stmt
            .query_map(params![EnrollmentStatus::Active, now], row_to_enrollment)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(due)
    }

    pub fn set_enrollment_status(
        &self,
        enrollment_id: &str,
        status: EnrollmentStatus,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sequence_enrollments SET status = ?1 WHERE id = ?2",
            params![status, enrollment_id],
        )?;
        Ok(())
    }

    /// Apply one campaign step: merge the rendered message into the pass
    /// payload (bumping the sync cursor) and move the enrollment forward,
    /// all in a single transaction. A crash can therefore never leave the
    /// message applied but the enrollment still due, which is what caused
    /// duplicate sends in earlier designs.
    pub fn apply_step(
        &self,
        enrollment_id: &str,
        pass_id: &str,
        message: &str,
        advance: StepAdvance,
    ) -> Result<(), StoreError> {
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

        match advance {
            StepAdvance::Next { step, run_at } => {
                tx.execute(
                    "UPDATE sequence_enrollments
                     SET current_step = ?1, next_execution_at = ?2
                     WHERE id = ?3",
                    params![step, run_at, enrollment_id],
                )?;
            }
            StepAdvance::Complete => {
                tx.execute(
                    "UPDATE sequence_enrollments SET status = ?1 WHERE id = ?2",
                    params![EnrollmentStatus::Completed, enrollment_id],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::IdentityStatus;
    use crate::store::passes::UPDATE_MESSAGE_KEY;
    use serde_json::json;

    fn seeded() -> (Store, String, String) {
        let store = Store::in_memory().unwrap();
        let identity = store
            .create_identity("pass.com.example.coupon", "TEAM01", "key-1", IdentityStatus::Active, 0)
            .unwrap();
        let pass = store
            .create_pass("S1", "tok-1", &identity.id, &json!({}))
            .unwrap();
        let sequence = store.create_sequence("welcome").unwrap();
        (store, pass.id, sequence.id)
    }

    #[test]
    fn due_query_includes_boundary() {
        let (store, pass_id, sequence_id) = seeded();
        store.create_enrollment(&pass_id, &sequence_id, 100).unwrap();

        assert_eq!(store.due_enrollments(99).unwrap().len(), 0);
        assert_eq!(store.due_enrollments(100).unwrap().len(), 1);
        assert_eq!(store.due_enrollments(101).unwrap().len(), 1);
    }

    #[test]
    fn due_query_skips_non_active() {
        let (store, pass_id, sequence_id) = seeded();
        let enrollment = store.create_enrollment(&pass_id, &sequence_id, 0).unwrap();
        store
            .set_enrollment_status(&enrollment.id, EnrollmentStatus::Paused)
            .unwrap();

        assert!(store.due_enrollments(10).unwrap().is_empty());
    }

    #[test]
    fn apply_step_moves_message_and_enrollment_together() {
        let (store, pass_id, sequence_id) = seeded();
        let enrollment = store.create_enrollment(&pass_id, &sequence_id, 0).unwrap();
        let before = store.pass_by_id(&pass_id).unwrap().unwrap();

        store
            .apply_step(
                &enrollment.id,
                &pass_id,
                "Welcome!",
                StepAdvance::Next {
                    step: 2,
                    run_at: 5000,
                },
            )
            .unwrap();

        let pass = store.pass_by_id(&pass_id).unwrap().unwrap();
        assert_eq!(pass.data[UPDATE_MESSAGE_KEY], "Welcome!");
        assert!(pass.last_modified > before.last_modified);

        let advanced = store.enrollment_by_id(&enrollment.id).unwrap().unwrap();
        assert_eq!(advanced.current_step, 2);
        assert_eq!(advanced.next_execution_at, 5000);
        assert_eq!(advanced.status, EnrollmentStatus::Active);
    }

    #[test]
    fn apply_step_complete_marks_enrollment() {
        let (store, pass_id, sequence_id) = seeded();
        let enrollment = store.create_enrollment(&pass_id, &sequence_id, 0).unwrap();

        store
            .apply_step(&enrollment.id, &pass_id, "Bye", StepAdvance::Complete)
            .unwrap();

        let done = store.enrollment_by_id(&enrollment.id).unwrap().unwrap();
        assert_eq!(done.status, EnrollmentStatus::Completed);
    }
}
