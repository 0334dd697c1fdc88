//! Storage model types.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Server-side record backing one issued wallet pass file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pass {
    pub id: String,
    pub serial_number: String,
    pub authentication_token: String,
    pub signing_identity_id: String,
    /// Mutable semi-structured payload handed to the pass serializer.
    pub data: serde_json::Value,
    /// Monotonic sync cursor, Unix seconds. Strictly increases on every
    /// content mutation.
    pub last_modified: i64,
    pub created_at: i64,
}

/// A wallet client installation, keyed by its opaque library identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub device_library_identifier: String,
    pub push_token: String,
    pub updated_at: i64,
}

/// Signing identity lifecycle state. Transitions are operator-driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityStatus {
    Active,
    Burned,
    Cooldown,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Burned => "BURNED",
            Self::Cooldown => "COOLDOWN",
        }
    }
}

impl FromSql for IdentityStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "ACTIVE" => Ok(Self::Active),
            "BURNED" => Ok(Self::Burned),
            "COOLDOWN" => Ok(Self::Cooldown),
            other => Err(FromSqlError::Other(
                format!("unknown identity status: {}", other).into(),
            )),
        }
    }
}

impl ToSql for IdentityStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

/// A credential bundle (team id, pass type, push key) used to sign pass
/// files and to scope push topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningIdentity {
    pub id: String,
    pub pass_type_id: String,
    pub team_id: String,
    /// Opaque provider credential presented to the push gateway.
    pub auth_key: String,
    pub status: IdentityStatus,
    pub priority: i64,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
}

/// A named drip campaign: an ordered, 1-based list of delayed steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    pub sequence_id: String,
    pub step_number: i64,
    pub delay_hours: i64,
    pub message_template: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrollmentStatus {
    Active,
    Paused,
    Completed,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
        }
    }
}

impl FromSql for EnrollmentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "ACTIVE" => Ok(Self::Active),
            "PAUSED" => Ok(Self::Paused),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(FromSqlError::Other(
                format!("unknown enrollment status: {}", other).into(),
            )),
        }
    }
}

impl ToSql for EnrollmentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

/// A pass's progress through one sequence. Advances monotonically through
/// step numbers until none remain, then COMPLETED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceEnrollment {
    pub id: String,
    pub pass_id: String,
    pub sequence_id: String,
    pub current_step: i64,
    pub next_execution_at: i64,
    pub status: EnrollmentStatus,
    pub created_at: i64,
}
