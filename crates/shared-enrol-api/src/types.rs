//! Shared types for enrolment instances and user enrolments

use serde::{Deserialize, Serialize};
use shared_enrol_util::{CourseId, InstanceId, RoleId, SyncRunId, Timestamp, UserEnrolmentId, UserId};
use std::time::Duration;
use thiserror::Error;

/// Unknown numeric code read back from storage or a form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unknown {kind} code: {code}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: i64,
}

/// Whether an instance lets users in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Enabled,
    Disabled,
}

impl InstanceStatus {
    pub const ALL: [InstanceStatus; 2] = [InstanceStatus::Enabled, InstanceStatus::Disabled];

    pub fn code(self) -> i64 {
        match self {
            InstanceStatus::Enabled => 0,
            InstanceStatus::Disabled => 1,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, UnknownCode> {
        match code {
            0 => Ok(InstanceStatus::Enabled),
            1 => Ok(InstanceStatus::Disabled),
            code => Err(UnknownCode { kind: "instance status", code }),
        }
    }
}

/// Per-user enrolment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserEnrolmentStatus {
    Active,
    Suspended,
}

impl UserEnrolmentStatus {
    pub fn code(self) -> i64 {
        match self {
            UserEnrolmentStatus::Active => 0,
            UserEnrolmentStatus::Suspended => 1,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, UnknownCode> {
        match code {
            0 => Ok(UserEnrolmentStatus::Active),
            1 => Ok(UserEnrolmentStatus::Suspended),
            code => Err(UnknownCode { kind: "user enrolment status", code }),
        }
    }
}

/// How the start date of a new user enrolment is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrolStartPolicy {
    /// The course's own start date
    CourseStart,
    /// Local midnight of the enrolment day
    Today,
    /// The moment of enrolment
    #[default]
    Now,
}

impl EnrolStartPolicy {
    pub fn code(self) -> i64 {
        match self {
            EnrolStartPolicy::CourseStart => 2,
            EnrolStartPolicy::Today => 3,
            EnrolStartPolicy::Now => 4,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, UnknownCode> {
        match code {
            2 => Ok(EnrolStartPolicy::CourseStart),
            3 => Ok(EnrolStartPolicy::Today),
            4 => Ok(EnrolStartPolicy::Now),
            code => Err(UnknownCode { kind: "enrol start", code }),
        }
    }
}

/// What happens to a user enrolment once it expires. Only unenrolment is
/// implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiredAction {
    #[default]
    Unenrol,
}

/// One enrolment-method configuration attached to a course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolmentInstance {
    pub id: InstanceId,
    /// Method name (`"shared"` for this method)
    pub enrol: String,
    pub course_id: CourseId,
    pub status: InstanceStatus,
    /// Role given to enrolled users. None means no role.
    pub role_id: Option<RoleId>,
    /// Length of a grant. None means unlimited.
    pub enrol_period: Option<Duration>,
    pub enrol_start: EnrolStartPolicy,
    pub time_created: Timestamp,
    pub time_modified: Timestamp,
}

impl EnrolmentInstance {
    pub fn is_method(&self, name: &str) -> bool {
        self.enrol == name
    }
}

/// Instance fields supplied on add/update. `None` leaves the field at its
/// default (add) or unchanged (update).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFields {
    pub status: Option<InstanceStatus>,
    pub role_id: Option<RoleId>,
    /// Period in seconds, 0 = unlimited
    pub enrol_period_seconds: Option<u64>,
    pub enrol_start: Option<EnrolStartPolicy>,
}

/// A record granting one user access to one course through one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEnrolment {
    pub id: UserEnrolmentId,
    pub instance_id: InstanceId,
    pub user_id: UserId,
    pub status: UserEnrolmentStatus,
    /// 0 means unknown
    pub time_start: Timestamp,
    /// 0 means unlimited
    pub time_end: Timestamp,
    pub modifier_id: UserId,
    pub time_created: Timestamp,
    pub time_modified: Timestamp,
}

impl UserEnrolment {
    /// Expiry is derived from the deadline at the time of asking, never stored.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        !self.time_end.is_zero() && self.time_end < now
    }
}

/// Row produced by the expiry scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredEnrolment {
    pub user_enrolment: UserEnrolment,
    pub course_id: CourseId,
}

/// Result code of a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Ok,
    /// Declared for callers that map codes; no sweep path produces it.
    Error,
    /// The method is disabled site-wide; nothing was touched
    Disabled,
}

impl SyncStatus {
    pub fn code(self) -> i32 {
        match self {
            SyncStatus::Ok => 0,
            SyncStatus::Error => 1,
            SyncStatus::Disabled => 2,
        }
    }
}

/// Summary of one sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: SyncRunId,
    pub status: SyncStatus,
    pub unenrolled: u64,
    /// Stopped early on request; rows after the last processed one are untouched
    pub interrupted: bool,
}
