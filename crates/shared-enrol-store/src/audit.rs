//! Audit event types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use shared_enrol_api::SyncStatus;
use shared_enrol_util::{CourseId, InstanceId, SyncRunId, Timestamp, UserId};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Daemon started
    DaemonStarted,

    /// Daemon stopped
    DaemonStopped,

    InstanceAdded {
        instance_id: InstanceId,
        course_id: CourseId,
    },

    InstanceUpdated {
        instance_id: InstanceId,
        course_id: CourseId,
        /// Duplicate instances deleted during the update
        removed_duplicates: Vec<InstanceId>,
    },

    InstanceDeleted {
        instance_id: InstanceId,
        course_id: CourseId,
        unenrolled: usize,
    },

    UserEnrolled {
        instance_id: InstanceId,
        course_id: CourseId,
        user_id: UserId,
        time_end: Timestamp,
    },

    UserEnrolmentUpdated {
        instance_id: InstanceId,
        course_id: CourseId,
        user_id: UserId,
        time_end: Timestamp,
    },

    UserUnenrolled {
        instance_id: InstanceId,
        course_id: CourseId,
        user_id: UserId,
        last_enrol: bool,
    },

    SyncStarted {
        run_id: SyncRunId,
        course_id: Option<CourseId>,
    },

    SyncFinished {
        run_id: SyncRunId,
        status: SyncStatus,
        unenrolled: u64,
        interrupted: bool,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: shared_enrol_util::now(),
            event,
        }
    }
}
