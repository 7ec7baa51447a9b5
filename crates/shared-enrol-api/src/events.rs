//! Lifecycle events emitted to the host event bus

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use shared_enrol_util::{ContextId, CourseId, UserEnrolmentId, UserId};

use crate::UserEnrolment;

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            timestamp: shared_enrol_util::now(),
            payload,
        }
    }
}

/// User enrolment lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    UserEnrolmentCreated {
        user_enrolment_id: UserEnrolmentId,
        course_id: CourseId,
        context_id: ContextId,
        related_user_id: UserId,
        enrol: String,
        record: UserEnrolment,
    },

    UserEnrolmentUpdated {
        user_enrolment_id: UserEnrolmentId,
        course_id: CourseId,
        context_id: ContextId,
        related_user_id: UserId,
        enrol: String,
        before: UserEnrolment,
        after: UserEnrolment,
    },

    UserEnrolmentDeleted {
        user_enrolment_id: UserEnrolmentId,
        course_id: CourseId,
        context_id: ContextId,
        related_user_id: UserId,
        enrol: String,
        record: UserEnrolment,
        /// The user has no enrolment left in the course, through any method
        last_enrol: bool,
    },
}

impl EventPayload {
    pub fn related_user_id(&self) -> UserId {
        match self {
            EventPayload::UserEnrolmentCreated { related_user_id, .. }
            | EventPayload::UserEnrolmentUpdated { related_user_id, .. }
            | EventPayload::UserEnrolmentDeleted { related_user_id, .. } => *related_user_id,
        }
    }

    pub fn course_id(&self) -> CourseId {
        match self {
            EventPayload::UserEnrolmentCreated { course_id, .. }
            | EventPayload::UserEnrolmentUpdated { course_id, .. }
            | EventPayload::UserEnrolmentDeleted { course_id, .. } => *course_id,
        }
    }

    /// Stable event name used by the host event log
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::UserEnrolmentCreated { .. } => "user_enrolment_created",
            EventPayload::UserEnrolmentUpdated { .. } => "user_enrolment_updated",
            EventPayload::UserEnrolmentDeleted { .. } => "user_enrolment_deleted",
        }
    }
}
