//! Store trait definitions

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use shared_enrol_api::{EnrolmentInstance, ExpiredEnrolment, UserEnrolment};
use shared_enrol_util::{CourseId, InstanceId, Timestamp, UserEnrolmentId, UserId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Enrolment instances

    /// Whether `course` has an instance of method `enrol`
    fn instance_exists(&self, course: CourseId, enrol: &str) -> StoreResult<bool>;

    fn get_instance(&self, id: InstanceId) -> StoreResult<Option<EnrolmentInstance>>;

    /// Instances of method `enrol` in `course`, oldest first
    fn instances_for_course(
        &self,
        course: CourseId,
        enrol: &str,
    ) -> StoreResult<Vec<EnrolmentInstance>>;

    /// Insert an instance; the `id` field is ignored and the new id returned
    fn insert_instance(&self, instance: &EnrolmentInstance) -> StoreResult<InstanceId>;

    fn update_instance(&self, instance: &EnrolmentInstance) -> StoreResult<()>;

    /// Delete the instance record only; user enrolments must be removed first
    fn delete_instance(&self, id: InstanceId) -> StoreResult<()>;

    // User enrolments

    fn get_user_enrolment(
        &self,
        instance: InstanceId,
        user: UserId,
    ) -> StoreResult<Option<UserEnrolment>>;

    /// Insert a user enrolment; the `id` field is ignored and the new id returned
    fn insert_user_enrolment(&self, enrolment: &UserEnrolment) -> StoreResult<UserEnrolmentId>;

    fn update_user_enrolment(&self, enrolment: &UserEnrolment) -> StoreResult<()>;

    fn delete_user_enrolment(&self, id: UserEnrolmentId) -> StoreResult<()>;

    fn user_enrolments_for_instance(&self, instance: InstanceId)
    -> StoreResult<Vec<UserEnrolment>>;

    /// Whether the user is still enrolled in the course through any method
    fn user_has_any_enrolment(&self, user: UserId, course: CourseId) -> StoreResult<bool>;

    /// One page of user enrolments of method `enrol` whose nonzero end lies
    /// before `now`, ordered by id and starting after `after`.
    fn expired_user_enrolments(
        &self,
        enrol: &str,
        now: Timestamp,
        course: Option<CourseId>,
        after: UserEnrolmentId,
        limit: usize,
    ) -> StoreResult<Vec<ExpiredEnrolment>>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Scheduled task state

    fn load_task_state(&self, name: &str) -> StoreResult<Option<TaskState>>;

    fn save_task_state(&self, state: &TaskState) -> StoreResult<()>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Last run of a scheduled task, kept across restarts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    pub name: String,
    pub last_run: DateTime<Local>,
    /// Sync status code of the last run
    pub last_result: i32,
}
