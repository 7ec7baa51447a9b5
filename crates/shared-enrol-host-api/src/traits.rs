//! Host service traits

use serde::{Deserialize, Serialize};
use shared_enrol_api::{Event, UserEnrolmentStatus};
use shared_enrol_util::{
    ContextId, CourseId, EnrolError, GroupId, InstanceId, RoleId, Timestamp, UserId,
};
use thiserror::Error;

use crate::Capability;

/// Errors from host service calls
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Course context not found: {0}")]
    MissingContext(CourseId),

    #[error("Role not found: {0}")]
    RoleNotFound(RoleId),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

impl From<HostError> for EnrolError {
    fn from(e: HostError) -> Self {
        match e {
            HostError::MissingContext(course) => EnrolError::MissingContext(course),
            other => EnrolError::host(other.to_string()),
        }
    }
}

/// Owner tag of a role assignment or group membership
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ownership {
    pub component: String,
    pub item_id: InstanceId,
}

impl Ownership {
    pub fn new(component: impl Into<String>, item_id: InstanceId) -> Self {
        Self {
            component: component.into(),
            item_id,
        }
    }
}

/// Which assignments a role removal touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentFilter {
    /// Every assignment regardless of owner
    Any,
    /// Only manual (untagged) assignments
    Untagged,
    /// Only assignments owned by the given component and item
    Owned(Ownership),
}

impl ComponentFilter {
    pub fn matches(&self, owner: Option<&Ownership>) -> bool {
        match self {
            ComponentFilter::Any => true,
            ComponentFilter::Untagged => owner.is_none(),
            ComponentFilter::Owned(wanted) => owner == Some(wanted),
        }
    }
}

/// Filter for bulk role removal of one user in one context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignmentFilter {
    pub user_id: UserId,
    pub context_id: ContextId,
    pub component: ComponentFilter,
}

/// Role catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub short_name: String,
    pub name: String,
}

/// Group membership owned by an enrolment instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub owner: Option<Ownership>,
}

/// Permission checks
pub trait AccessControl {
    fn has_capability(
        &self,
        user_id: UserId,
        capability: Capability,
        context_id: ContextId,
    ) -> HostResult<bool>;
}

/// Course lookups
pub trait CourseDirectory {
    /// The site's root course, which never takes enrolments
    fn site_course_id(&self) -> CourseId;

    /// Permission context of a course
    fn course_context(&self, course_id: CourseId) -> HostResult<ContextId>;

    /// Course start date
    fn course_start(&self, course_id: CourseId) -> HostResult<Timestamp>;
}

/// Role assignment
pub trait RoleService {
    /// Assign a role; `owner` tags the assignment for selective removal later
    fn assign_role(
        &self,
        role_id: RoleId,
        user_id: UserId,
        context_id: ContextId,
        owner: Option<&Ownership>,
    ) -> HostResult<()>;

    /// Remove every assignment matching the filter; returns how many went
    fn unassign_roles(&self, filter: &RoleAssignmentFilter) -> HostResult<usize>;

    /// Roles that may be given by enrolment in this context
    fn assignable_roles(&self, context_id: ContextId) -> HostResult<Vec<Role>>;

    fn role(&self, role_id: RoleId) -> HostResult<Option<Role>>;

    /// When false, enrolment roles are assigned untagged
    fn roles_protected(&self) -> bool {
        true
    }
}

/// Group membership
pub trait GroupService {
    fn owned_memberships(
        &self,
        user_id: UserId,
        owner: &Ownership,
    ) -> HostResult<Vec<GroupMembership>>;

    fn remove_member(&self, group_id: GroupId, user_id: UserId) -> HostResult<()>;

    /// Drop the user from every group of the course
    fn delete_course_memberships(&self, course_id: CourseId, user_id: UserId)
    -> HostResult<usize>;
}

/// Grade history
pub trait GradeService {
    /// Restore grades archived by a previous unenrolment
    fn recover_grade_history(&self, user_id: UserId, course_id: CourseId) -> HostResult<()>;

    /// Archive the user's grades so a later re-enrolment can recover them
    fn archive_grades(&self, course_id: CourseId, user_id: UserId) -> HostResult<()>;

    /// Site-wide default for grade recovery on enrolment
    fn recover_grades_default(&self) -> bool {
        false
    }
}

/// Last course access bookkeeping
pub trait LastAccessService {
    fn purge_last_access(&self, user_id: UserId, course_id: CourseId) -> HostResult<()>;
}

/// Host caches that depend on enrolments
pub trait CacheService {
    /// Invalidate every session-level enrolment cache of the user
    fn mark_user_dirty(&self, user_id: UserId) -> HostResult<()>;

    /// A user enrolment changed in this course (course contacts cache)
    fn user_enrolment_changed(
        &self,
        course_id: CourseId,
        user_id: UserId,
        status: UserEnrolmentStatus,
        time_start: Timestamp,
        time_end: Timestamp,
    ) -> HostResult<()>;
}

/// Host event bus
pub trait EventSink {
    fn emit(&self, event: Event) -> HostResult<()>;
}

/// Everything the engine needs from the host
pub trait Host:
    AccessControl
    + CourseDirectory
    + RoleService
    + GroupService
    + GradeService
    + LastAccessService
    + CacheService
    + EventSink
    + Send
    + Sync
{
}

impl<T> Host for T where
    T: AccessControl
        + CourseDirectory
        + RoleService
        + GroupService
        + GradeService
        + LastAccessService
        + CacheService
        + EventSink
        + Send
        + Sync
{
}
