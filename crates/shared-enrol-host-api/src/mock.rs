//! Mock host for testing

use shared_enrol_api::{Event, UserEnrolmentStatus};
use shared_enrol_util::{ContextId, CourseId, GroupId, RoleId, Timestamp, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::{
    AccessControl, CacheService, Capability, CourseDirectory, EventSink, GradeService,
    GroupMembership, GroupService, HostError, HostResult, LastAccessService, Ownership, Role,
    RoleAssignmentFilter, RoleService,
};

/// Role assignment as recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRoleAssignment {
    pub role_id: RoleId,
    pub user_id: UserId,
    pub context_id: ContextId,
    pub owner: Option<Ownership>,
}

#[derive(Debug, Clone)]
struct MockCourse {
    context_id: ContextId,
    start: Timestamp,
}

#[derive(Debug, Default)]
struct MockState {
    courses: HashMap<CourseId, MockCourse>,
    grants: HashSet<(UserId, Capability, ContextId)>,
    roles: Vec<Role>,
    unassignable: HashSet<RoleId>,
    assignments: Vec<MockRoleAssignment>,
    groups: HashMap<GroupId, CourseId>,
    memberships: Vec<GroupMembership>,
    grades: HashSet<(UserId, CourseId)>,
    archived_grades: HashSet<(UserId, CourseId)>,
    last_access: HashSet<(UserId, CourseId)>,
    dirty_users: Vec<UserId>,
    enrolment_changes: Vec<(CourseId, UserId, UserEnrolmentStatus)>,
    events: Vec<Event>,
    fail_unassign: bool,
}

/// In-memory host for unit/integration testing
pub struct MockHost {
    site_course_id: CourseId,
    roles_protected: bool,
    recover_grades_default: bool,
    state: Mutex<MockState>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            site_course_id: CourseId::new(1),
            roles_protected: true,
            recover_grades_default: false,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_roles_protected(mut self, protected: bool) -> Self {
        self.roles_protected = protected;
        self
    }

    pub fn with_recover_grades_default(mut self, recover: bool) -> Self {
        self.recover_grades_default = recover;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a course and its context
    pub fn add_course(&self, course_id: CourseId, context_id: ContextId, start: Timestamp) {
        self.state()
            .courses
            .insert(course_id, MockCourse { context_id, start });
    }

    pub fn add_role(&self, id: RoleId, short_name: &str) {
        self.state().roles.push(Role {
            id,
            short_name: short_name.to_string(),
            name: short_name.to_string(),
        });
    }

    /// Role that exists in the catalog but cannot be given by enrolment
    pub fn add_unassignable_role(&self, id: RoleId, short_name: &str) {
        self.add_role(id, short_name);
        self.state().unassignable.insert(id);
    }

    pub fn grant(&self, user_id: UserId, capability: Capability, context_id: ContextId) {
        self.state().grants.insert((user_id, capability, context_id));
    }

    pub fn add_group(&self, group_id: GroupId, course_id: CourseId) {
        self.state().groups.insert(group_id, course_id);
    }

    pub fn add_group_member(&self, group_id: GroupId, user_id: UserId, owner: Option<Ownership>) {
        self.state().memberships.push(GroupMembership {
            group_id,
            user_id,
            owner,
        });
    }

    /// Give the user a live grade record in the course
    pub fn add_grade(&self, user_id: UserId, course_id: CourseId) {
        self.state().grades.insert((user_id, course_id));
    }

    pub fn record_access(&self, user_id: UserId, course_id: CourseId) {
        self.state().last_access.insert((user_id, course_id));
    }

    /// Make every role removal fail
    pub fn set_fail_unassign(&self, fail: bool) {
        self.state().fail_unassign = fail;
    }

    pub fn role_assignments(&self, user_id: UserId, context_id: ContextId) -> Vec<MockRoleAssignment> {
        self.state()
            .assignments
            .iter()
            .filter(|a| a.user_id == user_id && a.context_id == context_id)
            .cloned()
            .collect()
    }

    pub fn group_memberships(&self, user_id: UserId) -> Vec<GroupMembership> {
        self.state()
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn has_grades(&self, user_id: UserId, course_id: CourseId) -> bool {
        self.state().grades.contains(&(user_id, course_id))
    }

    pub fn has_archived_grades(&self, user_id: UserId, course_id: CourseId) -> bool {
        self.state().archived_grades.contains(&(user_id, course_id))
    }

    pub fn has_last_access(&self, user_id: UserId, course_id: CourseId) -> bool {
        self.state().last_access.contains(&(user_id, course_id))
    }

    pub fn dirty_users(&self) -> Vec<UserId> {
        self.state().dirty_users.clone()
    }

    pub fn enrolment_changes(&self) -> Vec<(CourseId, UserId, UserEnrolmentStatus)> {
        self.state().enrolment_changes.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    /// Number of recorded side effects, for "nothing happened" assertions
    pub fn mutation_count(&self) -> usize {
        let state = self.state();
        state.dirty_users.len() + state.enrolment_changes.len() + state.events.len()
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessControl for MockHost {
    fn has_capability(
        &self,
        user_id: UserId,
        capability: Capability,
        context_id: ContextId,
    ) -> HostResult<bool> {
        Ok(self.state().grants.contains(&(user_id, capability, context_id)))
    }
}

impl CourseDirectory for MockHost {
    fn site_course_id(&self) -> CourseId {
        self.site_course_id
    }

    fn course_context(&self, course_id: CourseId) -> HostResult<ContextId> {
        self.state()
            .courses
            .get(&course_id)
            .map(|c| c.context_id)
            .ok_or(HostError::MissingContext(course_id))
    }

    fn course_start(&self, course_id: CourseId) -> HostResult<Timestamp> {
        self.state()
            .courses
            .get(&course_id)
            .map(|c| c.start)
            .ok_or(HostError::MissingContext(course_id))
    }
}

impl RoleService for MockHost {
    fn assign_role(
        &self,
        role_id: RoleId,
        user_id: UserId,
        context_id: ContextId,
        owner: Option<&Ownership>,
    ) -> HostResult<()> {
        let mut state = self.state();
        let assignment = MockRoleAssignment {
            role_id,
            user_id,
            context_id,
            owner: owner.cloned(),
        };
        // Assigning the same role twice is a no-op
        if !state.assignments.contains(&assignment) {
            state.assignments.push(assignment);
        }
        Ok(())
    }

    fn unassign_roles(&self, filter: &RoleAssignmentFilter) -> HostResult<usize> {
        let mut state = self.state();
        if state.fail_unassign {
            return Err(HostError::Internal("Mock unassign failure".into()));
        }

        let before = state.assignments.len();
        state.assignments.retain(|a| {
            !(a.user_id == filter.user_id
                && a.context_id == filter.context_id
                && filter.component.matches(a.owner.as_ref()))
        });
        Ok(before - state.assignments.len())
    }

    fn assignable_roles(&self, _context_id: ContextId) -> HostResult<Vec<Role>> {
        let state = self.state();
        Ok(state
            .roles
            .iter()
            .filter(|r| !state.unassignable.contains(&r.id))
            .cloned()
            .collect())
    }

    fn role(&self, role_id: RoleId) -> HostResult<Option<Role>> {
        Ok(self.state().roles.iter().find(|r| r.id == role_id).cloned())
    }

    fn roles_protected(&self) -> bool {
        self.roles_protected
    }
}

impl GroupService for MockHost {
    fn owned_memberships(
        &self,
        user_id: UserId,
        owner: &Ownership,
    ) -> HostResult<Vec<GroupMembership>> {
        Ok(self
            .state()
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.owner.as_ref() == Some(owner))
            .cloned()
            .collect())
    }

    fn remove_member(&self, group_id: GroupId, user_id: UserId) -> HostResult<()> {
        self.state()
            .memberships
            .retain(|m| !(m.group_id == group_id && m.user_id == user_id));
        Ok(())
    }

    fn delete_course_memberships(
        &self,
        course_id: CourseId,
        user_id: UserId,
    ) -> HostResult<usize> {
        let mut state = self.state();
        let course_groups: HashSet<GroupId> = state
            .groups
            .iter()
            .filter(|(_, c)| **c == course_id)
            .map(|(g, _)| *g)
            .collect();

        let before = state.memberships.len();
        state
            .memberships
            .retain(|m| !(m.user_id == user_id && course_groups.contains(&m.group_id)));
        Ok(before - state.memberships.len())
    }
}

impl GradeService for MockHost {
    fn recover_grade_history(&self, user_id: UserId, course_id: CourseId) -> HostResult<()> {
        let mut state = self.state();
        if state.archived_grades.remove(&(user_id, course_id)) {
            state.grades.insert((user_id, course_id));
        }
        Ok(())
    }

    fn archive_grades(&self, course_id: CourseId, user_id: UserId) -> HostResult<()> {
        let mut state = self.state();
        if state.grades.remove(&(user_id, course_id)) {
            state.archived_grades.insert((user_id, course_id));
        }
        Ok(())
    }

    fn recover_grades_default(&self) -> bool {
        self.recover_grades_default
    }
}

impl LastAccessService for MockHost {
    fn purge_last_access(&self, user_id: UserId, course_id: CourseId) -> HostResult<()> {
        self.state().last_access.remove(&(user_id, course_id));
        Ok(())
    }
}

impl CacheService for MockHost {
    fn mark_user_dirty(&self, user_id: UserId) -> HostResult<()> {
        self.state().dirty_users.push(user_id);
        Ok(())
    }

    fn user_enrolment_changed(
        &self,
        course_id: CourseId,
        user_id: UserId,
        status: UserEnrolmentStatus,
        _time_start: Timestamp,
        _time_end: Timestamp,
    ) -> HostResult<()> {
        self.state()
            .enrolment_changes
            .push((course_id, user_id, status));
        Ok(())
    }
}

impl EventSink for MockHost {
    fn emit(&self, event: Event) -> HostResult<()> {
        self.state().events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ComponentFilter;
    use shared_enrol_util::InstanceId;

    fn setup() -> MockHost {
        let host = MockHost::new();
        host.add_course(CourseId::new(2), ContextId::new(20), Timestamp::from_secs(500));
        host
    }

    #[test]
    fn unknown_course_has_no_context() {
        let host = setup();
        assert_eq!(host.course_context(CourseId::new(2)).unwrap(), ContextId::new(20));
        assert!(matches!(
            host.course_context(CourseId::new(3)),
            Err(HostError::MissingContext(_))
        ));
    }

    #[test]
    fn owned_unassign_leaves_other_owners() {
        let host = setup();
        let user = UserId::new(5);
        let ctx = ContextId::new(20);
        let ours = Ownership::new("enrol_shared", InstanceId::new(1));
        let theirs = Ownership::new("enrol_manual", InstanceId::new(2));

        host.assign_role(RoleId::new(5), user, ctx, Some(&ours)).unwrap();
        host.assign_role(RoleId::new(5), user, ctx, Some(&theirs)).unwrap();
        host.assign_role(RoleId::new(3), user, ctx, None).unwrap();

        let removed = host
            .unassign_roles(&RoleAssignmentFilter {
                user_id: user,
                context_id: ctx,
                component: ComponentFilter::Owned(ours),
            })
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(host.role_assignments(user, ctx).len(), 2);
    }

    #[test]
    fn grades_archive_and_recover() {
        let host = setup();
        let user = UserId::new(5);
        let course = CourseId::new(2);
        host.add_grade(user, course);

        host.archive_grades(course, user).unwrap();
        assert!(!host.has_grades(user, course));
        assert!(host.has_archived_grades(user, course));

        host.recover_grade_history(user, course).unwrap();
        assert!(host.has_grades(user, course));
        assert!(!host.has_archived_grades(user, course));
    }

    #[test]
    fn course_memberships_only_touch_that_course() {
        let host = setup();
        let user = UserId::new(5);
        host.add_group(GroupId::new(1), CourseId::new(2));
        host.add_group(GroupId::new(2), CourseId::new(3));
        host.add_group_member(GroupId::new(1), user, None);
        host.add_group_member(GroupId::new(2), user, None);

        let removed = host.delete_course_memberships(CourseId::new(2), user).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(host.group_memberships(user)[0].group_id, GroupId::new(2));
    }
}
