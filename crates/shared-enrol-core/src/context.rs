//! Per-request state of the acting user

use shared_enrol_util::{ContextId, CourseId, RoleId, Timestamp, UserId};
use std::collections::HashMap;

/// Who is acting, plus the enrolment caches kept for them during a request.
///
/// Enrolling or unenrolling the acting user drops the cached entries for
/// the course so the next access check sees the change.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    acting_user: Option<UserId>,
    enrolled: HashMap<CourseId, Timestamp>,
    tempguest: HashMap<CourseId, Timestamp>,
    temp_roles: HashMap<ContextId, Vec<RoleId>>,
}

impl RequestContext {
    /// Context for an interactive request by `user`
    pub fn for_user(user: UserId) -> Self {
        Self {
            acting_user: Some(user),
            ..Default::default()
        }
    }

    /// Context for background jobs; no user session is touched
    pub fn system() -> Self {
        Self::default()
    }

    pub fn acting_user(&self) -> Option<UserId> {
        self.acting_user
    }

    pub fn is_acting_user(&self, user: UserId) -> bool {
        self.acting_user == Some(user)
    }

    /// Id recorded as the modifier of records written in this context
    pub fn modifier_id(&self) -> UserId {
        self.acting_user.unwrap_or(UserId::new(0))
    }

    /// Remember that the acting user may access `course` until `until`
    pub fn cache_enrolled(&mut self, course: CourseId, until: Timestamp) {
        self.enrolled.insert(course, until);
    }

    /// Remember temporary guest access to `course`
    pub fn cache_tempguest(&mut self, course: CourseId, until: Timestamp) {
        self.tempguest.insert(course, until);
    }

    /// Temporary role held for the duration of the request
    pub fn add_temp_role(&mut self, context: ContextId, role: RoleId) {
        self.temp_roles.entry(context).or_default().push(role);
    }

    pub fn enrolled_until(&self, course: CourseId) -> Option<Timestamp> {
        self.enrolled.get(&course).copied()
    }

    pub fn tempguest_until(&self, course: CourseId) -> Option<Timestamp> {
        self.tempguest.get(&course).copied()
    }

    pub fn temp_roles(&self, context: ContextId) -> &[RoleId] {
        self.temp_roles.get(&context).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop cached access to `course` if `user` is the acting user.
    /// Temporary roles in the course context go with a temp-guest entry.
    pub(crate) fn forget_course(&mut self, user: UserId, course: CourseId, context: ContextId) {
        if !self.is_acting_user(user) {
            return;
        }
        self.enrolled.remove(&course);
        if self.tempguest.remove(&course).is_some() {
            self.temp_roles.remove(&context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated(user: UserId) -> RequestContext {
        let mut ctx = RequestContext::for_user(user);
        ctx.cache_enrolled(CourseId::new(2), Timestamp::from_secs(100));
        ctx.cache_tempguest(CourseId::new(2), Timestamp::from_secs(100));
        ctx.add_temp_role(ContextId::new(20), RoleId::new(6));
        ctx
    }

    #[test]
    fn forget_course_for_acting_user() {
        let mut ctx = populated(UserId::new(7));
        ctx.forget_course(UserId::new(7), CourseId::new(2), ContextId::new(20));

        assert!(ctx.enrolled_until(CourseId::new(2)).is_none());
        assert!(ctx.tempguest_until(CourseId::new(2)).is_none());
        assert!(ctx.temp_roles(ContextId::new(20)).is_empty());
    }

    #[test]
    fn other_users_leave_cache_alone() {
        let mut ctx = populated(UserId::new(7));
        ctx.forget_course(UserId::new(8), CourseId::new(2), ContextId::new(20));

        assert!(ctx.enrolled_until(CourseId::new(2)).is_some());
        assert_eq!(ctx.temp_roles(ContextId::new(20)), &[RoleId::new(6)]);
    }

    #[test]
    fn temp_roles_kept_without_tempguest_entry() {
        let mut ctx = RequestContext::for_user(UserId::new(7));
        ctx.cache_enrolled(CourseId::new(2), Timestamp::from_secs(100));
        ctx.add_temp_role(ContextId::new(20), RoleId::new(6));

        ctx.forget_course(UserId::new(7), CourseId::new(2), ContextId::new(20));
        assert!(ctx.enrolled_until(CourseId::new(2)).is_none());
        assert_eq!(ctx.temp_roles(ContextId::new(20)).len(), 1);
    }

    #[test]
    fn system_context_has_no_user() {
        let ctx = RequestContext::system();
        assert!(ctx.acting_user().is_none());
        assert_eq!(ctx.modifier_id(), UserId::new(0));
    }
}
