//! User enrolment lifecycle: enrol and unenrol

use shared_enrol_api::{
    COMPONENT, EnrolStartPolicy, EnrolmentInstance, Event, EventPayload, METHOD_NAME,
    UserEnrolment, UserEnrolmentStatus,
};
use shared_enrol_host_api::{
    CacheService, ComponentFilter, CourseDirectory, EventSink, GradeService, GroupService,
    LastAccessService, Ownership, RoleAssignmentFilter, RoleService,
};
use shared_enrol_store::{AuditEvent, AuditEventType};
use shared_enrol_util::{EnrolError, Result, RoleId, Timestamp, UserEnrolmentId, UserId};
use tracing::{debug, info};

use crate::{RequestContext, SharedEnrolPlugin};

/// Optional overrides for [`SharedEnrolPlugin::enrol_user`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrolOptions {
    /// Role to assign instead of the instance default
    pub role_id: Option<RoleId>,
    /// Status for new records (default active); updates keep the current
    /// status unless this is set
    pub status: Option<UserEnrolmentStatus>,
    /// Restore archived grades; defaults to the host-wide policy
    pub recover_grades: Option<bool>,
}

impl SharedEnrolPlugin {
    /// Enrol `user` through `instance`, or refresh an existing enrolment.
    ///
    /// The grant starts according to the instance start policy and ends
    /// `enrol_period` after `now` (never, for unlimited instances).
    pub fn enrol_user(
        &self,
        ctx: &mut RequestContext,
        instance: &EnrolmentInstance,
        user: UserId,
        options: &EnrolOptions,
        now: Timestamp,
    ) -> Result<UserEnrolment> {
        if instance.course_id == self.host.site_course_id() {
            return Err(EnrolError::invalid_instance(
                "cannot enrol into the site course",
            ));
        }
        self.check_method(instance)?;

        let course = instance.course_id;
        let context = self.host.course_context(course)?;

        let time_start = match instance.enrol_start {
            EnrolStartPolicy::CourseStart => self.host.course_start(course)?,
            EnrolStartPolicy::Today => now.start_of_day(),
            EnrolStartPolicy::Now => now,
        };
        let time_end = instance
            .enrol_period
            // A course that has not started yet grants the full period from its start
            .map(|period| now.max(time_start).saturating_add(period))
            .unwrap_or(Timestamp::ZERO);

        let record = match self.store.get_user_enrolment(instance.id, user)? {
            Some(existing) => {
                let status_changed = options.status.is_some_and(|s| s != existing.status);
                if existing.time_start != time_start
                    || existing.time_end != time_end
                    || status_changed
                {
                    let updated = UserEnrolment {
                        status: options.status.unwrap_or(existing.status),
                        time_start,
                        time_end,
                        modifier_id: ctx.modifier_id(),
                        time_modified: now,
                        ..existing.clone()
                    };
                    self.store.update_user_enrolment(&updated)?;

                    self.host.emit(Event::new(EventPayload::UserEnrolmentUpdated {
                        user_enrolment_id: updated.id,
                        course_id: course,
                        context_id: context,
                        related_user_id: user,
                        enrol: METHOD_NAME.to_string(),
                        before: existing,
                        after: updated.clone(),
                    }))?;
                    self.host.user_enrolment_changed(
                        course,
                        user,
                        updated.status,
                        updated.time_start,
                        updated.time_end,
                    )?;

                    let _ = self.store.append_audit(AuditEvent::new(
                        AuditEventType::UserEnrolmentUpdated {
                            instance_id: instance.id,
                            course_id: course,
                            user_id: user,
                            time_end,
                        },
                    ));
                    info!(user_id = %user, course_id = %course, time_end = %time_end, "User enrolment updated");
                    updated
                } else {
                    debug!(user_id = %user, course_id = %course, "User enrolment unchanged");
                    existing
                }
            }
            None => {
                let mut created = UserEnrolment {
                    id: UserEnrolmentId::new(0),
                    instance_id: instance.id,
                    user_id: user,
                    status: options.status.unwrap_or(UserEnrolmentStatus::Active),
                    time_start,
                    time_end,
                    modifier_id: ctx.modifier_id(),
                    time_created: now,
                    time_modified: now,
                };
                created.id = self.store.insert_user_enrolment(&created)?;

                self.host.emit(Event::new(EventPayload::UserEnrolmentCreated {
                    user_enrolment_id: created.id,
                    course_id: course,
                    context_id: context,
                    related_user_id: user,
                    enrol: METHOD_NAME.to_string(),
                    record: created.clone(),
                }))?;
                self.host.user_enrolment_changed(
                    course,
                    user,
                    created.status,
                    created.time_start,
                    created.time_end,
                )?;

                let _ = self.store.append_audit(AuditEvent::new(AuditEventType::UserEnrolled {
                    instance_id: instance.id,
                    course_id: course,
                    user_id: user,
                    time_end,
                }));
                info!(user_id = %user, course_id = %course, time_end = %time_end, "User enrolled");
                created
            }
        };

        // Roles go in after the enrolment event
        if let Some(role) = options.role_id.or(instance.role_id) {
            let owner = self.owner(instance);
            let tag = self.host.roles_protected().then_some(&owner);
            self.host.assign_role(role, user, context, tag)?;
        }

        if options
            .recover_grades
            .unwrap_or_else(|| self.host.recover_grades_default())
        {
            self.host.recover_grade_history(user, course)?;
        }

        ctx.forget_course(user, course, context);

        Ok(record)
    }

    /// Remove `user` from `instance`. Unknown users are ignored.
    ///
    /// When this was the user's last enrolment in the course, through any
    /// method, every remaining trace of the user in the course is removed:
    /// roles, group memberships, grades (archived) and last access.
    pub fn unenrol_user(
        &self,
        ctx: &mut RequestContext,
        instance: &EnrolmentInstance,
        user: UserId,
    ) -> Result<()> {
        self.check_method(instance)?;

        let course = instance.course_id;
        let context = self.host.course_context(course)?;

        let Some(ue) = self.store.get_user_enrolment(instance.id, user)? else {
            debug!(user_id = %user, instance_id = %instance.id, "User not enrolled, nothing to do");
            return Ok(());
        };

        let owner = self.owner(instance);
        for membership in self.host.owned_memberships(user, &owner)? {
            self.host.remove_member(membership.group_id, user)?;
        }

        self.host.unassign_roles(&RoleAssignmentFilter {
            user_id: user,
            context_id: context,
            component: ComponentFilter::Owned(owner),
        })?;
        self.store.delete_user_enrolment(ue.id)?;

        let last_enrol = !self.store.user_has_any_enrolment(user, course)?;
        if last_enrol {
            self.host.unassign_roles(&RoleAssignmentFilter {
                user_id: user,
                context_id: context,
                component: ComponentFilter::Any,
            })?;
            self.host.delete_course_memberships(course, user)?;
            self.host.archive_grades(course, user)?;
            self.host.purge_last_access(user, course)?;
        }

        self.host.emit(Event::new(EventPayload::UserEnrolmentDeleted {
            user_enrolment_id: ue.id,
            course_id: course,
            context_id: context,
            related_user_id: user,
            enrol: METHOD_NAME.to_string(),
            record: ue.clone(),
            last_enrol,
        }))?;

        self.host.mark_user_dirty(user)?;
        self.host.user_enrolment_changed(
            course,
            user,
            UserEnrolmentStatus::Suspended,
            ue.time_start,
            ue.time_end,
        )?;

        ctx.forget_course(user, course, context);

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::UserUnenrolled {
            instance_id: instance.id,
            course_id: course,
            user_id: user,
            last_enrol,
        }));
        info!(user_id = %user, course_id = %course, last_enrol, "User unenrolled");

        Ok(())
    }

    fn owner(&self, instance: &EnrolmentInstance) -> Ownership {
        Ownership::new(COMPONENT, instance.id)
    }
}
