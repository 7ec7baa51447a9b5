//! Host service implementations over the local database

use rusqlite::{OptionalExtension, params};
use shared_enrol_api::{Event, UserEnrolmentStatus};
use shared_enrol_host_api::{
    AccessControl, CacheService, Capability, ComponentFilter, CourseDirectory, EventSink,
    GradeService, GroupMembership, GroupService, HostError, HostResult, LastAccessService,
    Ownership, Role, RoleAssignmentFilter, RoleService,
};
use shared_enrol_util::{ContextId, CourseId, GroupId, RoleId, Timestamp, UserId};
use tracing::{debug, info};

use crate::adapter::{db, owner_columns, owner_from_columns};
use crate::LocalHost;

impl LocalHost {
    fn course_column(&self, course_id: CourseId, column: &str) -> HostResult<i64> {
        let sql = format!("SELECT {} FROM courses WHERE id = ?", column);
        self.conn()?
            .query_row(&sql, [course_id.get()], |row| row.get(0))
            .optional()
            .map_err(db)?
            .ok_or(HostError::MissingContext(course_id))
    }
}

impl AccessControl for LocalHost {
    fn has_capability(
        &self,
        user_id: UserId,
        capability: Capability,
        context_id: ContextId,
    ) -> HostResult<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM capability_grants
                 WHERE user_id = ? AND capability = ? AND context_id = ?",
                params![user_id.get(), capability.name(), context_id.get()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db)?;
        Ok(found.is_some())
    }
}

impl CourseDirectory for LocalHost {
    fn site_course_id(&self) -> CourseId {
        self.settings.site_course_id
    }

    fn course_context(&self, course_id: CourseId) -> HostResult<ContextId> {
        self.course_column(course_id, "context_id").map(ContextId::new)
    }

    fn course_start(&self, course_id: CourseId) -> HostResult<Timestamp> {
        self.course_column(course_id, "start_date")
            .map(Timestamp::from_secs)
    }
}

impl RoleService for LocalHost {
    fn assign_role(
        &self,
        role_id: RoleId,
        user_id: UserId,
        context_id: ContextId,
        owner: Option<&Ownership>,
    ) -> HostResult<()> {
        if self.role(role_id)?.is_none() {
            return Err(HostError::RoleNotFound(role_id));
        }

        let (component, item_id) = owner_columns(owner);
        self.conn()?
            .execute(
                "INSERT OR IGNORE INTO role_assignments
                 (role_id, user_id, context_id, component, item_id) VALUES (?, ?, ?, ?, ?)",
                params![role_id.get(), user_id.get(), context_id.get(), component, item_id],
            )
            .map_err(db)?;
        debug!(role_id = %role_id, user_id = %user_id, context_id = %context_id, "Role assigned");
        Ok(())
    }

    fn unassign_roles(&self, filter: &RoleAssignmentFilter) -> HostResult<usize> {
        let conn = self.conn()?;
        let user = filter.user_id.get();
        let context = filter.context_id.get();

        let removed = match &filter.component {
            ComponentFilter::Any => conn.execute(
                "DELETE FROM role_assignments WHERE user_id = ? AND context_id = ?",
                params![user, context],
            ),
            ComponentFilter::Untagged => conn.execute(
                "DELETE FROM role_assignments
                 WHERE user_id = ? AND context_id = ? AND component = ''",
                params![user, context],
            ),
            ComponentFilter::Owned(owner) => conn.execute(
                "DELETE FROM role_assignments
                 WHERE user_id = ? AND context_id = ? AND component = ? AND item_id = ?",
                params![user, context, owner.component, owner.item_id.get()],
            ),
        }
        .map_err(db)?;

        debug!(user_id = %filter.user_id, context_id = %filter.context_id, removed, "Roles unassigned");
        Ok(removed)
    }

    fn assignable_roles(&self, _context_id: ContextId) -> HostResult<Vec<Role>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, short_name, name FROM roles WHERE assignable = 1 ORDER BY id ASC")
            .map_err(db)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Role {
                    id: RoleId::new(row.get(0)?),
                    short_name: row.get(1)?,
                    name: row.get(2)?,
                })
            })
            .map_err(db)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db)
    }

    fn role(&self, role_id: RoleId) -> HostResult<Option<Role>> {
        self.conn()?
            .query_row(
                "SELECT short_name, name FROM roles WHERE id = ?",
                [role_id.get()],
                |row| {
                    Ok(Role {
                        id: role_id,
                        short_name: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(db)
    }

    fn roles_protected(&self) -> bool {
        self.settings.roles_protected
    }
}

impl GroupService for LocalHost {
    fn owned_memberships(
        &self,
        user_id: UserId,
        owner: &Ownership,
    ) -> HostResult<Vec<GroupMembership>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT group_id, component, item_id FROM group_members
                 WHERE user_id = ? AND component = ? AND item_id = ? ORDER BY group_id ASC",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map(
                params![user_id.get(), owner.component, owner.item_id.get()],
                |row| {
                    Ok(GroupMembership {
                        group_id: GroupId::new(row.get(0)?),
                        user_id,
                        owner: owner_from_columns(row.get(1)?, row.get(2)?),
                    })
                },
            )
            .map_err(db)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db)
    }

    fn remove_member(&self, group_id: GroupId, user_id: UserId) -> HostResult<()> {
        self.conn()?
            .execute(
                "DELETE FROM group_members WHERE group_id = ? AND user_id = ?",
                params![group_id.get(), user_id.get()],
            )
            .map_err(db)?;
        Ok(())
    }

    fn delete_course_memberships(
        &self,
        course_id: CourseId,
        user_id: UserId,
    ) -> HostResult<usize> {
        self.conn()?
            .execute(
                "DELETE FROM group_members WHERE user_id = ?1 AND group_id IN
                 (SELECT id FROM course_groups WHERE course_id = ?2)",
                params![user_id.get(), course_id.get()],
            )
            .map_err(db)
    }
}

impl GradeService for LocalHost {
    fn recover_grade_history(&self, user_id: UserId, course_id: CourseId) -> HostResult<()> {
        self.conn()?
            .execute(
                "UPDATE grades SET archived = 0 WHERE user_id = ? AND course_id = ?",
                params![user_id.get(), course_id.get()],
            )
            .map_err(db)?;
        Ok(())
    }

    fn archive_grades(&self, course_id: CourseId, user_id: UserId) -> HostResult<()> {
        self.conn()?
            .execute(
                "UPDATE grades SET archived = 1 WHERE user_id = ? AND course_id = ?",
                params![user_id.get(), course_id.get()],
            )
            .map_err(db)?;
        Ok(())
    }

    fn recover_grades_default(&self) -> bool {
        self.settings.recover_grades_default
    }
}

impl LastAccessService for LocalHost {
    fn purge_last_access(&self, user_id: UserId, course_id: CourseId) -> HostResult<()> {
        self.conn()?
            .execute(
                "DELETE FROM last_access WHERE user_id = ? AND course_id = ?",
                params![user_id.get(), course_id.get()],
            )
            .map_err(db)?;
        Ok(())
    }
}

impl CacheService for LocalHost {
    fn mark_user_dirty(&self, user_id: UserId) -> HostResult<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO dirty_users (user_id, marked_at) VALUES (?, ?)",
                params![user_id.get(), shared_enrol_util::now().to_rfc3339()],
            )
            .map_err(db)?;
        Ok(())
    }

    fn user_enrolment_changed(
        &self,
        course_id: CourseId,
        user_id: UserId,
        status: UserEnrolmentStatus,
        time_start: Timestamp,
        time_end: Timestamp,
    ) -> HostResult<()> {
        self.conn()?
            .execute(
                "INSERT INTO enrolment_changes (course_id, user_id, status, time_start, time_end)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    course_id.get(),
                    user_id.get(),
                    status.code(),
                    time_start.secs(),
                    time_end.secs()
                ],
            )
            .map_err(db)?;
        Ok(())
    }
}

impl EventSink for LocalHost {
    fn emit(&self, event: Event) -> HostResult<()> {
        let name = event.payload.name();
        let json =
            serde_json::to_string(&event).map_err(|e| HostError::Internal(e.to_string()))?;

        self.conn()?
            .execute(
                "INSERT INTO events (name, timestamp, event_json) VALUES (?, ?, ?)",
                params![name, event.timestamp.to_rfc3339(), json],
            )
            .map_err(db)?;

        info!(
            event = name,
            course_id = %event.payload.course_id(),
            user_id = %event.payload.related_user_id(),
            "Enrolment event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_enrol_api::EventPayload;
    use shared_enrol_config::HostSettings;
    use shared_enrol_util::{InstanceId, UserEnrolmentId};

    const COURSE: CourseId = CourseId::new(2);
    const CONTEXT: ContextId = ContextId::new(20);

    fn host() -> LocalHost {
        let host = LocalHost::in_memory(HostSettings::default()).unwrap();
        host.add_course(COURSE, CONTEXT, Timestamp::from_secs(500)).unwrap();
        host.add_role(RoleId::new(3), "editingteacher", "Teacher", true).unwrap();
        host.add_role(RoleId::new(5), "student", "Student", true).unwrap();
        host.add_role(RoleId::new(9), "manager", "Manager", false).unwrap();
        host
    }

    #[test]
    fn test_course_lookups() {
        let host = host();
        assert_eq!(host.course_context(COURSE).unwrap(), CONTEXT);
        assert_eq!(host.course_start(COURSE).unwrap(), Timestamp::from_secs(500));
        assert!(matches!(
            host.course_context(CourseId::new(99)),
            Err(HostError::MissingContext(c)) if c == CourseId::new(99)
        ));
        assert_eq!(host.site_course_id(), CourseId::new(1));
    }

    #[test]
    fn test_capability_grants() {
        let host = host();
        let user = UserId::new(4);
        host.grant_capability(user, Capability::SharedConfig, CONTEXT).unwrap();

        assert!(host.has_capability(user, Capability::SharedConfig, CONTEXT).unwrap());
        assert!(!host.has_capability(user, Capability::CourseEnrolConfig, CONTEXT).unwrap());
        assert!(!host
            .has_capability(user, Capability::SharedConfig, ContextId::new(30))
            .unwrap());
    }

    #[test]
    fn test_role_catalog() {
        let host = host();
        let ids: Vec<_> = host
            .assignable_roles(CONTEXT)
            .unwrap()
            .into_iter()
            .map(|r| r.id.get())
            .collect();
        assert_eq!(ids, vec![3, 5]);
        assert_eq!(host.role(RoleId::new(9)).unwrap().unwrap().short_name, "manager");
        assert!(host.role(RoleId::new(42)).unwrap().is_none());
    }

    #[test]
    fn test_unassign_filters() {
        let host = host();
        let user = UserId::new(4);
        let mine = Ownership::new("enrol_shared", InstanceId::new(1));
        let theirs = Ownership::new("enrol_self", InstanceId::new(2));
        host.assign_role(RoleId::new(5), user, CONTEXT, Some(&mine)).unwrap();
        host.assign_role(RoleId::new(5), user, CONTEXT, Some(&theirs)).unwrap();
        host.assign_role(RoleId::new(3), user, CONTEXT, None).unwrap();
        // Duplicate assignment is ignored
        host.assign_role(RoleId::new(3), user, CONTEXT, None).unwrap();

        let filter = |component| RoleAssignmentFilter {
            user_id: user,
            context_id: CONTEXT,
            component,
        };

        assert_eq!(host.unassign_roles(&filter(ComponentFilter::Owned(mine))).unwrap(), 1);
        assert_eq!(host.unassign_roles(&filter(ComponentFilter::Untagged)).unwrap(), 1);
        let left = host.role_assignments(user, CONTEXT).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].owner, Some(theirs));

        assert_eq!(host.unassign_roles(&filter(ComponentFilter::Any)).unwrap(), 1);
        assert!(host.role_assignments(user, CONTEXT).unwrap().is_empty());
    }

    #[test]
    fn test_assign_unknown_role_fails() {
        let host = host();
        let result = host.assign_role(RoleId::new(42), UserId::new(4), CONTEXT, None);
        assert!(matches!(result, Err(HostError::RoleNotFound(_))));
    }

    #[test]
    fn test_group_memberships() {
        let host = host();
        let user = UserId::new(4);
        let owner = Ownership::new("enrol_shared", InstanceId::new(1));
        host.add_group(GroupId::new(1), COURSE).unwrap();
        host.add_group(GroupId::new(2), COURSE).unwrap();
        host.add_group(GroupId::new(3), CourseId::new(3)).unwrap();
        host.add_group_member(GroupId::new(1), user, Some(&owner)).unwrap();
        host.add_group_member(GroupId::new(2), user, None).unwrap();
        host.add_group_member(GroupId::new(3), user, None).unwrap();

        let owned = host.owned_memberships(user, &owner).unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].group_id, GroupId::new(1));

        host.remove_member(GroupId::new(1), user).unwrap();
        assert!(host.owned_memberships(user, &owner).unwrap().is_empty());

        // Only this course's groups are touched
        assert_eq!(host.delete_course_memberships(COURSE, user).unwrap(), 1);
        assert_eq!(host.delete_course_memberships(COURSE, user).unwrap(), 0);
    }

    #[test]
    fn test_grades_and_last_access() {
        let host = host();
        let user = UserId::new(4);
        host.record_grade(user, COURSE).unwrap();
        host.record_access(user, COURSE, Timestamp::from_secs(900)).unwrap();

        host.archive_grades(COURSE, user).unwrap();
        assert_eq!(host.grade_archived(user, COURSE).unwrap(), Some(true));
        host.recover_grade_history(user, COURSE).unwrap();
        assert_eq!(host.grade_archived(user, COURSE).unwrap(), Some(false));

        host.purge_last_access(user, COURSE).unwrap();
        assert_eq!(host.last_access(user, COURSE).unwrap(), None);
    }

    #[test]
    fn test_events_and_caches_recorded() {
        let host = host();
        let user = UserId::new(4);
        let record = shared_enrol_api::UserEnrolment {
            id: UserEnrolmentId::new(1),
            instance_id: InstanceId::new(1),
            user_id: user,
            status: UserEnrolmentStatus::Active,
            time_start: Timestamp::ZERO,
            time_end: Timestamp::ZERO,
            modifier_id: UserId::new(0),
            time_created: Timestamp::ZERO,
            time_modified: Timestamp::ZERO,
        };
        host.emit(Event::new(EventPayload::UserEnrolmentCreated {
            user_enrolment_id: record.id,
            course_id: COURSE,
            context_id: CONTEXT,
            related_user_id: user,
            enrol: "shared".into(),
            record,
        }))
        .unwrap();
        host.mark_user_dirty(user).unwrap();

        assert_eq!(host.recent_event_names(5).unwrap().len(), 1);
        assert!(host.is_user_dirty(user).unwrap());
        assert!(!host.is_user_dirty(UserId::new(5)).unwrap());
    }
}
