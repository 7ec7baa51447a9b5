//! Enrolment instance manager

use shared_enrol_api::{EnrolmentInstance, InstanceFields, METHOD_NAME};
use shared_enrol_config::PluginSettings;
use shared_enrol_host_api::{AccessControl, Capability, CourseDirectory, Host};
use shared_enrol_store::{AuditEvent, AuditEventType, Store};
use shared_enrol_util::{ContextId, CourseId, EnrolError, InstanceId, Result, RoleId, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::RequestContext;

/// The shared enrolment method: instance management, the user enrolment
/// lifecycle and the expiry sweep.
pub struct SharedEnrolPlugin {
    pub(crate) settings: PluginSettings,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) host: Arc<dyn Host>,
}

impl SharedEnrolPlugin {
    pub fn new(settings: PluginSettings, store: Arc<dyn Store>, host: Arc<dyn Host>) -> Self {
        info!(
            enabled = settings.enabled,
            default_enrol = settings.default_enrol,
            "Shared enrolment plugin initialized"
        );

        Self {
            settings,
            store,
            host,
        }
    }

    /// Method name stored on every instance
    pub fn name(&self) -> &'static str {
        METHOD_NAME
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Users of this method may be managed by hand
    pub fn allow_manage(&self, _instance: &EnrolmentInstance) -> bool {
        true
    }

    pub(crate) fn has_capability(
        &self,
        ctx: &RequestContext,
        capability: Capability,
        context: ContextId,
    ) -> Result<bool> {
        match ctx.acting_user() {
            Some(user) => Ok(self.host.has_capability(user, capability, context)?),
            None => Ok(false),
        }
    }

    /// The acting user may configure enrolment and no instance exists yet
    pub fn can_add_instance(&self, ctx: &RequestContext, course: CourseId) -> Result<bool> {
        let context = self.host.course_context(course)?;

        if !self.has_capability(ctx, Capability::CourseEnrolConfig, context)?
            || !self.has_capability(ctx, Capability::SharedConfig, context)?
        {
            return Ok(false);
        }

        // Multiple instances per course are not supported
        Ok(!self.store.instance_exists(course, METHOD_NAME)?)
    }

    /// Add an instance seeded from the configured defaults
    pub fn add_default_instance(
        &self,
        course: CourseId,
        now: Timestamp,
    ) -> Result<Option<InstanceId>> {
        self.add_instance(course, &InstanceFields::default(), now)
    }

    /// Add an instance unless the course already has one (returns `None`).
    /// Unset fields take the configured defaults.
    pub fn add_instance(
        &self,
        course: CourseId,
        fields: &InstanceFields,
        now: Timestamp,
    ) -> Result<Option<InstanceId>> {
        if self.store.instance_exists(course, METHOD_NAME)? {
            debug!(course_id = %course, "Course already has a shared instance");
            return Ok(None);
        }

        let instance = EnrolmentInstance {
            id: InstanceId::new(0),
            enrol: METHOD_NAME.to_string(),
            course_id: course,
            status: fields.status.unwrap_or(self.settings.status),
            role_id: match fields.role_id {
                Some(role) => real_role(role),
                None => self.settings.role_id,
            },
            enrol_period: match fields.enrol_period_seconds {
                Some(secs) => period_from_secs(secs),
                None => self.settings.enrol_period,
            },
            enrol_start: fields.enrol_start.unwrap_or(self.settings.enrol_start),
            time_created: now,
            time_modified: now,
        };

        let id = self.store.insert_instance(&instance)?;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::InstanceAdded {
            instance_id: id,
            course_id: course,
        }));
        info!(instance_id = %id, course_id = %course, "Shared instance added");

        Ok(Some(id))
    }

    /// Add the default instance to a new course when `default_enrol` is on
    pub fn on_course_created(
        &self,
        course: CourseId,
        now: Timestamp,
    ) -> Result<Option<InstanceId>> {
        if !self.settings.default_enrol {
            return Ok(None);
        }
        self.add_default_instance(course, now)
    }

    /// Apply changed fields. Every other shared instance in the course is
    /// deleted first, unenrolling its users, so one instance remains.
    ///
    /// Returns false when the instance record no longer exists.
    pub fn update_instance(
        &self,
        ctx: &mut RequestContext,
        instance: &EnrolmentInstance,
        data: &InstanceFields,
        now: Timestamp,
    ) -> Result<bool> {
        let mut removed_duplicates = Vec::new();
        for other in self.store.instances_for_course(instance.course_id, METHOD_NAME)? {
            if other.id != instance.id {
                self.delete_instance(ctx, &other)?;
                removed_duplicates.push(other.id);
            }
        }

        let Some(mut current) = self.store.get_instance(instance.id)? else {
            return Ok(false);
        };

        let mut changed = false;
        if let Some(status) = data.status
            && status != current.status
        {
            current.status = status;
            changed = true;
        }
        if let Some(role) = data.role_id.map(real_role)
            && role != current.role_id
        {
            current.role_id = role;
            changed = true;
        }
        if let Some(period) = data.enrol_period_seconds.map(period_from_secs)
            && period != current.enrol_period
        {
            current.enrol_period = period;
            changed = true;
        }
        if let Some(start) = data.enrol_start
            && start != current.enrol_start
        {
            current.enrol_start = start;
            changed = true;
        }

        if changed {
            current.time_modified = now;
            self.store.update_instance(&current)?;
        }

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::InstanceUpdated {
            instance_id: current.id,
            course_id: current.course_id,
            removed_duplicates: removed_duplicates.clone(),
        }));
        info!(
            instance_id = %current.id,
            changed,
            removed_duplicates = removed_duplicates.len(),
            "Shared instance updated"
        );

        Ok(true)
    }

    /// Unenrol every user of the instance, then delete it.
    /// Returns how many users were unenrolled.
    pub fn delete_instance(
        &self,
        ctx: &mut RequestContext,
        instance: &EnrolmentInstance,
    ) -> Result<usize> {
        self.check_method(instance)?;

        let users = self.store.user_enrolments_for_instance(instance.id)?;
        for ue in &users {
            self.unenrol_user(ctx, instance, ue.user_id)?;
        }
        self.store.delete_instance(instance.id)?;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::InstanceDeleted {
            instance_id: instance.id,
            course_id: instance.course_id,
            unenrolled: users.len(),
        }));
        info!(
            instance_id = %instance.id,
            course_id = %instance.course_id,
            unenrolled = users.len(),
            "Shared instance deleted"
        );

        Ok(users.len())
    }

    pub fn can_delete_instance(
        &self,
        ctx: &RequestContext,
        instance: &EnrolmentInstance,
    ) -> Result<bool> {
        let context = self.host.course_context(instance.course_id)?;
        self.has_capability(ctx, Capability::SharedConfig, context)
    }

    pub fn can_hide_show_instance(
        &self,
        ctx: &RequestContext,
        instance: &EnrolmentInstance,
    ) -> Result<bool> {
        let context = self.host.course_context(instance.course_id)?;
        self.has_capability(ctx, Capability::SharedConfig, context)
    }

    pub(crate) fn check_method(&self, instance: &EnrolmentInstance) -> Result<()> {
        if !instance.is_method(METHOD_NAME) {
            return Err(EnrolError::invalid_instance(format!(
                "instance {} belongs to method '{}'",
                instance.id, instance.enrol
            )));
        }
        Ok(())
    }
}

/// Role id 0 means "no role"
fn real_role(role: RoleId) -> Option<RoleId> {
    (role.get() > 0).then_some(role)
}

/// Period 0 means unlimited
fn period_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
