//! Expiry sweep

use shared_enrol_api::{EnrolmentInstance, METHOD_NAME, SyncReport, SyncStatus};
use shared_enrol_host_api::{
    ComponentFilter, CourseDirectory, HostError, ProgressTrace, RoleAssignmentFilter, RoleService,
};
use shared_enrol_store::{AuditEvent, AuditEventType};
use shared_enrol_util::{CourseId, InstanceId, Result, SyncRunId, Timestamp, UserEnrolmentId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::{RequestContext, SharedEnrolPlugin};

/// Rows fetched per page of the expired scan
pub const DEFAULT_SYNC_PAGE_SIZE: usize = 500;

/// Options for one sweep
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Only sweep this course
    pub course: Option<CourseId>,
    /// Checked between rows; the sweep stops cleanly once set
    pub interrupt: Option<Arc<AtomicBool>>,
    pub page_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            course: None,
            interrupt: None,
            page_size: DEFAULT_SYNC_PAGE_SIZE,
        }
    }
}

impl SyncOptions {
    pub fn for_course(course: CourseId) -> Self {
        Self {
            course: Some(course),
            ..Default::default()
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

impl SharedEnrolPlugin {
    /// Unenrol every user whose grant through this method ended before `now`.
    ///
    /// Returns `Disabled` without touching anything when the method is
    /// switched off site-wide. A host or store failure aborts the pass.
    pub fn sync(
        &self,
        trace: &mut dyn ProgressTrace,
        options: &SyncOptions,
        now: Timestamp,
    ) -> Result<SyncReport> {
        let run_id = SyncRunId::new();

        if !self.settings.enabled {
            debug!(run_id = %run_id, "Shared enrolment disabled, skipping sweep");
            trace.finished();
            return Ok(SyncReport {
                run_id,
                status: SyncStatus::Disabled,
                unenrolled: 0,
                interrupted: false,
            });
        }

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SyncStarted {
            run_id: run_id.clone(),
            course_id: options.course,
        }));
        info!(run_id = %run_id, course_id = ?options.course, "Expiry sweep started");

        trace.output("Verifying shared enrolment expiration...", 0);

        let (unenrolled, interrupted) = match self.sweep_expired(trace, options, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Expiry sweep aborted");
                return Err(e);
            }
        };

        trace.output("...shared enrolment updates finished.", 0);
        trace.finished();

        let report = SyncReport {
            run_id,
            status: SyncStatus::Ok,
            unenrolled,
            interrupted,
        };

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SyncFinished {
            run_id: report.run_id.clone(),
            status: report.status,
            unenrolled,
            interrupted,
        }));
        info!(run_id = %report.run_id, unenrolled, interrupted, "Expiry sweep finished");

        Ok(report)
    }

    /// Walk expired rows page by page in id order. Rows are deleted as they
    /// are processed, so resuming after the last seen id never skips one.
    fn sweep_expired(
        &self,
        trace: &mut dyn ProgressTrace,
        options: &SyncOptions,
        now: Timestamp,
    ) -> Result<(u64, bool)> {
        let page_size = options.page_size.max(1);
        let mut ctx = RequestContext::system();
        let mut instances: HashMap<InstanceId, Option<EnrolmentInstance>> = HashMap::new();
        let mut after = UserEnrolmentId::new(0);
        let mut unenrolled = 0u64;

        loop {
            let page = self.store.expired_user_enrolments(
                METHOD_NAME,
                now,
                options.course,
                after,
                page_size,
            )?;
            let last_page = page.len() < page_size;

            for row in page {
                if options.interrupted() {
                    info!(after = %after, "Expiry sweep interrupted");
                    return Ok((unenrolled, true));
                }

                let ue = row.user_enrolment;
                after = ue.id;

                let instance = match instances.entry(ue.instance_id) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => entry.insert(self.store.get_instance(ue.instance_id)?),
                };
                let Some(instance) = instance.as_ref() else {
                    debug!(instance_id = %ue.instance_id, "Instance vanished during sweep");
                    continue;
                };

                let context = match self.host.course_context(row.course_id) {
                    Ok(context) => context,
                    Err(HostError::MissingContext(course)) => {
                        debug!(course_id = %course, "Course has no context, skipping");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };

                // Every role in the course context goes, whoever granted it.
                // Hosts expose no child contexts, so none are walked.
                self.host.unassign_roles(&RoleAssignmentFilter {
                    user_id: ue.user_id,
                    context_id: context,
                    component: ComponentFilter::Any,
                })?;
                self.unenrol_user(&mut ctx, instance, ue.user_id)?;

                trace.output(
                    &format!(
                        "unenrolling expired user {} from course {}",
                        ue.user_id, instance.course_id
                    ),
                    1,
                );
                unenrolled += 1;
            }

            if last_page {
                return Ok((unenrolled, false));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_enrol_api::InstanceFields;
    use shared_enrol_config::PluginSettings;
    use shared_enrol_host_api::{BufferTrace, MockHost};
    use shared_enrol_store::SqliteStore;
    use shared_enrol_util::{ContextId, UserId};
    use crate::EnrolOptions;

    const NOW: Timestamp = Timestamp::from_secs(1_000);

    fn plugin(settings: PluginSettings) -> (SharedEnrolPlugin, Arc<MockHost>, EnrolmentInstance) {
        let host = Arc::new(MockHost::new());
        host.add_course(CourseId::new(2), ContextId::new(20), Timestamp::from_secs(0));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let plugin = SharedEnrolPlugin::new(settings, store, host.clone());
        let fields = InstanceFields {
            enrol_period_seconds: Some(100),
            ..Default::default()
        };
        let id = plugin.add_instance(CourseId::new(2), &fields, NOW).unwrap().unwrap();
        let instance = plugin.store().get_instance(id).unwrap().unwrap();
        (plugin, host, instance)
    }

    fn enrol_many(plugin: &SharedEnrolPlugin, instance: &EnrolmentInstance, users: std::ops::Range<i64>) {
        let mut ctx = RequestContext::system();
        for user in users {
            plugin
                .enrol_user(&mut ctx, instance, UserId::new(user), &EnrolOptions::default(), NOW)
                .unwrap();
        }
    }

    #[test]
    fn test_disabled_sweep_touches_nothing() {
        let settings = PluginSettings {
            enabled: false,
            ..Default::default()
        };
        let (plugin, host, instance) = plugin(settings);
        enrol_many(&plugin, &instance, 10..13);
        let before = host.mutation_count();

        let mut trace = BufferTrace::new();
        let report = plugin
            .sync(&mut trace, &SyncOptions::default(), Timestamp::from_secs(1_000_000))
            .unwrap();

        assert_eq!(report.status, SyncStatus::Disabled);
        assert_eq!(report.status.code(), 2);
        assert!(trace.is_finished());
        assert!(trace.lines().is_empty());
        assert_eq!(host.mutation_count(), before);
        assert_eq!(plugin.store().user_enrolments_for_instance(instance.id).unwrap().len(), 3);
    }

    #[test]
    fn test_paging_covers_every_row() {
        let (plugin, _, instance) = plugin(PluginSettings::default());
        enrol_many(&plugin, &instance, 10..17);

        let options = SyncOptions {
            page_size: 2,
            ..Default::default()
        };
        let mut trace = BufferTrace::new();
        let report = plugin.sync(&mut trace, &options, Timestamp::from_secs(2_000)).unwrap();

        assert_eq!(report.status, SyncStatus::Ok);
        assert_eq!(report.unenrolled, 7);
        assert!(!report.interrupted);
        assert!(plugin.store().user_enrolments_for_instance(instance.id).unwrap().is_empty());
    }

    #[test]
    fn test_interrupt_stops_between_rows() {
        let (plugin, _, instance) = plugin(PluginSettings::default());
        enrol_many(&plugin, &instance, 10..13);

        let flag = Arc::new(AtomicBool::new(true));
        let options = SyncOptions {
            interrupt: Some(flag),
            ..Default::default()
        };
        let mut trace = BufferTrace::new();
        let report = plugin.sync(&mut trace, &options, Timestamp::from_secs(2_000)).unwrap();

        assert!(report.interrupted);
        assert_eq!(report.unenrolled, 0);
        assert!(trace.is_finished());
        assert_eq!(plugin.store().user_enrolments_for_instance(instance.id).unwrap().len(), 3);
    }

    #[test]
    fn test_host_failure_aborts_sweep() {
        let (plugin, host, instance) = plugin(PluginSettings::default());
        enrol_many(&plugin, &instance, 10..12);
        host.set_fail_unassign(true);

        let mut trace = BufferTrace::new();
        let result = plugin.sync(&mut trace, &SyncOptions::default(), Timestamp::from_secs(2_000));

        assert!(result.is_err());
        assert!(!trace.is_finished());
        assert_eq!(plugin.store().user_enrolments_for_instance(instance.id).unwrap().len(), 2);
    }

    #[test]
    fn test_course_filter() {
        let (plugin, host, instance) = plugin(PluginSettings::default());
        host.add_course(CourseId::new(3), ContextId::new(30), Timestamp::from_secs(0));
        let other_id = plugin
            .add_instance(
                CourseId::new(3),
                &InstanceFields {
                    enrol_period_seconds: Some(100),
                    ..Default::default()
                },
                NOW,
            )
            .unwrap()
            .unwrap();
        let other = plugin.store().get_instance(other_id).unwrap().unwrap();
        enrol_many(&plugin, &instance, 10..12);
        enrol_many(&plugin, &other, 10..12);

        let mut trace = BufferTrace::new();
        let report = plugin
            .sync(&mut trace, &SyncOptions::for_course(CourseId::new(3)), Timestamp::from_secs(2_000))
            .unwrap();

        assert_eq!(report.unenrolled, 2);
        assert_eq!(plugin.store().user_enrolments_for_instance(instance.id).unwrap().len(), 2);
        assert!(plugin.store().user_enrolments_for_instance(other.id).unwrap().is_empty());
        assert!(trace.contains("from course 3"));
        assert!(!trace.contains("from course 2"));
    }
}
