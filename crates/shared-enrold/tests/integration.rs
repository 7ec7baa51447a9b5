//! Integration tests for shared-enrold
//!
//! These wire the same pieces as the daemon: parsed configuration, the
//! on-disk store and the local host.

use shared_enrol_api::{InstanceFields, SyncStatus};
use shared_enrol_config::{SYNC_TASK_NAME, Settings, parse_config};
use shared_enrol_core::{EnrolOptions, RequestContext, SharedEnrolPlugin, SyncOptions};
use shared_enrol_host_api::{BufferTrace, Capability};
use shared_enrol_host_local::{HOST_DB_FILENAME, LocalHost};
use shared_enrol_store::{SqliteStore, Store, TaskState};
use shared_enrol_util::{
    ContextId, CourseId, DB_FILENAME, EnrolError, RoleId, Timestamp, UserId,
};
use std::path::Path;
use std::sync::Arc;

const COURSE: CourseId = CourseId::new(2);
const CONTEXT: ContextId = ContextId::new(20);
const STUDENT: RoleId = RoleId::new(5);

fn settings(extra: &str) -> Settings {
    parse_config(&format!(
        "config_version = 1\n\n[plugin]\nenrol_period_seconds = 86400\n{}",
        extra
    ))
    .unwrap()
}

fn open(dir: &Path, settings: &Settings) -> (SharedEnrolPlugin, Arc<LocalHost>, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open(dir.join(DB_FILENAME)).unwrap());
    let host = Arc::new(LocalHost::open(dir.join(HOST_DB_FILENAME), settings.host.clone()).unwrap());
    let plugin = SharedEnrolPlugin::new(settings.plugin.clone(), store.clone(), host.clone());
    (plugin, host, store)
}

fn seed(host: &LocalHost) {
    host.add_course(COURSE, CONTEXT, Timestamp::from_secs(0)).unwrap();
    host.add_role(STUDENT, "student", "Student", true).unwrap();
    host.add_role(RoleId::new(3), "editingteacher", "Teacher", true).unwrap();
}

#[test]
fn test_configured_sweep_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings("");
    let user = UserId::new(40);

    {
        let (plugin, host, store) = open(dir.path(), &settings);
        seed(&host);
        let id = plugin
            .add_default_instance(COURSE, Timestamp::from_secs(1))
            .unwrap()
            .unwrap();
        let instance = store.get_instance(id).unwrap().unwrap();
        assert_eq!(instance.role_id, Some(STUDENT));

        let ue = plugin
            .enrol_user(
                &mut RequestContext::system(),
                &instance,
                user,
                &EnrolOptions::default(),
                Timestamp::from_secs(1000),
            )
            .unwrap();
        assert_eq!(ue.time_end, Timestamp::from_secs(87_400));
        assert_eq!(host.role_assignments(user, CONTEXT).unwrap().len(), 1);
    }

    // Reopen as a fresh daemon process would
    let (plugin, host, store) = open(dir.path(), &settings);
    let mut trace = BufferTrace::new();
    let report = plugin
        .sync(&mut trace, &SyncOptions::default(), Timestamp::from_secs(87_399))
        .unwrap();
    assert_eq!(report.unenrolled, 0);

    let mut trace = BufferTrace::new();
    let report = plugin
        .sync(&mut trace, &SyncOptions::default(), Timestamp::from_secs(87_401))
        .unwrap();
    assert_eq!(report.status, SyncStatus::Ok);
    assert_eq!(report.unenrolled, 1);
    assert!(trace.contains("unenrolling expired user 40 from course 2"));

    assert!(host.role_assignments(user, CONTEXT).unwrap().is_empty());
    assert!(host.is_user_dirty(user).unwrap());
    let events = host.recent_event_names(10).unwrap();
    assert_eq!(events.first().map(String::as_str), Some("user_enrolment_deleted"));
    assert!(!store.user_has_any_enrolment(user, COURSE).unwrap());
}

#[test]
fn test_unprotected_roles_are_untagged() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings("\n[host]\nroles_protected = false\n");
    let (plugin, host, store) = open(dir.path(), &settings);
    seed(&host);

    let id = plugin
        .add_instance(COURSE, &InstanceFields::default(), Timestamp::from_secs(1))
        .unwrap()
        .unwrap();
    let instance = store.get_instance(id).unwrap().unwrap();
    plugin
        .enrol_user(
            &mut RequestContext::system(),
            &instance,
            UserId::new(40),
            &EnrolOptions::default(),
            Timestamp::from_secs(10),
        )
        .unwrap();

    let roles = host.role_assignments(UserId::new(40), CONTEXT).unwrap();
    assert_eq!(roles.len(), 1);
    assert!(roles[0].owner.is_none());
}

#[test]
fn test_site_course_from_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings("\n[host]\nsite_course_id = 2\n");
    let (plugin, host, store) = open(dir.path(), &settings);
    seed(&host);

    let id = plugin
        .add_instance(COURSE, &InstanceFields::default(), Timestamp::from_secs(1))
        .unwrap()
        .unwrap();
    let instance = store.get_instance(id).unwrap().unwrap();
    let result = plugin.enrol_user(
        &mut RequestContext::system(),
        &instance,
        UserId::new(40),
        &EnrolOptions::default(),
        Timestamp::from_secs(10),
    );
    assert!(matches!(result, Err(EnrolError::InvalidInstance(_))));
}

#[test]
fn test_capabilities_from_local_host() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings("");
    let (plugin, host, _) = open(dir.path(), &settings);
    seed(&host);
    let teacher = UserId::new(7);
    let ctx = RequestContext::for_user(teacher);

    assert!(!plugin.can_add_instance(&ctx, COURSE).unwrap());

    host.grant_capability(teacher, Capability::CourseEnrolConfig, CONTEXT).unwrap();
    host.grant_capability(teacher, Capability::SharedConfig, CONTEXT).unwrap();
    assert!(plugin.can_add_instance(&ctx, COURSE).unwrap());

    plugin
        .add_default_instance(COURSE, Timestamp::from_secs(1))
        .unwrap();
    assert!(!plugin.can_add_instance(&ctx, COURSE).unwrap());
}

#[test]
fn test_disabled_method_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings("enabled = false\n");
    let (plugin, _, _) = open(dir.path(), &settings);

    let mut trace = BufferTrace::new();
    let report = plugin
        .sync(&mut trace, &SyncOptions::default(), Timestamp::from_secs(1))
        .unwrap();
    assert_eq!(report.status.code(), 2);
}

#[test]
fn test_task_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings("");
    let started = shared_enrol_util::now();

    {
        let (_, _, store) = open(dir.path(), &settings);
        store
            .save_task_state(&TaskState {
                name: settings.task.name.to_string(),
                last_run: started,
                last_result: SyncStatus::Ok.code(),
            })
            .unwrap();
    }

    let (_, _, store) = open(dir.path(), &settings);
    let state = store.load_task_state(SYNC_TASK_NAME).unwrap().unwrap();
    assert_eq!(state.last_result, 0);
    assert_eq!(state.last_run.timestamp(), started.timestamp());
}
